use led_flasher::control::{ControlClient, ControlRequest, ControlResponse, ControlServer};
use led_flasher::core_led::pin::memory::MemoryChip;
use led_flasher::{LedModule, Mode, VirtualFs};
use std::net::UdpSocket;
use std::time::Duration;

fn read(path: &str) -> ControlRequest {
    ControlRequest::Read {
        path: path.to_string(),
    }
}

fn write(path: &str, value: &str) -> ControlRequest {
    ControlRequest::Write {
        path: path.to_string(),
        value: value.to_string(),
    }
}

#[test]
fn attributes_over_udp() {
    let mut chip = MemoryChip::new(64);
    let fs = VirtualFs::new();
    let module = LedModule::load(&mut chip, &fs, 21, 1000).unwrap();
    let server = ControlServer::bind("127.0.0.1:0", fs.clone()).unwrap();
    let client =
        ControlClient::connect(&server.local_addr().to_string(), Duration::from_secs(2)).unwrap();

    assert_eq!(
        client
            .request(&ControlRequest::List {
                dir: "/sys/led".into()
            })
            .unwrap(),
        ControlResponse::Entries(vec!["led21".into()])
    );

    assert_eq!(
        client.request(&write("/sys/led/led21/mode", "off\n")).unwrap(),
        ControlResponse::Written(4)
    );
    assert_eq!(module.state().mode(), Mode::Off);
    assert_eq!(
        client.request(&read("/sys/led/led21/mode")).unwrap(),
        ControlResponse::Value("off\n".into())
    );

    // Out of range: accepted, nothing changes.
    assert_eq!(
        client
            .request(&write("/sys/led/led21/blinkPeriod", "20000\n"))
            .unwrap(),
        ControlResponse::Written(6)
    );
    assert_eq!(
        client.request(&read("/sys/led/led21/blinkPeriod")).unwrap(),
        ControlResponse::Value("1000\n".into())
    );

    match client
        .request(&write("/sys/led/led21/blinkPeriod", "fast\n"))
        .unwrap()
    {
        ControlResponse::Error { errno, .. } => assert_eq!(errno, -libc::EINVAL),
        other => panic!("unexpected {:?}", other),
    }

    server.shutdown();
    module.unload();
}

#[test]
fn garbage_datagram_gets_an_error_reply() {
    let fs = VirtualFs::new();
    let server = ControlServer::bind("127.0.0.1:0", fs).unwrap();

    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    socket
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();
    socket.send_to(b"not json", server.local_addr()).unwrap();
    let mut buf = [0u8; 1024];
    let (size, _) = socket.recv_from(&mut buf).unwrap();
    let reply: ControlResponse = serde_json::from_slice(&buf[..size]).unwrap();
    match reply {
        ControlResponse::Error { errno, .. } => assert_eq!(errno, -libc::EINVAL),
        other => panic!("unexpected {:?}", other),
    }
    server.shutdown();
}

#[test]
fn unknown_path_reports_enoent() {
    let fs = VirtualFs::new();
    let server = ControlServer::bind("127.0.0.1:0", fs).unwrap();
    let client =
        ControlClient::connect(&server.local_addr().to_string(), Duration::from_secs(2)).unwrap();
    match client.request(&read("/sys/led/led21/mode")).unwrap() {
        ControlResponse::Error { errno, .. } => assert_eq!(errno, -libc::ENOENT),
        other => panic!("unexpected {:?}", other),
    }
}
