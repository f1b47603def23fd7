use super::protocol::{ControlRequest, ControlResponse, MAX_DATAGRAM};
use crate::attributes::VirtualFs;
use log::{debug, info, warn};
use std::error::Error;
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

/// How often the listener wakes up to check for shutdown.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Runs one request against the attribute tree.
pub fn handle_request(fs: &VirtualFs, request: ControlRequest) -> ControlResponse {
    let result = match request {
        ControlRequest::Read { path } => fs.read(&path).map(ControlResponse::Value),
        ControlRequest::Write { path, value } => fs
            .write(&path, value.as_bytes())
            .map(ControlResponse::Written),
        ControlRequest::List { dir } => fs.list(&dir).map(ControlResponse::Entries),
    };
    result.unwrap_or_else(|e| ControlResponse::Error {
        errno: e.errno(),
        message: e.to_string(),
    })
}

/// UDP endpoint exposing the attribute tree to other processes.
pub struct ControlServer {
    local_addr: SocketAddr,
    stop_flag: Arc<AtomicBool>,
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl ControlServer {
    /// Binds `addr` and starts the listening thread.
    pub fn bind(addr: &str, fs: Arc<VirtualFs>) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_read_timeout(Some(POLL_INTERVAL))?;
        let local_addr = socket.local_addr()?;

        let stop_flag = Arc::new(AtomicBool::new(false));
        let stop = stop_flag.clone();

        let thread_handle = thread::Builder::new()
            .name("led_control".to_string())
            .spawn(move || {
                let mut buf = [0u8; MAX_DATAGRAM];
                while !stop.load(Ordering::SeqCst) {
                    match socket.recv_from(&mut buf) {
                        Ok((size, src)) => {
                            let response = match serde_json::from_slice::<ControlRequest>(&buf[..size])
                            {
                                Ok(request) => {
                                    debug!("control {}: {:?}", src, request);
                                    handle_request(&fs, request)
                                }
                                Err(e) => ControlResponse::Error {
                                    errno: -libc::EINVAL,
                                    message: format!("bad request: {}", e),
                                },
                            };
                            if let Err(e) = send_response(&socket, src, &response) {
                                warn!("control reply to {} failed: {}", src, e);
                            }
                        }
                        Err(e)
                            if e.kind() == io::ErrorKind::WouldBlock
                                || e.kind() == io::ErrorKind::TimedOut => {}
                        Err(e) => warn!("control receive error: {}", e),
                    }
                }
            })?;

        info!("Control endpoint listening on {}", local_addr);
        Ok(ControlServer {
            local_addr,
            stop_flag,
            thread_handle: Some(thread_handle),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ControlServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn send_response(
    socket: &UdpSocket,
    dest: SocketAddr,
    response: &ControlResponse,
) -> Result<(), Box<dyn Error>> {
    let json = serde_json::to_vec(response)?;
    socket.send_to(&json, dest)?;
    Ok(())
}

/// Sends one request and waits for the reply.
pub struct ControlClient {
    socket: UdpSocket,
    server: SocketAddr,
}

impl ControlClient {
    pub fn connect(server: &str, timeout: Duration) -> Result<Self, Box<dyn Error>> {
        let server: SocketAddr = server.parse()?;
        let bind_addr = if server.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(bind_addr)?;
        socket.set_read_timeout(Some(timeout))?;
        Ok(ControlClient { socket, server })
    }

    pub fn request(&self, request: &ControlRequest) -> Result<ControlResponse, Box<dyn Error>> {
        let json = serde_json::to_vec(request)?;
        self.socket.send_to(&json, self.server)?;
        let mut buf = [0u8; MAX_DATAGRAM];
        loop {
            let (size, src) = self.socket.recv_from(&mut buf)?;
            if src == self.server {
                return Ok(serde_json::from_slice(&buf[..size])?);
            }
        }
    }
}
