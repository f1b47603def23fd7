use led_flasher::control::{ControlClient, ControlRequest, ControlResponse, ControlServer};
use led_flasher::core_led::GpioChip;
use led_flasher::core_led::pin::memory::MemoryChip;
use led_flasher::{Backend, LedModule, LoadParams, VirtualFs, logger};
use log::{error, info};
use std::error::Error;
use std::process::ExitCode;
use std::time::Duration;
use tokio::signal;

const CLIENT_TIMEOUT: Duration = Duration::from_secs(2);

fn usage() -> String {
    format!(
        "Usage:\n  led-flasher [--config <file>] [name=value ...]\n  \
         led-flasher read <path> [control=<addr>]\n  \
         led-flasher write <path> <value> [control=<addr>]\n  \
         led-flasher ls <dir> [control=<addr>]\n\nParameters:\n{}",
        LoadParams::describe()
    )
}

/// Turns a negative errno into a process exit status.
fn exit_code(errno: i32) -> ExitCode {
    ExitCode::from(errno.unsigned_abs().clamp(1, 255) as u8)
}

async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        if let Ok(mut term) = signal(SignalKind::terminate()) {
            tokio::select! {
                _ = signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
            return;
        }
    }
    if let Err(e) = signal::ctrl_c().await {
        error!("failed to wait for Ctrl+C: {}", e);
    }
}

async fn serve<C: GpioChip>(mut chip: C, params: &LoadParams) -> Result<ExitCode, Box<dyn Error>> {
    let fs = VirtualFs::new();
    let module = match LedModule::load(&mut chip, &fs, params.gpio_led, params.blink_period) {
        Ok(module) => module,
        Err(e) => {
            error!("{}", e);
            return Ok(exit_code(e.errno()));
        }
    };

    let control = match ControlServer::bind(&params.control_addr, fs.clone()) {
        Ok(control) => control,
        Err(e) => {
            error!("failed to bind control endpoint {}: {}", params.control_addr, e);
            module.unload();
            return Err(e.into());
        }
    };

    info!("Attributes at {} (Ctrl+C to unload)", module.group_path());
    wait_for_shutdown().await;
    info!("Shutdown requested, unloading");

    control.shutdown();
    module.unload();
    Ok(ExitCode::SUCCESS)
}

async fn run_daemon(params: LoadParams) -> Result<ExitCode, Box<dyn Error>> {
    if logger::init(params.level_filter()).is_err() {
        eprintln!("logger already initialised");
    }

    match params.backend {
        #[cfg(target_os = "linux")]
        Backend::Cdev => {
            use led_flasher::core_led::pin::cdev::CdevChip;
            match CdevChip::open(&params.gpio_chip) {
                Ok(chip) => serve(chip, &params).await,
                Err(e) => {
                    error!("{}", e);
                    Ok(exit_code(e.errno()))
                }
            }
        }
        #[cfg(target_os = "linux")]
        Backend::Sysfs => {
            use led_flasher::core_led::pin::sysfs::SysfsChip;
            serve(SysfsChip, &params).await
        }
        #[cfg(not(target_os = "linux"))]
        Backend::Cdev | Backend::Sysfs => Err("this GPIO backend requires Linux".into()),
        Backend::Memory => serve(MemoryChip::default(), &params).await,
    }
}

fn run_client(command: &str, args: &[String]) -> Result<ExitCode, Box<dyn Error>> {
    let positional = match command {
        "write" => 2,
        _ => 1,
    };
    if args.len() < positional {
        return Err(usage().into());
    }
    let (targets, rest) = args.split_at(positional);
    let params = LoadParams::from_args(rest)?;

    let request = match command {
        "read" => ControlRequest::Read {
            path: targets[0].clone(),
        },
        // Same bytes as `echo <value> > <path>`.
        "write" => ControlRequest::Write {
            path: targets[0].clone(),
            value: format!("{}\n", targets[1]),
        },
        _ => ControlRequest::List {
            dir: targets[0].clone(),
        },
    };

    let client = ControlClient::connect(&params.control_addr, CLIENT_TIMEOUT)?;
    match client.request(&request)? {
        ControlResponse::Value(value) => print!("{}", value),
        ControlResponse::Written(_) => {}
        ControlResponse::Entries(entries) => {
            for entry in entries {
                println!("{}", entry);
            }
        }
        ControlResponse::Error { errno, message } => {
            eprintln!("{}", message);
            return Ok(exit_code(errno));
        }
    }
    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn Error>> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    match args.first().map(String::as_str) {
        Some("-h") | Some("--help") => {
            print!("{}", usage());
            Ok(ExitCode::SUCCESS)
        }
        Some(command @ ("read" | "write" | "ls")) => run_client(command, &args[1..]),
        _ => {
            let params = LoadParams::from_args(&args)?;
            run_daemon(params).await
        }
    }
}
