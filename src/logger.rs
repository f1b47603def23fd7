//! printk-style log backend: one line per record on stderr, prefixed with
//! the level and the driver tag.

use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};
use std::io::Write;

pub const LOG_TAG: &str = "LED";

pub struct KernelLogger;

static LOGGER: KernelLogger = KernelLogger;

impl Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format_record(record);
        let _ = writeln!(std::io::stderr().lock(), "{}", line);
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

fn format_record(record: &Record) -> String {
    format!(
        "[{}] {}: {}",
        record.level().as_str().to_ascii_lowercase(),
        LOG_TAG,
        record.args()
    )
}

/// Installs the logger. Fails if another logger is already set.
pub fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
    log::set_logger(&LOGGER)?;
    log::set_max_level(level);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::Level;

    #[test]
    fn record_format() {
        let line = format_record(
            &Record::builder()
                .args(format_args!("Thread has started running"))
                .level(Level::Info)
                .build(),
        );
        assert_eq!(line, "[info] LED: Thread has started running");
    }
}
