//! GPIO output pin ownership.
//!
//! A [`GpioChip`] hands out [`GpioLine`]s; a [`PinController`] owns one line
//! for the module's whole lifetime. Freeing a line is dropping it.

use crate::error::PinError;
use log::{error, info};

/// Consumer label attached to the requested line.
pub const CONSUMER_LABEL: &str = "sysfs";

pub trait GpioLine: Send {
    fn set_value(&mut self, level: bool) -> Result<(), PinError>;

    /// Makes the line visible to other tools. With `direction_may_change`
    /// false, the direction stays locked to output.
    fn export(&mut self, direction_may_change: bool) -> Result<(), PinError>;

    fn unexport(&mut self);
}

pub trait GpioChip {
    type Line: GpioLine + 'static;

    /// Claims `pin` exclusively and drives it as an output at `initial`.
    fn request_output(&mut self, pin: u32, label: &str, initial: bool)
    -> Result<Self::Line, PinError>;
}

pub struct PinController<L: GpioLine> {
    pin: u32,
    line: L,
}

impl<L: GpioLine> PinController<L> {
    /// Requests `pin`, drives it to `initial` and exports it read-only.
    pub fn acquire<C>(chip: &mut C, pin: u32, initial: bool) -> Result<Self, PinError>
    where
        C: GpioChip<Line = L>,
    {
        let mut line = chip.request_output(pin, CONSUMER_LABEL, initial)?;
        // On failure the line is dropped here, which frees it.
        line.export(false)?;
        info!("GPIO {} acquired, initial level {}", pin, initial as u8);
        Ok(PinController { pin, line })
    }

    pub fn pin(&self) -> u32 {
        self.pin
    }

    /// Drives the pin. Backend failures are logged, not returned.
    pub fn set(&mut self, level: bool) {
        if let Err(e) = self.line.set_value(level) {
            error!("GPIO {}: failed to set level {}: {}", self.pin, level as u8, e);
        }
    }

    /// Unexports then frees the pin.
    pub fn release(self) {
        let PinController { pin, mut line } = self;
        line.unexport();
        drop(line);
        info!("GPIO {} released", pin);
    }
}

#[cfg(target_os = "linux")]
pub mod cdev {
    use super::{GpioChip, GpioLine};
    use crate::error::PinError;
    use gpio_cdev::{Chip, LineHandle, LineRequestFlags};
    use log::debug;
    use std::fmt;

    /// GPIO character device, e.g. "/dev/gpiochip0".
    pub struct CdevChip {
        chip: Chip,
    }

    impl CdevChip {
        pub fn open(gpio_chip: &str) -> Result<Self, PinError> {
            let chip = Chip::new(gpio_chip)
                .map_err(|e| PinError::Io(format!("{}: {}", gpio_chip, e)))?;
            Ok(CdevChip { chip })
        }
    }

    impl GpioChip for CdevChip {
        type Line = CdevLine;

        fn request_output(
            &mut self,
            pin: u32,
            label: &str,
            initial: bool,
        ) -> Result<CdevLine, PinError> {
            if pin >= self.chip.num_lines() {
                return Err(PinError::InvalidPin(pin));
            }
            let line = self
                .chip
                .get_line(pin)
                .map_err(|e| PinError::Io(e.to_string()))?;
            let info = line.info().map_err(|e| PinError::Io(e.to_string()))?;
            if info.is_used() {
                return Err(PinError::Busy(pin));
            }
            // Another consumer may grab the line between the check above and
            // the request; the kernel then answers EBUSY.
            let handle = line
                .request(LineRequestFlags::OUTPUT, initial as u8, label)
                .map_err(|e| {
                    let claimed = line.info().map(|info| info.is_used()).unwrap_or(false);
                    request_failure(pin, claimed, &e)
                })?;
            Ok(CdevLine { pin, handle })
        }
    }

    fn request_failure(pin: u32, claimed: bool, cause: &dyn fmt::Display) -> PinError {
        if claimed {
            PinError::Busy(pin)
        } else {
            PinError::Io(cause.to_string())
        }
    }

    pub struct CdevLine {
        pin: u32,
        handle: LineHandle,
    }

    impl GpioLine for CdevLine {
        fn set_value(&mut self, level: bool) -> Result<(), PinError> {
            self.handle
                .set_value(level as u8)
                .map_err(|e| PinError::Io(e.to_string()))
        }

        // The chardev ABI already publishes ownership through the consumer
        // label and has no export step.
        fn export(&mut self, _direction_may_change: bool) -> Result<(), PinError> {
            debug!("GPIO {}: visible through its consumer label", self.pin);
            Ok(())
        }

        fn unexport(&mut self) {}
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn lost_request_race_is_busy() {
            let err = request_failure(21, true, &"Device or resource busy");
            assert!(matches!(err, PinError::Busy(21)));
            assert_eq!(err.errno(), -libc::EBUSY);
        }

        #[test]
        fn other_request_failures_are_io() {
            let err = request_failure(21, false, &"Invalid argument");
            assert!(matches!(err, PinError::Io(ref msg) if msg == "Invalid argument"));
            assert_eq!(err.errno(), -libc::EIO);
        }
    }
}

#[cfg(target_os = "linux")]
pub mod sysfs {
    use super::{GpioChip, GpioLine};
    use crate::error::PinError;
    use log::warn;
    use sysfs_gpio::{Direction, Pin};

    /// Legacy `/sys/class/gpio` interface.
    #[derive(Default)]
    pub struct SysfsChip;

    fn map_err(pin: u32, err: sysfs_gpio::Error) -> PinError {
        match err {
            sysfs_gpio::Error::Io(ref io) if io.raw_os_error() == Some(libc::EINVAL) => {
                PinError::InvalidPin(pin)
            }
            sysfs_gpio::Error::Io(ref io) if io.raw_os_error() == Some(libc::EBUSY) => {
                PinError::Busy(pin)
            }
            other => PinError::Io(other.to_string()),
        }
    }

    impl GpioChip for SysfsChip {
        type Line = SysfsLine;

        fn request_output(
            &mut self,
            pin: u32,
            _label: &str,
            initial: bool,
        ) -> Result<SysfsLine, PinError> {
            let gpio = Pin::new(pin as u64);
            if gpio.is_exported() {
                return Err(PinError::Busy(pin));
            }
            gpio.export().map_err(|e| map_err(pin, e))?;
            let direction = if initial {
                Direction::High
            } else {
                Direction::Low
            };
            if let Err(e) = gpio.set_direction(direction) {
                let _ = gpio.unexport();
                return Err(map_err(pin, e));
            }
            Ok(SysfsLine {
                pin,
                gpio,
                exported: true,
            })
        }
    }

    pub struct SysfsLine {
        pin: u32,
        gpio: Pin,
        exported: bool,
    }

    impl GpioLine for SysfsLine {
        fn set_value(&mut self, level: bool) -> Result<(), PinError> {
            self.gpio
                .set_value(level as u8)
                .map_err(|e| map_err(self.pin, e))
        }

        // Requesting through sysfs already exported the pin.
        fn export(&mut self, _direction_may_change: bool) -> Result<(), PinError> {
            Ok(())
        }

        fn unexport(&mut self) {
            if !self.exported {
                return;
            }
            if let Err(e) = self.gpio.unexport() {
                warn!("GPIO {}: unexport failed: {}", self.pin, e);
            }
            self.exported = false;
        }
    }

    impl Drop for SysfsLine {
        fn drop(&mut self) {
            self.unexport();
        }
    }
}

/// In-process GPIO lines, used on hosts without GPIO hardware and in tests.
pub mod memory {
    use super::{GpioChip, GpioLine};
    use crate::error::PinError;
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex, MutexGuard};
    use std::time::Instant;

    #[derive(Debug, Clone, Default)]
    pub struct LineRecord {
        pub consumer: Option<String>,
        pub exported: bool,
        pub direction_locked: bool,
        pub level: bool,
        /// Every level written, in order, with the time it was written.
        pub history: Vec<(Instant, bool)>,
        pub fail_next_write: bool,
    }

    #[derive(Debug, Default)]
    struct ChipInner {
        num_lines: u32,
        lines: BTreeMap<u32, LineRecord>,
    }

    /// Cheap to clone; all clones see the same lines.
    #[derive(Debug, Clone)]
    pub struct MemoryChip {
        inner: Arc<Mutex<ChipInner>>,
    }

    impl MemoryChip {
        pub fn new(num_lines: u32) -> Self {
            MemoryChip {
                inner: Arc::new(Mutex::new(ChipInner {
                    num_lines,
                    lines: BTreeMap::new(),
                })),
            }
        }

        fn lock(&self) -> MutexGuard<'_, ChipInner> {
            self.inner.lock().unwrap_or_else(|p| p.into_inner())
        }

        /// Marks `pin` as held by someone else.
        pub fn claim(&self, pin: u32, consumer: &str) {
            self.lock().lines.entry(pin).or_default().consumer = Some(consumer.to_string());
        }

        pub fn is_claimed(&self, pin: u32) -> bool {
            self.lock()
                .lines
                .get(&pin)
                .is_some_and(|l| l.consumer.is_some())
        }

        pub fn is_exported(&self, pin: u32) -> bool {
            self.lock().lines.get(&pin).is_some_and(|l| l.exported)
        }

        pub fn level(&self, pin: u32) -> Option<bool> {
            self.lock().lines.get(&pin).map(|l| l.level)
        }

        pub fn record(&self, pin: u32) -> Option<LineRecord> {
            self.lock().lines.get(&pin).cloned()
        }

        pub fn history(&self, pin: u32) -> Vec<(Instant, bool)> {
            self.lock()
                .lines
                .get(&pin)
                .map(|l| l.history.clone())
                .unwrap_or_default()
        }

        pub fn fail_next_write(&self, pin: u32) {
            self.lock().lines.entry(pin).or_default().fail_next_write = true;
        }
    }

    impl Default for MemoryChip {
        fn default() -> Self {
            MemoryChip::new(64)
        }
    }

    impl GpioChip for MemoryChip {
        type Line = MemoryLine;

        fn request_output(
            &mut self,
            pin: u32,
            label: &str,
            initial: bool,
        ) -> Result<MemoryLine, PinError> {
            let mut inner = self.lock();
            if pin >= inner.num_lines {
                return Err(PinError::InvalidPin(pin));
            }
            let record = inner.lines.entry(pin).or_default();
            if record.consumer.is_some() {
                return Err(PinError::Busy(pin));
            }
            record.consumer = Some(label.to_string());
            record.level = initial;
            record.history.push((Instant::now(), initial));
            Ok(MemoryLine {
                pin,
                chip: self.clone(),
            })
        }
    }

    pub struct MemoryLine {
        pin: u32,
        chip: MemoryChip,
    }

    impl GpioLine for MemoryLine {
        fn set_value(&mut self, level: bool) -> Result<(), PinError> {
            let mut inner = self.chip.lock();
            let record = inner.lines.entry(self.pin).or_default();
            if record.fail_next_write {
                record.fail_next_write = false;
                return Err(PinError::Io("simulated write failure".to_string()));
            }
            record.level = level;
            record.history.push((Instant::now(), level));
            Ok(())
        }

        fn export(&mut self, direction_may_change: bool) -> Result<(), PinError> {
            let mut inner = self.chip.lock();
            let record = inner.lines.entry(self.pin).or_default();
            record.exported = true;
            record.direction_locked = !direction_may_change;
            Ok(())
        }

        fn unexport(&mut self) {
            let mut inner = self.chip.lock();
            if let Some(record) = inner.lines.get_mut(&self.pin) {
                record.exported = false;
                record.direction_locked = false;
            }
        }
    }

    impl Drop for MemoryLine {
        fn drop(&mut self) {
            let mut inner = self.chip.lock();
            if let Some(record) = inner.lines.get_mut(&self.pin) {
                record.consumer = None;
            }
        }
    }
}
