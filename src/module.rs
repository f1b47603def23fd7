use crate::attributes::{GroupHandle, LED_KOBJECT_DIR, VirtualFs, led_group};
use crate::core_led::state::{MAX_PERIOD_MS, MIN_PERIOD_MS};
use crate::core_led::{Flasher, GpioChip, GpioLine, LedState, PinController, SharedState};
use crate::error::LoadError;
use log::{debug, error, info, warn};
use std::sync::Arc;

/// The loaded LED driver: a claimed pin, its `led<pin>` attribute group and
/// the flasher thread.
///
/// Dropping a loaded module tears it down the same way [`LedModule::unload`]
/// does.
pub struct LedModule<L: GpioLine + 'static> {
    pin: u32,
    state: SharedState,
    group_path: String,
    group: Option<GroupHandle>,
    flasher: Option<Flasher<L>>,
}

impl<L: GpioLine + 'static> LedModule<L> {
    /// Acquires the pin, publishes the attributes and starts the flasher.
    ///
    /// On failure, whatever was already set up is torn down again before
    /// the error is returned.
    pub fn load<C>(
        chip: &mut C,
        fs: &Arc<VirtualFs>,
        gpio_led: u32,
        blink_period: u32,
    ) -> Result<Self, LoadError>
    where
        C: GpioChip<Line = L>,
    {
        info!("Initializing the LED Module");
        if blink_period < MIN_PERIOD_MS || blink_period > MAX_PERIOD_MS {
            warn!(
                "blinkPeriod {} outside the documented {}..={} ms",
                blink_period, MIN_PERIOD_MS, MAX_PERIOD_MS
            );
        }

        let state = LedState::shared(blink_period);
        state.set_led_on(true);

        let pin = PinController::acquire(chip, gpio_led, true)
            .inspect_err(|e| error!("failed to request GPIO {}: {}", gpio_led, e))?;

        let group = match fs.publish_group(LED_KOBJECT_DIR, led_group(gpio_led, &state)) {
            Ok(group) => group,
            Err(e) => {
                error!("failed to create sysfs group: {}", e);
                pin.release();
                return Err(e.into());
            }
        };

        // Spawn failure drops the worker closure, and the pin with it.
        let flasher = match Flasher::start(pin, Arc::clone(&state)) {
            Ok(flasher) => flasher,
            Err(e) => {
                error!("failed to create the task: {}", e);
                group.remove();
                return Err(LoadError::WorkerStart(e));
            }
        };

        info!("LED on GPIO {} published at {}", gpio_led, LED_KOBJECT_DIR);
        Ok(LedModule {
            pin: gpio_led,
            state,
            group_path: group.path().to_string(),
            group: Some(group),
            flasher: Some(flasher),
        })
    }

    pub fn pin(&self) -> u32 {
        self.pin
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }

    /// Directory holding `mode` and `blinkPeriod`.
    pub fn group_path(&self) -> &str {
        &self.group_path
    }

    /// Stops the flasher, unpublishes the attributes, drives the pin low and
    /// releases it, in that order.
    pub fn unload(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        let Some(flasher) = self.flasher.take() else {
            return;
        };
        let controller = flasher.stop();
        if let Some(group) = self.group.take() {
            group.remove();
        }
        match controller {
            Some(mut controller) => {
                controller.set(false);
                self.state.set_led_on(false);
                controller.release();
            }
            None => warn!("GPIO {} was lost with the flasher thread", self.pin),
        }
        info!("Module exiting");
    }
}

impl<L: GpioLine + 'static> Drop for LedModule<L> {
    fn drop(&mut self) {
        if self.flasher.is_some() {
            debug!("LED module on GPIO {} dropped without unload()", self.pin);
            self.teardown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_led::pin::memory::MemoryChip;

    #[test]
    fn failed_publish_releases_pin() {
        let mut chip = MemoryChip::new(32);
        let fs = VirtualFs::new();
        let first = LedModule::load(&mut chip, &fs, 21, 1000).unwrap();

        // A second chip with the same pin free, but the group already exists.
        let mut other = MemoryChip::new(32);
        let err = LedModule::load(&mut other, &fs, 21, 1000).err().unwrap();
        assert!(matches!(err, LoadError::Publish(_)));
        assert_eq!(err.errno(), -libc::EEXIST);
        assert!(!other.is_claimed(21));
        assert!(!other.is_exported(21));

        first.unload();
    }

    #[test]
    fn busy_pin_aborts_load_without_publishing() {
        let mut chip = MemoryChip::new(32);
        chip.claim(21, "another-driver");
        let fs = VirtualFs::new();
        let err = LedModule::load(&mut chip, &fs, 21, 1000).err().unwrap();
        assert_eq!(err.errno(), -libc::EBUSY);
        assert!(!fs.exists("/sys/led/led21"));
    }

    #[test]
    fn dropping_the_module_unloads_it() {
        let mut chip = MemoryChip::new(32);
        let fs = VirtualFs::new();
        let module = LedModule::load(&mut chip, &fs, 5, 10_000).unwrap();
        fs.write("/sys/led/led5/mode", b"on\n").unwrap();
        let state = Arc::clone(module.state());

        drop(module);

        assert_eq!(chip.level(5), Some(false));
        assert!(!state.led_on());
        assert!(!chip.is_claimed(5));
        assert!(!chip.is_exported(5));
        assert!(!fs.exists("/sys/led/led5"));
    }

    #[test]
    fn out_of_range_load_period_is_kept() {
        let mut chip = MemoryChip::new(32);
        let fs = VirtualFs::new();
        let module = LedModule::load(&mut chip, &fs, 2, 1).unwrap();
        assert_eq!(module.state().period_ms(), 1);
        assert_eq!(fs.read("/sys/led/led2/blinkPeriod").unwrap(), "1\n");
        module.unload();
    }
}
