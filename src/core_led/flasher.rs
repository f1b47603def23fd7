use super::pin::{GpioLine, PinController};
use super::state::SharedState;
use log::{debug, info, warn};
use std::io;
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, channel};
use std::thread;
use std::time::Duration;

pub const THREAD_NAME: &str = "LED_thread";

enum ControlMessage {
    Stop,
}

/// Half of the blink period, never below one millisecond.
pub fn tick_interval(period_ms: u32) -> Duration {
    Duration::from_millis(u64::from((period_ms / 2).max(1)))
}

struct FlashWorker<L: GpioLine> {
    pin: PinController<L>,
    state: SharedState,
    control_receiver: Receiver<ControlMessage>,
}

impl<L: GpioLine> FlashWorker<L> {
    fn tick(&mut self) {
        let level = self.state.mode().next_level(self.state.led_on());
        self.state.set_led_on(level);
        self.pin.set(level);
    }

    /// Loops until a stop request arrives, then hands the pin back. The
    /// worker can only be woken while it waits on the control channel,
    /// never in the middle of a tick.
    fn run(mut self) -> PinController<L> {
        info!("Thread has started running");
        loop {
            match self.control_receiver.try_recv() {
                Ok(ControlMessage::Stop) => break,
                Err(std::sync::mpsc::TryRecvError::Disconnected) => {
                    warn!("Flasher control channel closed, stopping");
                    break;
                }
                Err(std::sync::mpsc::TryRecvError::Empty) => {}
            }

            self.tick();

            let interval = tick_interval(self.state.period_ms());
            match self.control_receiver.recv_timeout(interval) {
                Ok(ControlMessage::Stop) => break,
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    warn!("Flasher control channel closed, stopping");
                    break;
                }
            }
        }
        info!("Thread has run to completion");
        self.pin
    }
}

/// Handle on the background thread that drives the LED.
///
/// The thread owns the pin while it runs; [`Flasher::stop`] joins it and
/// returns the pin, so the pin cannot be released under a live worker.
pub struct Flasher<L: GpioLine + 'static> {
    control_sender: Sender<ControlMessage>,
    thread_handle: Option<thread::JoinHandle<PinController<L>>>,
}

impl<L: GpioLine + 'static> Flasher<L> {
    pub fn start(pin: PinController<L>, state: SharedState) -> io::Result<Self> {
        let (control_sender, control_receiver) = channel();
        let worker = FlashWorker {
            pin,
            state,
            control_receiver,
        };

        let thread_handle = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || worker.run())?;

        Ok(Flasher {
            control_sender,
            thread_handle: Some(thread_handle),
        })
    }

    /// Stops the worker, waking it from its sleep, and waits for it to exit.
    ///
    /// Returns `None` if the worker panicked; its pin was dropped (and so
    /// freed) during unwinding.
    pub fn stop(mut self) -> Option<PinController<L>> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Option<PinController<L>> {
        let _ = self.control_sender.send(ControlMessage::Stop);
        let handle = self.thread_handle.take()?;
        match handle.join() {
            Ok(pin) => Some(pin),
            Err(_) => {
                warn!("Flasher thread panicked");
                None
            }
        }
    }
}

impl<L: GpioLine + 'static> Drop for Flasher<L> {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            debug!("Flasher dropped without stop(), joining");
            if let Some(pin) = self.shutdown() {
                pin.release();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_led::pin::memory::{MemoryChip, MemoryLine};
    use crate::core_led::state::{LedState, Mode};
    use std::time::Instant;

    fn start(chip: &mut MemoryChip, pin: u32, period: u32) -> (Flasher<MemoryLine>, SharedState) {
        let ctrl = PinController::acquire(chip, pin, true).unwrap();
        let state = LedState::shared(period);
        state.set_led_on(true);
        let flasher = Flasher::start(ctrl, state.clone()).unwrap();
        (flasher, state)
    }

    #[test]
    fn tick_interval_is_half_period_with_floor() {
        assert_eq!(tick_interval(1000), Duration::from_millis(500));
        assert_eq!(tick_interval(3), Duration::from_millis(1));
        assert_eq!(tick_interval(1), Duration::from_millis(1));
        assert_eq!(tick_interval(0), Duration::from_millis(1));
    }

    #[test]
    fn stop_interrupts_long_sleep() {
        let mut chip = MemoryChip::new(32);
        let (flasher, _state) = start(&mut chip, 4, 10_000);
        thread::sleep(Duration::from_millis(50));

        let begin = Instant::now();
        let pin = flasher.stop().expect("worker exited cleanly");
        assert!(begin.elapsed() < Duration::from_secs(2));
        assert_eq!(pin.pin(), 4);
    }

    #[test]
    fn first_tick_in_flash_mode_inverts_initial_level() {
        let mut chip = MemoryChip::new(32);
        let (flasher, state) = start(&mut chip, 6, 10_000);
        thread::sleep(Duration::from_millis(50));
        assert!(!state.led_on());
        assert_eq!(chip.level(6), Some(false));
        flasher.stop().unwrap().release();
    }

    #[test]
    fn on_mode_holds_level_high() {
        let mut chip = MemoryChip::new(32);
        let ctrl = PinController::acquire(&mut chip, 7, false).unwrap();
        let state = LedState::shared(20);
        state.set_mode(Mode::On);
        let flasher = Flasher::start(ctrl, state.clone()).unwrap();
        thread::sleep(Duration::from_millis(100));
        flasher.stop().unwrap().release();

        let history = chip.history(7);
        assert!(history.len() > 2);
        assert!(history.iter().skip(1).all(|&(_, level)| level));
    }

    #[test]
    fn stop_never_lands_between_state_and_pin_update() {
        let mut chip = MemoryChip::new(32);
        let (flasher, state) = start(&mut chip, 9, 2);
        thread::sleep(Duration::from_millis(30));
        let pin = flasher.stop().unwrap();
        assert_eq!(chip.level(9), Some(state.led_on()));
        pin.release();
    }

    #[test]
    fn drop_joins_and_releases() {
        let mut chip = MemoryChip::new(32);
        let (flasher, _state) = start(&mut chip, 8, 100);
        drop(flasher);
        assert!(!chip.is_claimed(8));
    }
}
