use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, Ordering};

/// Lower bound (exclusive) of a period accepted through `blinkPeriod`.
pub const MIN_PERIOD_MS: u32 = 1;
/// Upper bound (inclusive) of a period accepted through `blinkPeriod`.
pub const MAX_PERIOD_MS: u32 = 10_000;
pub const DEFAULT_PERIOD_MS: u32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Off,
    On,
    Flash,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Off => "off",
            Mode::On => "on",
            Mode::Flash => "flash",
        }
    }

    /// Matches a write token. "on" is tried first, then "off", then "flash".
    pub fn from_token(token: &str) -> Option<Mode> {
        if token == "on" {
            Some(Mode::On)
        } else if token == "off" {
            Some(Mode::Off)
        } else if token == "flash" {
            Some(Mode::Flash)
        } else {
            None
        }
    }

    fn to_raw(self) -> u8 {
        match self {
            Mode::Off => 0,
            Mode::On => 1,
            Mode::Flash => 2,
        }
    }

    /// Anything unknown drives the LED low.
    fn from_raw(raw: u8) -> Mode {
        match raw {
            1 => Mode::On,
            2 => Mode::Flash,
            _ => Mode::Off,
        }
    }

    /// Level the LED should take on the next tick, given its current one.
    pub fn next_level(self, current: bool) -> bool {
        match self {
            Mode::Flash => !current,
            Mode::On => true,
            Mode::Off => false,
        }
    }
}

pub fn period_in_range(period: u32) -> bool {
    period > MIN_PERIOD_MS && period <= MAX_PERIOD_MS
}

/// State shared between the attribute callbacks and the flasher thread.
///
/// Every field is independent, so each one is a plain atomic and no lock
/// spans them.
#[derive(Debug)]
pub struct LedState {
    mode: AtomicU8,
    period_ms: AtomicU32,
    led_on: AtomicBool,
}

pub type SharedState = Arc<LedState>;

impl LedState {
    pub fn new(period_ms: u32) -> Self {
        Self {
            mode: AtomicU8::new(Mode::Flash.to_raw()),
            period_ms: AtomicU32::new(period_ms),
            led_on: AtomicBool::new(false),
        }
    }

    pub fn shared(period_ms: u32) -> SharedState {
        Arc::new(Self::new(period_ms))
    }

    pub fn mode(&self) -> Mode {
        Mode::from_raw(self.mode.load(Ordering::Acquire))
    }

    pub fn set_mode(&self, mode: Mode) {
        self.mode.store(mode.to_raw(), Ordering::Release);
    }

    pub fn period_ms(&self) -> u32 {
        self.period_ms.load(Ordering::Acquire)
    }

    /// Stores `period_ms` if it is in (1, 10000]. Returns whether it was kept.
    pub fn try_set_period(&self, period_ms: u32) -> bool {
        if period_in_range(period_ms) {
            self.period_ms.store(period_ms, Ordering::Release);
            true
        } else {
            false
        }
    }

    pub fn led_on(&self) -> bool {
        self.led_on.load(Ordering::Acquire)
    }

    pub(crate) fn set_led_on(&self, on: bool) {
        self.led_on.store(on, Ordering::Release);
    }
}

impl Default for LedState {
    fn default() -> Self {
        Self::new(DEFAULT_PERIOD_MS)
    }
}
