//! Single GPIO LED driver with `mode` and `blinkPeriod` attributes.
//!
//! Loading a [`LedModule`] claims the pin, publishes `/sys/led/led<pin>` in a
//! [`VirtualFs`] and starts the flasher thread; unloading undoes all three in
//! reverse order.

pub mod attributes;
pub mod config;
pub mod control;
pub mod core_led;
pub mod error;
pub mod logger;
pub mod module;

pub use attributes::VirtualFs;
pub use config::{Backend, LoadParams};
pub use core_led::{LedState, Mode};
pub use error::{AttrError, ConfigError, LoadError, PinError};
pub use module::LedModule;

// Defaults grouped by platform
#[cfg(target_os = "linux")]
pub mod platform {
    use crate::config::Backend;

    pub const DEFAULT_BACKEND: Backend = Backend::Cdev;
}

#[cfg(not(target_os = "linux"))]
pub mod platform {
    use crate::config::Backend;

    pub const DEFAULT_BACKEND: Backend = Backend::Memory;
}
