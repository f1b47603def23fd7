pub mod flasher;
pub mod pin;
pub mod state;
pub use flasher::Flasher;
pub use pin::{GpioChip, GpioLine, PinController};
pub use state::{LedState, Mode, SharedState};
