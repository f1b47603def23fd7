pub mod protocol;
pub mod server;

pub use protocol::{ControlRequest, ControlResponse};
pub use server::{ControlClient, ControlServer, handle_request};
