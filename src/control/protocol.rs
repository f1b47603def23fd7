use serde::{Deserialize, Serialize};

/// Largest datagram the control endpoint reads or sends.
pub const MAX_DATAGRAM: usize = 8192;

/// One request per datagram, JSON encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlRequest {
    /// `cat <path>`
    Read { path: String },

    /// Writes `value` verbatim, newline included if the sender added one.
    Write { path: String, value: String },

    /// `ls <dir>`
    List { dir: String },
}

/// Reply to a [`ControlRequest`], sent back to the requesting address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlResponse {
    /// Content of an attribute.
    Value(String),

    /// Number of bytes the attribute consumed.
    Written(usize),

    /// Directory entries.
    Entries(Vec<String>),

    /// Negative errno plus a readable message.
    Error { errno: i32, message: String },
}
