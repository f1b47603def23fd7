use std::fmt;
use std::io;

/// Failure reported by a GPIO backend.
#[derive(Debug)]
pub enum PinError {
    /// The line is already claimed by another consumer.
    Busy(u32),
    /// The line number does not exist on this chip.
    InvalidPin(u32),
    /// Any other backend failure (ioctl, sysfs write, ...).
    Io(String),
}

impl PinError {
    pub fn errno(&self) -> i32 {
        match self {
            PinError::Busy(_) => -libc::EBUSY,
            PinError::InvalidPin(_) => -libc::EINVAL,
            PinError::Io(_) => -libc::EIO,
        }
    }
}

impl fmt::Display for PinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PinError::Busy(pin) => write!(f, "GPIO {} is already in use", pin),
            PinError::InvalidPin(pin) => write!(f, "GPIO {} is not a valid line", pin),
            PinError::Io(msg) => write!(f, "GPIO backend error: {}", msg),
        }
    }
}

impl std::error::Error for PinError {}

/// Error returned by a virtual filesystem access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrError {
    NotFound(String),
    PermissionDenied(String),
    InvalidInput(String),
    AlreadyExists(String),
}

impl AttrError {
    pub fn errno(&self) -> i32 {
        match self {
            AttrError::NotFound(_) => -libc::ENOENT,
            AttrError::PermissionDenied(_) => -libc::EACCES,
            AttrError::InvalidInput(_) => -libc::EINVAL,
            AttrError::AlreadyExists(_) => -libc::EEXIST,
        }
    }
}

impl fmt::Display for AttrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrError::NotFound(path) => write!(f, "{}: no such file or directory", path),
            AttrError::PermissionDenied(path) => write!(f, "{}: permission denied", path),
            AttrError::InvalidInput(msg) => write!(f, "invalid argument: {}", msg),
            AttrError::AlreadyExists(path) => write!(f, "{}: file exists", path),
        }
    }
}

impl std::error::Error for AttrError {}

/// Fatal error raised while loading the LED module.
#[derive(Debug)]
pub enum LoadError {
    Pin(PinError),
    Publish(AttrError),
    WorkerStart(io::Error),
}

impl LoadError {
    /// Negative errno, as a kernel init function would return it.
    pub fn errno(&self) -> i32 {
        match self {
            LoadError::Pin(e) => e.errno(),
            LoadError::Publish(e) => e.errno(),
            LoadError::WorkerStart(_) => -libc::EAGAIN,
        }
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::Pin(e) => write!(f, "failed to acquire the LED pin: {}", e),
            LoadError::Publish(e) => write!(f, "failed to create sysfs group: {}", e),
            LoadError::WorkerStart(e) => write!(f, "failed to create the task: {}", e),
        }
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LoadError::Pin(e) => Some(e),
            LoadError::Publish(e) => Some(e),
            LoadError::WorkerStart(e) => Some(e),
        }
    }
}

impl From<PinError> for LoadError {
    fn from(err: PinError) -> Self {
        LoadError::Pin(err)
    }
}

impl From<AttrError> for LoadError {
    fn from(err: AttrError) -> Self {
        LoadError::Publish(err)
    }
}

/// Invalid load-time parameters.
#[derive(Debug)]
pub enum ConfigError {
    UnknownParam(String),
    InvalidValue { name: String, value: String },
    File(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::UnknownParam(name) => write!(f, "unknown parameter '{}'", name),
            ConfigError::InvalidValue { name, value } => {
                write!(f, "invalid value '{}' for parameter '{}'", value, name)
            }
            ConfigError::File(msg) => write!(f, "config file: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_errors_map_to_negative_errno() {
        assert_eq!(LoadError::Pin(PinError::Busy(21)).errno(), -libc::EBUSY);
        assert_eq!(LoadError::Pin(PinError::InvalidPin(900)).errno(), -libc::EINVAL);
        assert_eq!(
            LoadError::Publish(AttrError::AlreadyExists("/sys/led/led21".into())).errno(),
            -libc::EEXIST
        );
        let spawn = io::Error::new(io::ErrorKind::Other, "no threads");
        assert_eq!(LoadError::WorkerStart(spawn).errno(), -libc::EAGAIN);
    }

    #[test]
    fn pin_and_publish_errors_convert_into_load_errors() {
        let err: LoadError = PinError::InvalidPin(99).into();
        assert!(matches!(err, LoadError::Pin(PinError::InvalidPin(99))));
        let err = LoadError::from(AttrError::AlreadyExists("/sys/led/led4".into()));
        assert_eq!(err.errno(), -libc::EEXIST);
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn display_mentions_pin_number() {
        let msg = PinError::Busy(17).to_string();
        assert!(msg.contains("17"));
    }
}
