//! Error types for Linux bus operations

use serbus_core::error::{errno, Error as CoreError, OpenFailure};
use thiserror::Error;

/// Linux i2c-dev/spidev specific errors
#[derive(Debug, Error)]
pub enum LinuxBusError {
    /// Failed to open device node
    #[error("Failed to open {path}: {source}")]
    OpenFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Node is held by another handle or process
    #[error("{path} is already in use: {source}")]
    Locked {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// No device nodes exist for the bus
    #[error("No device nodes found for {0}")]
    NoNodes(String),

    /// Querying adapter functionality failed
    #[error("Failed to query adapter functionality of {path}: {source}")]
    FuncsQueryFailed {
        path: String,
        #[source]
        source: nix::errno::Errno,
    },

    /// Adapter cannot do plain I2C transfers (SMBus-only controller)
    #[error("Adapter {0} does not support I2C_RDWR transfers")]
    NotI2c(String),

    /// A bus ioctl failed
    #[error("{request} failed on {path}: {source}")]
    Ioctl {
        path: String,
        request: &'static str,
        #[source]
        source: nix::errno::Errno,
    },

    /// Fewer messages completed than were submitted
    #[error("Short transfer: {done} of {expected} messages completed")]
    ShortTransfer { done: usize, expected: usize },
}

/// Result type for Linux bus operations
pub type Result<T> = std::result::Result<T, LinuxBusError>;

fn classify_open(source: &std::io::Error) -> OpenFailure {
    match source.kind() {
        std::io::ErrorKind::NotFound => OpenFailure::NotFound,
        std::io::ErrorKind::PermissionDenied => OpenFailure::PermissionDenied,
        _ => match source.raw_os_error() {
            Some(errno::EBUSY) => OpenFailure::Busy,
            Some(code) => OpenFailure::Os(code),
            None => OpenFailure::Os(errno::EIO),
        },
    }
}

impl From<LinuxBusError> for CoreError {
    fn from(err: LinuxBusError) -> Self {
        match err {
            LinuxBusError::OpenFailed { source, .. } => {
                CoreError::DeviceOpen(classify_open(&source))
            }
            LinuxBusError::Locked { .. } => CoreError::DeviceOpen(OpenFailure::Busy),
            LinuxBusError::NoNodes(_) => CoreError::DeviceOpen(OpenFailure::NotFound),
            LinuxBusError::FuncsQueryFailed { source, .. } => {
                CoreError::DeviceOpen(OpenFailure::Os(source as i32))
            }
            LinuxBusError::NotI2c(_) => CoreError::DeviceOpen(OpenFailure::Unsupported),
            LinuxBusError::Ioctl { source, .. } => CoreError::Transaction(source as i32),
            LinuxBusError::ShortTransfer { .. } => CoreError::Transaction(errno::EIO),
        }
    }
}
