//! Error types for serbus-core
//!
//! This module provides a no_std compatible error type shared by every
//! transport. Errors carry only `Copy` data so that backends can attach
//! the raw OS error code without pulling in `std::io`.

use core::fmt;

/// Linux errno values that the core needs to name
///
/// Transports report failures with the raw code the kernel returned; these
/// constants let callers interpret them without depending on `libc`.
pub mod errno {
    /// I/O error (also used for short transfers)
    pub const EIO: i32 = 5;
    /// No such device or address (NACK on many I2C adapters)
    pub const ENXIO: i32 = 6;
    /// Try again
    pub const EAGAIN: i32 = 11;
    /// Device or resource busy
    pub const EBUSY: i32 = 16;
    /// Invalid argument
    pub const EINVAL: i32 = 22;
    /// Message too long
    pub const EMSGSIZE: i32 = 90;
    /// Connection timed out
    pub const ETIMEDOUT: i32 = 110;
    /// Remote I/O error (NACK on i2c-dev)
    pub const EREMOTEIO: i32 = 121;
}

/// Why a device node could not be opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenFailure {
    /// The device node does not exist
    NotFound,
    /// The caller lacks permission to open the node
    PermissionDenied,
    /// The node is already exclusively held
    Busy,
    /// The node exists but the adapter cannot perform the required transfers
    Unsupported,
    /// Any other OS error, with its raw code
    Os(i32),
}

/// Invalid SPI chip-select parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Maximum clock frequency of zero
    ZeroFrequency,
    /// Bits per word outside 1..=32
    InvalidBitsPerWord(u8),
    /// Clock mode outside 0..=3
    InvalidClockMode(u8),
}

/// Core error type - no_std compatible, Copy for efficiency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    // Lifecycle errors
    /// Device node missing, inaccessible or already held
    DeviceOpen(OpenFailure),
    /// `open()` called on a handle that is already open
    AlreadyOpen,
    /// Data operation attempted on a closed handle
    ClosedHandle,

    // Argument errors
    /// Invalid SPI chip-select configuration
    Configuration(ConfigError),
    /// I2C slave address outside the 7/10-bit range, or 10-bit address on an
    /// adapter that cannot address it
    InvalidAddress(u16),
    /// SPI word does not fit in the configured word width
    InvalidWord {
        /// The offending word
        word: u32,
        /// Configured bits per word
        bits: u8,
    },
    /// Transaction exceeds the kernel's transfer limits
    TransferTooLarge {
        /// Requested length (bytes, words or messages, depending on the limit hit)
        len: usize,
        /// Maximum accepted by the kernel interface
        max: usize,
    },

    // Bus errors
    /// Bus I/O failure (NACK, timeout, arbitration loss, short transfer),
    /// carrying the raw OS error code
    Transaction(i32),
}

impl Error {
    /// Raw OS error code carried by this error, if any
    pub fn raw_code(&self) -> Option<i32> {
        match self {
            Self::Transaction(code) => Some(*code),
            Self::DeviceOpen(OpenFailure::Os(code)) => Some(*code),
            _ => None,
        }
    }

    /// Whether this is a transaction error that i2c adapters use to report a
    /// missing acknowledge
    ///
    /// A peripheral in an internal write cycle (e.g. an EEPROM committing a
    /// page) NACKs until the cycle completes, so callers typically retry on
    /// this condition.
    pub fn is_nack(&self) -> bool {
        matches!(
            self,
            Self::Transaction(errno::EREMOTEIO) | Self::Transaction(errno::ENXIO)
        )
    }
}

impl fmt::Display for OpenFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "device node not found"),
            Self::PermissionDenied => write!(f, "permission denied"),
            Self::Busy => write!(f, "device is already in use"),
            Self::Unsupported => write!(f, "adapter does not support the required transfers"),
            Self::Os(code) => write!(f, "OS error {}", code),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroFrequency => write!(f, "clock frequency must be non-zero"),
            Self::InvalidBitsPerWord(bits) => {
                write!(f, "invalid bits per word {} (must be 1-32)", bits)
            }
            Self::InvalidClockMode(mode) => write!(f, "invalid SPI mode {} (must be 0-3)", mode),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeviceOpen(reason) => write!(f, "failed to open device: {}", reason),
            Self::AlreadyOpen => write!(f, "device is already open"),
            Self::ClosedHandle => write!(f, "device is not open"),
            Self::Configuration(err) => write!(f, "invalid configuration: {}", err),
            Self::InvalidAddress(addr) => write!(f, "invalid I2C address 0x{:X}", addr),
            Self::InvalidWord { word, bits } => {
                write!(f, "word 0x{:X} does not fit in {} bits", word, bits)
            }
            Self::TransferTooLarge { len, max } => {
                write!(f, "transfer too large ({} > {})", len, max)
            }
            Self::Transaction(code) => write!(f, "bus transaction failed (errno {})", code),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Self::Configuration(err)
    }
}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_code() {
        assert_eq!(Error::Transaction(errno::ETIMEDOUT).raw_code(), Some(110));
        assert_eq!(Error::DeviceOpen(OpenFailure::Os(19)).raw_code(), Some(19));
        assert_eq!(Error::ClosedHandle.raw_code(), None);
    }

    #[test]
    fn test_is_nack() {
        assert!(Error::Transaction(errno::EREMOTEIO).is_nack());
        assert!(Error::Transaction(errno::ENXIO).is_nack());
        assert!(!Error::Transaction(errno::EIO).is_nack());
        assert!(!Error::DeviceOpen(OpenFailure::Busy).is_nack());
    }
}
