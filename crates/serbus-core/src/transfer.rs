//! Transfer descriptors
//!
//! A [`TransferDescriptor`] is the transient, per-call description of one
//! logical bus operation. Wrappers build them, [`BusHandle`] submits an
//! ordered batch of them as a single atomic transaction, and the codec turns
//! them into kernel message layouts.
//!
//! [`BusHandle`]: crate::bus::BusHandle

use alloc::vec::Vec;
use core::fmt;

use crate::error::{Error, Result};
use crate::spi::SpiChipSelectConfig;

/// SPI chip-select index
pub type ChipSelect = u8;

/// Wire protocol served by a transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// Two-wire, address-selected bus
    I2c,
    /// Four-wire, chip-select-selected bus
    Spi,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::I2c => write!(f, "I2C"),
            Self::Spi => write!(f, "SPI"),
        }
    }
}

/// Validated I2C slave address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum I2cAddress {
    /// Standard 7-bit address (0x00-0x7F)
    SevenBit(u8),
    /// Extended 10-bit address (0x080-0x3FF)
    TenBit(u16),
}

impl I2cAddress {
    /// Highest 7-bit address
    pub const MAX_SEVEN_BIT: u16 = 0x7F;
    /// Highest 10-bit address
    pub const MAX_TEN_BIT: u16 = 0x3FF;

    /// Classify a raw address
    ///
    /// Values up to 0x7F are 7-bit addresses, values up to 0x3FF are 10-bit
    /// addresses; anything larger is rejected.
    pub fn new(raw: u16) -> Result<Self> {
        match raw {
            0..=Self::MAX_SEVEN_BIT => Ok(Self::SevenBit(raw as u8)),
            0..=Self::MAX_TEN_BIT => Ok(Self::TenBit(raw)),
            _ => Err(Error::InvalidAddress(raw)),
        }
    }

    /// The raw address value
    pub fn raw(self) -> u16 {
        match self {
            Self::SevenBit(addr) => addr as u16,
            Self::TenBit(addr) => addr,
        }
    }

    /// Whether this address needs 10-bit addressing on the wire
    pub fn is_ten_bit(self) -> bool {
        matches!(self, Self::TenBit(_))
    }
}

impl fmt::Display for I2cAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SevenBit(addr) => write!(f, "0x{:02X}", addr),
            Self::TenBit(addr) => write!(f, "0x{:03X} (10-bit)", addr),
        }
    }
}

/// Where a descriptor is sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// An I2C peripheral
    I2c(I2cAddress),
    /// An SPI chip-select, with the configuration to apply for this transfer
    Spi {
        /// Chip-select index
        cs: ChipSelect,
        /// Configuration applied immediately before the transfer
        config: SpiChipSelectConfig,
    },
}

impl Target {
    /// Protocol this target belongs to
    pub fn protocol(&self) -> Protocol {
        match self {
            Self::I2c(_) => Protocol::I2c,
            Self::Spi { .. } => Protocol::Spi,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::I2c(addr) => write!(f, "addr {}", addr),
            Self::Spi { cs, .. } => write!(f, "cs {}", cs),
        }
    }
}

/// Direction of a descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Transmit only
    Write,
    /// Receive only
    Read,
    /// Transmit then receive without releasing the bus
    WriteThenRead,
    /// Transmit and receive simultaneously (SPI only)
    Duplex,
}

/// Data carried by a descriptor
///
/// For SPI, the byte buffers are already packed into wire order by the codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Bytes to transmit
    Write(Vec<u8>),
    /// Number of bytes to receive
    Read(usize),
    /// Bytes to transmit, then number of bytes to receive
    WriteThenRead {
        /// Write phase
        write: Vec<u8>,
        /// Read phase length
        read_len: usize,
    },
    /// Bytes to transmit; the same number of bytes is received
    Duplex(Vec<u8>),
}

/// One logical bus operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferDescriptor {
    /// Destination of the operation
    pub target: Target,
    /// What to transfer
    pub payload: Payload,
}

impl TransferDescriptor {
    /// Create a descriptor from its parts
    pub fn new(target: Target, payload: Payload) -> Self {
        Self { target, payload }
    }

    /// I2C write of `bytes` to `addr`
    pub fn i2c_write(addr: I2cAddress, bytes: Vec<u8>) -> Self {
        Self::new(Target::I2c(addr), Payload::Write(bytes))
    }

    /// I2C read of `len` bytes from `addr`
    pub fn i2c_read(addr: I2cAddress, len: usize) -> Self {
        Self::new(Target::I2c(addr), Payload::Read(len))
    }

    /// I2C write of `bytes` followed by a repeated-start read of `read_len`
    pub fn i2c_write_read(addr: I2cAddress, bytes: Vec<u8>, read_len: usize) -> Self {
        Self::new(
            Target::I2c(addr),
            Payload::WriteThenRead {
                write: bytes,
                read_len,
            },
        )
    }

    /// SPI descriptor on `cs` with the given configuration
    pub fn spi(cs: ChipSelect, config: SpiChipSelectConfig, payload: Payload) -> Self {
        Self::new(Target::Spi { cs, config }, payload)
    }

    /// Direction of this descriptor
    pub fn direction(&self) -> Direction {
        match self.payload {
            Payload::Write(_) => Direction::Write,
            Payload::Read(_) => Direction::Read,
            Payload::WriteThenRead { .. } => Direction::WriteThenRead,
            Payload::Duplex(_) => Direction::Duplex,
        }
    }

    /// Number of reply bytes this descriptor produces
    pub fn reply_len(&self) -> usize {
        match &self.payload {
            Payload::Write(_) => 0,
            Payload::Read(len) => *len,
            Payload::WriteThenRead { read_len, .. } => *read_len,
            Payload::Duplex(bytes) => bytes.len(),
        }
    }

    /// Whether this descriptor produces a reply entry from `submit`
    pub fn has_reply(&self) -> bool {
        !matches!(self.payload, Payload::Write(_))
    }

    /// Total number of bytes moved over the bus, saturating at `usize::MAX`
    pub fn wire_len(&self) -> usize {
        match &self.payload {
            Payload::Write(bytes) | Payload::Duplex(bytes) => bytes.len(),
            Payload::Read(len) => *len,
            Payload::WriteThenRead { write, read_len } => write.len().saturating_add(*read_len),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn test_address_classification() {
        assert_eq!(I2cAddress::new(0x50), Ok(I2cAddress::SevenBit(0x50)));
        assert_eq!(I2cAddress::new(0x7F), Ok(I2cAddress::SevenBit(0x7F)));
        assert_eq!(I2cAddress::new(0x80), Ok(I2cAddress::TenBit(0x80)));
        assert_eq!(I2cAddress::new(0x3FF), Ok(I2cAddress::TenBit(0x3FF)));
        assert_eq!(I2cAddress::new(0x400), Err(Error::InvalidAddress(0x400)));
        assert!(I2cAddress::new(0x150).unwrap().is_ten_bit());
        assert_eq!(I2cAddress::new(0x150).unwrap().raw(), 0x150);
    }

    #[test]
    fn test_descriptor_lengths() {
        let addr = I2cAddress::SevenBit(0x40);

        let write = TransferDescriptor::i2c_write(addr, vec![1, 2, 3]);
        assert_eq!(write.direction(), Direction::Write);
        assert_eq!(write.reply_len(), 0);
        assert!(!write.has_reply());
        assert_eq!(write.wire_len(), 3);

        let combined = TransferDescriptor::i2c_write_read(addr, vec![0xE3], 3);
        assert_eq!(combined.direction(), Direction::WriteThenRead);
        assert_eq!(combined.reply_len(), 3);
        assert!(combined.has_reply());
        assert_eq!(combined.wire_len(), 4);

        let duplex = TransferDescriptor::spi(0, SpiChipSelectConfig::default(), Payload::Duplex(vec![0; 4]));
        assert_eq!(duplex.direction(), Direction::Duplex);
        assert_eq!(duplex.reply_len(), 4);
        assert_eq!(duplex.target.protocol(), Protocol::Spi);
    }
}
