//! serbus-core - Bus-device layer for I2C and SPI peripherals
//!
//! This crate holds everything about talking to a serial bus that does not
//! depend on a particular operating system: the error taxonomy, transfer
//! descriptors, the wire codec, per-chip-select SPI configuration and the
//! `I2cDevice`/`SpiDevice` wrappers. Access to an actual bus goes through the
//! [`Transport`] trait, which is implemented by the Linux backend
//! (`serbus-linux`) and by the in-memory emulator (`serbus-dummy`).
//!
//! # Features
//!
//! - `std` - Implement `std::error::Error` for [`Error`]
//!
//! # Example
//!
//! ```ignore
//! use serbus_core::{I2cDevice, SerialBus};
//!
//! fn read_temperature<T: serbus_core::Transport>(bus: &mut I2cDevice<T>) -> serbus_core::Result<u16> {
//!     bus.open()?;
//!     let raw = bus.read_transaction(0x40, 0xE3, 3)?;
//!     bus.close();
//!     Ok(u16::from_be_bytes([raw[0], raw[1]]) & !0b11)
//! }
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod bus;
pub mod codec;
pub mod error;
pub mod i2c;
pub mod spi;
pub mod transfer;

#[cfg(test)]
mod testing;

pub use bus::{BusHandle, HandleState, SerialBus, Transport};
pub use error::{errno, ConfigError, Error, OpenFailure, Result};
pub use i2c::I2cDevice;
pub use spi::{
    BitOrder, ConfigStore, CsPolarity, SpiChipSelectConfig, SpiDevice, SpiFlags, SpiMode,
};
pub use transfer::{
    ChipSelect, Direction, I2cAddress, Payload, Protocol, Target, TransferDescriptor,
};
