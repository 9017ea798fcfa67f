//! serbus-linux - Linux i2c-dev and spidev transports
//!
//! This crate backs the [`serbus_core`] bus devices with the Linux userspace
//! interfaces for I2C and SPI controllers.
//!
//! # Overview
//!
//! - I2C adapters appear as `/dev/i2c-N`. Every batch goes out in one
//!   `I2C_RDWR` call, so a combined write-then-read keeps the bus between
//!   its halves.
//! - SPI controllers appear as `/dev/spidevB.C`, one node per chip-select.
//!   An SPI bus device opens all nodes of bus `B` and selects the node by
//!   chip-select on every transfer.
//!
//! Each node is opened with an exclusive `flock`, so a second handle (in this
//! or another process) gets `DeviceOpen(Busy)` instead of interleaving
//! traffic.
//!
//! # Example
//!
//! ```no_run
//! use serbus_linux::{i2c_bus, spi_bus};
//!
//! // Read a 16-bit EEPROM location on /dev/i2c-1
//! let mut i2c = i2c_bus(1);
//! i2c.open()?;
//! let data = i2c.write_read(0x50, &[0x00, 0x10], 4)?;
//! println!("{:02X?}", data);
//!
//! // JEDEC ID from a flash chip on /dev/spidev0.0 at 1 MHz, mode 0
//! let mut spi = spi_bus(0);
//! spi.open()?;
//! spi.set_max_frequency(0, 1_000_000)?;
//! let id = spi.write_read(0, &[0x9F], 3)?;
//! println!("{:02X?}", id);
//! # Ok::<(), serbus_core::Error>(())
//! ```
//!
//! # Device directory
//!
//! Nodes are looked up under `/dev` unless `SERBUS_DEV_ROOT` names another
//! directory (see [`NodeResolver::from_env`]).
//!
//! # System Requirements
//!
//! - Linux kernel with `CONFIG_I2C_CHARDEV` and/or `CONFIG_SPI_SPIDEV`
//! - Read/write access to the device nodes
//! - May require adding user to the `i2c`/`spi` groups or using udev rules

pub mod error;
pub mod i2cdev;
pub mod node;
pub mod spidev;

// Re-exports
pub use error::{LinuxBusError, Result};
pub use i2cdev::{I2cDev, I2cFuncs};
pub use node::{NodeResolver, DEFAULT_DEV_ROOT, DEV_ROOT_ENV};
pub use spidev::SpiDev;

use serbus_core::{I2cDevice, SpiDevice};

/// I2C bus device on a Linux i2c-dev adapter
pub type LinuxI2c = I2cDevice<I2cDev>;

/// SPI bus device on Linux spidev nodes
pub type LinuxSpi = SpiDevice<SpiDev>;

/// Closed I2C bus device for `/dev/i2c-<bus>`
///
/// The device directory comes from [`NodeResolver::from_env`].
pub fn i2c_bus(bus: u32) -> LinuxI2c {
    i2c_bus_at(&NodeResolver::from_env(), bus)
}

/// Closed I2C bus device for bus `bus` under `resolver`'s directory
pub fn i2c_bus_at(resolver: &NodeResolver, bus: u32) -> LinuxI2c {
    I2cDevice::new(I2cDev::new(resolver, bus))
}

/// Closed SPI bus device for `/dev/spidev<bus>.*`
///
/// The device directory comes from [`NodeResolver::from_env`].
pub fn spi_bus(bus: u32) -> LinuxSpi {
    spi_bus_at(&NodeResolver::from_env(), bus)
}

/// Closed SPI bus device for bus `bus` under `resolver`'s directory
pub fn spi_bus_at(resolver: &NodeResolver, bus: u32) -> LinuxSpi {
    SpiDevice::new(SpiDev::new(resolver, bus))
}
