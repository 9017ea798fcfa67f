//! SPI chip-select configuration and the `SpiDevice` wrapper
//!
//! The kernel spidev interface does not remember electrical settings per
//! peripheral, so this module keeps them: one [`SpiChipSelectConfig`] per
//! chip-select, created on first use and re-applied before every transfer.

mod config;
mod device;

pub use config::*;
pub use device::SpiDevice;
