//! I2C device wrapper
//!
//! [`I2cDevice`] issues byte-addressed write, read and combined
//! write-then-read transactions against a slave address supplied on every
//! call. It keeps no per-peripheral state.
//!
//! ## Non-volatile writes
//!
//! A write to a peripheral with internal non-volatile storage (an EEPROM, for
//! instance) finishes on the wire before the peripheral has committed it, and
//! the peripheral NACKs everything until its write cycle is over. This layer
//! does not wait or retry: the NACK is returned as [`Error::Transaction`]
//! (see [`Error::is_nack`]) and the caller decides how long to back off.

use alloc::vec::Vec;

use crate::bus::{BusHandle, HandleState, SerialBus, Transport};
use crate::error::{errno, Error, Result};
use crate::transfer::{I2cAddress, TransferDescriptor};

/// I2C bus device
pub struct I2cDevice<T: Transport> {
    handle: BusHandle<T>,
}

impl<T: Transport> I2cDevice<T> {
    /// Create a closed device on top of a transport
    pub fn new(transport: T) -> Self {
        Self {
            handle: BusHandle::new(transport),
        }
    }

    /// Open the bus device
    pub fn open(&mut self) -> Result<()> {
        self.handle.open()
    }

    /// Close the bus device; a no-op when already closed
    pub fn close(&mut self) {
        self.handle.close()
    }

    /// Whether the bus device is open
    pub fn is_open(&self) -> bool {
        self.handle.is_open()
    }

    /// Current lifecycle state
    pub fn state(&self) -> HandleState {
        self.handle.state()
    }

    /// Device node of the bus
    pub fn path(&self) -> &str {
        self.handle.path()
    }

    /// Borrow the underlying transport
    pub fn transport(&self) -> &T {
        self.handle.transport()
    }

    /// Write `bytes` to the peripheral at `address`
    ///
    /// The payload is opaque; by convention its first bytes usually select a
    /// register or memory location inside the peripheral.
    pub fn write(&mut self, address: u16, bytes: &[u8]) -> Result<()> {
        self.handle.ensure_open()?;
        let addr = I2cAddress::new(address)?;

        log::trace!("i2c: write {} byte(s) to {}", bytes.len(), addr);
        self.handle
            .submit(&[TransferDescriptor::i2c_write(addr, bytes.to_vec())])?;
        Ok(())
    }

    /// Read exactly `count` bytes from the peripheral at `address`
    pub fn read(&mut self, address: u16, count: usize) -> Result<Vec<u8>> {
        self.handle.ensure_open()?;
        let addr = I2cAddress::new(address)?;
        if count == 0 {
            return Ok(Vec::new());
        }

        log::trace!("i2c: read {} byte(s) from {}", count, addr);
        let replies = self
            .handle
            .submit(&[TransferDescriptor::i2c_read(addr, count)])?;
        single_reply(replies, count)
    }

    /// Write `command` then read `count` bytes in one atomic transaction
    ///
    /// The read follows the write with a repeated start, so the bus is never
    /// released between the two halves. The reply is returned raw, including
    /// any trailing checksum byte the peripheral appends.
    pub fn read_transaction(&mut self, address: u16, command: u8, count: usize) -> Result<Vec<u8>> {
        self.write_read(address, &[command], count)
    }

    /// Write `bytes` then read `count` bytes in one atomic transaction
    ///
    /// Like [`read_transaction`](Self::read_transaction) but with a
    /// multi-byte write phase, e.g. a 16-bit EEPROM memory pointer.
    pub fn write_read(&mut self, address: u16, bytes: &[u8], count: usize) -> Result<Vec<u8>> {
        self.handle.ensure_open()?;
        let addr = I2cAddress::new(address)?;

        log::trace!(
            "i2c: write {} byte(s) then read {} byte(s) at {}",
            bytes.len(),
            count,
            addr
        );
        let replies = self.handle.submit(&[TransferDescriptor::i2c_write_read(
            addr,
            bytes.to_vec(),
            count,
        )])?;
        single_reply(replies, count)
    }
}

/// Extract the one reply a single-descriptor batch produced
///
/// Anything other than exactly `count` bytes is a short transfer.
fn single_reply(mut replies: Vec<Vec<u8>>, count: usize) -> Result<Vec<u8>> {
    match replies.pop() {
        Some(data) if data.len() == count && replies.is_empty() => Ok(data),
        _ => Err(Error::Transaction(errno::EIO)),
    }
}

impl<T: Transport> SerialBus for I2cDevice<T> {
    type Target = u16;
    type Word = u8;

    fn open(&mut self) -> Result<()> {
        I2cDevice::open(self)
    }

    fn close(&mut self) {
        I2cDevice::close(self)
    }

    fn is_open(&self) -> bool {
        I2cDevice::is_open(self)
    }

    fn write(&mut self, target: u16, data: &[u8]) -> Result<()> {
        I2cDevice::write(self, target, data)
    }

    fn read(&mut self, target: u16, count: usize) -> Result<Vec<u8>> {
        I2cDevice::read(self, target, count)
    }
}
