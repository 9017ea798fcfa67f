//! Bus handle and transport traits
//!
//! [`Transport`] is the seam between the protocol wrappers and whatever
//! actually moves bytes: the Linux i2c-dev/spidev backends or the in-memory
//! emulator. [`BusHandle`] wraps a transport with the Closed/Open state
//! machine so that no transport ever sees a submit while closed.
//!
//! ```text
//!   Closed --open()--> Open --close()--> Closed
//! ```

use alloc::vec::Vec;

use crate::error::{Error, Result};
use crate::transfer::{Protocol, TransferDescriptor};

/// Low-level bus access
///
/// Implementations own the OS resources for one bus. They are only driven
/// through [`BusHandle`], which guarantees `open` is never called twice in a
/// row and `submit` is only called between `open` and `close`.
pub trait Transport {
    /// Protocol served by this transport
    fn protocol(&self) -> Protocol;

    /// Device node (or other human readable location) of the bus
    fn path(&self) -> &str;

    /// Acquire the underlying device
    fn open(&mut self) -> Result<()>;

    /// Release the underlying device
    fn close(&mut self);

    /// Execute `batch` as one atomic bus operation
    ///
    /// Returns one reply buffer per descriptor that reads (Read,
    /// WriteThenRead, Duplex), in submission order. On failure no reply data
    /// is returned.
    fn submit(&mut self, batch: &[TransferDescriptor]) -> Result<Vec<Vec<u8>>>;
}

/// Lifecycle state of a [`BusHandle`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandleState {
    /// No device held (initial state)
    #[default]
    Closed,
    /// Device held, transfers allowed
    Open,
}

/// Exclusive connection to one bus device
pub struct BusHandle<T: Transport> {
    transport: T,
    state: HandleState,
}

impl<T: Transport> BusHandle<T> {
    /// Wrap a transport; the handle starts closed
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            state: HandleState::Closed,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> HandleState {
        self.state
    }

    /// Whether the handle is open
    pub fn is_open(&self) -> bool {
        self.state == HandleState::Open
    }

    /// Device node of the bus
    pub fn path(&self) -> &str {
        self.transport.path()
    }

    /// Protocol of the bus
    pub fn protocol(&self) -> Protocol {
        self.transport.protocol()
    }

    /// Borrow the transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Open the device
    ///
    /// Fails with [`Error::AlreadyOpen`] if the handle is already open rather
    /// than silently reopening.
    pub fn open(&mut self) -> Result<()> {
        if self.is_open() {
            return Err(Error::AlreadyOpen);
        }
        self.transport.open()?;
        self.state = HandleState::Open;
        log::debug!("{}: opened {}", self.protocol(), self.path());
        Ok(())
    }

    /// Release the device; closing a closed handle is a no-op
    pub fn close(&mut self) {
        if !self.is_open() {
            return;
        }
        self.transport.close();
        self.state = HandleState::Closed;
        log::debug!("{}: closed {}", self.protocol(), self.path());
    }

    /// Fail with [`Error::ClosedHandle`] unless open
    pub fn ensure_open(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(Error::ClosedHandle)
        }
    }

    /// Submit a batch of descriptors as one atomic bus operation
    pub fn submit(&mut self, batch: &[TransferDescriptor]) -> Result<Vec<Vec<u8>>> {
        self.ensure_open()?;
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        debug_assert!(batch
            .iter()
            .all(|d| d.target.protocol() == self.transport.protocol()));

        log::trace!(
            "{}: submitting {} descriptor(s) on {}",
            self.protocol(),
            batch.len(),
            self.path()
        );
        self.transport.submit(batch).map_err(|e| {
            log::debug!("{}: transaction on {} failed: {}", self.protocol(), self.path(), e);
            e
        })
    }
}

impl<T: Transport> Drop for BusHandle<T> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Capabilities shared by I2C and SPI devices
///
/// The two protocols address peripherals differently (slave address versus
/// chip-select) and move different units (bytes versus configurable-width
/// words), so both are associated types.
pub trait SerialBus {
    /// How a peripheral is selected
    type Target: Copy;
    /// Unit of data moved
    type Word: Copy;

    /// Open the bus device
    fn open(&mut self) -> Result<()>;

    /// Close the bus device (no-op if already closed)
    fn close(&mut self);

    /// Whether the bus device is open
    fn is_open(&self) -> bool;

    /// Write `data` to `target`
    fn write(&mut self, target: Self::Target, data: &[Self::Word]) -> Result<()>;

    /// Read `count` words from `target`
    fn read(&mut self, target: Self::Target, count: usize) -> Result<Vec<Self::Word>>;
}
