//! serbus-dummy - In-memory bus emulator for testing
//!
//! This crate provides transports that run I2C and SPI batches against
//! emulated peripherals in memory. It's useful for testing code built on
//! `serbus-core` without real hardware.
//!
//! A [`DummyBus`] is shared by any number of [`DummyTransport`] handles,
//! possibly on different threads. Each batch runs with the bus locked, so a
//! batch is atomic just like one `I2C_RDWR` or `SPI_IOC_MESSAGE` call. All
//! messages are recorded in a transaction log tagged with the handle that
//! issued them.
//!
//! # Example
//!
//! ```
//! use serbus_dummy::{DummyBus, Eeprom};
//!
//! let bus = DummyBus::new();
//! bus.attach_i2c(0x50, Eeprom::new_24c32());
//!
//! let mut dev = bus.i2c_device();
//! dev.open()?;
//! dev.write(0x50, &[0x00, 0x10, 0xAB])?;
//! assert_eq!(dev.write_read(0x50, &[0x00, 0x10], 1)?, [0xAB]);
//! # Ok::<(), serbus_core::Error>(())
//! ```

mod peripheral;

pub use peripheral::{Ack, Eeprom, FixedResponse, I2cPeripheral, Loopback, Nack, SpiPeripheral};

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use serbus_core::codec;
use serbus_core::error::{errno, Error, OpenFailure, Result};
use serbus_core::{
    ChipSelect, I2cDevice, Protocol, SpiChipSelectConfig, SpiDevice, Target, Transport,
    TransferDescriptor,
};

/// SPI transfer limit of a new [`DummyBus`], the spidev default `bufsiz`
pub const DEFAULT_MAX_TRANSFER_LEN: usize = 4096;

/// Identifier of one transport attached to a [`DummyBus`]
pub type HandleId = usize;

/// One message as it appeared on the emulated bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// I2C write that was acknowledged
    I2cWrite {
        /// Slave address
        addr: u16,
        /// Bytes written
        data: Vec<u8>,
    },
    /// I2C read that was acknowledged
    I2cRead {
        /// Slave address
        addr: u16,
        /// Bytes returned
        data: Vec<u8>,
    },
    /// I2C message that was not acknowledged
    I2cNack {
        /// Slave address
        addr: u16,
    },
    /// One SPI segment with chip-select asserted
    SpiTransfer {
        /// Chip-select
        cs: ChipSelect,
        /// Configuration applied for this segment
        config: SpiChipSelectConfig,
        /// Bytes shifted out by the controller
        tx: Vec<u8>,
        /// Bytes shifted in
        rx: Vec<u8>,
    },
}

/// Transaction log entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Transport that issued the message
    pub handle: HandleId,
    /// The message
    pub message: Message,
}

struct BusState {
    i2c: BTreeMap<u16, Box<dyn I2cPeripheral>>,
    spi: BTreeMap<ChipSelect, Box<dyn SpiPeripheral>>,
    log: Vec<LogEntry>,
    next_handle: HandleId,
    open_failure: Option<OpenFailure>,
    max_transfer_len: usize,
}

impl Default for BusState {
    fn default() -> Self {
        Self {
            i2c: BTreeMap::new(),
            spi: BTreeMap::new(),
            log: Vec::new(),
            next_handle: 0,
            open_failure: None,
            max_transfer_len: DEFAULT_MAX_TRANSFER_LEN,
        }
    }
}

/// Emulated bus shared by all of its transports
#[derive(Clone, Default)]
pub struct DummyBus {
    state: Arc<Mutex<BusState>>,
}

impl std::fmt::Debug for DummyBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("DummyBus")
            .field("i2c", &state.i2c.keys().collect::<Vec<_>>())
            .field("spi", &state.spi.keys().collect::<Vec<_>>())
            .field("log_len", &state.log.len())
            .finish()
    }
}

impl DummyBus {
    /// Create an empty bus
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BusState> {
        // A panicking test thread must not wedge every other handle
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Attach an I2C peripheral at `addr`, replacing any previous one
    pub fn attach_i2c(&self, addr: u16, peripheral: impl I2cPeripheral + 'static) {
        self.lock().i2c.insert(addr, Box::new(peripheral));
    }

    /// Remove the I2C peripheral at `addr`
    pub fn detach_i2c(&self, addr: u16) {
        self.lock().i2c.remove(&addr);
    }

    /// Attach an SPI peripheral behind `cs`, replacing any previous one
    pub fn attach_spi(&self, cs: ChipSelect, peripheral: impl SpiPeripheral + 'static) {
        self.lock().spi.insert(cs, Box::new(peripheral));
    }

    /// Remove the SPI peripheral behind `cs`
    pub fn detach_spi(&self, cs: ChipSelect) {
        self.lock().spi.remove(&cs);
    }

    /// Make every following `open` fail with `failure` (`None` to clear)
    pub fn set_open_failure(&self, failure: Option<OpenFailure>) {
        self.lock().open_failure = failure;
    }

    /// Bytes one SPI batch may move, like spidev's `bufsiz`
    pub fn set_max_transfer_len(&self, len: usize) {
        self.lock().max_transfer_len = len;
    }

    /// Copy of the transaction log
    pub fn log(&self) -> Vec<LogEntry> {
        self.lock().log.clone()
    }

    /// Empty the transaction log
    pub fn clear_log(&self) {
        self.lock().log.clear();
    }

    /// New I2C transport on this bus
    pub fn i2c_transport(&self) -> DummyTransport {
        DummyTransport::new(self.clone(), Protocol::I2c)
    }

    /// New SPI transport on this bus
    pub fn spi_transport(&self) -> DummyTransport {
        DummyTransport::new(self.clone(), Protocol::Spi)
    }

    /// New (closed) I2C bus device on this bus
    pub fn i2c_device(&self) -> I2cDevice<DummyTransport> {
        I2cDevice::new(self.i2c_transport())
    }

    /// New (closed) SPI bus device on this bus
    pub fn spi_device(&self) -> SpiDevice<DummyTransport> {
        SpiDevice::new(self.spi_transport())
    }
}

/// Transport backed by a [`DummyBus`]
#[derive(Debug)]
pub struct DummyTransport {
    bus: DummyBus,
    id: HandleId,
    protocol: Protocol,
    path: String,
    open: bool,
}

impl DummyTransport {
    fn new(bus: DummyBus, protocol: Protocol) -> Self {
        let id = {
            let mut state = bus.lock();
            state.next_handle += 1;
            state.next_handle
        };
        Self {
            bus,
            id,
            protocol,
            path: match protocol {
                Protocol::I2c => "dummy-i2c",
                Protocol::Spi => "dummy-spi",
            }
            .to_string(),
            open: false,
        }
    }

    /// Handle id used in the transaction log
    pub fn id(&self) -> HandleId {
        self.id
    }

    fn run_i2c(&self, state: &mut BusState, batch: &[TransferDescriptor]) -> Result<Vec<Vec<u8>>> {
        let mut messages = codec::encode_i2c(batch)?;
        let mut addressed = BTreeSet::new();

        let mut result = Ok(());
        for msg in &mut messages {
            addressed.insert(msg.addr);
            let ack = match state.i2c.get_mut(&msg.addr) {
                Some(dev) if msg.is_read() => dev.read(&mut msg.buf),
                Some(dev) => dev.write(&msg.buf),
                None => Err(Nack),
            };

            let message = match ack {
                Ok(()) if msg.is_read() => Message::I2cRead {
                    addr: msg.addr,
                    data: msg.buf.clone(),
                },
                Ok(()) => Message::I2cWrite {
                    addr: msg.addr,
                    data: msg.buf.clone(),
                },
                Err(Nack) => Message::I2cNack { addr: msg.addr },
            };
            state.log.push(LogEntry {
                handle: self.id,
                message,
            });

            if ack.is_err() {
                log::debug!("dummy: NACK from 0x{:02X}", msg.addr);
                result = Err(Error::Transaction(errno::EREMOTEIO));
                break;
            }
        }

        for addr in addressed {
            if let Some(dev) = state.i2c.get_mut(&addr) {
                dev.stop();
            }
        }

        result.map(|()| codec::decode_i2c(messages))
    }

    fn run_spi(&self, state: &mut BusState, batch: &[TransferDescriptor]) -> Result<Vec<Vec<u8>>> {
        let mut spi = codec::encode_spi(batch, state.max_transfer_len)?;
        let Some(Target::Spi { config, .. }) = batch.first().map(|d| &d.target) else {
            return Err(Error::Transaction(errno::EINVAL));
        };
        let config = *config;
        let cs = spi.cs;

        let Some(dev) = state.spi.get_mut(&cs) else {
            log::debug!("dummy: No peripheral behind chip-select {}", cs);
            return Err(Error::DeviceOpen(OpenFailure::NotFound));
        };

        // Segment buffers hold host-order words; peripherals see wire order
        let mut entries = Vec::with_capacity(spi.segments.len());
        for segment in &mut spi.segments {
            let mut tx = segment.tx.clone().unwrap_or_else(|| vec![0; segment.len]);
            codec::swap_word_order(&mut tx, segment.bits_per_word);
            let rx = dev.transfer(&config, &tx);

            if let Some(buf) = segment.rx.as_mut() {
                for (dst, src) in buf.iter_mut().zip(&rx) {
                    *dst = *src;
                }
                codec::swap_word_order(buf, segment.bits_per_word);
            }
            entries.push(LogEntry {
                handle: self.id,
                message: Message::SpiTransfer { cs, config, tx, rx },
            });
        }
        dev.deselect();

        state.log.extend(entries);
        Ok(codec::decode_spi(spi))
    }
}

impl Transport for DummyTransport {
    fn protocol(&self) -> Protocol {
        self.protocol
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn open(&mut self) -> Result<()> {
        if let Some(failure) = self.bus.lock().open_failure {
            return Err(Error::DeviceOpen(failure));
        }
        self.open = true;
        log::debug!("dummy: Handle {} opened ({})", self.id, self.protocol);
        Ok(())
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            log::debug!("dummy: Handle {} closed", self.id);
        }
    }

    fn submit(&mut self, batch: &[TransferDescriptor]) -> Result<Vec<Vec<u8>>> {
        if !self.open {
            return Err(Error::ClosedHandle);
        }

        let mut state = self.bus.lock();
        match self.protocol {
            Protocol::I2c => self.run_i2c(&mut state, batch),
            Protocol::Spi => self.run_spi(&mut state, batch),
        }
    }
}
