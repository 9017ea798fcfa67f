//! Emulated peripherals
//!
//! Peripherals see a bus batch as the controller drives it: one call per
//! message, then a stop (I2C) or deselect (SPI) once the batch is over.

use serbus_core::SpiChipSelectConfig;

/// The peripheral did not acknowledge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Nack;

/// Outcome of one I2C message as seen by the controller
pub type Ack = core::result::Result<(), Nack>;

/// A device answering on one I2C address
pub trait I2cPeripheral: Send {
    /// Controller wrote `data` (an empty slice is an address-only write)
    fn write(&mut self, data: &[u8]) -> Ack;

    /// Controller reads `buf.len()` bytes
    fn read(&mut self, buf: &mut [u8]) -> Ack;

    /// STOP condition at the end of a batch that addressed this device
    fn stop(&mut self) {}
}

/// A device behind one SPI chip-select
pub trait SpiPeripheral: Send {
    /// Shift `tx` in and return the bytes shifted out (same length)
    fn transfer(&mut self, config: &SpiChipSelectConfig, tx: &[u8]) -> Vec<u8>;

    /// Chip-select released at the end of a batch
    fn deselect(&mut self) {}
}

/// I2C EEPROM with a 16-bit memory pointer (24C32 and larger)
///
/// A write starts with the two pointer bytes; any bytes after them are
/// stored, wrapping inside the current page. Reads continue from the
/// pointer and wrap at the end of memory. Once a write with data is
/// followed by STOP the part goes into its internal write cycle and NACKs
/// the next `write_cycle` messages addressed to it.
#[derive(Debug, Clone)]
pub struct Eeprom {
    data: Vec<u8>,
    page_size: usize,
    pointer: usize,
    write_cycle: u32,
    busy: u32,
    pending: bool,
}

impl Eeprom {
    /// Erased (0xFF) EEPROM of `size` bytes with `page_size` byte pages
    ///
    /// # Panics
    ///
    /// If `size` or `page_size` is zero.
    pub fn new(size: usize, page_size: usize) -> Self {
        assert!(size > 0 && page_size > 0, "EEPROM geometry must be non-zero");
        Self {
            data: vec![0xFF; size],
            page_size,
            pointer: 0,
            write_cycle: 0,
            busy: 0,
            pending: false,
        }
    }

    /// 24C32: 4 KiB with 32 byte pages
    pub fn new_24c32() -> Self {
        Self::new(4096, 32)
    }

    /// NACK this many messages after each committed write
    pub fn with_write_cycle(mut self, polls: u32) -> Self {
        self.write_cycle = polls;
        self
    }

    /// Memory contents
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Whether an internal write cycle is in progress
    pub fn is_busy(&self) -> bool {
        self.busy > 0
    }

    fn poll(&mut self) -> Ack {
        if self.busy > 0 {
            self.busy -= 1;
            return Err(Nack);
        }
        Ok(())
    }
}

impl I2cPeripheral for Eeprom {
    fn write(&mut self, data: &[u8]) -> Ack {
        self.poll()?;
        let Some((pointer, payload)) = data.split_first_chunk::<2>() else {
            return Ok(());
        };

        self.pointer = u16::from_be_bytes(*pointer) as usize % self.data.len();
        let page_start = self.pointer - self.pointer % self.page_size;
        for &byte in payload {
            self.data[self.pointer] = byte;
            self.pointer = page_start + (self.pointer - page_start + 1) % self.page_size;
            self.pending = true;
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Ack {
        self.poll()?;
        for byte in buf {
            *byte = self.data[self.pointer];
            self.pointer = (self.pointer + 1) % self.data.len();
        }
        Ok(())
    }

    fn stop(&mut self) {
        if self.pending {
            self.pending = false;
            self.busy = self.write_cycle;
            log::trace!("dummy: EEPROM write cycle started ({} polls)", self.busy);
        }
    }
}

/// Peripheral answering every read with the same programmed bytes
///
/// Works on I2C and SPI. Each read (or SPI transfer) returns the reply from
/// its first byte, padded with 0xFF. Writes are acknowledged and ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedResponse {
    reply: Vec<u8>,
}

impl FixedResponse {
    /// Answer reads with `reply`
    pub fn new(reply: impl Into<Vec<u8>>) -> Self {
        Self {
            reply: reply.into(),
        }
    }

    fn fill(&self, buf: &mut [u8]) {
        for (i, byte) in buf.iter_mut().enumerate() {
            *byte = self.reply.get(i).copied().unwrap_or(0xFF);
        }
    }
}

impl I2cPeripheral for FixedResponse {
    fn write(&mut self, _data: &[u8]) -> Ack {
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Ack {
        self.fill(buf);
        Ok(())
    }
}

impl SpiPeripheral for FixedResponse {
    fn transfer(&mut self, _config: &SpiChipSelectConfig, tx: &[u8]) -> Vec<u8> {
        let mut rx = vec![0; tx.len()];
        self.fill(&mut rx);
        rx
    }
}

/// SPI device with MISO tied to MOSI
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Loopback;

impl SpiPeripheral for Loopback {
    fn transfer(&mut self, _config: &SpiChipSelectConfig, tx: &[u8]) -> Vec<u8> {
        tx.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eeprom_page_write_wraps() {
        let mut eeprom = Eeprom::new(64, 8);
        eeprom.write(&[0x00, 0x06, 1, 2, 3, 4]).unwrap();
        eeprom.stop();

        assert_eq!(&eeprom.data()[..8], &[3, 4, 0xFF, 0xFF, 0xFF, 0xFF, 1, 2]);
        assert_eq!(eeprom.data()[8], 0xFF);
    }

    #[test]
    fn test_eeprom_sequential_read() {
        let mut eeprom = Eeprom::new(16, 16);
        eeprom.write(&[0x00, 0x0E, 0xAA, 0xBB]).unwrap();
        eeprom.stop();

        eeprom.write(&[0x00, 0x0E]).unwrap();
        let mut buf = [0; 3];
        eeprom.read(&mut buf).unwrap();
        eeprom.stop();
        assert_eq!(buf, [0xAA, 0xBB, 0xFF]);
    }

    #[test]
    fn test_eeprom_write_cycle() {
        let mut eeprom = Eeprom::new(32, 8).with_write_cycle(2);

        // Pointer-only writes do not start a write cycle
        eeprom.write(&[0x00, 0x00]).unwrap();
        eeprom.stop();
        assert!(!eeprom.is_busy());

        eeprom.write(&[0x00, 0x00, 0x42]).unwrap();
        eeprom.stop();
        assert!(eeprom.is_busy());

        assert_eq!(eeprom.write(&[0x00, 0x00]), Err(Nack));
        assert_eq!(eeprom.read(&mut [0]), Err(Nack));
        assert!(!eeprom.is_busy());

        eeprom.write(&[0x00, 0x00]).unwrap();
        let mut buf = [0];
        eeprom.read(&mut buf).unwrap();
        assert_eq!(buf, [0x42]);
    }

    #[test]
    fn test_fixed_response_pads() {
        let mut dev = FixedResponse::new([0x66, 0x50]);
        let mut buf = [0; 3];
        I2cPeripheral::read(&mut dev, &mut buf).unwrap();
        assert_eq!(buf, [0x66, 0x50, 0xFF]);

        let rx = dev.transfer(&SpiChipSelectConfig::default(), &[0x9F]);
        assert_eq!(rx, [0x66]);
    }
}
