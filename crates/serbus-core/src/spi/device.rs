//! SPI device wrapper

use alloc::vec::Vec;

use crate::bus::{BusHandle, HandleState, SerialBus, Transport};
use crate::codec;
use crate::error::{errno, Error, Result};
use crate::transfer::{ChipSelect, Payload, TransferDescriptor};

use super::config::{BitOrder, ConfigStore, CsPolarity, SpiChipSelectConfig, SpiFlags};

/// SPI bus device
///
/// Holds the bus handle plus a configuration record for every chip-select
/// that has been configured. Setters only update that record; the full
/// record is applied to the bus immediately before each transfer, which lets
/// peripherals with different electrical requirements share one bus.
///
/// Data is exchanged as logical words of the configured width. Packing into
/// bytes (including LSB-first bit order) is done by the codec.
pub struct SpiDevice<T: Transport> {
    handle: BusHandle<T>,
    configs: ConfigStore,
}

impl<T: Transport> SpiDevice<T> {
    /// Create a closed device on top of a transport
    pub fn new(transport: T) -> Self {
        Self {
            handle: BusHandle::new(transport),
            configs: ConfigStore::new(),
        }
    }

    /// Open the bus device
    pub fn open(&mut self) -> Result<()> {
        self.handle.open()
    }

    /// Close the bus device; a no-op when already closed
    ///
    /// Stored chip-select configuration survives a close.
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

    /// Stored configuration for `cs` (defaults if never configured)
    pub fn config(&self, cs: ChipSelect) -> SpiChipSelectConfig {
        self.configs.get(cs)
    }

    /// Set the maximum clock frequency for `cs`
    pub fn set_max_frequency(&mut self, cs: ChipSelect, hz: u32) -> Result<()> {
        self.handle.ensure_open()?;
        self.configs.set_max_frequency(cs, hz)
    }

    /// Set the word width for `cs` (1-32 bits)
    pub fn set_bits_per_word(&mut self, cs: ChipSelect, bits: u8) -> Result<()> {
        self.handle.ensure_open()?;
        self.configs.set_bits_per_word(cs, bits)
    }

    /// Set the clock mode for `cs` (0-3)
    pub fn set_clock_mode(&mut self, cs: ChipSelect, mode: u8) -> Result<()> {
        self.handle.ensure_open()?;
        self.configs.set_clock_mode(cs, mode)
    }

    /// Make `cs` active high
    pub fn set_cs_active_high(&mut self, cs: ChipSelect) -> Result<()> {
        self.handle.ensure_open()?;
        self.configs.set_cs_polarity(cs, CsPolarity::ActiveHigh);
        Ok(())
    }

    /// Make `cs` active low
    pub fn set_cs_active_low(&mut self, cs: ChipSelect) -> Result<()> {
        self.handle.ensure_open()?;
        self.configs.set_cs_polarity(cs, CsPolarity::ActiveLow);
        Ok(())
    }

    /// Shift words on `cs` most significant bit first
    pub fn set_msb_first(&mut self, cs: ChipSelect) -> Result<()> {
        self.handle.ensure_open()?;
        self.configs.set_bit_order(cs, BitOrder::MsbFirst);
        Ok(())
    }

    /// Shift words on `cs` least significant bit first
    pub fn set_lsb_first(&mut self, cs: ChipSelect) -> Result<()> {
        self.handle.ensure_open()?;
        self.configs.set_bit_order(cs, BitOrder::LsbFirst);
        Ok(())
    }

    /// Enable or disable controller loopback on `cs`
    pub fn set_loopback(&mut self, cs: ChipSelect, enabled: bool) -> Result<()> {
        self.handle.ensure_open()?;
        self.configs.set_flag(cs, SpiFlags::LOOPBACK, enabled);
        Ok(())
    }

    /// Enable or disable 3-wire (shared data line) mode on `cs`
    pub fn set_three_wire(&mut self, cs: ChipSelect, enabled: bool) -> Result<()> {
        self.handle.ensure_open()?;
        self.configs.set_flag(cs, SpiFlags::THREE_WIRE, enabled);
        Ok(())
    }

    /// Enable or disable driving the chip-select line for `cs`
    pub fn set_cs_enabled(&mut self, cs: ChipSelect, enabled: bool) -> Result<()> {
        self.handle.ensure_open()?;
        self.configs.set_flag(cs, SpiFlags::NO_CS, !enabled);
        Ok(())
    }

    /// Write `words` to `cs`, discarding what is shifted in
    pub fn write(&mut self, cs: ChipSelect, words: &[u32]) -> Result<()> {
        self.handle.ensure_open()?;
        let config = self.configs.get(cs);
        let bytes = codec::pack_words(words, config.bits_per_word, config.bit_order)?;
        if bytes.is_empty() {
            return Ok(());
        }

        log::trace!("spi: write {} word(s) to cs {}", words.len(), cs);
        self.handle
            .submit(&[TransferDescriptor::spi(cs, config, Payload::Write(bytes))])?;
        Ok(())
    }

    /// Read `count` words from `cs`, shifting out zeros
    pub fn read(&mut self, cs: ChipSelect, count: usize) -> Result<Vec<u32>> {
        self.handle.ensure_open()?;
        let config = self.configs.get(cs);
        if count == 0 {
            return Ok(Vec::new());
        }

        let len = reply_bytes(count, config.bits_per_word)?;
        log::trace!("spi: read {} word(s) from cs {}", count, cs);
        self.exchange(cs, config, Payload::Read(len), len)
    }

    /// Full-duplex transfer: shift out `words` while shifting in as many
    pub fn transfer(&mut self, cs: ChipSelect, words: &[u32]) -> Result<Vec<u32>> {
        self.handle.ensure_open()?;
        let config = self.configs.get(cs);
        let bytes = codec::pack_words(words, config.bits_per_word, config.bit_order)?;
        if bytes.is_empty() {
            return Ok(Vec::new());
        }

        log::trace!("spi: transfer {} word(s) on cs {}", words.len(), cs);
        let len = bytes.len();
        self.exchange(cs, config, Payload::Duplex(bytes), len)
    }

    /// Write `words` then read `count` words with chip-select held throughout
    pub fn write_read(&mut self, cs: ChipSelect, words: &[u32], count: usize) -> Result<Vec<u32>> {
        self.handle.ensure_open()?;
        let config = self.configs.get(cs);
        let bytes = codec::pack_words(words, config.bits_per_word, config.bit_order)?;
        let read_len = reply_bytes(count, config.bits_per_word)?;

        log::trace!(
            "spi: write {} word(s) then read {} word(s) on cs {}",
            words.len(),
            count,
            cs
        );
        let payload = match (bytes.is_empty(), read_len) {
            (true, 0) => return Ok(Vec::new()),
            (true, _) => Payload::Read(read_len),
            (false, 0) => Payload::Write(bytes),
            (false, _) => Payload::WriteThenRead {
                write: bytes,
                read_len,
            },
        };
        self.exchange(cs, config, payload, read_len)
    }

    fn exchange(
        &mut self,
        cs: ChipSelect,
        config: SpiChipSelectConfig,
        payload: Payload,
        reply_len: usize,
    ) -> Result<Vec<u32>> {
        let has_reply = !matches!(payload, Payload::Write(_));
        let mut replies = self
            .handle
            .submit(&[TransferDescriptor::spi(cs, config, payload)])?;
        if !has_reply {
            return Ok(Vec::new());
        }
        match replies.pop() {
            Some(bytes) if bytes.len() == reply_len && replies.is_empty() => Ok(
                codec::unpack_words(&bytes, config.bits_per_word, config.bit_order),
            ),
            _ => Err(Error::Transaction(errno::EIO)),
        }
    }
}

/// Byte length of `count` words, or `TransferTooLarge` if it does not fit a `usize`
fn reply_bytes(count: usize, bits_per_word: u8) -> Result<usize> {
    let size = codec::word_bytes(bits_per_word);
    count.checked_mul(size).ok_or(Error::TransferTooLarge {
        len: count,
        max: usize::MAX / size,
    })
}

impl<T: Transport> SerialBus for SpiDevice<T> {
    type Target = ChipSelect;
    type Word = u32;

    fn open(&mut self) -> Result<()> {
        SpiDevice::open(self)
    }

    fn close(&mut self) {
        SpiDevice::close(self)
    }

    fn is_open(&self) -> bool {
        SpiDevice::is_open(self)
    }

    fn write(&mut self, target: ChipSelect, data: &[u32]) -> Result<()> {
        SpiDevice::write(self, target, data)
    }

    fn read(&mut self, target: ChipSelect, count: usize) -> Result<Vec<u32>> {
        SpiDevice::read(self, target, count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;
    use crate::spi::SpiMode;
    use crate::testing::ScriptedTransport;
    use crate::transfer::{Protocol, Target};
    use alloc::vec;

    fn open_device() -> SpiDevice<ScriptedTransport> {
        let mut dev = SpiDevice::new(ScriptedTransport::new(Protocol::Spi));
        dev.open().unwrap();
        dev
    }

    fn submitted_target(dev: &SpiDevice<ScriptedTransport>, index: usize) -> (ChipSelect, SpiChipSelectConfig) {
        match dev.transport().submitted[index][0].target {
            Target::Spi { cs, config } => (cs, config),
            Target::I2c(_) => panic!("expected an SPI target"),
        }
    }

    #[test]
    fn test_closed_device_rejects_everything() {
        let mut dev = SpiDevice::new(ScriptedTransport::new(Protocol::Spi));
        assert_eq!(dev.set_max_frequency(0, 1_000_000), Err(Error::ClosedHandle));
        assert_eq!(dev.set_clock_mode(0, 3), Err(Error::ClosedHandle));
        assert_eq!(dev.write(0, &[1]), Err(Error::ClosedHandle));
        assert_eq!(dev.read(0, 1), Err(Error::ClosedHandle));
        assert_eq!(dev.transfer(0, &[1]), Err(Error::ClosedHandle));
        assert!(dev.transport().submitted.is_empty());
    }

    #[test]
    fn test_write_applies_stored_config() {
        let mut dev = open_device();
        dev.set_max_frequency(0, 1_000_000).unwrap();
        dev.set_bits_per_word(0, 16).unwrap();
        dev.set_clock_mode(0, 3).unwrap();
        dev.set_cs_active_high(0).unwrap();
        dev.set_msb_first(0).unwrap();

        dev.write(0, &[0x0ABC]).unwrap();

        let (cs, config) = submitted_target(&dev, 0);
        assert_eq!(cs, 0);
        assert_eq!(config.max_speed_hz, 1_000_000);
        assert_eq!(config.bits_per_word, 16);
        assert_eq!(config.mode, SpiMode::Mode3);
        assert_eq!(config.cs_polarity, CsPolarity::ActiveHigh);
        assert_eq!(
            dev.transport().submitted[0][0].payload,
            Payload::Write(vec![0x0A, 0xBC])
        );
    }

    #[test]
    fn test_lsb_first_packing() {
        let mut dev = open_device();
        dev.set_bits_per_word(1, 16).unwrap();
        dev.set_lsb_first(1).unwrap();
        dev.write(1, &[0x0ABC]).unwrap();
        assert_eq!(
            dev.transport().submitted[0][0].payload,
            Payload::Write(vec![0x3D, 0x50])
        );
    }

    #[test]
    fn test_chip_select_isolation() {
        let mut dev = open_device();
        dev.set_bits_per_word(0, 16).unwrap();
        dev.set_clock_mode(0, 2).unwrap();

        dev.write(1, &[0xAA]).unwrap();

        let (cs, config) = submitted_target(&dev, 0);
        assert_eq!(cs, 1);
        assert_eq!(config, SpiChipSelectConfig::default());
        assert_eq!(dev.transport().submitted[0][0].payload, Payload::Write(vec![0xAA]));
    }

    #[test]
    fn test_config_reapplied_on_every_transfer() {
        let mut dev = open_device();
        dev.set_clock_mode(0, 1).unwrap();
        dev.write(0, &[1]).unwrap();
        dev.set_clock_mode(0, 2).unwrap();
        dev.write(0, &[2]).unwrap();

        assert_eq!(submitted_target(&dev, 0).1.mode, SpiMode::Mode1);
        assert_eq!(submitted_target(&dev, 1).1.mode, SpiMode::Mode2);
    }

    #[test]
    fn test_read_unpacks_words() {
        let mut transport = ScriptedTransport::new(Protocol::Spi);
        transport.replies.push_back(vec![0x0F, 0xFF, 0x00, 0x10]);
        let mut dev = SpiDevice::new(transport);
        dev.open().unwrap();
        dev.set_bits_per_word(0, 12).unwrap();

        assert_eq!(dev.read(0, 2).unwrap(), [0xFFF, 0x010]);
        assert_eq!(dev.transport().submitted[0][0].payload, Payload::Read(4));
    }

    #[test]
    fn test_write_read_shapes() {
        let mut dev = open_device();
        assert_eq!(dev.write_read(0, &[0x9F], 3).unwrap(), [0, 0, 0]);
        assert_eq!(
            dev.transport().submitted[0][0].payload,
            Payload::WriteThenRead { write: vec![0x9F], read_len: 3 }
        );

        assert_eq!(dev.write_read(0, &[0x06], 0).unwrap(), Vec::<u32>::new());
        assert_eq!(dev.transport().submitted[1][0].payload, Payload::Write(vec![0x06]));

        assert_eq!(dev.write_read(0, &[], 0).unwrap(), Vec::<u32>::new());
        assert_eq!(dev.transport().submitted.len(), 2);
    }

    #[test]
    fn test_word_count_overflow() {
        let mut dev = open_device();
        dev.set_bits_per_word(0, 16).unwrap();
        let count = usize::MAX / 2 + 1;
        let expected = Err(Error::TransferTooLarge {
            len: count,
            max: usize::MAX / 2,
        });

        assert_eq!(dev.read(0, count), expected);
        assert_eq!(dev.write_read(0, &[0x9F], count), expected);
        assert_eq!(dev.write_read(0, &[], count), expected);
        assert!(dev.transport().submitted.is_empty());

        assert_eq!(reply_bytes(usize::MAX / 4, 32), Ok(usize::MAX / 4 * 4));
    }

    #[test]
    fn test_invalid_setters() {
        let mut dev = open_device();
        assert_eq!(
            dev.set_clock_mode(0, 4),
            Err(Error::Configuration(ConfigError::InvalidClockMode(4)))
        );
        assert_eq!(
            dev.set_max_frequency(0, 0),
            Err(Error::Configuration(ConfigError::ZeroFrequency))
        );
        assert_eq!(dev.config(0), SpiChipSelectConfig::default());
    }

    #[test]
    fn test_word_wider_than_config() {
        let mut dev = open_device();
        assert_eq!(
            dev.write(0, &[0x1FF]),
            Err(Error::InvalidWord { word: 0x1FF, bits: 8 })
        );
        assert!(dev.transport().submitted.is_empty());
    }

    #[test]
    fn test_cs_flags() {
        let mut dev = open_device();
        dev.set_loopback(0, true).unwrap();
        dev.set_cs_enabled(0, false).unwrap();
        dev.set_three_wire(0, true).unwrap();
        dev.set_three_wire(0, false).unwrap();
        assert_eq!(dev.config(0).flags, SpiFlags::LOOPBACK | SpiFlags::NO_CS);
    }

    #[test]
    fn test_config_survives_close() {
        let mut dev = open_device();
        dev.set_bits_per_word(0, 16).unwrap();
        dev.close();
        dev.open().unwrap();
        assert_eq!(dev.config(0).bits_per_word, 16);
    }
}
