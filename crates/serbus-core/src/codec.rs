//! Wire codec
//!
//! Pure translation between transfer descriptors and the fixed-shape message
//! lists the kernel bus interfaces expect, plus SPI word packing. Nothing in
//! here holds state or touches a device; transports call [`encode_i2c`] /
//! [`encode_spi`] before submitting and the matching decode function after.
//!
//! ## SPI word layout
//!
//! Words are stored the way spidev stores them: one byte for widths up to 8
//! bits, two bytes up to 16 and four bytes up to 32. In *wire order* each
//! word is big-endian, so with 16-bit words `0x0ABC` is the byte pair
//! `0x0A, 0xBC`. The kernel reads multi-byte words in host byte order, which
//! [`encode_spi`] and [`decode_spi`] account for.
//!
//! Bit order is handled here as well: the controller is always driven
//! MSB-first and LSB-first words are bit-reversed within the configured
//! width before packing.

use alloc::vec;
use alloc::vec::Vec;
use bitflags::bitflags;

use crate::error::{errno, Error, Result};
use crate::spi::{BitOrder, CsPolarity, SpiChipSelectConfig, SpiFlags};
use crate::transfer::{ChipSelect, Payload, Target, TransferDescriptor};

/// Maximum number of messages in one `I2C_RDWR` call
pub const I2C_RDWR_MAX_MSGS: usize = 42;

/// Maximum length of a single I2C message
pub const I2C_MAX_MSG_LEN: usize = 8192;

bitflags! {
    /// `struct i2c_msg` flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct I2cMsgFlags: u16 {
        /// Read from slave
        const READ    = 0x0001;
        /// 10-bit slave address
        const TEN_BIT = 0x0010;
    }
}

bitflags! {
    /// spidev `SPI_IOC_WR_MODE` bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SpiModeBits: u8 {
        /// Clock phase
        const CPHA      = 0x01;
        /// Clock polarity
        const CPOL      = 0x02;
        /// Chip-select active high
        const CS_HIGH   = 0x04;
        /// Shift least significant bit first
        const LSB_FIRST = 0x08;
        /// Shared SI/SO line
        const THREE_WIRE = 0x10;
        /// Loopback
        const LOOP      = 0x20;
        /// No chip-select
        const NO_CS     = 0x40;
    }
}

/// One I2C message, ready to be pointed at by a kernel `struct i2c_msg`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct I2cMessage {
    /// Slave address
    pub addr: u16,
    /// Message flags
    pub flags: I2cMsgFlags,
    /// Bytes to send, or a zeroed buffer to receive into
    pub buf: Vec<u8>,
}

impl I2cMessage {
    /// Whether the kernel fills this message's buffer
    pub fn is_read(&self) -> bool {
        self.flags.contains(I2cMsgFlags::READ)
    }
}

/// One spidev transfer segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpiSegment {
    /// Bytes to shift out, in kernel order (`None` shifts out zeros)
    pub tx: Option<Vec<u8>>,
    /// Buffer to shift into (`None` discards what is received)
    pub rx: Option<Vec<u8>>,
    /// Segment length in bytes
    pub len: usize,
    /// Clock rate for this segment
    pub speed_hz: u32,
    /// Word width for this segment
    pub bits_per_word: u8,
}

/// Kernel-ready form of a batch sent to one chip-select
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpiBatch {
    /// Chip-select every segment targets
    pub cs: ChipSelect,
    /// Mode bits to program before the transfer
    pub mode: SpiModeBits,
    /// Segments, executed with chip-select held between them
    pub segments: Vec<SpiSegment>,
}

impl SpiBatch {
    /// Total bytes moved by the batch
    pub fn total_len(&self) -> usize {
        self.segments.iter().map(|s| s.len).sum()
    }
}

/// Storage size of one SPI word (1, 2 or 4 bytes)
pub fn word_bytes(bits_per_word: u8) -> usize {
    match bits_per_word {
        0..=8 => 1,
        9..=16 => 2,
        _ => 4,
    }
}

fn word_mask(bits: u8) -> u32 {
    if bits >= 32 {
        u32::MAX
    } else {
        (1u32 << bits) - 1
    }
}

fn reverse_bits(word: u32, bits: u8) -> u32 {
    if bits == 0 {
        return 0;
    }
    word.reverse_bits() >> (32 - bits as u32)
}

/// Pack logical words into wire-order bytes
///
/// Fails with [`Error::InvalidWord`] if a word has bits set above the
/// configured width.
pub fn pack_words(words: &[u32], bits_per_word: u8, order: BitOrder) -> Result<Vec<u8>> {
    let size = word_bytes(bits_per_word);
    let mask = word_mask(bits_per_word);
    let mut out = Vec::with_capacity(words.len() * size);

    for &word in words {
        if word & !mask != 0 {
            return Err(Error::InvalidWord {
                word,
                bits: bits_per_word,
            });
        }
        let word = match order {
            BitOrder::MsbFirst => word,
            BitOrder::LsbFirst => reverse_bits(word, bits_per_word),
        };
        out.extend_from_slice(&word.to_be_bytes()[4 - size..]);
    }

    Ok(out)
}

/// Unpack wire-order bytes into logical words
///
/// Bits above the configured width are discarded. A trailing partial word is
/// ignored.
pub fn unpack_words(bytes: &[u8], bits_per_word: u8, order: BitOrder) -> Vec<u32> {
    let size = word_bytes(bits_per_word);
    let mask = word_mask(bits_per_word);

    bytes
        .chunks_exact(size)
        .map(|chunk| {
            let word = chunk.iter().fold(0u32, |acc, &b| (acc << 8) | b as u32) & mask;
            match order {
                BitOrder::MsbFirst => word,
                BitOrder::LsbFirst => reverse_bits(word, bits_per_word),
            }
        })
        .collect()
}

/// Convert between wire order and the kernel's host-order word buffers
///
/// Multi-byte words are byte-swapped on little-endian hosts. The conversion
/// is its own inverse.
pub fn swap_word_order(buf: &mut [u8], bits_per_word: u8) {
    let size = word_bytes(bits_per_word);
    if size == 1 || cfg!(target_endian = "big") {
        return;
    }
    for chunk in buf.chunks_exact_mut(size) {
        chunk.reverse();
    }
}

/// Translate an I2C batch into kernel messages
///
/// A WriteThenRead descriptor becomes two messages in the same batch, so the
/// adapter issues a repeated start between them. Kernel limits are checked
/// before any read buffer is allocated.
pub fn encode_i2c(batch: &[TransferDescriptor]) -> Result<Vec<I2cMessage>> {
    let count = check_i2c_limits(batch)?;
    let mut messages = Vec::with_capacity(count);

    for desc in batch {
        let addr = match desc.target {
            Target::I2c(addr) => addr,
            Target::Spi { .. } => return Err(Error::Transaction(errno::EINVAL)),
        };
        let base = if addr.is_ten_bit() {
            I2cMsgFlags::TEN_BIT
        } else {
            I2cMsgFlags::empty()
        };
        let write = |bytes: &[u8]| I2cMessage {
            addr: addr.raw(),
            flags: base,
            buf: bytes.to_vec(),
        };
        let read = |len: usize| I2cMessage {
            addr: addr.raw(),
            flags: base | I2cMsgFlags::READ,
            buf: vec![0; len],
        };

        match &desc.payload {
            Payload::Write(bytes) => messages.push(write(bytes.as_slice())),
            Payload::Read(len) => messages.push(read(*len)),
            Payload::WriteThenRead { write: bytes, read_len } => {
                messages.push(write(bytes.as_slice()));
                messages.push(read(*read_len));
            }
            Payload::Duplex(_) => return Err(Error::Transaction(errno::EINVAL)),
        }
    }

    Ok(messages)
}

/// Check per-message length and message count; returns the message count
fn check_i2c_limits(batch: &[TransferDescriptor]) -> Result<usize> {
    let mut count = 0;

    for desc in batch {
        let lens = match &desc.payload {
            Payload::Write(bytes) => [Some(bytes.len()), None],
            Payload::Read(len) => [Some(*len), None],
            Payload::WriteThenRead { write, read_len } => [Some(write.len()), Some(*read_len)],
            // i2c has no full-duplex phase
            Payload::Duplex(_) => return Err(Error::Transaction(errno::EINVAL)),
        };
        for len in lens.into_iter().flatten() {
            if len > I2C_MAX_MSG_LEN {
                return Err(Error::TransferTooLarge {
                    len,
                    max: I2C_MAX_MSG_LEN,
                });
            }
            count += 1;
        }
    }

    if count > I2C_RDWR_MAX_MSGS {
        return Err(Error::TransferTooLarge {
            len: count,
            max: I2C_RDWR_MAX_MSGS,
        });
    }
    Ok(count)
}

/// Collect the reply bytes of an executed I2C batch, in submission order
pub fn decode_i2c(messages: Vec<I2cMessage>) -> Vec<Vec<u8>> {
    messages
        .into_iter()
        .filter(I2cMessage::is_read)
        .map(|m| m.buf)
        .collect()
}

/// Mode bits for a chip-select configuration
///
/// `LSB_FIRST` is never set; bit order is applied by [`pack_words`].
pub fn spi_mode_bits(config: &SpiChipSelectConfig) -> SpiModeBits {
    let mut bits = SpiModeBits::empty();
    bits.set(SpiModeBits::CPHA, config.mode.cpha() != 0);
    bits.set(SpiModeBits::CPOL, config.mode.cpol() != 0);
    bits.set(
        SpiModeBits::CS_HIGH,
        config.cs_polarity == CsPolarity::ActiveHigh,
    );
    bits.set(
        SpiModeBits::THREE_WIRE,
        config.flags.contains(SpiFlags::THREE_WIRE),
    );
    bits.set(SpiModeBits::LOOP, config.flags.contains(SpiFlags::LOOPBACK));
    bits.set(SpiModeBits::NO_CS, config.flags.contains(SpiFlags::NO_CS));
    bits
}

/// Translate an SPI batch into spidev segments
///
/// Every descriptor must target the same chip-select and carry the same
/// configuration. `max_len` is the kernel's per-message buffer limit; it is
/// checked before any receive buffer is allocated.
pub fn encode_spi(batch: &[TransferDescriptor], max_len: usize) -> Result<SpiBatch> {
    let (cs, config) = match batch.first().map(|d| &d.target) {
        Some(Target::Spi { cs, config }) => (*cs, *config),
        _ => return Err(Error::Transaction(errno::EINVAL)),
    };
    config.validate()?;

    let mut total = 0usize;
    for desc in batch {
        match desc.target {
            Target::Spi { cs: c, config: ref cfg } if c == cs && *cfg == config => {}
            _ => return Err(Error::Transaction(errno::EINVAL)),
        }
        total = total.saturating_add(desc.wire_len());
    }
    if total > max_len {
        return Err(Error::TransferTooLarge {
            len: total,
            max: max_len,
        });
    }

    let bits = config.bits_per_word;
    let segment = |tx: Option<&[u8]>, rx_len: Option<usize>| {
        let tx = tx.map(|bytes| {
            let mut buf = bytes.to_vec();
            swap_word_order(&mut buf, bits);
            buf
        });
        let len = tx.as_ref().map_or(0, Vec::len).max(rx_len.unwrap_or(0));
        SpiSegment {
            tx,
            rx: rx_len.map(|n| vec![0; n]),
            len,
            speed_hz: config.max_speed_hz,
            bits_per_word: bits,
        }
    };

    let mut segments = Vec::with_capacity(batch.len() * 2);
    for desc in batch {
        match &desc.payload {
            Payload::Write(bytes) => segments.push(segment(Some(bytes.as_slice()), None)),
            Payload::Read(len) => segments.push(segment(None, Some(*len))),
            Payload::WriteThenRead { write, read_len } => {
                segments.push(segment(Some(write.as_slice()), None));
                segments.push(segment(None, Some(*read_len)));
            }
            Payload::Duplex(bytes) => {
                segments.push(segment(Some(bytes.as_slice()), Some(bytes.len())))
            }
        }
    }

    Ok(SpiBatch {
        cs,
        mode: spi_mode_bits(&config),
        segments,
    })
}

/// Collect the reply bytes of an executed SPI batch in wire order
pub fn decode_spi(batch: SpiBatch) -> Vec<Vec<u8>> {
    batch
        .segments
        .into_iter()
        .filter_map(|segment| {
            segment.rx.map(|mut rx| {
                swap_word_order(&mut rx, segment.bits_per_word);
                rx
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spi::SpiMode;
    use crate::transfer::I2cAddress;

    #[test]
    fn test_word_bytes() {
        assert_eq!(word_bytes(1), 1);
        assert_eq!(word_bytes(8), 1);
        assert_eq!(word_bytes(9), 2);
        assert_eq!(word_bytes(16), 2);
        assert_eq!(word_bytes(24), 4);
        assert_eq!(word_bytes(32), 4);
    }

    #[test]
    fn test_pack_16_bit_msb_first() {
        let bytes = pack_words(&[0x0ABC], 16, BitOrder::MsbFirst).unwrap();
        assert_eq!(bytes, [0x0A, 0xBC]);
        assert_eq!(unpack_words(&bytes, 16, BitOrder::MsbFirst), [0x0ABC]);
    }

    #[test]
    fn test_pack_16_bit_lsb_first() {
        // 0000_1010_1011_1100 reversed is 0011_1101_0101_0000
        let bytes = pack_words(&[0x0ABC], 16, BitOrder::LsbFirst).unwrap();
        assert_eq!(bytes, [0x3D, 0x50]);
        assert_eq!(unpack_words(&bytes, 16, BitOrder::LsbFirst), [0x0ABC]);
    }

    #[test]
    fn test_pack_narrow_words() {
        // 12-bit DAC words occupy two bytes each
        let bytes = pack_words(&[0xFFF, 0x001], 12, BitOrder::MsbFirst).unwrap();
        assert_eq!(bytes, [0x0F, 0xFF, 0x00, 0x01]);

        // LSB-first reverses within the 12-bit width, not the 16-bit container
        let bytes = pack_words(&[0x001], 12, BitOrder::LsbFirst).unwrap();
        assert_eq!(bytes, [0x08, 0x00]);

        let bytes = pack_words(&[0x01, 0x80], 8, BitOrder::LsbFirst).unwrap();
        assert_eq!(bytes, [0x80, 0x01]);
    }

    #[test]
    fn test_pack_rejects_wide_word() {
        assert_eq!(
            pack_words(&[0x100], 8, BitOrder::MsbFirst),
            Err(Error::InvalidWord { word: 0x100, bits: 8 })
        );
        assert!(pack_words(&[u32::MAX], 32, BitOrder::MsbFirst).is_ok());
    }

    #[test]
    fn test_unpack_masks_and_drops_partial() {
        assert_eq!(unpack_words(&[0xFF, 0xFF, 0x12], 12, BitOrder::MsbFirst), [0xFFF]);
    }

    #[test]
    fn test_swap_word_order_is_involution() {
        let mut buf = [0x0A, 0xBC, 0x12, 0x34];
        swap_word_order(&mut buf, 16);
        if cfg!(target_endian = "little") {
            assert_eq!(buf, [0xBC, 0x0A, 0x34, 0x12]);
        }
        swap_word_order(&mut buf, 16);
        assert_eq!(buf, [0x0A, 0xBC, 0x12, 0x34]);

        let mut bytes = [1, 2, 3];
        swap_word_order(&mut bytes, 8);
        assert_eq!(bytes, [1, 2, 3]);
    }

    #[test]
    fn test_encode_i2c_write_then_read() {
        let addr = I2cAddress::SevenBit(0x40);
        let batch = [TransferDescriptor::i2c_write_read(addr, vec![0xE3], 3)];
        let messages = encode_i2c(&batch).unwrap();

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].addr, 0x40);
        assert_eq!(messages[0].flags, I2cMsgFlags::empty());
        assert_eq!(messages[0].buf, [0xE3]);
        assert_eq!(messages[1].flags, I2cMsgFlags::READ);
        assert_eq!(messages[1].buf.len(), 3);
    }

    #[test]
    fn test_encode_i2c_ten_bit() {
        let addr = I2cAddress::new(0x2A5).unwrap();
        let messages = encode_i2c(&[TransferDescriptor::i2c_read(addr, 2)]).unwrap();
        assert_eq!(messages[0].addr, 0x2A5);
        assert_eq!(messages[0].flags, I2cMsgFlags::TEN_BIT | I2cMsgFlags::READ);
    }

    #[test]
    fn test_encode_i2c_limits() {
        let addr = I2cAddress::SevenBit(0x50);
        let too_long = [TransferDescriptor::i2c_write(addr, vec![0; I2C_MAX_MSG_LEN + 1])];
        assert_eq!(
            encode_i2c(&too_long),
            Err(Error::TransferTooLarge {
                len: I2C_MAX_MSG_LEN + 1,
                max: I2C_MAX_MSG_LEN
            })
        );

        let too_many: Vec<_> = (0..22)
            .map(|_| TransferDescriptor::i2c_write_read(addr, vec![0], 1))
            .collect();
        assert_eq!(
            encode_i2c(&too_many),
            Err(Error::TransferTooLarge { len: 44, max: 42 })
        );
    }

    #[test]
    fn test_encode_i2c_rejects_huge_read_before_allocating() {
        let addr = I2cAddress::SevenBit(0x50);
        assert_eq!(
            encode_i2c(&[TransferDescriptor::i2c_read(addr, usize::MAX)]),
            Err(Error::TransferTooLarge {
                len: usize::MAX,
                max: I2C_MAX_MSG_LEN
            })
        );
        assert_eq!(
            encode_i2c(&[TransferDescriptor::i2c_write_read(addr, vec![0x00], usize::MAX)]),
            Err(Error::TransferTooLarge {
                len: usize::MAX,
                max: I2C_MAX_MSG_LEN
            })
        );

        let at_limit = encode_i2c(&[TransferDescriptor::i2c_read(addr, I2C_MAX_MSG_LEN)]).unwrap();
        assert_eq!(at_limit[0].buf.len(), I2C_MAX_MSG_LEN);
    }

    #[test]
    fn test_decode_i2c_keeps_read_order() {
        let messages = vec![
            I2cMessage { addr: 0x50, flags: I2cMsgFlags::empty(), buf: vec![0x00] },
            I2cMessage { addr: 0x50, flags: I2cMsgFlags::READ, buf: vec![1, 2] },
            I2cMessage { addr: 0x51, flags: I2cMsgFlags::READ, buf: vec![3] },
        ];
        assert_eq!(decode_i2c(messages), vec![vec![1, 2], vec![3]]);
    }

    #[test]
    fn test_spi_mode_bits() {
        let config = SpiChipSelectConfig::default()
            .with_mode(SpiMode::Mode3)
            .with_cs_polarity(CsPolarity::ActiveHigh)
            .with_bit_order(BitOrder::LsbFirst);
        assert_eq!(
            spi_mode_bits(&config),
            SpiModeBits::CPHA | SpiModeBits::CPOL | SpiModeBits::CS_HIGH
        );

        let mut config = SpiChipSelectConfig::default().with_mode(SpiMode::Mode2);
        config.flags = SpiFlags::LOOPBACK | SpiFlags::THREE_WIRE;
        assert_eq!(
            spi_mode_bits(&config),
            SpiModeBits::CPOL | SpiModeBits::LOOP | SpiModeBits::THREE_WIRE
        );
    }

    #[test]
    fn test_encode_spi_write_then_read() {
        let config = SpiChipSelectConfig::default().with_speed(1_000_000);
        let batch = [TransferDescriptor::spi(
            1,
            config,
            Payload::WriteThenRead { write: vec![0x9F], read_len: 3 },
        )];
        let spi = encode_spi(&batch, 4096).unwrap();

        assert_eq!(spi.cs, 1);
        assert_eq!(spi.segments.len(), 2);
        assert_eq!(spi.segments[0].tx.as_deref(), Some(&[0x9F][..]));
        assert_eq!(spi.segments[0].rx, None);
        assert_eq!(spi.segments[1].tx, None);
        assert_eq!(spi.segments[1].len, 3);
        assert!(spi.segments.iter().all(|s| s.speed_hz == 1_000_000 && s.bits_per_word == 8));
        assert_eq!(spi.total_len(), 4);

        assert_eq!(decode_spi(spi), vec![vec![0, 0, 0]]);
    }

    #[test]
    fn test_encode_spi_rejects_mixed_targets() {
        let a = SpiChipSelectConfig::default();
        let b = a.with_bits_per_word(16);
        let batch = [
            TransferDescriptor::spi(0, a, Payload::Read(1)),
            TransferDescriptor::spi(0, b, Payload::Read(2)),
        ];
        assert_eq!(encode_spi(&batch, 4096), Err(Error::Transaction(errno::EINVAL)));

        let batch = [
            TransferDescriptor::spi(0, a, Payload::Read(1)),
            TransferDescriptor::spi(1, a, Payload::Read(1)),
        ];
        assert_eq!(encode_spi(&batch, 4096), Err(Error::Transaction(errno::EINVAL)));
    }

    #[test]
    fn test_encode_spi_limit() {
        let batch = [TransferDescriptor::spi(
            0,
            SpiChipSelectConfig::default(),
            Payload::Duplex(vec![0; 5000]),
        )];
        assert_eq!(
            encode_spi(&batch, 4096),
            Err(Error::TransferTooLarge { len: 5000, max: 4096 })
        );
    }

    #[test]
    fn test_encode_spi_rejects_huge_read_before_allocating() {
        let config = SpiChipSelectConfig::default();
        let batch = [TransferDescriptor::spi(0, config, Payload::Read(usize::MAX))];
        assert_eq!(
            encode_spi(&batch, 4096),
            Err(Error::TransferTooLarge { len: usize::MAX, max: 4096 })
        );

        // the sum saturates rather than wrapping past the limit
        let batch = [
            TransferDescriptor::spi(0, config, Payload::Read(usize::MAX)),
            TransferDescriptor::spi(
                0,
                config,
                Payload::WriteThenRead { write: vec![0x03], read_len: usize::MAX },
            ),
        ];
        assert_eq!(
            encode_spi(&batch, usize::MAX - 1),
            Err(Error::TransferTooLarge { len: usize::MAX, max: usize::MAX - 1 })
        );
    }
}
