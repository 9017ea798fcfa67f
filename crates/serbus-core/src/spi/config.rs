//! Per-chip-select SPI configuration

use alloc::collections::BTreeMap;
use bitflags::bitflags;
use core::fmt;

use crate::error::{ConfigError, Result};
use crate::transfer::ChipSelect;

/// Default clock rate for a chip-select that was never configured (100 kHz)
///
/// This is the lowest rate every common spidev controller can generate.
pub const DEFAULT_SPEED_HZ: u32 = 100_000;

/// Default word width
pub const DEFAULT_BITS_PER_WORD: u8 = 8;

/// Widest word the kernel interface accepts
pub const MAX_BITS_PER_WORD: u8 = 32;

/// SPI clock mode (CPOL/CPHA combination)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SpiMode {
    /// CPOL=0, CPHA=0
    #[default]
    Mode0,
    /// CPOL=0, CPHA=1
    Mode1,
    /// CPOL=1, CPHA=0
    Mode2,
    /// CPOL=1, CPHA=1
    Mode3,
}

impl SpiMode {
    /// Convert a numeric mode (0-3)
    pub fn from_u8(mode: u8) -> Result<Self> {
        match mode {
            0 => Ok(Self::Mode0),
            1 => Ok(Self::Mode1),
            2 => Ok(Self::Mode2),
            3 => Ok(Self::Mode3),
            _ => Err(ConfigError::InvalidClockMode(mode).into()),
        }
    }

    /// Numeric mode (0-3)
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Clock polarity
    pub fn cpol(self) -> u8 {
        (self.as_u8() >> 1) & 1
    }

    /// Clock phase
    pub fn cpha(self) -> u8 {
        self.as_u8() & 1
    }
}

impl fmt::Display for SpiMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

/// Active level of the chip-select line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CsPolarity {
    /// Selected when driven low
    #[default]
    ActiveLow,
    /// Selected when driven high
    ActiveHigh,
}

/// Bit order within each word
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BitOrder {
    /// Most significant bit first
    #[default]
    MsbFirst,
    /// Least significant bit first
    LsbFirst,
}

bitflags! {
    /// Less common spidev mode flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SpiFlags: u8 {
        /// Loop MOSI back to MISO inside the controller
        const LOOPBACK   = 1 << 0;
        /// Shared MOSI/MISO line (half duplex)
        const THREE_WIRE = 1 << 1;
        /// Do not drive chip-select at all
        const NO_CS      = 1 << 2;
    }
}

/// Electrical configuration of one chip-select
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpiChipSelectConfig {
    /// Maximum clock frequency in Hz
    pub max_speed_hz: u32,
    /// Bits per word (1-32)
    pub bits_per_word: u8,
    /// Clock polarity/phase
    pub mode: SpiMode,
    /// Chip-select active level
    pub cs_polarity: CsPolarity,
    /// Bit order within each word
    pub bit_order: BitOrder,
    /// Extra mode flags
    pub flags: SpiFlags,
}

impl Default for SpiChipSelectConfig {
    fn default() -> Self {
        Self {
            max_speed_hz: DEFAULT_SPEED_HZ,
            bits_per_word: DEFAULT_BITS_PER_WORD,
            mode: SpiMode::Mode0,
            cs_polarity: CsPolarity::ActiveLow,
            bit_order: BitOrder::MsbFirst,
            flags: SpiFlags::empty(),
        }
    }
}

impl SpiChipSelectConfig {
    /// Set the maximum clock frequency
    pub fn with_speed(mut self, hz: u32) -> Self {
        self.max_speed_hz = hz;
        self
    }

    /// Set the word width
    pub fn with_bits_per_word(mut self, bits: u8) -> Self {
        self.bits_per_word = bits;
        self
    }

    /// Set the clock mode
    pub fn with_mode(mut self, mode: SpiMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the chip-select polarity
    pub fn with_cs_polarity(mut self, polarity: CsPolarity) -> Self {
        self.cs_polarity = polarity;
        self
    }

    /// Set the bit order
    pub fn with_bit_order(mut self, order: BitOrder) -> Self {
        self.bit_order = order;
        self
    }

    /// Check every field is in range
    pub fn validate(&self) -> Result<()> {
        validate_speed(self.max_speed_hz)?;
        validate_bits(self.bits_per_word)?;
        Ok(())
    }
}

fn validate_speed(hz: u32) -> Result<()> {
    if hz == 0 {
        return Err(ConfigError::ZeroFrequency.into());
    }
    Ok(())
}

fn validate_bits(bits: u8) -> Result<()> {
    if bits == 0 || bits > MAX_BITS_PER_WORD {
        return Err(ConfigError::InvalidBitsPerWord(bits).into());
    }
    Ok(())
}

/// Chip-select index to configuration mapping
///
/// Entries are created lazily by the first setter touching a chip-select and
/// are only ever changed by later setters. Lookups of chip-selects that were
/// never configured yield the defaults.
#[derive(Debug, Clone, Default)]
pub struct ConfigStore {
    configs: BTreeMap<ChipSelect, SpiChipSelectConfig>,
}

impl ConfigStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration for `cs` (defaults if never configured)
    pub fn get(&self, cs: ChipSelect) -> SpiChipSelectConfig {
        self.configs.get(&cs).copied().unwrap_or_default()
    }

    /// Whether a setter has touched `cs`
    pub fn is_configured(&self, cs: ChipSelect) -> bool {
        self.configs.contains_key(&cs)
    }

    /// Chip-selects with a stored configuration, in ascending order
    pub fn chip_selects(&self) -> impl Iterator<Item = ChipSelect> + '_ {
        self.configs.keys().copied()
    }

    fn entry(&mut self, cs: ChipSelect) -> &mut SpiChipSelectConfig {
        self.configs.entry(cs).or_default()
    }

    /// Set the maximum clock frequency for `cs`
    pub fn set_max_frequency(&mut self, cs: ChipSelect, hz: u32) -> Result<()> {
        validate_speed(hz)?;
        self.entry(cs).max_speed_hz = hz;
        Ok(())
    }

    /// Set the word width for `cs`
    pub fn set_bits_per_word(&mut self, cs: ChipSelect, bits: u8) -> Result<()> {
        validate_bits(bits)?;
        self.entry(cs).bits_per_word = bits;
        Ok(())
    }

    /// Set the clock mode (0-3) for `cs`
    pub fn set_clock_mode(&mut self, cs: ChipSelect, mode: u8) -> Result<()> {
        let mode = SpiMode::from_u8(mode)?;
        self.entry(cs).mode = mode;
        Ok(())
    }

    /// Set the chip-select polarity for `cs`
    pub fn set_cs_polarity(&mut self, cs: ChipSelect, polarity: CsPolarity) {
        self.entry(cs).cs_polarity = polarity;
    }

    /// Set the bit order for `cs`
    pub fn set_bit_order(&mut self, cs: ChipSelect, order: BitOrder) {
        self.entry(cs).bit_order = order;
    }

    /// Set or clear extra mode flags for `cs`
    pub fn set_flag(&mut self, cs: ChipSelect, flag: SpiFlags, enabled: bool) {
        self.entry(cs).flags.set(flag, enabled);
    }
}
