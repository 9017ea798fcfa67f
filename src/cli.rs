//! CLI argument parsing

use clap::{Parser, Subcommand};
use serbus_linux::DEV_ROOT_ENV;
use std::path::PathBuf;

/// Parse a string as a hex or decimal u32
fn parse_hex_u32(s: &str) -> Result<u32, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u32>().map_err(|e| format!("Invalid number: {}", e))
    }
}

/// Parse a string as a hex or decimal I2C address
fn parse_address(s: &str) -> Result<u16, String> {
    let value = parse_hex_u32(s)?;
    u16::try_from(value).map_err(|_| format!("Address out of range: {}", s))
}

/// Parse a string as a hex or decimal byte
fn parse_byte(s: &str) -> Result<u8, String> {
    let value = parse_hex_u32(s)?;
    u8::try_from(value).map_err(|_| format!("Byte out of range: {}", s))
}

#[derive(Parser)]
#[command(name = "serbus")]
#[command(author, version, about = "I2C and SPI bus access from userspace", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Directory holding the i2c-N and spidevB.C nodes
    #[arg(long, global = true, env = DEV_ROOT_ENV)]
    pub dev_root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List I2C buses and spidev nodes
    List,

    /// I2C operations
    #[command(subcommand)]
    I2c(I2cCommands),

    /// SPI operations
    #[command(subcommand)]
    Spi(SpiCommands),
}

/// Bus and slave address shared by the I2C commands
#[derive(clap::Args, Debug, Clone)]
pub struct I2cTarget {
    /// I2C bus number (/dev/i2c-N)
    #[arg(short, long)]
    pub bus: u32,

    /// Slave address (7-bit, or 10-bit above 0x7F)
    #[arg(short, long, value_parser = parse_address)]
    pub address: u16,
}

/// I2C subcommands
#[derive(Subcommand)]
pub enum I2cCommands {
    /// Write bytes to a peripheral
    Write {
        #[command(flatten)]
        target: I2cTarget,

        /// Bytes to write (hex or decimal)
        #[arg(value_parser = parse_byte, required = true)]
        data: Vec<u8>,
    },

    /// Read bytes from a peripheral
    Read {
        #[command(flatten)]
        target: I2cTarget,

        /// Number of bytes to read
        #[arg(short = 'n', long)]
        count: usize,
    },

    /// Send a one-byte command and read the reply without releasing the bus
    Transaction {
        #[command(flatten)]
        target: I2cTarget,

        /// Command byte
        #[arg(short, long, value_parser = parse_byte)]
        command: u8,

        /// Number of bytes to read
        #[arg(short = 'n', long)]
        count: usize,
    },

    /// Write bytes then read the reply without releasing the bus
    WriteRead {
        #[command(flatten)]
        target: I2cTarget,

        /// Number of bytes to read
        #[arg(short = 'n', long)]
        count: usize,

        /// Bytes to write (hex or decimal)
        #[arg(value_parser = parse_byte, required = true)]
        data: Vec<u8>,
    },
}

/// Bus, chip-select and chip-select configuration shared by the SPI commands
#[derive(clap::Args, Debug, Clone, Default)]
pub struct SpiArgs {
    /// SPI bus number (/dev/spidevB.*)
    #[arg(short, long)]
    pub bus: u32,

    /// Chip-select
    #[arg(short, long, default_value_t = 0)]
    pub cs: u8,

    /// Maximum clock frequency in Hz
    #[arg(long, value_parser = parse_hex_u32)]
    pub speed: Option<u32>,

    /// Word width in bits (1-32)
    #[arg(long)]
    pub bits: Option<u8>,

    /// Clock mode (0-3)
    #[arg(short, long)]
    pub mode: Option<u8>,

    /// Chip-select is active high
    #[arg(long)]
    pub cs_high: bool,

    /// Shift words least significant bit first
    #[arg(long)]
    pub lsb_first: bool,

    /// Do not drive the chip-select line
    #[arg(long)]
    pub no_cs: bool,

    /// Shared MOSI/MISO line
    #[arg(long)]
    pub three_wire: bool,

    /// Controller loopback
    #[arg(long)]
    pub loopback: bool,
}

/// SPI subcommands
#[derive(Subcommand)]
pub enum SpiCommands {
    /// Write words, discarding what is shifted in
    Write {
        #[command(flatten)]
        spi: SpiArgs,

        /// Words to write (hex or decimal)
        #[arg(value_parser = parse_hex_u32, required = true)]
        words: Vec<u32>,
    },

    /// Read words, shifting out zeros
    Read {
        #[command(flatten)]
        spi: SpiArgs,

        /// Number of words to read
        #[arg(short = 'n', long)]
        count: usize,
    },

    /// Full-duplex transfer
    Transfer {
        #[command(flatten)]
        spi: SpiArgs,

        /// Words to shift out (hex or decimal)
        #[arg(value_parser = parse_hex_u32, required = true)]
        words: Vec<u32>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_numbers() {
        assert_eq!(parse_hex_u32("0x1F"), Ok(0x1F));
        assert_eq!(parse_hex_u32("31"), Ok(31));
        assert!(parse_hex_u32("0xZZ").is_err());
        assert_eq!(parse_address("0x3FF"), Ok(0x3FF));
        assert!(parse_address("0x10000").is_err());
        assert_eq!(parse_byte("0XE3"), Ok(0xE3));
        assert!(parse_byte("256").is_err());
    }

    #[test]
    fn test_i2c_transaction_args() {
        let cli = Cli::try_parse_from([
            "serbus", "i2c", "transaction", "-b", "1", "-a", "0x40", "-c", "0xE3", "-n", "3",
        ])
        .unwrap();

        match cli.command {
            Commands::I2c(I2cCommands::Transaction {
                target,
                command,
                count,
            }) => {
                assert_eq!(target.bus, 1);
                assert_eq!(target.address, 0x40);
                assert_eq!(command, 0xE3);
                assert_eq!(count, 3);
            }
            _ => panic!("wrong subcommand"),
        }
    }

    #[test]
    fn test_spi_args() {
        let cli = Cli::try_parse_from([
            "serbus", "spi", "transfer", "-b", "0", "-c", "1", "--speed", "1000000", "--bits",
            "12", "--lsb-first", "0xABC", "1",
        ])
        .unwrap();

        match cli.command {
            Commands::Spi(SpiCommands::Transfer { spi, words }) => {
                assert_eq!(spi.cs, 1);
                assert_eq!(spi.speed, Some(1_000_000));
                assert_eq!(spi.bits, Some(12));
                assert!(spi.lsb_first);
                assert!(!spi.cs_high);
                assert_eq!(words, [0xABC, 1]);
            }
            _ => panic!("wrong subcommand"),
        }
    }

    #[test]
    fn test_write_requires_data() {
        assert!(Cli::try_parse_from(["serbus", "i2c", "write", "-b", "1", "-a", "0x50"]).is_err());
    }
}
