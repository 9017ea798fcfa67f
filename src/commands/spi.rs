//! SPI command implementations

use super::format_words;
use crate::cli::SpiArgs;
use serbus_core::{SpiDevice, Transport};
use serbus_linux::{spi_bus_at, LinuxSpi, NodeResolver};

type CmdResult = Result<(), Box<dyn std::error::Error>>;

/// Apply the chip-select settings given on the command line
///
/// Settings that were not given keep their defaults.
pub(crate) fn configure<T: Transport>(
    dev: &mut SpiDevice<T>,
    args: &SpiArgs,
) -> serbus_core::Result<()> {
    let cs = args.cs;
    if let Some(hz) = args.speed {
        dev.set_max_frequency(cs, hz)?;
    }
    if let Some(bits) = args.bits {
        dev.set_bits_per_word(cs, bits)?;
    }
    if let Some(mode) = args.mode {
        dev.set_clock_mode(cs, mode)?;
    }
    if args.cs_high {
        dev.set_cs_active_high(cs)?;
    }
    if args.lsb_first {
        dev.set_lsb_first(cs)?;
    }
    if args.no_cs {
        dev.set_cs_enabled(cs, false)?;
    }
    if args.three_wire {
        dev.set_three_wire(cs, true)?;
    }
    if args.loopback {
        dev.set_loopback(cs, true)?;
    }

    let config = dev.config(cs);
    log::debug!(
        "cs {}: {} Hz, {} bits, {}, {:?}, {:?}, flags {:?}",
        cs,
        config.max_speed_hz,
        config.bits_per_word,
        config.mode,
        config.cs_polarity,
        config.bit_order,
        config.flags
    );
    Ok(())
}

fn open(resolver: &NodeResolver, args: &SpiArgs) -> serbus_core::Result<LinuxSpi> {
    let mut dev = spi_bus_at(resolver, args.bus);
    dev.open()?;
    configure(&mut dev, args)?;
    Ok(dev)
}

/// Write `words` to the chip-select
pub fn cmd_write(resolver: &NodeResolver, args: &SpiArgs, words: &[u32]) -> CmdResult {
    let mut dev = open(resolver, args)?;
    dev.write(args.cs, words)?;
    log::info!("Wrote {} word(s) to cs {} on {}", words.len(), args.cs, dev.path());
    Ok(())
}

/// Read `count` words from the chip-select
pub fn cmd_read(resolver: &NodeResolver, args: &SpiArgs, count: usize) -> CmdResult {
    let mut dev = open(resolver, args)?;
    let words = dev.read(args.cs, count)?;
    println!("{}", format_words(&words, dev.config(args.cs).bits_per_word));
    Ok(())
}

/// Full-duplex transfer of `words` on the chip-select
pub fn cmd_transfer(resolver: &NodeResolver, args: &SpiArgs, words: &[u32]) -> CmdResult {
    let mut dev = open(resolver, args)?;
    let reply = dev.transfer(args.cs, words)?;
    println!("{}", format_words(&reply, dev.config(args.cs).bits_per_word));
    Ok(())
}
