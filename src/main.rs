//! serbus - I2C and SPI bus access from userspace
//!
//! One-shot access to I2C adapters (`/dev/i2c-N`) and SPI controllers
//! (`/dev/spidevB.C`) through the `serbus-core` bus devices.
//!
//! # Architecture
//!
//! - `serbus-core` holds the bus handle, transfer descriptors, the codec and
//!   the `I2cDevice`/`SpiDevice` wrappers
//! - `serbus-linux` implements the transports on i2c-dev and spidev
//! - `serbus-dummy` emulates peripherals in memory for tests

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands, I2cCommands, SpiCommands};
use serbus_linux::NodeResolver;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    let resolver = cli
        .dev_root
        .map(NodeResolver::new)
        .unwrap_or_default();
    log::debug!("Device directory: {}", resolver.root().display());

    let result = match cli.command {
        Commands::List => {
            commands::list_buses(&resolver);
            Ok(())
        }
        Commands::I2c(subcmd) => match subcmd {
            I2cCommands::Write { target, data } => {
                commands::i2c::cmd_write(&resolver, &target, &data)
            }
            I2cCommands::Read { target, count } => {
                commands::i2c::cmd_read(&resolver, &target, count)
            }
            I2cCommands::Transaction {
                target,
                command,
                count,
            } => commands::i2c::cmd_transaction(&resolver, &target, command, count),
            I2cCommands::WriteRead {
                target,
                count,
                data,
            } => commands::i2c::cmd_write_read(&resolver, &target, &data, count),
        },
        Commands::Spi(subcmd) => match subcmd {
            SpiCommands::Write { spi, words } => commands::spi::cmd_write(&resolver, &spi, &words),
            SpiCommands::Read { spi, count } => commands::spi::cmd_read(&resolver, &spi, count),
            SpiCommands::Transfer { spi, words } => {
                commands::spi::cmd_transfer(&resolver, &spi, &words)
            }
        },
    };

    result
}
