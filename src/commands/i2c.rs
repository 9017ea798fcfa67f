//! I2C command implementations

use super::format_bytes;
use crate::cli::I2cTarget;
use serbus_linux::{i2c_bus_at, LinuxI2c, NodeResolver};

type CmdResult = Result<(), Box<dyn std::error::Error>>;

fn open(resolver: &NodeResolver, target: &I2cTarget) -> serbus_core::Result<LinuxI2c> {
    let mut dev = i2c_bus_at(resolver, target.bus);
    dev.open()?;
    Ok(dev)
}

/// Write `data` to the target
pub fn cmd_write(resolver: &NodeResolver, target: &I2cTarget, data: &[u8]) -> CmdResult {
    let mut dev = open(resolver, target)?;
    dev.write(target.address, data)?;
    log::info!(
        "Wrote {} byte(s) to 0x{:02X} on {}",
        data.len(),
        target.address,
        dev.path()
    );
    Ok(())
}

/// Read `count` bytes from the target
pub fn cmd_read(resolver: &NodeResolver, target: &I2cTarget, count: usize) -> CmdResult {
    let mut dev = open(resolver, target)?;
    let data = dev.read(target.address, count)?;
    println!("{}", format_bytes(&data));
    Ok(())
}

/// Send `command` and read `count` bytes in one transaction
pub fn cmd_transaction(
    resolver: &NodeResolver,
    target: &I2cTarget,
    command: u8,
    count: usize,
) -> CmdResult {
    let mut dev = open(resolver, target)?;
    let data = dev.read_transaction(target.address, command, count)?;
    println!("{}", format_bytes(&data));
    Ok(())
}

/// Write `data` and read `count` bytes in one transaction
pub fn cmd_write_read(
    resolver: &NodeResolver,
    target: &I2cTarget,
    data: &[u8],
    count: usize,
) -> CmdResult {
    let mut dev = open(resolver, target)?;
    let reply = dev.write_read(target.address, data, count)?;
    println!("{}", format_bytes(&reply));
    Ok(())
}
