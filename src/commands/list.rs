//! List command implementation

use serbus_linux::NodeResolver;

/// List all I2C buses and spidev nodes under the device directory
pub fn list_buses(resolver: &NodeResolver) {
    let i2c = resolver.list_i2c();
    let spi = resolver.list_spidev();

    println!("Buses under {}:", resolver.root().display());
    println!();

    if i2c.is_empty() && spi.is_empty() {
        println!("  (none)");
        return;
    }

    for bus in i2c {
        println!("  i2c   {:<4} {}", bus, resolver.i2c_path(bus).display());
    }
    for (bus, cs) in spi {
        println!(
            "  spi   {:<4} cs {:<3} {}",
            bus,
            cs,
            resolver.spidev_path(bus, cs).display()
        );
    }
}
