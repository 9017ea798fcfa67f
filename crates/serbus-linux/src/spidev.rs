//! Linux spidev transport
//!
//! One SPI bus is served by one `/dev/spidevB.C` node per chip-select. The
//! transport opens all of them together and routes each batch to the node of
//! its chip-select. Before every batch the chip-select's mode bits are
//! written with `SPI_IOC_WR_MODE`; clock rate and word width travel in each
//! `spi_ioc_transfer`, so nothing is left for the kernel to remember between
//! calls.

use crate::error::{LinuxBusError, Result};
use crate::node::{open_node, spidev_bufsiz, LockedNode, NodeResolver};

use serbus_core::codec::{self, SpiBatch};
use serbus_core::error::{Error as CoreError, OpenFailure, Result as CoreResult};
use serbus_core::{ChipSelect, Protocol, Transport, TransferDescriptor};

use std::collections::BTreeMap;
use std::fs::File;
use std::os::unix::io::AsRawFd;

mod ioctl {
    use super::SpiIocTransfer;
    use nix::{ioctl_write_buf, ioctl_write_ptr};

    pub const SPI_IOC_MAGIC: u8 = b'k';

    ioctl_write_ptr!(spi_ioc_wr_mode, SPI_IOC_MAGIC, 1, u8);
    // SPI_IOC_MESSAGE(n): the size field carries n transfers
    ioctl_write_buf!(spi_ioc_message, SPI_IOC_MAGIC, 0, SpiIocTransfer);
}

/// Kernel `struct spi_ioc_transfer`
///
/// Buffers are user addresses widened to 64 bits. Everything after
/// `bits_per_word` stays zero, which keeps chip-select asserted from one
/// segment to the next and uses single-line transfers in both directions.
#[repr(C)]
#[derive(Debug, Default, Clone)]
struct SpiIocTransfer {
    tx_buf: u64,
    rx_buf: u64,
    len: u32,
    speed_hz: u32,
    delay_usecs: u16,
    bits_per_word: u8,
    cs_change: u8,
    tx_nbits: u8,
    rx_nbits: u8,
    word_delay_usecs: u8,
    _pad: u8,
}

/// Transfers that fit the 14-bit size field of `SPI_IOC_MESSAGE`
const MAX_TRANSFERS: usize = ((1 << 14) - 1) / std::mem::size_of::<SpiIocTransfer>();

/// Transport for all chip-selects of one SPI bus
#[derive(Debug)]
pub struct SpiDev {
    bus: u32,
    path: String,
    resolver: NodeResolver,
    nodes: BTreeMap<ChipSelect, LockedNode>,
    max_transfer_len: usize,
}

impl SpiDev {
    /// Transport for SPI bus `bus`; nothing is opened yet
    pub fn new(resolver: &NodeResolver, bus: u32) -> Self {
        Self {
            bus,
            path: resolver
                .root()
                .join(format!("spidev{}.*", bus))
                .display()
                .to_string(),
            resolver: resolver.clone(),
            nodes: BTreeMap::new(),
            max_transfer_len: 0,
        }
    }

    /// Bus index
    pub fn bus(&self) -> u32 {
        self.bus
    }

    /// Chip-selects with an open node (empty while closed)
    pub fn chip_selects(&self) -> Vec<ChipSelect> {
        self.nodes.keys().copied().collect()
    }

    /// Largest number of bytes one batch may move
    pub fn max_transfer_len(&self) -> usize {
        self.max_transfer_len
    }

    fn open_nodes(&mut self) -> Result<()> {
        let chip_selects = self.resolver.spidev_chip_selects(self.bus);
        if chip_selects.is_empty() {
            return Err(LinuxBusError::NoNodes(self.path.clone()));
        }

        let mut nodes = BTreeMap::new();
        for cs in chip_selects {
            let path = self.resolver.spidev_path(self.bus, cs);
            // Nodes opened so far are released when `nodes` drops on error
            nodes.insert(cs, open_node(&path)?);
        }

        self.max_transfer_len = spidev_bufsiz();
        log::info!(
            "spidev: Opened bus {} (chip-selects {:?}, max transfer {} bytes)",
            self.bus,
            nodes.keys().collect::<Vec<_>>(),
            self.max_transfer_len
        );
        self.nodes = nodes;
        Ok(())
    }

    /// Program the mode bits and run the batch with one SPI_IOC_MESSAGE call
    fn spi_transfer(&self, file: &File, batch: &mut SpiBatch) -> Result<()> {
        let fd = file.as_raw_fd();
        let node = self.resolver.spidev_path(self.bus, batch.cs);

        let mode = batch.mode.bits();
        unsafe { ioctl::spi_ioc_wr_mode(fd, &mode) }.map_err(|e| LinuxBusError::Ioctl {
            path: node.display().to_string(),
            request: "SPI_IOC_WR_MODE",
            source: e,
        })?;

        let transfers: Vec<SpiIocTransfer> = batch
            .segments
            .iter_mut()
            .map(|segment| SpiIocTransfer {
                tx_buf: segment.tx.as_ref().map_or(0, |tx| tx.as_ptr() as u64),
                rx_buf: segment
                    .rx
                    .as_mut()
                    .map_or(0, |rx| rx.as_mut_ptr() as u64),
                len: segment.len as u32,
                speed_hz: segment.speed_hz,
                bits_per_word: segment.bits_per_word,
                ..Default::default()
            })
            .collect();

        unsafe { ioctl::spi_ioc_message(fd, &transfers) }.map_err(|e| LinuxBusError::Ioctl {
            path: node.display().to_string(),
            request: "SPI_IOC_MESSAGE",
            source: e,
        })?;
        Ok(())
    }
}

impl Transport for SpiDev {
    fn protocol(&self) -> Protocol {
        Protocol::Spi
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn open(&mut self) -> CoreResult<()> {
        self.open_nodes().map_err(|e| {
            log::debug!("spidev: {}", e);
            CoreError::from(e)
        })
    }

    fn close(&mut self) {
        if !self.nodes.is_empty() {
            self.nodes.clear();
            log::debug!("spidev: Closed bus {}", self.bus);
        }
    }

    fn submit(&mut self, batch: &[TransferDescriptor]) -> CoreResult<Vec<Vec<u8>>> {
        if self.nodes.is_empty() {
            return Err(CoreError::ClosedHandle);
        }

        let mut spi = codec::encode_spi(batch, self.max_transfer_len)?;
        if spi.segments.len() > MAX_TRANSFERS {
            return Err(CoreError::TransferTooLarge {
                len: spi.segments.len(),
                max: MAX_TRANSFERS,
            });
        }
        let file = self.nodes.get(&spi.cs).ok_or_else(|| {
            log::debug!("spidev: No node for chip-select {} on bus {}", spi.cs, self.bus);
            CoreError::DeviceOpen(OpenFailure::NotFound)
        })?;

        log::trace!(
            "spidev: cs {} mode {:?}, {} segment(s), {} byte(s)",
            spi.cs,
            spi.mode,
            spi.segments.len(),
            spi.total_len()
        );

        self.spi_transfer(file, &mut spi).map_err(|e| {
            log::debug!("spidev: {}", e);
            CoreError::from(e)
        })?;

        Ok(codec::decode_spi(spi))
    }
}
