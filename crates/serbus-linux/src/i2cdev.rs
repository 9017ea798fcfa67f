//! Linux i2c-dev transport
//!
//! Every batch is sent with a single `I2C_RDWR` ioctl, so all of its
//! messages run back to back with repeated starts and no other transaction
//! can get onto the bus in between.

use crate::error::{LinuxBusError, Result};
use crate::node::{open_node, LockedNode, NodeResolver};

use bitflags::bitflags;
use serbus_core::codec::{self, I2cMessage};
use serbus_core::error::{Error as CoreError, Result as CoreResult};
use serbus_core::{Protocol, Target, Transport, TransferDescriptor};

use std::fs::File;
use std::os::unix::io::AsRawFd;
use std::path::PathBuf;

/// Linux i2c-dev ioctl constants
mod ioctl {
    use nix::{ioctl_read_bad, ioctl_readwrite_bad};

    /// Get the adapter functionality mask
    const I2C_FUNCS: u16 = 0x0705;
    /// Combined read/write transfer (one STOP only)
    const I2C_RDWR: u16 = 0x0707;

    /// Kernel `struct i2c_msg`
    #[repr(C)]
    #[derive(Debug)]
    pub struct I2cMsg {
        pub addr: u16,
        pub flags: u16,
        pub len: u16,
        pub buf: *mut u8,
    }

    /// Kernel `struct i2c_rdwr_ioctl_data`
    #[repr(C)]
    #[derive(Debug)]
    pub struct I2cRdwrIoctlData {
        pub msgs: *mut I2cMsg,
        pub nmsgs: u32,
    }

    ioctl_read_bad!(i2c_funcs, I2C_FUNCS, libc::c_ulong);
    ioctl_readwrite_bad!(i2c_rdwr, I2C_RDWR, I2cRdwrIoctlData);
}

bitflags! {
    /// Adapter functionality reported by `I2C_FUNCS`
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct I2cFuncs: u64 {
        /// Plain i2c-level commands (`I2C_RDWR`)
        const I2C = 0x0000_0001;
        /// 10-bit slave addresses
        const TEN_BIT_ADDR = 0x0000_0002;
        /// `I2C_M_IGNORE_NAK` and friends
        const PROTOCOL_MANGLING = 0x0000_0004;
        /// SMBus packet error checking
        const SMBUS_PEC = 0x0000_0008;
        /// `I2C_M_NOSTART`
        const NOSTART = 0x0000_0010;
        /// Slave mode
        const SLAVE = 0x0000_0020;
    }
}

/// Transport for one `/dev/i2c-N` adapter
#[derive(Debug)]
pub struct I2cDev {
    bus: u32,
    path: String,
    node: PathBuf,
    file: Option<LockedNode>,
    funcs: I2cFuncs,
}

impl I2cDev {
    /// Transport for I2C bus `bus`; nothing is opened yet
    pub fn new(resolver: &NodeResolver, bus: u32) -> Self {
        let node = resolver.i2c_path(bus);
        Self {
            bus,
            path: node.display().to_string(),
            node,
            file: None,
            funcs: I2cFuncs::empty(),
        }
    }

    /// Bus index
    pub fn bus(&self) -> u32 {
        self.bus
    }

    /// Functionality reported by the adapter (empty while closed)
    pub fn funcs(&self) -> I2cFuncs {
        self.funcs
    }

    fn open_adapter(&mut self) -> Result<()> {
        let file = open_node(&self.node)?;

        let mut raw: libc::c_ulong = 0;
        unsafe { ioctl::i2c_funcs(file.as_raw_fd(), &mut raw) }.map_err(|e| {
            LinuxBusError::FuncsQueryFailed {
                path: self.path.clone(),
                source: e,
            }
        })?;
        let funcs = I2cFuncs::from_bits_truncate(raw as u64);
        if !funcs.contains(I2cFuncs::I2C) {
            return Err(LinuxBusError::NotI2c(self.path.clone()));
        }

        log::info!(
            "i2c-dev: Opened {} (10-bit addressing {})",
            self.path,
            if funcs.contains(I2cFuncs::TEN_BIT_ADDR) {
                "supported"
            } else {
                "not supported"
            }
        );

        self.funcs = funcs;
        self.file = Some(file);
        Ok(())
    }

    /// Run `messages` with one `I2C_RDWR` call
    fn rdwr(&self, file: &File, messages: &mut [I2cMessage]) -> Result<()> {
        let mut msgs: Vec<ioctl::I2cMsg> = messages
            .iter_mut()
            .map(|m| ioctl::I2cMsg {
                addr: m.addr,
                flags: m.flags.bits(),
                len: m.buf.len() as u16,
                buf: m.buf.as_mut_ptr(),
            })
            .collect();
        let mut data = ioctl::I2cRdwrIoctlData {
            msgs: msgs.as_mut_ptr(),
            nmsgs: msgs.len() as u32,
        };

        let done = unsafe { ioctl::i2c_rdwr(file.as_raw_fd(), &mut data) }.map_err(|e| {
            LinuxBusError::Ioctl {
                path: self.path.clone(),
                request: "I2C_RDWR",
                source: e,
            }
        })?;

        if done as usize != msgs.len() {
            return Err(LinuxBusError::ShortTransfer {
                done: done as usize,
                expected: msgs.len(),
            });
        }
        Ok(())
    }
}

impl Transport for I2cDev {
    fn protocol(&self) -> Protocol {
        Protocol::I2c
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn open(&mut self) -> CoreResult<()> {
        self.open_adapter().map_err(|e| {
            log::debug!("i2c-dev: {}", e);
            CoreError::from(e)
        })
    }

    fn close(&mut self) {
        if self.file.take().is_some() {
            log::debug!("i2c-dev: Closed {}", self.path);
        }
        self.funcs = I2cFuncs::empty();
    }

    fn submit(&mut self, batch: &[TransferDescriptor]) -> CoreResult<Vec<Vec<u8>>> {
        let file = self.file.as_ref().ok_or(CoreError::ClosedHandle)?;

        if !self.funcs.contains(I2cFuncs::TEN_BIT_ADDR) {
            let ten_bit = batch.iter().find_map(|d| match d.target {
                Target::I2c(addr) if addr.is_ten_bit() => Some(addr.raw()),
                _ => None,
            });
            if let Some(addr) = ten_bit {
                return Err(CoreError::InvalidAddress(addr));
            }
        }

        let mut messages = codec::encode_i2c(batch)?;
        log::trace!(
            "i2c-dev: {} message(s) on {}: {:?}",
            messages.len(),
            self.path,
            messages
                .iter()
                .map(|m| (m.addr, m.is_read(), m.buf.len()))
                .collect::<Vec<_>>()
        );

        self.rdwr(file, &mut messages).map_err(|e| {
            log::debug!("i2c-dev: {}", e);
            CoreError::from(e)
        })?;

        Ok(codec::decode_i2c(messages))
    }
}
