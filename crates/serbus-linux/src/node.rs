//! Device node resolution
//!
//! Maps bus indices to character device paths and opens them with an
//! exclusive advisory lock:
//!
//! - I2C bus `n` is `<root>/i2c-<n>`
//! - SPI bus `b`, chip-select `c` is `<root>/spidev<b>.<c>`

use crate::error::{LinuxBusError, Result};

use nix::fcntl::{Flock, FlockArg};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Default device directory
pub const DEFAULT_DEV_ROOT: &str = "/dev";

/// Environment variable overriding the device directory
pub const DEV_ROOT_ENV: &str = "SERBUS_DEV_ROOT";

/// Path to kernel spidev buffer size parameter
const BUF_SIZE_SYSFS: &str = "/sys/module/spidev/parameters/bufsiz";

/// Resolves bus indices to device node paths
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeResolver {
    root: PathBuf,
}

impl Default for NodeResolver {
    fn default() -> Self {
        Self::new(DEFAULT_DEV_ROOT)
    }
}

impl NodeResolver {
    /// Resolve nodes under `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve nodes under `$SERBUS_DEV_ROOT`, or `/dev` if unset
    pub fn from_env() -> Self {
        match std::env::var_os(DEV_ROOT_ENV) {
            Some(root) if !root.is_empty() => Self::new(root),
            _ => Self::default(),
        }
    }

    /// Device directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Node of I2C bus `bus`
    pub fn i2c_path(&self, bus: u32) -> PathBuf {
        self.root.join(format!("i2c-{}", bus))
    }

    /// Node of SPI bus `bus`, chip-select `cs`
    pub fn spidev_path(&self, bus: u32, cs: u8) -> PathBuf {
        self.root.join(format!("spidev{}.{}", bus, cs))
    }

    /// All I2C buses present, sorted by index
    pub fn list_i2c(&self) -> Vec<u32> {
        let mut buses: Vec<u32> = self
            .entry_names()
            .iter()
            .filter_map(|name| parse_i2c_name(name))
            .collect();
        buses.sort_unstable();
        buses
    }

    /// All spidev nodes present as `(bus, cs)`, sorted
    pub fn list_spidev(&self) -> Vec<(u32, u8)> {
        let mut nodes: Vec<(u32, u8)> = self
            .entry_names()
            .iter()
            .filter_map(|name| parse_spidev_name(name))
            .collect();
        nodes.sort_unstable();
        nodes
    }

    /// Chip-selects present on SPI bus `bus`, sorted
    pub fn spidev_chip_selects(&self, bus: u32) -> Vec<u8> {
        self.list_spidev()
            .into_iter()
            .filter(|(b, _)| *b == bus)
            .map(|(_, cs)| cs)
            .collect()
    }

    fn entry_names(&self) -> Vec<String> {
        match std::fs::read_dir(&self.root) {
            Ok(entries) => entries
                .filter_map(|entry| entry.ok())
                .filter_map(|entry| entry.file_name().into_string().ok())
                .collect(),
            Err(e) => {
                log::debug!("Cannot list {}: {}", self.root.display(), e);
                Vec::new()
            }
        }
    }
}

fn parse_i2c_name(name: &str) -> Option<u32> {
    name.strip_prefix("i2c-")?.parse().ok()
}

fn parse_spidev_name(name: &str) -> Option<(u32, u8)> {
    let (bus, cs) = name.strip_prefix("spidev")?.split_once('.')?;
    Some((bus.parse().ok()?, cs.parse().ok()?))
}

/// Open device node; the lock is released when it is dropped
pub(crate) type LockedNode = Flock<File>;

/// Open a node read/write and take an exclusive, non-blocking lock on it
pub(crate) fn open_node(path: &Path) -> Result<LockedNode> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|e| LinuxBusError::OpenFailed {
            path: path.display().to_string(),
            source: e,
        })?;

    Flock::lock(file, FlockArg::LockExclusiveNonblock).map_err(|(_, errno)| {
        LinuxBusError::Locked {
            path: path.display().to_string(),
            source: errno.into(),
        }
    })
}

/// Read the maximum spidev message size from sysfs, or use page size as fallback
pub(crate) fn spidev_bufsiz() -> usize {
    if let Ok(content) = std::fs::read_to_string(BUF_SIZE_SYSFS) {
        if let Ok(size) = content.trim().parse::<usize>() {
            if size > 0 {
                log::debug!("spidev: Using buffer size {} from sysfs", size);
                return size;
            }
        }
        log::warn!("spidev: Invalid buffer size in {}", BUF_SIZE_SYSFS);
    } else {
        log::debug!("spidev: Cannot read {}, using page size", BUF_SIZE_SYSFS);
    }

    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if page_size > 0 {
        page_size as usize
    } else {
        4096
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        let resolver = NodeResolver::default();
        assert_eq!(resolver.i2c_path(2), PathBuf::from("/dev/i2c-2"));
        assert_eq!(resolver.spidev_path(1, 0), PathBuf::from("/dev/spidev1.0"));

        let resolver = NodeResolver::new("/tmp/fake");
        assert_eq!(resolver.i2c_path(0), PathBuf::from("/tmp/fake/i2c-0"));
    }

    #[test]
    fn test_parse_names() {
        assert_eq!(parse_i2c_name("i2c-12"), Some(12));
        assert_eq!(parse_i2c_name("i2c-dev"), None);
        assert_eq!(parse_i2c_name("tty0"), None);
        assert_eq!(parse_spidev_name("spidev1.0"), Some((1, 0)));
        assert_eq!(parse_spidev_name("spidev10.3"), Some((10, 3)));
        assert_eq!(parse_spidev_name("spidev1"), None);
        assert_eq!(parse_spidev_name("spidevx.0"), None);
    }

    #[test]
    fn test_listing() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["i2c-2", "i2c-0", "spidev1.1", "spidev1.0", "spidev0.0", "null"] {
            File::create(dir.path().join(name)).unwrap();
        }
        let resolver = NodeResolver::new(dir.path());

        assert_eq!(resolver.list_i2c(), [0, 2]);
        assert_eq!(resolver.list_spidev(), [(0, 0), (1, 0), (1, 1)]);
        assert_eq!(resolver.spidev_chip_selects(1), [0, 1]);
        assert!(resolver.spidev_chip_selects(5).is_empty());
    }

    #[test]
    fn test_missing_root_lists_nothing() {
        let resolver = NodeResolver::new("/nonexistent/serbus-test");
        assert!(resolver.list_i2c().is_empty());
        assert!(resolver.list_spidev().is_empty());
    }

    #[test]
    fn test_open_missing_node() {
        let dir = tempfile::tempdir().unwrap();
        let err = open_node(&dir.path().join("i2c-7")).unwrap_err();
        assert!(matches!(err, LinuxBusError::OpenFailed { .. }));
    }

    #[test]
    fn test_open_is_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("i2c-1");
        File::create(&path).unwrap();

        let first = open_node(&path).unwrap();
        match open_node(&path).unwrap_err() {
            LinuxBusError::Locked { source, .. } => {
                assert_eq!(source.kind(), std::io::ErrorKind::WouldBlock)
            }
            other => panic!("unexpected error {:?}", other),
        }

        drop(first);
        let second = open_node(&path).unwrap();
        assert!(second.metadata().unwrap().is_file());
    }
}
