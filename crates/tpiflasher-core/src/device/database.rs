//! Device database for runtime loading and lookup
//!
//! Devices are described in RON files, one file per vendor:
//!
//! ```text
//! (
//!     vendor: "Atmel",
//!     devices: [
//!         (
//!             name: "ATtiny10",
//!             signature: (0x1E, 0x90, 0x03),
//!             flash: (address: 0x4000, size: KiB(1)),
//!         ),
//!     ],
//! )
//! ```

use std::fs;
use std::io;
use std::path::Path;

use thiserror::Error;

use super::types::{DeviceInfo, DeviceSignature, FlashSection};

/// Built-in definitions for the TPI parts
const BUILTIN_ATMEL: &str = include_str!("../../devices/atmel.ron");

/// Error type for device database operations
#[derive(Debug, Error)]
pub enum DeviceDbError {
    /// I/O error reading files
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// RON parsing error
    #[error("Parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),
    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Size specification with human-readable units (for RON parsing)
#[derive(Debug, Clone, Copy, serde::Deserialize)]
pub enum Size {
    /// Size in bytes
    B(u32),
    /// Size in kibibytes (1024 bytes)
    KiB(u32),
}

impl Size {
    /// Convert to bytes, `None` if the value does not fit in 32 bits
    pub fn to_bytes(self) -> Option<u32> {
        match self {
            Size::B(n) => Some(n),
            Size::KiB(n) => n.checked_mul(1024),
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
struct FlashDef {
    address: u16,
    size: Size,
}

#[derive(Debug, Clone, serde::Deserialize)]
struct DeviceDef {
    name: String,
    signature: (u8, u8, u8),
    flash: FlashDef,
}

#[derive(Debug, Clone, serde::Deserialize)]
struct VendorDef {
    vendor: String,
    devices: Vec<DeviceDef>,
}

/// Runtime device database
#[derive(Debug, Clone, Default)]
pub struct DeviceDatabase {
    devices: Vec<DeviceInfo>,
}

impl DeviceDatabase {
    /// Create an empty database
    pub fn new() -> Self {
        Self {
            devices: Vec::new(),
        }
    }

    /// Database holding the compiled-in device definitions
    pub fn builtin() -> Result<Self, DeviceDbError> {
        let mut db = Self::new();
        db.load_ron(BUILTIN_ATMEL)?;
        Ok(db)
    }

    /// Load device definitions from a single RON file
    pub fn load_file(&mut self, path: &Path) -> Result<usize, DeviceDbError> {
        let content = fs::read_to_string(path)?;
        self.load_ron(&content)
    }

    /// Load device definitions from a RON string
    ///
    /// A device whose signature is already known replaces the earlier entry.
    pub fn load_ron(&mut self, content: &str) -> Result<usize, DeviceDbError> {
        let vendor_def: VendorDef = ron::from_str(content)?;
        let count = vendor_def.devices.len();

        for def in vendor_def.devices {
            let size = def.flash.size.to_bytes().ok_or_else(|| {
                DeviceDbError::Validation(format!("{}: flash size overflows", def.name))
            })?;
            if size == 0 || u64::from(def.flash.address) + u64::from(size) > 0x1_0000 {
                return Err(DeviceDbError::Validation(format!(
                    "{}: flash section 0x{:04X}+{} does not fit the 16-bit data space",
                    def.name, def.flash.address, size
                )));
            }
            let (a, b, c) = def.signature;
            let info = DeviceInfo {
                vendor: vendor_def.vendor.clone(),
                name: def.name,
                signature: DeviceSignature::new(a, b, c),
                flash: FlashSection {
                    address: def.flash.address,
                    size,
                },
            };
            self.devices.retain(|d| d.signature != info.signature);
            self.devices.push(info);
        }

        Ok(count)
    }

    /// Load all RON files from a directory
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize, DeviceDbError> {
        let mut total = 0;

        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();

            if path.extension().is_some_and(|ext| ext == "ron") {
                total += self.load_file(&path)?;
            }
        }

        Ok(total)
    }

    /// Get the number of devices in the database
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Check if the database is empty
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Find a device by exact signature
    pub fn lookup(&self, signature: DeviceSignature) -> Option<&DeviceInfo> {
        self.devices.iter().find(|d| d.signature == signature)
    }

    /// Find devices by name (case-insensitive partial match)
    pub fn find_by_name(&self, name: &str) -> Vec<&DeviceInfo> {
        let name_lower = name.to_lowercase();
        self.devices
            .iter()
            .filter(|d| d.name.to_lowercase().contains(&name_lower))
            .collect()
    }

    /// Iterate over all devices
    pub fn iter(&self) -> impl Iterator<Item = &DeviceInfo> {
        self.devices.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_ron() {
        let ron = r#"
        (
            vendor: "Atmel",
            devices: [
                (
                    name: "ATtiny20",
                    signature: (0x1E, 0x91, 0x0F),
                    flash: (address: 0x4000, size: KiB(2)),
                ),
            ],
        )
        "#;

        let mut db = DeviceDatabase::new();
        let count = db.load_ron(ron).unwrap();

        assert_eq!(count, 1);
        let dev = db.lookup(DeviceSignature::new(0x1E, 0x91, 0x0F)).unwrap();
        assert_eq!(dev.name, "ATtiny20");
        assert_eq!(dev.vendor, "Atmel");
        assert_eq!(dev.flash.address, 0x4000);
        assert_eq!(dev.flash.size, 2048);
        assert!(db.lookup(DeviceSignature::new(0x1E, 0x91, 0x0A)).is_none());
    }

    #[test]
    fn test_reject_oversized_section() {
        let ron = r#"(
            vendor: "Test",
            devices: [(name: "Big", signature: (1, 2, 3), flash: (address: 0xC000, size: KiB(32)))],
        )"#;
        let mut db = DeviceDatabase::new();
        assert!(matches!(db.load_ron(ron), Err(DeviceDbError::Validation(_))));
    }

    #[test]
    fn test_builtin() {
        let db = DeviceDatabase::builtin().unwrap();
        let tiny10 = db.lookup(DeviceSignature::new(0x1E, 0x90, 0x03)).unwrap();
        assert_eq!(tiny10.name, "ATtiny10");
        assert_eq!(tiny10.flash.size, 1024);
        assert_eq!(db.find_by_name("tiny4").len(), 2);
        assert!(db.iter().all(|d| d.flash.address == 0x4000));
    }

    #[test]
    fn test_size_conversion() {
        assert_eq!(Size::B(512).to_bytes(), Some(512));
        assert_eq!(Size::KiB(4).to_bytes(), Some(4096));
        assert_eq!(Size::KiB(4_194_305).to_bytes(), None);
    }

    #[test]
    fn test_reject_overflowing_size() {
        let ron = r#"(
            vendor: "Test",
            devices: [(name: "Wrap", signature: (1, 2, 3), flash: (address: 0x4000, size: KiB(4194305)))],
        )"#;
        let mut db = DeviceDatabase::new();
        assert!(matches!(db.load_ron(ron), Err(DeviceDbError::Validation(_))));

        let ron = r#"(
            vendor: "Test",
            devices: [(name: "Huge", signature: (1, 2, 3), flash: (address: 0x4000, size: B(4294967295)))],
        )"#;
        assert!(matches!(db.load_ron(ron), Err(DeviceDbError::Validation(_))));
        assert!(db.is_empty());
    }
}
