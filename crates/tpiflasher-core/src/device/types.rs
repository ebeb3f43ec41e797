//! Device identification types

use std::fmt;
use std::str::FromStr;

/// Three-byte AVR device signature read from 0x3FC0
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct DeviceSignature(pub [u8; 3]);

impl DeviceSignature {
    /// Construct from manufacturer id and the two device id bytes
    pub const fn new(manufacturer_id: u8, device_id1: u8, device_id2: u8) -> Self {
        Self([manufacturer_id, device_id1, device_id2])
    }

    /// Manufacturer id (0x1E for Atmel/Microchip)
    pub fn manufacturer_id(&self) -> u8 {
        self.0[0]
    }

    /// First device id byte (encodes the flash size)
    pub fn device_id1(&self) -> u8 {
        self.0[1]
    }

    /// Second device id byte
    pub fn device_id2(&self) -> u8 {
        self.0[2]
    }

    /// Raw signature bytes
    pub fn bytes(&self) -> [u8; 3] {
        self.0
    }
}

impl From<[u8; 3]> for DeviceSignature {
    fn from(bytes: [u8; 3]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for DeviceSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X} {:02X} {:02X}", self.0[0], self.0[1], self.0[2])
    }
}

impl FromStr for DeviceSignature {
    type Err = String;

    /// Accepts `1E9003`, `1e:90:03`, `1E 90 03` or `0x1E9003`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        let digits: String = s
            .chars()
            .filter(|c| !matches!(c, ':' | ' ' | '-'))
            .collect();
        if digits.len() != 6 {
            return Err(format!("Invalid signature '{}': expected 3 hex bytes", s));
        }
        let mut bytes = [0u8; 3];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&digits[i * 2..i * 2 + 2], 16)
                .map_err(|e| format!("Invalid signature '{}': {}", s, e))?;
        }
        Ok(Self(bytes))
    }
}

/// Programmable flash window in the TPI data space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashSection {
    /// Data-space address of the first flash byte
    pub address: u16,
    /// Size in bytes
    pub size: u32,
}

impl FlashSection {
    /// Whether an image offset lies inside the section
    pub fn contains(&self, offset: u64) -> bool {
        offset < u64::from(self.size)
    }

    /// Data-space address of `offset`, if it is representable
    pub fn address_of(&self, offset: u64) -> Option<u16> {
        if !self.contains(offset) {
            return None;
        }
        u16::try_from(u64::from(self.address) + offset).ok()
    }
}

/// A known TPI device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Vendor name
    pub vendor: String,
    /// Part name
    pub name: String,
    /// Signature bytes
    pub signature: DeviceSignature,
    /// Code flash section
    pub flash: FlashSection,
}
