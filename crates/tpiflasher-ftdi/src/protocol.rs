//! FTDI adapter identification

// ============================================================================
// USB VID/PID constants
// ============================================================================

/// FTDI vendor ID
pub const FTDI_VID: u16 = 0x0403;

/// FT2232D/FT2232H product ID (dual channel)
pub const FTDI_FT2232_PID: u16 = 0x6010;

/// FT4232H product ID (quad channel)
pub const FTDI_FT4232H_PID: u16 = 0x6011;

/// FT232H product ID (single channel)
pub const FTDI_FT232H_PID: u16 = 0x6014;

/// Bit mode mask for MPSSE: TCK, TDI, TMS and GPIOL0 drive, TDO samples
pub const MPSSE_PIN_MASK: u8 = 0x1B;

/// Latency timer in milliseconds
pub const LATENCY_TIMER_MS: u8 = 2;

// ============================================================================
// Supported device types
// ============================================================================

/// Supported FTDI device types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FtdiDeviceType {
    /// FT2232D (dual channel, 12 MHz)
    #[default]
    Ft2232D,
    /// FT2232H (dual channel, 60 MHz)
    Ft2232H,
    /// FT4232H (quad channel, 60 MHz)
    Ft4232H,
    /// FT232H (single channel, 60 MHz)
    Ft232H,
}

impl FtdiDeviceType {
    /// All device types, in listing order
    pub const ALL: [FtdiDeviceType; 4] = [
        FtdiDeviceType::Ft2232D,
        FtdiDeviceType::Ft2232H,
        FtdiDeviceType::Ft4232H,
        FtdiDeviceType::Ft232H,
    ];

    /// Get the vendor ID for this device type
    pub fn vendor_id(&self) -> u16 {
        FTDI_VID
    }

    /// Get the product ID for this device type
    pub fn product_id(&self) -> u16 {
        match self {
            FtdiDeviceType::Ft2232D | FtdiDeviceType::Ft2232H => FTDI_FT2232_PID,
            FtdiDeviceType::Ft4232H => FTDI_FT4232H_PID,
            FtdiDeviceType::Ft232H => FTDI_FT232H_PID,
        }
    }

    /// Get the number of MPSSE-capable channels
    pub fn channel_count(&self) -> u8 {
        match self {
            FtdiDeviceType::Ft232H => 1,
            // Channels C and D of the FT4232H have no MPSSE
            FtdiDeviceType::Ft2232D | FtdiDeviceType::Ft2232H | FtdiDeviceType::Ft4232H => 2,
        }
    }

    /// Whether this device has a 60 MHz base clock
    ///
    /// These parts need the divide-by-5 prescaler enabled to run the TCK
    /// divisor from 12 MHz.
    pub fn is_high_speed(&self) -> bool {
        !matches!(self, FtdiDeviceType::Ft2232D)
    }

    /// Parse device type from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "2232d" | "ft2232d" | "2232" | "ft2232" => Some(FtdiDeviceType::Ft2232D),
            "2232h" | "ft2232h" => Some(FtdiDeviceType::Ft2232H),
            "4232h" | "ft4232h" => Some(FtdiDeviceType::Ft4232H),
            "232h" | "ft232h" => Some(FtdiDeviceType::Ft232H),
            _ => None,
        }
    }

    /// Get the name of this device type
    pub fn name(&self) -> &'static str {
        match self {
            FtdiDeviceType::Ft2232D => "FT2232D",
            FtdiDeviceType::Ft2232H => "FT2232H",
            FtdiDeviceType::Ft4232H => "FT4232H",
            FtdiDeviceType::Ft232H => "FT232H",
        }
    }
}

/// FTDI interface/channel selection
///
/// Only A and B carry an MPSSE engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FtdiInterface {
    /// Channel A (default)
    #[default]
    A,
    /// Channel B
    B,
}

impl FtdiInterface {
    /// Parse interface from character
    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'A' => Some(FtdiInterface::A),
            'B' => Some(FtdiInterface::B),
            _ => None,
        }
    }

    /// Get the interface index (0-1)
    pub fn index(&self) -> u8 {
        match self {
            FtdiInterface::A => 0,
            FtdiInterface::B => 1,
        }
    }

    /// Get the channel letter
    pub fn letter(&self) -> char {
        (b'A' + self.index()) as char
    }
}

/// A USB VID/PID pair this crate can drive
pub struct SupportedDevice {
    /// USB vendor ID
    pub vendor_id: u16,
    /// USB product ID
    pub product_id: u16,
    /// Vendor name
    pub vendor_name: &'static str,
    /// Device name
    pub device_name: &'static str,
}

/// List of all supported FTDI devices
pub const SUPPORTED_DEVICES: &[SupportedDevice] = &[
    SupportedDevice {
        vendor_id: FTDI_VID,
        product_id: FTDI_FT2232_PID,
        vendor_name: "FTDI",
        device_name: "FT2232D/FT2232H",
    },
    SupportedDevice {
        vendor_id: FTDI_VID,
        product_id: FTDI_FT4232H_PID,
        vendor_name: "FTDI",
        device_name: "FT4232H",
    },
    SupportedDevice {
        vendor_id: FTDI_VID,
        product_id: FTDI_FT232H_PID,
        vendor_name: "FTDI",
        device_name: "FT232H",
    },
];

/// Get device info for a VID/PID pair
pub fn get_device_info(vid: u16, pid: u16) -> Option<&'static SupportedDevice> {
    SUPPORTED_DEVICES
        .iter()
        .find(|d| d.vendor_id == vid && d.product_id == pid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_device_type() {
        assert_eq!(FtdiDeviceType::parse("FT232H"), Some(FtdiDeviceType::Ft232H));
        assert_eq!(FtdiDeviceType::parse("2232"), Some(FtdiDeviceType::Ft2232D));
        assert_eq!(FtdiDeviceType::parse("jtagkey"), None);
        for ty in FtdiDeviceType::ALL {
            assert!(get_device_info(ty.vendor_id(), ty.product_id()).is_some());
        }
    }

    #[test]
    fn test_prescaler_only_on_h_parts() {
        assert!(!FtdiDeviceType::Ft2232D.is_high_speed());
        assert!(FtdiDeviceType::Ft4232H.is_high_speed());
    }

    #[test]
    fn test_interface_letters() {
        assert_eq!(FtdiInterface::from_char('b'), Some(FtdiInterface::B));
        assert_eq!(FtdiInterface::B.letter(), 'B');
        assert_eq!(FtdiInterface::from_char('C'), None);
        assert_eq!(FtdiInterface::from_char('D'), None);
    }
}
