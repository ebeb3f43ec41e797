//! MPSSE channel on an FTDI adapter

use std::io::{self, Read, Write};

use ftdi::{find_by_vid_pid, BitMode, Device, Interface};
use tpiflasher_core::channel::RawChannel;
use tpiflasher_core::mpsse::{GpioBank, MpsseCommandBuilder};
use tpiflasher_core::tpi::LinkConfig;

use crate::error::{FtdiError, Result};
use crate::protocol::*;

/// Default TCK divisor register value (1.2 MHz TPICLK)
pub const DEFAULT_DIVISOR: u16 = 4;

/// Default ADBUS bit driving #RESET (GPIOL0)
pub const DEFAULT_RESET_BIT: u8 = 4;

/// Configuration for opening an FTDI device
#[derive(Debug, Clone)]
pub struct FtdiConfig {
    /// Device type (determines VID/PID and base clock)
    pub device_type: FtdiDeviceType,
    /// Interface/channel to use (A, B)
    pub interface: FtdiInterface,
    /// TCK divisor register value: TCK = 12 MHz / ((1 + divisor) * 2)
    pub divisor: u16,
    /// ADBUS bit (0-7) wired to the target's #RESET
    pub reset_bit: u8,
}

impl Default for FtdiConfig {
    fn default() -> Self {
        Self::for_device(FtdiDeviceType::default())
    }
}

impl FtdiConfig {
    /// Create a new config for a specific device type
    pub fn for_device(device_type: FtdiDeviceType) -> Self {
        FtdiConfig {
            device_type,
            interface: FtdiInterface::default(),
            divisor: DEFAULT_DIVISOR,
            reset_bit: DEFAULT_RESET_BIT,
        }
    }

    /// Set the interface/channel
    pub fn interface(mut self, interface: FtdiInterface) -> Result<Self> {
        let max_channel = self.device_type.channel_count();
        if interface.index() >= max_channel {
            return Err(FtdiError::InvalidChannel(format!(
                "Channel {} not available on {} (max: {})",
                interface.letter(),
                self.device_type.name(),
                (b'A' + max_channel - 1) as char
            )));
        }
        self.interface = interface;
        Ok(self)
    }

    /// Set the TCK divisor register value
    pub fn divisor(mut self, divisor: u16) -> Self {
        self.divisor = divisor;
        self
    }

    /// Set the ADBUS bit driving #RESET
    pub fn reset_bit(mut self, bit: u8) -> Result<Self> {
        // ADBUS0..2 carry TPICLK and TPIDATA
        if !(3..=7).contains(&bit) {
            return Err(FtdiError::InvalidParameter(format!(
                "Invalid reset bit {}: must be 3-7",
                bit
            )));
        }
        self.reset_bit = bit;
        Ok(self)
    }

    /// Link settings matching this adapter
    pub fn link_config(&self) -> LinkConfig {
        let reset_mask = 1 << self.reset_bit;
        LinkConfig {
            clock_divisor: self.divisor,
            enable_div5: self.device_type.is_high_speed(),
            pin_direction: 0x0B | reset_mask,
            reset_mask,
            ..LinkConfig::default()
        }
    }
}

/// An FTDI interface in MPSSE mode
///
/// Pins are released (all inputs) when the channel is dropped.
pub struct FtdiChannel {
    /// libftdi device context
    device: Device,
    device_type: FtdiDeviceType,
}

impl FtdiChannel {
    /// Open an FTDI device with the given configuration
    pub fn open(config: &FtdiConfig) -> Result<Self> {
        log::info!(
            "Opening FTDI {} channel {}",
            config.device_type.name(),
            config.interface.letter()
        );

        let interface = match config.interface {
            FtdiInterface::A => Interface::A,
            FtdiInterface::B => Interface::B,
        };

        let vid = config.device_type.vendor_id();
        let pid = config.device_type.product_id();
        log::debug!("Looking for FTDI device VID={:04X} PID={:04X}", vid, pid);

        let mut device = find_by_vid_pid(vid, pid)
            .interface(interface)
            .open()
            .map_err(|e| FtdiError::OpenFailed(e.to_string()))?;

        device
            .usb_reset()
            .map_err(|e| FtdiError::ConfigFailed(format!("USB reset failed: {}", e)))?;
        device
            .usb_purge_buffers()
            .map_err(|e| FtdiError::ConfigFailed(format!("Purge failed: {}", e)))?;
        device
            .set_latency_timer(LATENCY_TIMER_MS)
            .map_err(|e| FtdiError::ConfigFailed(format!("Set latency timer failed: {}", e)))?;
        device
            .set_bitmode(MPSSE_PIN_MASK, BitMode::Mpsse)
            .map_err(|e| FtdiError::ConfigFailed(format!("Set MPSSE mode failed: {}", e)))?;

        log::debug!("FTDI device VID={:04X} PID={:04X} in MPSSE mode", vid, pid);

        Ok(FtdiChannel {
            device,
            device_type: config.device_type,
        })
    }

    /// Open the default device type on channel A
    pub fn open_first() -> Result<Self> {
        Self::open(&FtdiConfig::default())
    }

    /// Device type this channel was opened as
    pub fn device_type(&self) -> FtdiDeviceType {
        self.device_type
    }

    /// Whether the adapter has a 60 MHz base clock
    pub fn is_high_speed(&self) -> bool {
        self.device_type.is_high_speed()
    }

    /// Set all pins of both GPIO groups to inputs
    fn release_pins(&mut self) -> io::Result<()> {
        let mut cmd = MpsseCommandBuilder::new();
        cmd.set_gpio(GpioBank::Low, 0x00, 0x00)
            .set_gpio(GpioBank::High, 0x00, 0x00);
        self.device.write_all(cmd.build().bytes())
    }
}

impl RawChannel for FtdiChannel {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.device.write(data)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.device.read(buf)
    }
}

impl Drop for FtdiChannel {
    fn drop(&mut self) {
        if let Err(e) = self.release_pins() {
            log::warn!("Failed to release pins on close: {}", e);
        }
    }
}

/// Parse programmer options
///
/// Keys: `type=<2232d|2232h|4232h|232h>`, `port=<A|B>`, `divisor=<N>`,
/// `reset=<bit>`.
pub fn parse_options(options: &[(&str, &str)]) -> Result<FtdiConfig> {
    let mut config = FtdiConfig::default();

    for (key, value) in options {
        match *key {
            "type" => {
                config.device_type = FtdiDeviceType::parse(value).ok_or_else(|| {
                    FtdiError::InvalidDeviceType(format!(
                        "Unknown device type '{}'. Valid types: 2232d, 2232h, 4232h, 232h",
                        value
                    ))
                })?;
            }
            "port" | "channel" => {
                let mut chars = value.chars();
                let interface = match (chars.next(), chars.next()) {
                    (Some(c), None) => FtdiInterface::from_char(c),
                    _ => None,
                }
                .ok_or_else(|| {
                    FtdiError::InvalidChannel(format!(
                        "Invalid channel '{}': must be A or B",
                        value
                    ))
                })?;
                config.interface = interface;
            }
            "divisor" => {
                let divisor: u16 = value.parse().map_err(|_| {
                    FtdiError::InvalidParameter(format!("Invalid divisor '{}'", value))
                })?;
                config = config.divisor(divisor);
            }
            "reset" => {
                let bit: u8 = value.parse().map_err(|_| {
                    FtdiError::InvalidParameter(format!("Invalid reset bit '{}'", value))
                })?;
                config = config.reset_bit(bit)?;
            }
            _ => {
                log::warn!("Unknown FTDI option: {}={}", key, value);
            }
        }
    }

    // Checked last so `port` may precede `type`
    let interface = config.interface;
    config.interface(interface)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = parse_options(&[]).unwrap();
        assert_eq!(config.device_type, FtdiDeviceType::Ft2232D);
        let link = config.link_config();
        assert_eq!(link.clock_divisor, 4);
        assert!(!link.enable_div5);
        assert_eq!(link.pin_direction, 0x1B);
        assert_eq!(link.reset_mask, 0x10);
    }

    #[test]
    fn test_parse_options() {
        // FT232H has a single channel
        let err = parse_options(&[("port", "b"), ("type", "232h")]).unwrap_err();
        assert!(matches!(err, FtdiError::InvalidChannel(_)));

        let config = parse_options(&[("type", "4232h"), ("port", "B"), ("reset", "3")]).unwrap();
        assert_eq!(config.interface, FtdiInterface::B);
        let link = config.link_config();
        assert!(link.enable_div5);
        assert_eq!(link.reset_mask, 0x08);
    }

    #[test]
    fn test_invalid_values() {
        assert!(parse_options(&[("type", "ft999")]).is_err());
        assert!(parse_options(&[("port", "AB")]).is_err());
        let err = parse_options(&[("type", "4232h"), ("port", "C")]).unwrap_err();
        assert!(err.to_string().ends_with("must be A or B"));
        assert!(parse_options(&[("divisor", "fast")]).is_err());
        assert!(parse_options(&[("reset", "1")]).is_err());
    }
}
