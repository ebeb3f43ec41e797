//! tpiflasher-ftdi - FTDI MPSSE channel for TPI programming
//!
//! This crate opens an FTDI adapter in MPSSE mode and exposes it as a
//! [`RawChannel`](tpiflasher_core::channel::RawChannel), and lists
//! connected adapters for enumeration and hot-plug watching.
//!
//! # Supported Devices
//!
//! - FTDI FT2232D (dual channel, 12 MHz)
//! - FTDI FT2232H (dual channel, 60 MHz)
//! - FTDI FT4232H (quad channel, MPSSE on A and B, 60 MHz)
//! - FTDI FT232H (single channel, 60 MHz)
//!
//! # Example
//!
//! ```no_run
//! use tpiflasher_core::tpi::TpiLink;
//! use tpiflasher_ftdi::{FtdiChannel, FtdiConfig, FtdiDeviceType};
//!
//! let config = FtdiConfig::for_device(FtdiDeviceType::Ft2232H)
//!     .interface(tpiflasher_ftdi::FtdiInterface::B)?
//!     .divisor(9);
//! let channel = FtdiChannel::open(&config)?;
//! let mut link = TpiLink::new(channel, config.link_config());
//! let signature = link.connect()?;
//! println!("Signature: {}", signature);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Programmer Options
//!
//! - `type=<device>` - Device type (2232d, 2232h, 4232h, 232h)
//! - `port=<A|B>` - Channel to use (default: A)
//! - `divisor=<N>` - TCK divisor register value (default: 4)
//! - `reset=<bit>` - ADBUS bit wired to #RESET (default: 4)
//!
//! # TPI Clock Speed
//!
//! The 60 MHz 'H' parts run with the divide-by-5 prescaler enabled, so
//! every adapter clocks from 12 MHz:
//!
//! ```text
//! TPICLK = 12 MHz / ((1 + divisor) * 2)
//! ```
//!
//! | Divisor | TPICLK   |
//! |---------|----------|
//! | 2       | 2 MHz    |
//! | 4       | 1.2 MHz  |
//! | 9       | 600 kHz  |
//! | 59      | 100 kHz  |

#![warn(missing_docs)]

mod channel;
mod error;
mod protocol;
mod registry;

pub use channel::{parse_options, FtdiChannel, FtdiConfig};
pub use error::{FtdiError, Result};
pub use protocol::{FtdiDeviceType, FtdiInterface, SupportedDevice, SUPPORTED_DEVICES};
pub use registry::{
    diff_devices, list_devices, spawn_watcher, DeviceEvent, DeviceRegistry, FtdiDeviceInfo,
};
