//! tpiflasher-core - Core library for AVR TPI programming
//!
//! This crate implements the Tiny Programming Interface (TPI) used by the
//! smallest AVR microcontrollers (ATtiny4/5/9/10/20/40/102/104) on top of a
//! synchronous FTDI MPSSE shift engine.
//!
//! The layers, from the wire up:
//!
//! - [`mpsse`] - MPSSE command encoding
//! - [`channel`] - the raw byte channel to the adapter and command execution
//! - [`tpi`] - software UART framing, the connection handshake and
//!   register-level TPI instructions
//! - [`nvm`] - NVM controller commands (erase, word write, readback)
//! - [`program`] - erase/program/verify over a [`image::SparseImage`]
//!
//! # Example
//!
//! ```ignore
//! use tpiflasher_core::{cancel::Cancellation, device::DeviceDatabase, image, nvm, program, tpi};
//!
//! let db = DeviceDatabase::builtin()?;
//! let link = tpi::TpiLink::new(channel, tpi::LinkConfig::default());
//! let cancel = Cancellation::new();
//! let (mut nvm, device) = nvm::NvmController::open(link, &db, cancel.clone())?;
//! println!("Found {} ({})", device.name, device.signature);
//!
//! let firmware = image::load_ihex_file("blink.hex".as_ref())?;
//! program::program(
//!     &mut nvm,
//!     &firmware,
//!     &program::ProgramOptions::default(),
//!     &mut program::NoProgress,
//!     &cancel,
//! )?;
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod cancel;
pub mod channel;
pub mod device;
pub mod error;
pub mod image;
pub mod mpsse;
pub mod nvm;
pub mod program;
pub mod tpi;

pub use error::{DecodeError, Error, Result};
