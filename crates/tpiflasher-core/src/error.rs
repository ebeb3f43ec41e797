//! Error types for tpiflasher-core

use thiserror::Error;

use crate::device::{DeviceDbError, DeviceSignature};

/// Ways an inbound TPI frame can fail to decode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// No start bit was found in the sampled window
    #[error("no frame found")]
    NoFrameFound,
    /// One or both stop bits were low
    #[error("frame error")]
    FrameError,
    /// Even parity check failed
    #[error("parity error")]
    ParityError,
}

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    /// A length, index or address argument is outside its valid range
    #[error("Argument out of range: {0}")]
    ArgumentOutOfRange(&'static str),

    /// An inbound frame could not be decoded
    #[error(
        "{kind} during {operation}{}",
        .address.map(|a| format!(" (address 0x{:04X})", a)).unwrap_or_default()
    )]
    Protocol {
        /// The TPI operation that was waiting for the frame
        operation: &'static str,
        /// Register or data-space address involved, if known
        address: Option<u16>,
        /// What was wrong with the frame
        kind: DecodeError,
    },

    /// TPIIR did not identify a TPI interface
    #[error("Invalid interface ID 0x{0:02X} (expected 0x80)")]
    InvalidInterfaceId(u8),

    /// The signature is not in the device database
    #[error("Unknown device signature {0}")]
    UnknownDevice(DeviceSignature),

    /// Read-back data does not match the image
    #[error("Verification failed at 0x{address:04X}: expected 0x{expected:02X}, read 0x{actual:02X}")]
    VerificationFailed {
        /// Data-space address of the first mismatch
        address: u32,
        /// Value in the image
        expected: u8,
        /// Value read from the device
        actual: u8,
    },

    /// The image has data outside the device's flash section
    #[error("Image address 0x{address:X} is outside the flash section ({size} bytes)")]
    ImageOutOfRange {
        /// Offending image address
        address: u64,
        /// Size of the flash section
        size: u32,
    },

    /// The operation needs a connected target
    #[error("Target is not connected")]
    NotConnected,

    /// The operation was cancelled
    #[error("Operation cancelled")]
    Cancelled,

    /// The cancellation deadline passed
    #[error("Timed out during {0}")]
    Timeout(&'static str),

    /// Raw channel I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed Intel-HEX record
    #[error("Intel HEX error: {0}")]
    HexRead(#[from] ihex::ReaderError),

    /// Intel-HEX output could not be produced
    #[error("Intel HEX error: {0}")]
    HexWrite(#[from] ihex::WriterError),

    /// Structurally invalid Intel-HEX file
    #[error("Intel HEX error: {0}")]
    HexFormat(&'static str),

    /// Device database could not be loaded
    #[error("Device database error: {0}")]
    DeviceDatabase(#[from] DeviceDbError),
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, Error>;
