//! Device identification and the device database

mod database;
mod types;

pub use database::{DeviceDatabase, DeviceDbError, Size};
pub use types::{DeviceInfo, DeviceSignature, FlashSection};
