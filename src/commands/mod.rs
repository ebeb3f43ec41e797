//! CLI command implementations
//!
//! Device commands open a programmer, run the TPI handshake and drive the
//! NVM controller. List commands only consult the device database or the
//! compiled-in programmer table.

mod list;
mod program;
mod watch;

pub use list::{list_devices, list_programmers, print_device_info};
pub use program::{cancel_on_interrupt, cancellation, run_erase, run_probe, run_read, run_verify, run_write};
pub use watch::watch;
