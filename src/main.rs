//! tpiflasher - TPI programmer for AVR microcontrollers
//!
//! Programs the flash of TPI parts (ATtiny4/5/9/10/20/40/102/104) through an
//! FTDI MPSSE adapter, or through a simulated target for testing.
//!
//! Every device command follows the same path: open the programmer as a raw
//! MPSSE channel, run the TPI handshake, look the signature up in the device
//! database and hand the session to the NVM controller.

mod cli;
mod commands;
mod programmers;

use clap::Parser;
use cli::{Cli, Commands};
use std::path::{Path, PathBuf};
use tpiflasher_core::device::DeviceDatabase;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // RUST_LOG still wins over -v
    let default_filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let db = match load_device_database(cli.device_db.as_deref()) {
        Ok(db) => db,
        Err(e) => {
            eprintln!("Failed to load device database: {}", e);
            std::process::exit(1);
        }
    };
    log::debug!("Loaded {} device definitions", db.len());

    let cancel = commands::cancellation(cli.timeout);
    commands::cancel_on_interrupt(&cancel)?;

    match cli.command {
        Commands::Probe { programmer } => commands::run_probe(&programmer, &db, &cancel),
        Commands::Erase { programmer } => commands::run_erase(&programmer, &db, &cancel),
        Commands::Write {
            programmer,
            input,
            no_verify,
        } => commands::run_write(&programmer, &input, no_verify, &db, &cancel),
        Commands::Verify { programmer, input } => {
            commands::run_verify(&programmer, &input, &db, &cancel)
        }
        Commands::Read { programmer, output } => {
            commands::run_read(&programmer, &output, &db, &cancel)
        }
        Commands::Info { device } => commands::print_device_info(&db, &device),
        Commands::ListProgrammers => {
            commands::list_programmers();
            Ok(())
        }
        Commands::ListDevices { name } => {
            commands::list_devices(&db, name.as_deref());
            Ok(())
        }
        Commands::Watch { interval } => commands::watch(interval),
    }
}

/// Load the device database from the specified path or default locations
///
/// Falls back to the built-in list of TPI parts when no default location
/// has any definitions.
fn load_device_database(path: Option<&Path>) -> Result<DeviceDatabase, Box<dyn std::error::Error>> {
    let mut db = DeviceDatabase::new();

    if let Some(path) = path {
        if path.is_dir() {
            db.load_dir(path)?;
        } else if path.is_file() {
            db.load_file(path)?;
        } else {
            return Err(format!("Device database path not found: {}", path.display()).into());
        }
        return Ok(db);
    }

    let default_paths = [
        PathBuf::from("devices"),
        PathBuf::from("/usr/share/tpiflasher/devices"),
        PathBuf::from("/usr/local/share/tpiflasher/devices"),
    ];

    for dir in &default_paths {
        if dir.is_dir() {
            match db.load_dir(dir) {
                Ok(count) => log::debug!("Loaded {} devices from {}", count, dir.display()),
                Err(e) => log::warn!("Failed to load devices from {}: {}", dir.display(), e),
            }
        }
    }

    if db.is_empty() {
        log::debug!("No device database found in default locations, using built-in list");
        db = DeviceDatabase::builtin()?;
    }
    Ok(db)
}
