//! CLI argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

const PROGRAMMER_HELP: &str =
    "Programmer to use: ftdi[:type=<dev>,port=<A|B>,divisor=<N>,reset=<bit>] or dummy[:signature=<hex>,flash=<bytes>]";

#[derive(Parser)]
#[command(name = "tpiflasher")]
#[command(author, version, about = "TPI programmer for AVR microcontrollers", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to a device database file or directory (contains .ron files)
    /// Defaults to ./devices/ and /usr/share/tpiflasher/devices/, then the built-in list
    #[arg(long, global = true)]
    pub device_db: Option<PathBuf>,

    /// Abort device operations after this many seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Connect to the target and identify it
    Probe {
        #[arg(short, long, default_value = "ftdi", help = PROGRAMMER_HELP)]
        programmer: String,
    },

    /// Erase the whole flash
    Erase {
        #[arg(short, long, default_value = "ftdi", help = PROGRAMMER_HELP)]
        programmer: String,
    },

    /// Erase, program and verify a firmware file
    Write {
        #[arg(short, long, default_value = "ftdi", help = PROGRAMMER_HELP)]
        programmer: String,

        /// Intel HEX input file (.bin for raw binary at offset 0)
        #[arg(short, long)]
        input: PathBuf,

        /// Skip read-back verification
        #[arg(long)]
        no_verify: bool,
    },

    /// Compare a firmware file against the flash contents
    Verify {
        #[arg(short, long, default_value = "ftdi", help = PROGRAMMER_HELP)]
        programmer: String,

        /// Intel HEX input file (.bin for raw binary at offset 0)
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Read the flash contents to a file (.bin for raw binary, Intel HEX otherwise)
    Read {
        #[arg(short, long, default_value = "ftdi", help = PROGRAMMER_HELP)]
        programmer: String,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Show database details for a device
    Info {
        /// Device name (e.g. ATtiny10) or signature (e.g. 1E9003)
        device: String,
    },

    /// List supported programmers
    ListProgrammers,

    /// List known devices
    ListDevices {
        /// Filter by name (case-insensitive substring)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Print FTDI adapters as they are attached and detached
    Watch {
        /// Polling interval in milliseconds
        #[arg(short, long, default_value = "500")]
        interval: u64,
    },
}
