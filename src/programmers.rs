//! Programmer registration and dispatch
//!
//! Every programmer ends up as a boxed [`RawChannel`] plus the
//! [`LinkConfig`] the TPI link should use with it.

use tpiflasher_core::channel::RawChannel;
use tpiflasher_core::tpi::LinkConfig;

/// Information about a programmer
pub struct ProgrammerInfo {
    /// Primary name (used for matching)
    pub name: &'static str,
    /// Alternative names/aliases
    pub aliases: &'static [&'static str],
    /// Short description
    pub description: &'static str,
}

/// Get information about all available programmers (enabled at compile time)
#[allow(unused_mut, clippy::vec_init_then_push)]
pub fn available_programmers() -> Vec<ProgrammerInfo> {
    let mut programmers = Vec::new();

    #[cfg(feature = "ftdi")]
    programmers.push(ProgrammerInfo {
        name: "ftdi",
        aliases: &["ft2232", "ft232h"],
        description: "FTDI MPSSE adapter (type=<2232d|2232h|4232h|232h>,port=<A|B>,divisor=<N>,reset=<bit>)",
    });

    #[cfg(feature = "dummy")]
    programmers.push(ProgrammerInfo {
        name: "dummy",
        aliases: &["sim"],
        description: "Simulated TPI target for testing (signature=<hex>,flash=<bytes>)",
    });

    programmers
}

/// Canonical name of a programmer, if it is compiled in
pub fn find_programmer(name: &str) -> Option<&'static str> {
    available_programmers()
        .into_iter()
        .find(|p| p.name == name || p.aliases.iter().any(|a| *a == name))
        .map(|p| p.name)
}

/// Parse a programmer string like "ftdi:type=232h,divisor=9"
///
/// Returns (name, options) where options is a list of key=value pairs.
/// Options without a `=` get an empty value.
pub fn parse_programmer_string(s: &str) -> (&str, Vec<(&str, &str)>) {
    let Some((name, rest)) = s.split_once(':') else {
        return (s, Vec::new());
    };

    let options = rest
        .split(',')
        .filter(|opt| !opt.is_empty())
        .map(|opt| opt.split_once('=').unwrap_or((opt, "")))
        .collect();
    (name, options)
}

/// A channel ready to be handed to a TPI link
pub type OpenedProgrammer = (Box<dyn RawChannel>, LinkConfig);

/// Open the programmer described by `programmer`
pub fn open_programmer(programmer: &str) -> Result<OpenedProgrammer, Box<dyn std::error::Error>> {
    let (name, options) = parse_programmer_string(programmer);

    let canonical = find_programmer(name).ok_or_else(|| {
        let names: Vec<&str> = available_programmers().iter().map(|p| p.name).collect();
        format!(
            "Unknown programmer '{}'. Available: {}",
            name,
            names.join(", ")
        )
    })?;

    match canonical {
        #[cfg(feature = "ftdi")]
        "ftdi" => open_ftdi(&options),
        #[cfg(feature = "dummy")]
        "dummy" => open_dummy(&options),
        _ => Err(format!("Programmer '{}' is not built in", canonical).into()),
    }
}

#[cfg(feature = "ftdi")]
fn open_ftdi(options: &[(&str, &str)]) -> Result<OpenedProgrammer, Box<dyn std::error::Error>> {
    let config = tpiflasher_ftdi::parse_options(options)?;
    let channel = tpiflasher_ftdi::FtdiChannel::open(&config)?;
    let link_config = config.link_config();
    log::debug!(
        "TPI clock {} Hz (divisor {})",
        link_config.clock_hz(),
        link_config.clock_divisor
    );
    let channel: Box<dyn RawChannel> = Box::new(channel);
    Ok((channel, link_config))
}

#[cfg(feature = "dummy")]
fn open_dummy(options: &[(&str, &str)]) -> Result<OpenedProgrammer, Box<dyn std::error::Error>> {
    use tpiflasher_dummy::{SimulatedConfig, SimulatedTarget};

    let mut config = SimulatedConfig::default();
    for (key, value) in options {
        match *key {
            "signature" => config.signature = value.parse()?,
            "flash" => {
                config.flash_size = value
                    .parse()
                    .map_err(|_| format!("Invalid flash size '{}'", value))?;
            }
            _ => log::warn!("Unknown dummy option: {}={}", key, value),
        }
    }

    log::info!(
        "Using simulated target with signature {} and {} bytes flash",
        config.signature,
        config.flash_size
    );
    let link_config = LinkConfig {
        reset_mask: config.reset_mask,
        reset_settle: std::time::Duration::ZERO,
        ..LinkConfig::default()
    };
    let channel: Box<dyn RawChannel> = Box::new(SimulatedTarget::new(config));
    Ok((channel, link_config))
}
