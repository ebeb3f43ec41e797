//! List and info commands

use tpiflasher_core::device::{DeviceDatabase, DeviceInfo, DeviceSignature};

use crate::programmers;

/// List all compiled-in programmers
pub fn list_programmers() {
    println!("Supported programmers:");
    println!();
    for p in programmers::available_programmers() {
        println!("  {:10} - {}", p.name, p.description);
        if !p.aliases.is_empty() {
            println!("  {:10}   aliases: {}", "", p.aliases.join(", "));
        }
    }
}

/// List known devices, optionally filtered by name
pub fn list_devices(db: &DeviceDatabase, name_filter: Option<&str>) {
    let mut devices: Vec<&DeviceInfo> = match name_filter {
        Some(name) => db.find_by_name(name),
        None => db.iter().collect(),
    };
    devices.sort_by(|a, b| a.name.cmp(&b.name));

    println!("{:<12} {:<12} {:>10} {:>10}", "Vendor", "Name", "Flash", "Signature");
    println!("{}", "-".repeat(48));
    for dev in &devices {
        println!(
            "{:<12} {:<12} {:>10} {:>10}",
            dev.vendor,
            dev.name,
            format_size(dev.flash.size),
            dev.signature.to_string().replace(' ', "")
        );
    }
    println!();
    println!("{} device(s)", devices.len());
}

/// Show database details for a device given by name or signature
pub fn print_device_info(
    db: &DeviceDatabase,
    query: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let by_signature = query
        .parse::<DeviceSignature>()
        .ok()
        .and_then(|sig| db.lookup(sig));
    let info = match by_signature {
        Some(info) => info,
        None => db
            .find_by_name(query)
            .into_iter()
            .find(|d| d.name.eq_ignore_ascii_case(query))
            .ok_or_else(|| format!("No device matching '{}'", query))?,
    };

    println!("Vendor:          {}", info.vendor);
    println!("Name:            {}", info.name);
    println!("Signature:       {}", info.signature);
    println!("Flash size:      {} ({} bytes)", format_size(info.flash.size), info.flash.size);
    println!(
        "Flash address:   0x{:04X}-0x{:04X}",
        info.flash.address,
        u32::from(info.flash.address) + info.flash.size.saturating_sub(1)
    );
    Ok(())
}

fn format_size(bytes: u32) -> String {
    if bytes >= 1024 && bytes % 1024 == 0 {
        format!("{} KiB", bytes / 1024)
    } else {
        format!("{} B", bytes)
    }
}
