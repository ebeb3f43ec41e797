//! Adapter enumeration and hot-plug polling
//!
//! Devices are only listed here, never opened, so enumeration can run while
//! another adapter is in use.

use std::fmt;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use crate::error::Result;
use crate::protocol::get_device_info;

/// Information about a connected FTDI device
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FtdiDeviceInfo {
    /// USB bus number
    pub bus: u8,
    /// USB device address
    pub address: u8,
    /// Vendor ID
    pub vendor_id: u16,
    /// Product ID
    pub product_id: u16,
    /// Vendor name
    pub vendor_name: &'static str,
    /// Device name
    pub device_name: &'static str,
    /// Serial number, when the OS has it cached
    pub serial: Option<String>,
}

impl fmt::Display for FtdiDeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} at bus {} address {} ({:04X}:{:04X})",
            self.vendor_name,
            self.device_name,
            self.bus,
            self.address,
            self.vendor_id,
            self.product_id
        )?;
        if let Some(serial) = &self.serial {
            write!(f, " serial {}", serial)?;
        }
        Ok(())
    }
}

/// List connected FTDI adapters
pub fn list_devices() -> Result<Vec<FtdiDeviceInfo>> {
    let mut devices = Vec::new();

    for dev in nusb::list_devices()? {
        let vid = dev.vendor_id();
        let pid = dev.product_id();

        if let Some(info) = get_device_info(vid, pid) {
            devices.push(FtdiDeviceInfo {
                bus: dev.bus_number(),
                address: dev.device_address(),
                vendor_id: vid,
                product_id: pid,
                vendor_name: info.vendor_name,
                device_name: info.device_name,
                serial: dev.serial_number().map(str::to_string),
            });
        }
    }

    log::debug!("Found {} FTDI device(s)", devices.len());
    Ok(devices)
}

/// A change in the set of connected adapters
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    /// A device appeared
    Attached(FtdiDeviceInfo),
    /// A device went away
    Detached(FtdiDeviceInfo),
}

impl fmt::Display for DeviceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceEvent::Attached(dev) => write!(f, "attached: {}", dev),
            DeviceEvent::Detached(dev) => write!(f, "detached: {}", dev),
        }
    }
}

/// Devices in `current` but not `previous`, and in `previous` but not `current`
pub fn diff_devices(
    previous: &[FtdiDeviceInfo],
    current: &[FtdiDeviceInfo],
) -> (Vec<FtdiDeviceInfo>, Vec<FtdiDeviceInfo>) {
    let added = current
        .iter()
        .filter(|dev| !previous.contains(dev))
        .cloned()
        .collect();
    let removed = previous
        .iter()
        .filter(|dev| !current.contains(dev))
        .cloned()
        .collect();
    (added, removed)
}

/// The last known set of connected adapters
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: Vec<FtdiDeviceInfo>,
}

impl DeviceRegistry {
    /// An empty registry; the first refresh reports every device as attached
    pub fn new() -> Self {
        Self::default()
    }

    /// Devices seen by the last refresh
    pub fn devices(&self) -> &[FtdiDeviceInfo] {
        &self.devices
    }

    /// Enumerate again and report what changed
    pub fn refresh(&mut self) -> Result<Vec<DeviceEvent>> {
        let current = list_devices()?;
        Ok(self.update(current))
    }

    /// Replace the known set with `current` and report what changed
    pub fn update(&mut self, current: Vec<FtdiDeviceInfo>) -> Vec<DeviceEvent> {
        let (added, removed) = diff_devices(&self.devices, &current);
        self.devices = current;
        removed
            .into_iter()
            .map(DeviceEvent::Detached)
            .chain(added.into_iter().map(DeviceEvent::Attached))
            .collect()
    }
}

/// Poll for hot-plug events on a background thread
///
/// Dropping the receiver is only noticed when the next event is sent, so the
/// thread keeps polling for as long as the bus stays quiet. Enumeration
/// failures are logged and retried on the next tick.
pub fn spawn_watcher(interval: Duration) -> mpsc::Receiver<DeviceEvent> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || poll_devices(&tx, interval, list_devices));
    rx
}

/// Report changes between successive `enumerate` calls until a send fails
fn poll_devices<F>(tx: &mpsc::Sender<DeviceEvent>, interval: Duration, mut enumerate: F)
where
    F: FnMut() -> Result<Vec<FtdiDeviceInfo>>,
{
    let mut registry = DeviceRegistry::new();
    loop {
        match enumerate() {
            Ok(current) => {
                for event in registry.update(current) {
                    if tx.send(event).is_err() {
                        return;
                    }
                }
            }
            Err(e) => log::warn!("USB enumeration failed: {}", e),
        }
        thread::sleep(interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(bus: u8, address: u8) -> FtdiDeviceInfo {
        FtdiDeviceInfo {
            bus,
            address,
            vendor_id: 0x0403,
            product_id: 0x6010,
            vendor_name: "FTDI",
            device_name: "FT2232D/FT2232H",
            serial: None,
        }
    }

    #[test]
    fn test_diff_devices() {
        let previous = vec![device(1, 2), device(1, 3)];
        let current = vec![device(1, 3), device(2, 7)];
        let (added, removed) = diff_devices(&previous, &current);
        assert_eq!(added, vec![device(2, 7)]);
        assert_eq!(removed, vec![device(1, 2)]);

        let (added, removed) = diff_devices(&current, &current);
        assert!(added.is_empty() && removed.is_empty());
    }

    #[test]
    fn test_registry_events() {
        let mut registry = DeviceRegistry::new();
        assert_eq!(
            registry.update(vec![device(1, 2)]),
            vec![DeviceEvent::Attached(device(1, 2))]
        );
        assert!(registry.update(vec![device(1, 2)]).is_empty());

        // Replug lands on a new address
        assert_eq!(
            registry.update(vec![device(1, 4)]),
            vec![
                DeviceEvent::Detached(device(1, 2)),
                DeviceEvent::Attached(device(1, 4))
            ]
        );
        assert_eq!(registry.devices(), &[device(1, 4)]);
    }

    #[test]
    fn test_display() {
        let mut dev = device(3, 9);
        assert_eq!(
            dev.to_string(),
            "FTDI FT2232D/FT2232H at bus 3 address 9 (0403:6010)"
        );
        dev.serial = Some("FT12AB".to_string());
        assert!(DeviceEvent::Detached(dev).to_string().ends_with("serial FT12AB"));
    }

    #[test]
    fn test_poll_stops_after_receiver_dropped() {
        let (tx, rx) = mpsc::channel();
        let mut calls = 0u32;
        let handle = thread::spawn(move || {
            poll_devices(&tx, Duration::from_millis(1), || {
                calls += 1;
                Ok(vec![device(1, (calls % 2) as u8)])
            })
        });

        assert!(matches!(rx.recv(), Ok(DeviceEvent::Attached(_))));
        drop(rx);
        handle.join().unwrap();
    }
}
