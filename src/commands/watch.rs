//! Hot-plug watch command

/// Print adapter attach/detach events until interrupted
///
/// Adapters already present are reported as attached on the first poll.
#[cfg(feature = "ftdi")]
pub fn watch(interval_ms: u64) -> Result<(), Box<dyn std::error::Error>> {
    use std::time::Duration;

    println!("Watching for FTDI adapters (Ctrl-C to stop)");
    let events = tpiflasher_ftdi::spawn_watcher(Duration::from_millis(interval_ms));
    for event in events {
        println!("{}", event);
    }
    Err("USB watcher stopped".into())
}

#[cfg(not(feature = "ftdi"))]
pub fn watch(_interval_ms: u64) -> Result<(), Box<dyn std::error::Error>> {
    Err("watch needs the ftdi feature".into())
}
