//! Device commands: probe, erase, write, verify, read

use std::path::Path;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use signal_hook::consts::SIGINT;
use tpiflasher_core::cancel::Cancellation;
use tpiflasher_core::channel::RawChannel;
use tpiflasher_core::device::{DeviceDatabase, DeviceInfo};
use tpiflasher_core::image::{self, SparseImage, ERASED};
use tpiflasher_core::nvm::NvmController;
use tpiflasher_core::program::{self, ProgramOptions, ProgramStats, ProgressSink};
use tpiflasher_core::tpi::TpiLink;
use tpiflasher_core::Error;

use crate::programmers;

type Session = NvmController<Box<dyn RawChannel>>;

fn create_bar_style(phase: &str) -> Result<ProgressStyle, Box<dyn std::error::Error>> {
    Ok(ProgressStyle::default_bar()
        .template(&format!(
            "{{spinner:.green}} [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{bytes}}/{{total_bytes}} ({{eta}}) {}",
            phase
        ))?
        .progress_chars("#>-"))
}

fn create_spinner_style() -> Result<ProgressStyle, Box<dyn std::error::Error>> {
    Ok(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?)
}

/// Progress reporter backed by indicatif bars
pub struct IndicatifProgress {
    current_bar: Option<ProgressBar>,
    total: u64,
}

impl IndicatifProgress {
    pub fn new() -> Self {
        Self {
            current_bar: None,
            total: 0,
        }
    }

    fn create_bar(&mut self, total: usize, phase: &str) {
        self.finish();
        self.total = total as u64;
        let pb = ProgressBar::new(self.total);
        pb.set_style(create_bar_style(phase).unwrap_or_else(|_| ProgressStyle::default_bar()));
        self.current_bar = Some(pb);
    }

    fn create_spinner(&mut self, message: &str) {
        self.finish();
        let pb = ProgressBar::new_spinner();
        pb.set_style(create_spinner_style().unwrap_or_else(|_| ProgressStyle::default_spinner()));
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        self.current_bar = Some(pb);
    }

    fn finish(&mut self) {
        if let Some(pb) = self.current_bar.take() {
            pb.finish();
        }
    }
}

impl Default for IndicatifProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for IndicatifProgress {
    fn erasing(&mut self) {
        self.create_spinner("Erasing flash...");
    }

    fn writing(&mut self, total_bytes: usize) {
        self.create_bar(total_bytes, "Writing");
    }

    fn verifying(&mut self, total_bytes: usize) {
        self.create_bar(total_bytes, "Verifying");
    }

    fn progress(&mut self, completion_ratio: f32) {
        if let Some(pb) = &self.current_bar {
            pb.set_position((completion_ratio * self.total as f32).round() as u64);
        }
    }

    fn complete(&mut self, stats: &ProgramStats) {
        self.finish();
        println!(
            "Programmed {} bytes in {} words, verified {} bytes",
            stats.bytes_programmed, stats.words_written, stats.bytes_verified
        );
    }
}

/// Cancellation token for one command, bounded by `--timeout` when given
pub fn cancellation(timeout: Option<u64>) -> Cancellation {
    match timeout {
        Some(secs) => Cancellation::with_timeout(Duration::from_secs(secs)),
        None => Cancellation::new(),
    }
}

/// Cancel `cancel` on the first Ctrl-C; a second one exits immediately
pub fn cancel_on_interrupt(cancel: &Cancellation) -> Result<(), Box<dyn std::error::Error>> {
    let flag = cancel.flag();
    signal_hook::flag::register_conditional_shutdown(SIGINT, 130, flag.clone())?;
    signal_hook::flag::register(SIGINT, flag)?;
    Ok(())
}

/// Open the programmer, connect and identify the target
fn open_session(
    programmer: &str,
    db: &DeviceDatabase,
    cancel: &Cancellation,
) -> Result<(Session, DeviceInfo), Box<dyn std::error::Error>> {
    let (channel, config) = programmers::open_programmer(programmer)?;
    let link = TpiLink::new(channel, config);
    Ok(NvmController::open(link, db, cancel.clone())?)
}

fn print_device(info: &DeviceInfo) {
    println!("Found {} {} (signature {})", info.vendor, info.name, info.signature);
}

/// Connect and report the signature, even for parts missing from the database
pub fn run_probe(
    programmer: &str,
    db: &DeviceDatabase,
    cancel: &Cancellation,
) -> Result<(), Box<dyn std::error::Error>> {
    let (channel, config) = programmers::open_programmer(programmer)?;
    let mut link = TpiLink::new(channel, config);
    let signature = link.connect()?;

    match db.lookup(signature) {
        Some(info) => {
            print_device(info);
            println!(
                "Flash:           {} bytes at 0x{:04X}",
                info.flash.size, info.flash.address
            );
        }
        None => println!("Unknown device with signature {}", signature),
    }

    link.disconnect(cancel)?;
    Ok(())
}

/// Chip erase
pub fn run_erase(
    programmer: &str,
    db: &DeviceDatabase,
    cancel: &Cancellation,
) -> Result<(), Box<dyn std::error::Error>> {
    let (mut nvm, info) = open_session(programmer, db, cancel)?;
    print_device(&info);

    let mut progress = IndicatifProgress::new();
    progress.erasing();
    nvm.chip_erase()?;
    progress.finish();
    nvm.disconnect()?;

    println!("Erased {} bytes of flash", info.flash.size);
    Ok(())
}

/// Erase, program and (unless `no_verify`) verify `input`
pub fn run_write(
    programmer: &str,
    input: &Path,
    no_verify: bool,
    db: &DeviceDatabase,
    cancel: &Cancellation,
) -> Result<(), Box<dyn std::error::Error>> {
    let firmware = image::load_image_file(input)?;
    println!("Loaded {} bytes from {}", firmware.len(), input.display());

    let (mut nvm, info) = open_session(programmer, db, cancel)?;
    print_device(&info);

    let options = ProgramOptions {
        verify: !no_verify,
        ..ProgramOptions::default()
    };
    let mut progress = IndicatifProgress::new();
    let result = program::program(&mut nvm, &firmware, &options, &mut progress, cancel);
    progress.finish();
    report_mismatch(&result);
    result?;
    Ok(())
}

/// Compare `input` with the flash contents
pub fn run_verify(
    programmer: &str,
    input: &Path,
    db: &DeviceDatabase,
    cancel: &Cancellation,
) -> Result<(), Box<dyn std::error::Error>> {
    let firmware = image::load_image_file(input)?;
    let (mut nvm, info) = open_session(programmer, db, cancel)?;
    print_device(&info);

    let mut progress = IndicatifProgress::new();
    let result = program::verify(&mut nvm, &firmware, &mut progress, cancel);
    progress.finish();
    report_mismatch(&result);
    let verified = result?;
    nvm.disconnect()?;

    println!("Verified {} bytes: flash matches {}", verified, input.display());
    Ok(())
}

/// Dump the whole flash section to `output`
pub fn run_read(
    programmer: &str,
    output: &Path,
    db: &DeviceDatabase,
    cancel: &Cancellation,
) -> Result<(), Box<dyn std::error::Error>> {
    let (mut nvm, info) = open_session(programmer, db, cancel)?;
    print_device(&info);

    let spinner = ProgressBar::new_spinner();
    spinner.set_message(format!("Reading {} bytes...", info.flash.size));
    spinner.enable_steady_tick(Duration::from_millis(100));
    let data = nvm.read_flash();
    spinner.finish_and_clear();
    let data = data?;
    nvm.disconnect()?;

    let dump = SparseImage::from_bytes(0, &data, ERASED);
    image::save_image_file(output, &dump)?;
    println!("Read {} bytes to {}", data.len(), output.display());
    Ok(())
}

fn report_mismatch<T>(result: &tpiflasher_core::Result<T>) {
    if let Err(Error::VerificationFailed { address, .. }) = result {
        log::error!("Flash contents differ from the image starting at 0x{:04X}", address);
    }
}

#[cfg(all(test, feature = "dummy"))]
mod tests {
    use super::*;
    use std::fs;

    fn db() -> DeviceDatabase {
        DeviceDatabase::builtin().unwrap()
    }

    #[test]
    fn test_write_then_read_dummy() {
        let dir = std::env::temp_dir().join(format!("tpiflasher-cmd-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let input = dir.join("blink.hex");
        fs::write(&input, ":0400000012345678E8\n:00000001FF\n").unwrap();

        let cancel = cancellation(Some(30));
        run_write("dummy", &input, false, &db(), &cancel).unwrap();

        // Each invocation opens a fresh simulated part
        let output = dir.join("dump.bin");
        run_read("dummy", &output, &db(), &cancel).unwrap();
        assert_eq!(fs::read(&output).unwrap(), vec![0xFF; 1024]);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_probe_unknown_signature() {
        let cancel = cancellation(None);
        run_probe("dummy:signature=1E9999", &db(), &cancel).unwrap();
        assert!(run_erase("dummy:signature=1E9999", &db(), &cancel).is_err());
        run_erase("dummy", &db(), &cancel).unwrap();
    }

    #[test]
    fn test_interrupt_cancels_operation() {
        let cancel = cancellation(None);
        cancel_on_interrupt(&cancel).unwrap();
        assert!(cancel.check("erase").is_ok());

        signal_hook::low_level::raise(SIGINT).unwrap();
        assert!(cancel.is_cancelled());
        assert!(matches!(
            cancel.check("erase"),
            Err(tpiflasher_core::Error::Cancelled)
        ));
    }
}
