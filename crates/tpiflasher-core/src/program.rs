//! Erase, program and verify a firmware image
//!
//! The loop only talks to a [`ProgrammingTarget`], which
//! [`NvmController`](crate::nvm::NvmController) implements.

use crate::cancel::Cancellation;
use crate::device::FlashSection;
use crate::error::{Error, Result};
use crate::image::SparseImage;

/// NVM operations the programming loop needs
pub trait ProgrammingTarget {
    /// Flash section of the connected device
    fn flash_section(&self) -> FlashSection;

    /// Erase all flash
    fn chip_erase(&mut self) -> Result<()>;

    /// Write one word at a data-space address
    fn write_word(&mut self, address: u16, low: u8, high: u8) -> Result<()>;

    /// Read one data-space byte
    fn read_byte(&mut self, address: u16) -> Result<u8>;

    /// Leave programming mode
    fn disconnect(&mut self) -> Result<()>;
}

/// Callback for progress reporting during programming
pub trait ProgressSink {
    /// Called when the chip erase starts
    fn erasing(&mut self);

    /// Called when word writes start
    fn writing(&mut self, total_bytes: usize);

    /// Called when read-back starts
    fn verifying(&mut self, total_bytes: usize);

    /// Completion of the current phase, in `0.0..=1.0`
    fn progress(&mut self, completion_ratio: f32);

    /// Called when the whole operation succeeded
    fn complete(&mut self, stats: &ProgramStats);
}

/// A no-op progress reporter
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn erasing(&mut self) {}
    fn writing(&mut self, _total_bytes: usize) {}
    fn verifying(&mut self, _total_bytes: usize) {}
    fn progress(&mut self, _completion_ratio: f32) {}
    fn complete(&mut self, _stats: &ProgramStats) {}
}

/// What [`program`] does besides erase and write
#[derive(Debug, Clone)]
pub struct ProgramOptions {
    /// Read back and compare every programmed byte
    pub verify: bool,
    /// Leave programming mode after success
    pub disconnect_on_success: bool,
}

impl Default for ProgramOptions {
    fn default() -> Self {
        Self {
            verify: true,
            disconnect_on_success: true,
        }
    }
}

/// Statistics from a programming run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgramStats {
    /// Number of word writes issued
    pub words_written: usize,
    /// Number of image bytes programmed
    pub bytes_programmed: usize,
    /// Number of bytes read back and compared
    pub bytes_verified: usize,
}

/// One word write derived from an image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedWord {
    /// Image offset of the low byte (always even)
    pub offset: u64,
    /// Low byte
    pub low: u8,
    /// High byte
    pub high: u8,
    /// How many of the two bytes the image defines
    pub entries: usize,
}

/// Fail with [`Error::ImageOutOfRange`] if any byte lies outside `section`
pub fn check_fits(image: &SparseImage, section: &FlashSection) -> Result<()> {
    match image.range(u64::from(section.size)..).next() {
        Some((address, _)) => Err(Error::ImageOutOfRange {
            address,
            size: section.size,
        }),
        None => Ok(()),
    }
}

/// Pair image bytes into word writes
///
/// One word per even offset present in the image, in ascending order. The
/// high byte takes the image's fill value when absent. Odd offsets are only
/// written as the high half of their even partner; a lone odd byte is
/// skipped. Offsets above 0xFFFF are not addressable and end the plan.
pub fn plan_words(image: &SparseImage) -> Vec<PlannedWord> {
    image
        .iter()
        .take_while(|&(offset, _)| offset <= 0xFFFF)
        .filter(|&(offset, _)| offset & 1 == 0)
        .map(|(offset, low)| PlannedWord {
            offset,
            low,
            high: image.get(offset + 1),
            entries: 1 + usize::from(image.contains(offset + 1)),
        })
        .collect()
}

fn target_address(section: &FlashSection, offset: u64) -> Result<u16> {
    section.address_of(offset).ok_or(Error::ImageOutOfRange {
        address: offset,
        size: section.size,
    })
}

fn ratio(done: usize, total: usize) -> f32 {
    if total == 0 {
        1.0
    } else {
        done as f32 / total as f32
    }
}

/// Erase the chip and program `image`, then optionally verify and disconnect
///
/// Nothing is erased if the image does not fit the flash section.
pub fn program<T: ProgrammingTarget + ?Sized, P: ProgressSink + ?Sized>(
    target: &mut T,
    image: &SparseImage,
    options: &ProgramOptions,
    progress: &mut P,
    cancel: &Cancellation,
) -> Result<ProgramStats> {
    let section = target.flash_section();
    check_fits(image, &section)?;

    let words = plan_words(image);
    let total: usize = words.iter().map(|w| w.entries).sum();
    let mut stats = ProgramStats::default();

    cancel.check("erase")?;
    progress.erasing();
    log::info!("Erasing flash");
    target.chip_erase()?;

    progress.writing(total);
    log::info!("Programming {} bytes in {} words", total, words.len());
    for word in &words {
        cancel.check("program")?;
        let address = target_address(&section, word.offset)?;
        target.write_word(address, word.low, word.high)?;
        stats.words_written += 1;
        stats.bytes_programmed += word.entries;
        progress.progress(ratio(stats.bytes_programmed, total));
    }

    if options.verify {
        stats.bytes_verified = verify(target, image, progress, cancel)?;
    }

    if options.disconnect_on_success {
        target.disconnect()?;
    }

    log::info!(
        "Programmed {} bytes ({} words), verified {} bytes",
        stats.bytes_programmed,
        stats.words_written,
        stats.bytes_verified
    );
    progress.complete(&stats);
    Ok(stats)
}

/// Compare every present image byte with the device
///
/// Returns the number of bytes compared. The first mismatch is reported as
/// [`Error::VerificationFailed`] with its data-space address.
pub fn verify<T: ProgrammingTarget + ?Sized, P: ProgressSink + ?Sized>(
    target: &mut T,
    image: &SparseImage,
    progress: &mut P,
    cancel: &Cancellation,
) -> Result<usize> {
    let section = target.flash_section();
    check_fits(image, &section)?;

    let total = image.len();
    progress.verifying(total);
    log::info!("Verifying {} bytes", total);

    for (done, (offset, expected)) in image.iter().enumerate() {
        cancel.check("verify")?;
        let address = target_address(&section, offset)?;
        let actual = target.read_byte(address)?;
        if actual != expected {
            return Err(Error::VerificationFailed {
                address: u32::from(address),
                expected,
                actual,
            });
        }
        progress.progress(ratio(done + 1, total));
    }
    Ok(total)
}
