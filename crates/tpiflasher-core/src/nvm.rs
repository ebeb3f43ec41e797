//! NVM controller access
//!
//! Flash is written one 16-bit word at a time through the NVM controller
//! in the target's I/O space. Every command waits for the controller to be
//! idle before it starts and again after it has been issued.

use crate::cancel::Cancellation;
use crate::channel::RawChannel;
use crate::device::{DeviceDatabase, DeviceInfo, FlashSection};
use crate::error::{Error, Result};
use crate::program::ProgrammingTarget;
use crate::tpi::{io, TpiLink};

/// NVM controller commands (NVMCMD values)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NvmCommand {
    /// No operation; reads are plain loads
    NoOperation = 0x00,
    /// Erase the whole flash section
    ChipErase = 0x10,
    /// Erase one section
    SectionErase = 0x14,
    /// Write one word from the latched bytes
    WordWrite = 0x1D,
}

/// NVM operations on a connected target
pub struct NvmController<C: RawChannel> {
    link: TpiLink<C>,
    section: FlashSection,
    cancel: Cancellation,
}

impl<C: RawChannel> NvmController<C> {
    /// Connect if needed and identify the device in `db`
    ///
    /// Fails with [`Error::UnknownDevice`] when the signature is not in the
    /// database; the link stays connected in that case and is dropped.
    pub fn open(
        mut link: TpiLink<C>,
        db: &DeviceDatabase,
        cancel: Cancellation,
    ) -> Result<(Self, DeviceInfo)> {
        let signature = match link.signature() {
            Some(sig) => sig,
            None => link.connect()?,
        };
        let info = db
            .lookup(signature)
            .cloned()
            .ok_or(Error::UnknownDevice(signature))?;
        log::info!(
            "Found {} {} ({} bytes flash at 0x{:04X})",
            info.vendor,
            info.name,
            info.flash.size,
            info.flash.address
        );
        let controller = Self {
            link,
            section: info.flash,
            cancel,
        };
        Ok((controller, info))
    }

    /// Wrap an already connected link with a known flash section
    pub fn new(link: TpiLink<C>, section: FlashSection) -> Result<Self> {
        if !link.is_connected() {
            return Err(Error::NotConnected);
        }
        Ok(Self {
            link,
            section,
            cancel: Cancellation::new(),
        })
    }

    /// Replace the cancellation token
    pub fn with_cancellation(mut self, cancel: Cancellation) -> Self {
        self.cancel = cancel;
        self
    }

    /// Flash section of the connected device
    pub fn section(&self) -> FlashSection {
        self.section
    }

    /// The underlying link
    pub fn link(&self) -> &TpiLink<C> {
        &self.link
    }

    /// The underlying link, mutably
    pub fn link_mut(&mut self) -> &mut TpiLink<C> {
        &mut self.link
    }

    /// Give the link back
    pub fn into_link(self) -> TpiLink<C> {
        self.link
    }

    /// Poll NVMCSR until the busy flag clears
    pub fn wait_not_busy(&mut self) -> Result<()> {
        let mut polls = 0u32;
        loop {
            self.cancel.check("NVM busy wait")?;
            let status = self.link.io_in(io::NVMCSR)?;
            if status & io::NVMBSY == 0 {
                if polls > 0 {
                    log::trace!("NVM ready after {} polls", polls);
                }
                return Ok(());
            }
            polls += 1;
        }
    }

    fn issue(&mut self, command: NvmCommand) -> Result<()> {
        log::debug!("NVMCMD <- {:?}", command);
        self.link.io_out(io::NVMCMD, command as u8)
    }

    fn erase(&mut self, command: NvmCommand) -> Result<()> {
        self.wait_not_busy()?;
        self.issue(command)?;
        // Any address inside the section selects it; use the high byte of the first word
        self.link.set_pointer(self.section.address | 1)?;
        self.link.store_indirect(0x00, false)?;
        self.wait_not_busy()
    }

    /// Erase the whole flash
    pub fn chip_erase(&mut self) -> Result<()> {
        self.erase(NvmCommand::ChipErase)
    }

    /// Erase the flash section
    pub fn section_erase(&mut self) -> Result<()> {
        self.erase(NvmCommand::SectionErase)
    }

    /// Write one word at a data-space address
    pub fn word_write(&mut self, address: u16, low: u8, high: u8) -> Result<()> {
        self.wait_not_busy()?;
        self.issue(NvmCommand::WordWrite)?;
        self.link.set_pointer(address)?;
        self.link.store_indirect(low, true)?;
        self.link.store_indirect(high, true)?;
        self.wait_not_busy()
    }

    /// Read one data-space byte, re-pointing only when needed
    pub fn read_byte(&mut self, address: u16) -> Result<u8> {
        if self.link.pointer() != Some(address) {
            self.link.set_pointer(address)?;
        }
        self.link.load_indirect(true)
    }

    /// Read `count` consecutive data-space bytes
    pub fn read_range(&mut self, address: u16, count: usize) -> Result<Vec<u8>> {
        if u64::from(address) + count as u64 > 0x1_0000 {
            return Err(Error::ArgumentOutOfRange("count"));
        }
        let mut data = Vec::with_capacity(count);
        self.link.set_pointer(address)?;
        for _ in 0..count {
            self.cancel.check("read")?;
            data.push(self.link.load_indirect(true)?);
        }
        Ok(data)
    }

    /// Read the whole flash section
    pub fn read_flash(&mut self) -> Result<Vec<u8>> {
        let count = self.section.size as usize;
        self.read_range(self.section.address, count)
    }

    /// Leave programming mode
    pub fn disconnect(&mut self) -> Result<()> {
        self.link.disconnect(&self.cancel)
    }
}

impl<C: RawChannel> ProgrammingTarget for NvmController<C> {
    fn flash_section(&self) -> FlashSection {
        self.section
    }

    fn chip_erase(&mut self) -> Result<()> {
        NvmController::chip_erase(self)
    }

    fn write_word(&mut self, address: u16, low: u8, high: u8) -> Result<()> {
        self.word_write(address, low, high)
    }

    fn read_byte(&mut self, address: u16) -> Result<u8> {
        NvmController::read_byte(self, address)
    }

    fn disconnect(&mut self) -> Result<()> {
        NvmController::disconnect(self)
    }
}
