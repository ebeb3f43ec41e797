//! TPI access layer and NVM controller of the simulated part

use tpiflasher_core::device::DeviceSignature;
use tpiflasher_core::nvm::NvmCommand;
use tpiflasher_core::tpi::{csr, io, opcode, NVM_PROGRAM_ENABLE_KEY, SIGNATURE_ADDRESS};

/// Idle bits before a response, indexed by TPIPCR.GT
const GUARD_BITS: [u32; 8] = [130, 66, 34, 18, 10, 6, 4, 2];

/// Counters exposed for assertions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimStats {
    /// Frames received without error
    pub frames_received: usize,
    /// Frames received with a parity or stop bit error
    pub frame_errors: usize,
    /// BREAK conditions seen
    pub breaks: usize,
    /// Chip erase operations performed
    pub chip_erases: usize,
    /// Section erase operations performed
    pub section_erases: usize,
    /// Words programmed
    pub word_writes: usize,
    /// NVMCSR reads that reported busy
    pub busy_polls: usize,
    /// NVM accesses issued while the controller was busy
    pub busy_violations: usize,
}

/// Operand the next frame is expected to carry
#[derive(Debug, Clone, Default)]
enum Operand {
    #[default]
    None,
    IoWrite(u8),
    CsWrite(u8),
    PointerLow,
    PointerHigh,
    Store {
        post_increment: bool,
    },
    Key(Vec<u8>),
}

pub(crate) struct TpiDevice {
    pub(crate) signature: DeviceSignature,
    pub(crate) interface_id: u8,
    pub(crate) flash_base: u16,
    pub(crate) flash: Vec<u8>,
    pub(crate) busy_polls: u32,
    pub(crate) stats: SimStats,
    operand: Operand,
    pointer: u16,
    nvm_enabled: bool,
    guard_time: u8,
    nvm_command: u8,
    busy: u32,
    latch: Option<(u16, u8)>,
}

impl TpiDevice {
    pub(crate) fn new(
        signature: DeviceSignature,
        interface_id: u8,
        flash_base: u16,
        flash_size: usize,
        busy_polls: u32,
    ) -> Self {
        Self {
            signature,
            interface_id,
            flash_base,
            flash: vec![0xFF; flash_size],
            busy_polls,
            stats: SimStats::default(),
            operand: Operand::None,
            pointer: 0,
            nvm_enabled: false,
            guard_time: 0,
            nvm_command: NvmCommand::NoOperation as u8,
            busy: 0,
            latch: None,
        }
    }

    /// Power-on state of the access layer; flash is kept
    pub(crate) fn reset(&mut self) {
        self.operand = Operand::None;
        self.pointer = 0;
        self.nvm_enabled = false;
        self.guard_time = 0;
        self.nvm_command = NvmCommand::NoOperation as u8;
        self.busy = 0;
        self.latch = None;
    }

    pub(crate) fn nvm_enabled(&self) -> bool {
        self.nvm_enabled
    }

    pub(crate) fn guard_bits(&self) -> u32 {
        GUARD_BITS[usize::from(self.guard_time & 0x07)]
    }

    pub(crate) fn on_break(&mut self) {
        self.stats.breaks += 1;
        self.operand = Operand::None;
    }

    pub(crate) fn on_frame_error(&mut self) {
        self.stats.frame_errors += 1;
        self.operand = Operand::None;
    }

    /// Handle one received frame; returns the byte to send back, if any
    pub(crate) fn on_frame(&mut self, data: u8) -> Option<u8> {
        self.stats.frames_received += 1;

        match std::mem::take(&mut self.operand) {
            Operand::None => self.instruction(data),
            Operand::IoWrite(address) => {
                if self.nvm_enabled {
                    self.io_write(address, data);
                }
                None
            }
            Operand::CsWrite(address) => {
                self.cs_write(address, data);
                None
            }
            Operand::PointerLow => {
                if self.nvm_enabled {
                    self.pointer = (self.pointer & 0xFF00) | u16::from(data);
                }
                None
            }
            Operand::PointerHigh => {
                if self.nvm_enabled {
                    self.pointer = (self.pointer & 0x00FF) | (u16::from(data) << 8);
                }
                None
            }
            Operand::Store { post_increment } => {
                if self.nvm_enabled {
                    self.write_data(self.pointer, data);
                    if post_increment {
                        self.pointer = self.pointer.wrapping_add(1);
                    }
                }
                None
            }
            Operand::Key(mut key) => {
                key.push(data);
                if key.len() < NVM_PROGRAM_ENABLE_KEY.len() {
                    self.operand = Operand::Key(key);
                } else if key == NVM_PROGRAM_ENABLE_KEY {
                    log::debug!("sim: NVM programming enabled");
                    self.nvm_enabled = true;
                } else {
                    log::debug!("sim: wrong key {:02X?}", key);
                }
                None
            }
        }
    }

    fn instruction(&mut self, op: u8) -> Option<u8> {
        let io_address = ((op >> 1) & 0x30) | (op & 0x0F);

        if op & 0x90 == opcode::SIN {
            return self.nvm_enabled.then(|| self.io_read(io_address));
        }
        if op & 0x90 == opcode::SOUT {
            self.operand = Operand::IoWrite(io_address);
            return None;
        }

        match op {
            opcode::SKEY => self.operand = Operand::Key(Vec::new()),
            _ if op & 0xF0 == opcode::SLDCS => return Some(self.cs_read(op & 0x0F)),
            _ if op & 0xF0 == opcode::SSTCS => self.operand = Operand::CsWrite(op & 0x0F),
            opcode::SLD | opcode::SLD_POST_INC => {
                if !self.nvm_enabled {
                    return None;
                }
                let value = self.read_data(self.pointer);
                if op == opcode::SLD_POST_INC {
                    self.pointer = self.pointer.wrapping_add(1);
                }
                return Some(value);
            }
            opcode::SST | opcode::SST_POST_INC => {
                self.operand = Operand::Store {
                    post_increment: op == opcode::SST_POST_INC,
                }
            }
            opcode::SSTPR_LOW => self.operand = Operand::PointerLow,
            opcode::SSTPR_HIGH => self.operand = Operand::PointerHigh,
            _ => log::warn!("sim: unknown instruction 0x{:02X}", op),
        }
        None
    }

    fn cs_read(&self, address: u8) -> u8 {
        match address {
            csr::TPISR if self.nvm_enabled => csr::NVMEN,
            csr::TPIPCR => self.guard_time,
            csr::TPIIR => self.interface_id,
            _ => 0x00,
        }
    }

    fn cs_write(&mut self, address: u8, value: u8) {
        match address {
            // NVMEN can only be cleared this way
            csr::TPISR => {
                if value & csr::NVMEN == 0 && self.nvm_enabled {
                    log::debug!("sim: NVM programming disabled");
                    self.nvm_enabled = false;
                }
            }
            csr::TPIPCR => self.guard_time = value & 0x07,
            _ => {}
        }
    }

    fn io_read(&mut self, address: u8) -> u8 {
        match address {
            io::NVMCSR => {
                if self.busy > 0 {
                    self.busy -= 1;
                    self.stats.busy_polls += 1;
                    io::NVMBSY
                } else {
                    0x00
                }
            }
            io::NVMCMD => self.nvm_command,
            _ => 0x00,
        }
    }

    fn io_write(&mut self, address: u8, value: u8) {
        if address == io::NVMCMD {
            if self.busy > 0 {
                self.busy_violation("NVMCMD write");
            }
            self.nvm_command = value & 0x3F;
        }
    }

    fn flash_index(&self, address: u16) -> Option<usize> {
        let offset = usize::from(address.checked_sub(self.flash_base)?);
        (offset < self.flash.len()).then_some(offset)
    }

    fn read_data(&self, address: u16) -> u8 {
        if let Some(index) = self.flash_index(address) {
            return self.flash[index];
        }
        match address.checked_sub(SIGNATURE_ADDRESS) {
            Some(i @ 0..=2) => self.signature.0[usize::from(i)],
            _ => 0x00,
        }
    }

    fn write_data(&mut self, address: u16, value: u8) {
        let Some(index) = self.flash_index(address) else {
            log::trace!("sim: ignoring store to 0x{:04X}", address);
            return;
        };
        if self.busy > 0 {
            self.busy_violation("flash store");
            return;
        }

        match self.nvm_command {
            c if c == NvmCommand::ChipErase as u8 => {
                self.flash.fill(0xFF);
                self.stats.chip_erases += 1;
                self.busy = self.busy_polls;
            }
            c if c == NvmCommand::SectionErase as u8 => {
                self.flash.fill(0xFF);
                self.stats.section_erases += 1;
                self.busy = self.busy_polls;
            }
            c if c == NvmCommand::WordWrite as u8 => {
                if address & 1 == 0 {
                    self.latch = Some((address, value));
                    return;
                }
                let low = match self.latch.take() {
                    Some((latched, low)) if latched + 1 == address => low,
                    _ => 0xFF,
                };
                let Some(low_index) = index.checked_sub(1) else {
                    return;
                };
                // Programming can only clear bits
                self.flash[low_index] &= low;
                self.flash[index] &= value;
                self.stats.word_writes += 1;
                self.busy = self.busy_polls;
            }
            _ => log::trace!("sim: store to flash without NVM command"),
        }
    }

    fn busy_violation(&mut self, what: &str) {
        log::warn!("sim: {} while NVM busy", what);
        self.stats.busy_violations += 1;
    }
}
