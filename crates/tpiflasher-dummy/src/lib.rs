//! tpiflasher-dummy - Simulated TPI target for testing
//!
//! [`SimulatedTarget`] behaves like an FTDI adapter in MPSSE mode with an
//! ATtiny TPI part wired to it. It decodes the MPSSE byte stream, clocks
//! every shifted bit through a model of the TPIDATA line and answers the way
//! the part would, so the whole protocol stack can be tested without
//! hardware.
//!
//! The model covers the #RESET pin, the 16 idle bits needed to enable TPI,
//! BREAK, guard time, the NVM program enable key, NVMCMD/NVMCSR with a
//! configurable busy time, the signature row and a flash array that can
//! only have bits cleared by word writes.

#![warn(missing_docs)]

mod device;
mod serial;

use std::collections::VecDeque;
use std::io;

use tpiflasher_core::channel::RawChannel;
use tpiflasher_core::device::{DeviceSignature, FlashSection};
use tpiflasher_core::mpsse::{self, ShiftFlags};

use device::TpiDevice;
use serial::{RxEvent, SerialLine};

pub use device::SimStats;
pub use serial::ResponseFault;

/// Configuration for the simulated part
#[derive(Debug, Clone)]
pub struct SimulatedConfig {
    /// Signature row contents
    pub signature: DeviceSignature,
    /// TPIIR value (0x80 on real parts)
    pub interface_id: u8,
    /// Data-space address of flash
    pub flash_base: u16,
    /// Flash size in bytes
    pub flash_size: usize,
    /// NVMCSR reads reporting busy after each erase or word write
    pub busy_polls: u32,
    /// ADBUS bit mask of the #RESET pin
    pub reset_mask: u8,
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        Self {
            signature: DeviceSignature::new(0x1E, 0x90, 0x03), // ATtiny10
            interface_id: 0x80,
            flash_base: 0x4000,
            flash_size: 1024,
            busy_polls: 2,
            reset_mask: 0x10,
        }
    }
}

/// Simulated MPSSE adapter with a TPI target attached
pub struct SimulatedTarget {
    device: TpiDevice,
    line: SerialLine,
    reset_mask: u8,
    /// Bytes written but not yet forming a complete command
    pending: Vec<u8>,
    response: VecDeque<u8>,
    gpio_low: (u8, u8),
    gpio_high: (u8, u8),
    clock_divisor: u16,
    divide_by_5: bool,
    fault: Option<ResponseFault>,
    transfer_limit: Option<usize>,
    stalls: usize,
}

impl SimulatedTarget {
    /// Create a simulated target with the given configuration
    pub fn new(config: SimulatedConfig) -> Self {
        Self {
            device: TpiDevice::new(
                config.signature,
                config.interface_id,
                config.flash_base,
                config.flash_size,
                config.busy_polls,
            ),
            line: SerialLine::new(),
            reset_mask: config.reset_mask,
            pending: Vec::new(),
            response: VecDeque::new(),
            gpio_low: (0x00, 0x00),
            gpio_high: (0x00, 0x00),
            clock_divisor: 0,
            divide_by_5: true,
            fault: None,
            transfer_limit: None,
            stalls: 0,
        }
    }

    /// Create a simulated ATtiny10
    pub fn new_default() -> Self {
        Self::new(SimulatedConfig::default())
    }

    /// Get a reference to the flash data
    pub fn flash(&self) -> &[u8] {
        &self.device.flash
    }

    /// Get a mutable reference to the flash data
    pub fn flash_mut(&mut self) -> &mut [u8] {
        &mut self.device.flash
    }

    /// Flash section as a device database entry would describe it
    pub fn flash_section(&self) -> FlashSection {
        FlashSection {
            address: self.device.flash_base,
            size: self.device.flash.len() as u32,
        }
    }

    /// Signature the part reports
    pub fn signature(&self) -> DeviceSignature {
        self.device.signature
    }

    /// Counters since creation
    pub fn stats(&self) -> &SimStats {
        &self.device.stats
    }

    /// Whether #RESET is low and the TPI interface is active
    pub fn tpi_active(&self) -> bool {
        self.line.is_enabled()
    }

    /// Whether the NVM program enable key has been accepted
    pub fn nvm_enabled(&self) -> bool {
        self.device.nvm_enabled()
    }

    /// Idle bits currently inserted before each response
    pub fn guard_bits(&self) -> u32 {
        self.device.guard_bits()
    }

    /// Last TCK divisor written
    pub fn clock_divisor(&self) -> u16 {
        self.clock_divisor
    }

    /// Whether the divide-by-5 prescaler is enabled
    pub fn divide_by_5(&self) -> bool {
        self.divide_by_5
    }

    /// Damage the next response frame
    pub fn corrupt_next_response(&mut self, fault: ResponseFault) {
        self.fault = Some(fault);
    }

    /// Accept at most `limit` bytes per read or write call
    pub fn set_transfer_limit(&mut self, limit: Option<usize>) {
        self.transfer_limit = limit;
    }

    /// Make the next `count` read or write calls transfer nothing
    pub fn stall_next(&mut self, count: usize) {
        self.stalls += count;
    }

    fn reset_is_high(&self) -> bool {
        let (value, direction) = self.gpio_low;
        // Undriven, the pin is pulled up
        direction & self.reset_mask == 0 || value & self.reset_mask != 0
    }

    fn set_gpio_low(&mut self, value: u8, direction: u8) {
        let was_high = self.reset_is_high();
        self.gpio_low = (value, direction);
        let is_high = self.reset_is_high();

        if was_high && !is_high {
            log::debug!("sim: #RESET low, TPI enabled");
            self.device.reset();
            self.line.enable();
        } else if !was_high && is_high {
            log::debug!("sim: #RESET high, TPI disabled");
            self.device.reset();
            self.line.disable();
        }
    }

    /// Clock one bit through the line
    fn clock(&mut self, host_bit: bool) -> bool {
        let (level, event) = self.line.clock(host_bit);
        match event {
            Some(RxEvent::Frame(data)) => {
                if let Some(reply) = self.device.on_frame(data) {
                    let guard = self.device.guard_bits();
                    let fault = self.fault.take();
                    self.line.respond(reply, guard, fault);
                }
            }
            Some(RxEvent::Break) => self.device.on_break(),
            Some(RxEvent::Error) => self.device.on_frame_error(),
            None => {}
        }
        level
    }

    /// Shift `bits` bits of `data`; returns the sampled bits packed the way
    /// MPSSE returns them
    fn shift_bits(&mut self, data: u8, bits: u8, lsb_first: bool) -> u8 {
        let mut sampled = 0u8;
        for i in 0..bits {
            let host_bit = if lsb_first {
                (data >> i) & 1 == 1
            } else {
                (data >> (7 - i)) & 1 == 1
            };
            let level = u8::from(self.clock(host_bit));
            // Bits enter from the MSB end when shifting LSB first
            sampled = if lsb_first {
                (sampled >> 1) | (level << 7)
            } else {
                (sampled << 1) | level
            };
        }
        sampled
    }

    fn shift(&mut self, op: u8, args: &[u8]) {
        let flags = ShiftFlags::from_bits_truncate(op);
        let lsb_first = flags.contains(ShiftFlags::LSB_FIRST);
        let read = flags.contains(ShiftFlags::READ_TDO);

        if flags.contains(ShiftFlags::WRITE_TMS) {
            // TDI holds bit 7 for the whole TMS sequence
            let tdi = if args[1] & 0x80 != 0 { 0xFF } else { 0x00 };
            let sampled = self.shift_bits(tdi, (args[0] & 0x07) + 1, true);
            if read {
                self.response.push_back(sampled);
            }
        } else if flags.contains(ShiftFlags::BIT_MODE) {
            let data = if flags.contains(ShiftFlags::WRITE_TDI) {
                args[1]
            } else {
                0xFF
            };
            let sampled = self.shift_bits(data, (args[0] & 0x07) + 1, lsb_first);
            if read {
                self.response.push_back(sampled);
            }
        } else {
            let count = usize::from(u16::from_le_bytes([args[0], args[1]])) + 1;
            for k in 0..count {
                let data = if flags.contains(ShiftFlags::WRITE_TDI) {
                    args[2 + k]
                } else {
                    0xFF
                };
                let sampled = self.shift_bits(data, 8, lsb_first);
                if read {
                    self.response.push_back(sampled);
                }
            }
        }
    }

    fn execute(&mut self, cmd: &[u8]) {
        let op = cmd[0];
        match op {
            mpsse::SET_BITS_LOW => self.set_gpio_low(cmd[1], cmd[2]),
            mpsse::SET_BITS_HIGH => self.gpio_high = (cmd[1], cmd[2]),
            mpsse::GET_BITS_LOW => self.response.push_back(self.gpio_low.0),
            mpsse::GET_BITS_HIGH => self.response.push_back(self.gpio_high.0),
            mpsse::TCK_DIVISOR => self.clock_divisor = u16::from_le_bytes([cmd[1], cmd[2]]),
            mpsse::DIS_DIV_5 => self.divide_by_5 = false,
            mpsse::EN_DIV_5 => self.divide_by_5 = true,
            mpsse::LOOPBACK_START | mpsse::LOOPBACK_END | mpsse::SEND_IMMEDIATE => {}
            _ if op & 0x80 == 0 => self.shift(op, &cmd[1..]),
            _ => {
                log::warn!("sim: bad MPSSE command 0x{:02X}", op);
                self.response.extend([0xFA, op]);
            }
        }
    }

    /// Execute every complete command in the pending buffer
    fn drain(&mut self) {
        while let Some(len) = command_len(&self.pending) {
            if self.pending.len() < len {
                break;
            }
            let cmd: Vec<u8> = self.pending.drain(..len).collect();
            self.execute(&cmd);
        }
    }

    fn transfer_len(&mut self, requested: usize) -> usize {
        if self.stalls > 0 {
            self.stalls -= 1;
            return 0;
        }
        self.transfer_limit
            .map_or(requested, |limit| limit.min(requested))
    }
}

/// Total length of the command at the start of `buf`, once enough of it is
/// present to tell
fn command_len(buf: &[u8]) -> Option<usize> {
    let op = *buf.first()?;
    let len = match op {
        mpsse::SET_BITS_LOW | mpsse::SET_BITS_HIGH | mpsse::TCK_DIVISOR => 3,
        _ if op & 0x80 != 0 => 1,
        _ => {
            let flags = ShiftFlags::from_bits_truncate(op);
            let writes = flags.contains(ShiftFlags::WRITE_TDI);
            if flags.contains(ShiftFlags::WRITE_TMS) {
                3
            } else if flags.contains(ShiftFlags::BIT_MODE) {
                2 + usize::from(writes)
            } else {
                let count = usize::from(u16::from_le_bytes([*buf.get(1)?, *buf.get(2)?])) + 1;
                3 + if writes { count } else { 0 }
            }
        }
    };
    Some(len)
}

impl RawChannel for SimulatedTarget {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let n = self.transfer_len(data.len());
        self.pending.extend_from_slice(&data[..n]);
        self.drain();
        Ok(n)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.transfer_len(buf.len()).min(self.response.len());
        for (slot, byte) in buf.iter_mut().zip(self.response.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tpiflasher_core::cancel::Cancellation;
    use tpiflasher_core::device::DeviceDatabase;
    use tpiflasher_core::image::SparseImage;
    use tpiflasher_core::nvm::NvmController;
    use tpiflasher_core::program::{self, NoProgress, ProgramOptions};
    use tpiflasher_core::tpi::{ConnectionState, LinkConfig, TpiLink};
    use tpiflasher_core::{DecodeError, Error};

    use super::*;

    fn fast_link_config() -> LinkConfig {
        LinkConfig {
            reset_settle: Duration::ZERO,
            ..LinkConfig::default()
        }
    }

    fn connected(config: SimulatedConfig) -> NvmController<SimulatedTarget> {
        let target = SimulatedTarget::new(config);
        let section = target.flash_section();
        let mut link = TpiLink::new(target, fast_link_config());
        link.connect().unwrap();
        NvmController::new(link, section).unwrap()
    }

    fn target(nvm: &NvmController<SimulatedTarget>) -> &SimulatedTarget {
        nvm.link().channel()
    }

    #[test]
    fn test_handshake_reads_signature() {
        let signature = DeviceSignature::new(0x1E, 0x91, 0x0A);
        let sim = SimulatedTarget::new(SimulatedConfig {
            signature,
            ..SimulatedConfig::default()
        });
        let mut link = TpiLink::new(sim, fast_link_config());

        assert_eq!(link.connect().unwrap(), signature);
        assert_eq!(link.state(), ConnectionState::Connected(signature));

        let sim = link.channel();
        assert!(sim.tpi_active());
        assert!(sim.nvm_enabled());
        assert_eq!(sim.guard_bits(), 2);
        assert_eq!(sim.clock_divisor(), 4);
        assert_eq!(sim.stats().breaks, 1);
        assert_eq!(sim.stats().frame_errors, 0);
    }

    #[test]
    fn test_wrong_interface_id() {
        let sim = SimulatedTarget::new(SimulatedConfig {
            interface_id: 0x81,
            ..SimulatedConfig::default()
        });
        let mut link = TpiLink::new(sim, fast_link_config());
        assert!(matches!(link.connect(), Err(Error::InvalidInterfaceId(0x81))));
        assert!(!link.is_connected());
    }

    #[test]
    fn test_no_target_in_reset() {
        // #RESET on a pin the simulated part is not wired to
        let sim = SimulatedTarget::new(SimulatedConfig {
            reset_mask: 0x80,
            ..SimulatedConfig::default()
        });
        let mut link = TpiLink::new(sim, fast_link_config());
        let err = link.connect().unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol {
                operation: "SLDCS",
                kind: DecodeError::NoFrameFound,
                ..
            }
        ));
    }

    #[test]
    fn test_open_identifies_device() {
        let db = DeviceDatabase::builtin().unwrap();
        let link = TpiLink::new(SimulatedTarget::new_default(), fast_link_config());
        let (nvm, info) = NvmController::open(link, &db, Cancellation::new()).unwrap();
        assert_eq!(info.name, "ATtiny10");
        assert_eq!(nvm.section(), target(&nvm).flash_section());
    }

    #[test]
    fn test_open_unknown_device() {
        let db = DeviceDatabase::new();
        let link = TpiLink::new(SimulatedTarget::new_default(), fast_link_config());
        let err = NvmController::open(link, &db, Cancellation::new())
            .err()
            .unwrap();
        assert!(matches!(err, Error::UnknownDevice(sig) if sig.bytes() == [0x1E, 0x90, 0x03]));
    }

    #[test]
    fn test_chip_erase_is_idempotent() {
        let mut nvm = connected(SimulatedConfig::default());
        nvm.link_mut().channel_mut().flash_mut()[..4].copy_from_slice(&[0, 1, 2, 3]);

        nvm.chip_erase().unwrap();
        let once = target(&nvm).flash().to_vec();
        nvm.chip_erase().unwrap();
        assert_eq!(target(&nvm).flash(), &once[..]);
        assert!(once.iter().all(|&b| b == 0xFF));

        let stats = target(&nvm).stats();
        assert_eq!(stats.chip_erases, 2);
        assert_eq!(stats.busy_violations, 0);
    }

    #[test]
    fn test_section_erase() {
        let mut nvm = connected(SimulatedConfig::default());
        nvm.link_mut().channel_mut().flash_mut()[100] = 0x00;
        nvm.section_erase().unwrap();
        assert_eq!(target(&nvm).flash()[100], 0xFF);
        assert_eq!(target(&nvm).stats().section_erases, 1);
    }

    #[test]
    fn test_word_write_only_clears_bits() {
        let mut nvm = connected(SimulatedConfig::default());
        nvm.word_write(0x4010, 0xF0, 0x0F).unwrap();
        nvm.word_write(0x4010, 0x3C, 0xFF).unwrap();
        assert_eq!(&target(&nvm).flash()[0x10..0x12], &[0x30, 0x0F]);
        assert_eq!(nvm.read_range(0x4010, 2).unwrap(), vec![0x30, 0x0F]);
        assert_eq!(target(&nvm).stats().word_writes, 2);
    }

    #[test]
    fn test_busy_is_polled() {
        let mut nvm = connected(SimulatedConfig {
            busy_polls: 7,
            ..SimulatedConfig::default()
        });
        nvm.word_write(0x4000, 0x12, 0x34).unwrap();
        nvm.word_write(0x4002, 0x56, 0x78).unwrap();
        let stats = target(&nvm).stats();
        assert_eq!(stats.busy_polls, 14);
        assert_eq!(stats.busy_violations, 0);
    }

    #[test]
    fn test_busy_wait_times_out() {
        let mut nvm = connected(SimulatedConfig {
            busy_polls: u32::MAX,
            ..SimulatedConfig::default()
        })
        .with_cancellation(Cancellation::with_timeout(Duration::from_millis(50)));
        assert!(matches!(nvm.chip_erase(), Err(Error::Timeout(_))));
    }

    #[test]
    fn test_program_verify_disconnect() {
        let mut nvm = connected(SimulatedConfig::default());
        let mut image = SparseImage::default();
        image.write(0, &[0x0A, 0xC0, 0xFF, 0xCF]);
        image.insert(0x100, 0x55);

        let stats = program::program(
            &mut nvm,
            &image,
            &ProgramOptions::default(),
            &mut NoProgress,
            &Cancellation::new(),
        )
        .unwrap();
        assert_eq!(stats.words_written, 3);
        assert_eq!(stats.bytes_verified, 5);

        let sim = target(&nvm);
        assert_eq!(&sim.flash()[..4], &[0x0A, 0xC0, 0xFF, 0xCF]);
        assert_eq!(&sim.flash()[0x100..0x102], &[0x55, 0xFF]);
        assert!(!sim.nvm_enabled());
        assert!(!sim.tpi_active());
        assert_eq!(nvm.link().state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_lone_odd_byte_is_not_programmed() {
        let mut nvm = connected(SimulatedConfig::default());
        let mut image = SparseImage::default();
        image.write(0, &[0x12, 0x34]);
        image.insert(0x101, 0x55);

        let err = program::program(
            &mut nvm,
            &image,
            &ProgramOptions::default(),
            &mut NoProgress,
            &Cancellation::new(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            Error::VerificationFailed {
                address: 0x4101,
                expected: 0x55,
                actual: 0xFF
            }
        ));
        let sim = target(&nvm);
        assert_eq!(sim.stats().word_writes, 1);
        assert_eq!(&sim.flash()[0x100..0x102], &[0xFF, 0xFF]);
    }

    #[test]
    fn test_verify_detects_mismatch() {
        let mut nvm = connected(SimulatedConfig::default());
        nvm.link_mut().channel_mut().flash_mut()[2] = 0x00;
        let image = SparseImage::from_bytes(0, &[0xFF; 4], 0xFF);
        let err = program::verify(&mut nvm, &image, &mut NoProgress, &Cancellation::new())
            .unwrap_err();
        assert!(matches!(
            err,
            Error::VerificationFailed {
                address: 0x4002,
                expected: 0xFF,
                actual: 0x00
            }
        ));
    }

    #[test]
    fn test_short_transfers_and_stalls() {
        let mut sim = SimulatedTarget::new_default();
        sim.set_transfer_limit(Some(3));
        sim.stall_next(5);
        let mut link = TpiLink::new(sim, fast_link_config());
        assert_eq!(link.connect().unwrap(), DeviceSignature::new(0x1E, 0x90, 0x03));
    }

    #[test]
    fn test_corrupted_responses() {
        let mut nvm = connected(SimulatedConfig::default());

        nvm.link_mut()
            .channel_mut()
            .corrupt_next_response(ResponseFault::Parity);
        let err = nvm.read_byte(0x4000).unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol {
                operation: "SLD",
                address: Some(0x4000),
                kind: DecodeError::ParityError
            }
        ));

        nvm.link_mut()
            .channel_mut()
            .corrupt_next_response(ResponseFault::StopBits);
        let err = nvm.link_mut().io_in(0x32).unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol {
                kind: DecodeError::FrameError,
                ..
            }
        ));

        // The link itself is unharmed
        assert_eq!(nvm.read_range(0x3FC0, 3).unwrap(), vec![0x1E, 0x90, 0x03]);
    }

    #[test]
    fn test_gpio_readback_and_bad_command() {
        let mut sim = SimulatedTarget::new_default();
        sim.write(&[0x80, 0x5A, 0x1B, 0x81, 0xAB]).unwrap();
        let mut buf = [0u8; 3];
        assert_eq!(sim.read(&mut buf).unwrap(), 3);
        assert_eq!(buf, [0x5A, 0xFA, 0xAB]);
    }

    #[test]
    fn test_partial_command_is_buffered() {
        let mut sim = SimulatedTarget::new_default();
        sim.write(&[0x86, 0x09]).unwrap();
        assert_eq!(sim.clock_divisor(), 0);
        sim.write(&[0x00]).unwrap();
        assert_eq!(sim.clock_divisor(), 9);
    }
}
