//! TPI link: connection handshake and register-level access

use std::time::Duration;

use super::{csr, frame, io, io_opcode, opcode};
use super::{MAX_CSR_ADDRESS, MAX_IO_ADDRESS, NVM_PROGRAM_ENABLE_KEY, SIGNATURE_ADDRESS, TPI_WRITE_MODE};
use crate::cancel::Cancellation;
use crate::channel::{self, RawChannel};
use crate::device::DeviceSignature;
use crate::error::{Error, Result};
use crate::mpsse::{GpioBank, MpsseCommandBuilder};

/// Physical-layer settings for [`TpiLink::connect`]
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// TCK divisor: TCK = 12 MHz / ((1 + divisor) * 2)
    pub clock_divisor: u16,
    /// Enable the divide-by-5 prescaler first (60 MHz "H" parts)
    pub enable_div5: bool,
    /// Delay after each edge of the reset pulse
    pub reset_settle: Duration,
    /// ADBUS direction mask while connected
    pub pin_direction: u8,
    /// ADBUS bit driving #RESET
    pub reset_mask: u8,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            clock_divisor: 4,
            enable_div5: false,
            reset_settle: Duration::from_millis(100),
            pin_direction: 0x1B,
            reset_mask: 0x10,
        }
    }
}

impl LinkConfig {
    /// TPICLK frequency in Hz
    pub fn clock_hz(&self) -> u32 {
        12_000_000 / ((1 + u32::from(self.clock_divisor)) * 2)
    }
}

/// Session state of a [`TpiLink`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No handshake has been performed
    NotConnected,
    /// NVM programming is enabled and the signature is known
    Connected(DeviceSignature),
    /// The session was closed; a new handshake is needed
    Disconnected,
}

/// A TPI session over an MPSSE channel
///
/// The link owns the channel for its whole lifetime. All operations are
/// strictly sequential: each one is a single MPSSE command written and
/// answered before the next is built.
pub struct TpiLink<C: RawChannel> {
    channel: C,
    config: LinkConfig,
    state: ConnectionState,
    pointer: Option<u16>,
}

impl<C: RawChannel> TpiLink<C> {
    /// Wrap a channel; no I/O is performed until [`connect`](Self::connect)
    pub fn new(channel: C, config: LinkConfig) -> Self {
        Self {
            channel,
            config,
            state: ConnectionState::NotConnected,
            pointer: None,
        }
    }

    /// Current session state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Signature read during the handshake, while connected
    pub fn signature(&self) -> Option<DeviceSignature> {
        match self.state {
            ConnectionState::Connected(sig) => Some(sig),
            _ => None,
        }
    }

    /// Whether the handshake has completed and the session is open
    pub fn is_connected(&self) -> bool {
        matches!(self.state, ConnectionState::Connected(_))
    }

    /// Last value written to the pointer register, advanced by post-increments
    pub fn pointer(&self) -> Option<u16> {
        self.pointer
    }

    /// Link configuration
    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Borrow the underlying channel
    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Mutably borrow the underlying channel
    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    /// Give the channel back
    pub fn into_inner(self) -> C {
        self.channel
    }

    fn run(&mut self, builder: &mut MpsseCommandBuilder) -> Result<Vec<u8>> {
        let command = builder.build();
        channel::execute(&mut self.channel, &command)
    }

    fn set_reset(&mut self, released: bool) -> Result<()> {
        let value = if released { self.config.reset_mask } else { 0x00 };
        let mut cmd = MpsseCommandBuilder::new();
        cmd.set_gpio(GpioBank::Low, value, self.config.pin_direction);
        self.run(&mut cmd)?;
        std::thread::sleep(self.config.reset_settle);
        Ok(())
    }

    /// Send frames back to back
    pub fn write_frames(&mut self, data: &[u8]) -> Result<()> {
        let mut cmd = MpsseCommandBuilder::with_capacity(data.len() * 6);
        for &byte in data {
            frame::append_write(&mut cmd, byte)?;
        }
        log::trace!("TPI tx {:02X?}", data);
        self.run(&mut cmd)?;
        Ok(())
    }

    /// Send one frame
    pub fn write_frame(&mut self, data: u8) -> Result<()> {
        self.write_frames(&[data])
    }

    /// Sample one inbound frame
    pub fn read_frame(&mut self, operation: &'static str, address: Option<u16>) -> Result<u8> {
        self.instruction_with_response(None, operation, address)
    }

    /// Optionally send an instruction, then receive its response frame in
    /// the same MPSSE transaction
    fn instruction_with_response(
        &mut self,
        instruction: Option<u8>,
        operation: &'static str,
        address: Option<u16>,
    ) -> Result<u8> {
        let mut cmd = MpsseCommandBuilder::new();
        if let Some(op) = instruction {
            frame::append_write(&mut cmd, op)?;
        }
        frame::append_read(&mut cmd)?;
        let response = self.run(&mut cmd)?;
        let data = frame::decode(&response).map_err(|kind| {
            log::debug!("{} failed: {} (raw {:02X?})", operation, kind, response);
            Error::Protocol {
                operation,
                address,
                kind,
            }
        })?;
        log::trace!("TPI rx {:02X} ({})", data, operation);
        Ok(data)
    }

    /// SIN: read an I/O space register
    pub fn io_in(&mut self, address: u8) -> Result<u8> {
        if address > MAX_IO_ADDRESS {
            return Err(Error::ArgumentOutOfRange("address"));
        }
        self.instruction_with_response(
            Some(io_opcode(opcode::SIN, address)),
            "SIN",
            Some(u16::from(address)),
        )
    }

    /// SOUT: write an I/O space register
    pub fn io_out(&mut self, address: u8, value: u8) -> Result<()> {
        if address > MAX_IO_ADDRESS {
            return Err(Error::ArgumentOutOfRange("address"));
        }
        self.write_frames(&[io_opcode(opcode::SOUT, address), value])
    }

    /// SLDCS: read a control/status register
    pub fn load_cs(&mut self, address: u8) -> Result<u8> {
        if address > MAX_CSR_ADDRESS {
            return Err(Error::ArgumentOutOfRange("address"));
        }
        self.instruction_with_response(
            Some(opcode::SLDCS | address),
            "SLDCS",
            Some(u16::from(address)),
        )
    }

    /// SSTCS: write a control/status register
    pub fn store_cs(&mut self, address: u8, value: u8) -> Result<()> {
        if address > MAX_CSR_ADDRESS {
            return Err(Error::ArgumentOutOfRange("address"));
        }
        self.write_frames(&[opcode::SSTCS | address, value])
    }

    /// SSTPR low then high: load the 16-bit pointer register
    pub fn set_pointer(&mut self, pointer: u16) -> Result<()> {
        let [low, high] = pointer.to_le_bytes();
        self.write_frames(&[opcode::SSTPR_LOW, low, opcode::SSTPR_HIGH, high])?;
        self.pointer = Some(pointer);
        Ok(())
    }

    /// SLD: read the data-space byte at the pointer
    pub fn load_indirect(&mut self, post_increment: bool) -> Result<u8> {
        let op = if post_increment {
            opcode::SLD_POST_INC
        } else {
            opcode::SLD
        };
        let data = self.instruction_with_response(Some(op), "SLD", self.pointer)?;
        if post_increment {
            self.pointer = self.pointer.map(|p| p.wrapping_add(1));
        }
        Ok(data)
    }

    /// SST: write the data-space byte at the pointer
    pub fn store_indirect(&mut self, value: u8, post_increment: bool) -> Result<()> {
        let op = if post_increment {
            opcode::SST_POST_INC
        } else {
            opcode::SST
        };
        self.write_frames(&[op, value])?;
        if post_increment {
            self.pointer = self.pointer.map(|p| p.wrapping_add(1));
        }
        Ok(())
    }

    /// SKEY followed by the NVM program enable key
    pub fn send_key(&mut self) -> Result<()> {
        let mut frames = Vec::with_capacity(1 + NVM_PROGRAM_ENABLE_KEY.len());
        frames.push(opcode::SKEY);
        frames.extend_from_slice(&NVM_PROGRAM_ENABLE_KEY);
        self.write_frames(&frames)
    }

    /// Reset the target into TPI mode, enable NVM programming and read its
    /// signature
    ///
    /// Any failure aborts the handshake; call again to retry from scratch.
    pub fn connect(&mut self) -> Result<DeviceSignature> {
        log::info!(
            "Connecting to TPI target at {} kHz",
            self.config.clock_hz() / 1000
        );
        self.state = ConnectionState::NotConnected;
        self.pointer = None;

        let mut cmd = MpsseCommandBuilder::new();
        if self.config.enable_div5 {
            cmd.clock_divide_by_5(true);
        }
        cmd.disable_loopback()
            .set_clock_divisor(self.config.clock_divisor);
        self.run(&mut cmd)?;

        log::debug!("Pulsing #RESET");
        self.set_reset(true)?;
        self.set_reset(false)?;

        // 16 idle clocks, then BREAK to clear any pending error state
        let mut cmd = MpsseCommandBuilder::new();
        cmd.write_bytes(TPI_WRITE_MODE, &[0xFF, 0xFF])?
            .write_bytes(TPI_WRITE_MODE, &[0x00, 0x80])?;
        self.run(&mut cmd)?;

        let id = self.load_cs(csr::TPIIR)?;
        log::debug!("TPIIR = 0x{:02X}", id);
        if id != csr::TPI_IDENTIFIER {
            return Err(Error::InvalidInterfaceId(id));
        }

        self.store_cs(csr::TPIPCR, csr::GUARD_TIME_2_BITS)?;
        log::debug!("Sending NVM program enable key");
        self.send_key()?;

        self.io_out(io::NVMCMD, 0x00)?;
        self.set_pointer(SIGNATURE_ADDRESS)?;
        let signature = DeviceSignature::new(
            self.load_indirect(true)?,
            self.load_indirect(true)?,
            self.load_indirect(true)?,
        );

        log::info!("Device signature: {}", signature);
        self.state = ConnectionState::Connected(signature);
        Ok(signature)
    }

    /// Leave programming mode and float all pins
    ///
    /// Clears NVMEN and polls TPISR until the target confirms. The link is
    /// marked disconnected even if a step fails.
    pub fn disconnect(&mut self, cancel: &Cancellation) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        log::debug!("Disabling NVM programming");

        let nvm = self.disable_nvm(cancel);
        let pins = self.release_pins();
        self.state = ConnectionState::Disconnected;
        self.pointer = None;

        nvm.and(pins)?;
        log::info!("Disconnected from target");
        Ok(())
    }

    fn disable_nvm(&mut self, cancel: &Cancellation) -> Result<()> {
        self.store_cs(csr::TPISR, 0x00)?;
        loop {
            cancel.check("disconnect")?;
            let status = self.load_cs(csr::TPISR)?;
            if status & csr::NVMEN == 0 {
                return Ok(());
            }
            std::thread::yield_now();
        }
    }

    /// Set both GPIO groups to inputs
    pub fn release_pins(&mut self) -> Result<()> {
        let mut cmd = MpsseCommandBuilder::new();
        cmd.set_gpio(GpioBank::Low, 0x00, 0x00)
            .set_gpio(GpioBank::High, 0x00, 0x00);
        self.run(&mut cmd)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DecodeError;

    /// Accepts everything and answers with an idle line
    #[derive(Default)]
    struct IdleLine {
        written: Vec<u8>,
    }

    impl RawChannel for IdleLine {
        fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
            self.written.extend_from_slice(data);
            Ok(data.len())
        }

        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            buf.fill(0xFF);
            Ok(buf.len())
        }
    }

    fn link() -> TpiLink<IdleLine> {
        TpiLink::new(IdleLine::default(), LinkConfig::default())
    }

    #[test]
    fn test_missing_response_names_register() {
        let mut link = link();
        let err = link.io_in(io::NVMCSR).unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol {
                operation: "SIN",
                address: Some(0x32),
                kind: DecodeError::NoFrameFound
            }
        ));
    }

    #[test]
    fn test_address_ranges() {
        let mut link = link();
        assert!(matches!(link.io_in(0x40), Err(Error::ArgumentOutOfRange(_))));
        assert!(matches!(link.io_out(0x40, 0), Err(Error::ArgumentOutOfRange(_))));
        assert!(matches!(link.load_cs(0x10), Err(Error::ArgumentOutOfRange(_))));
        assert!(matches!(link.store_cs(0x10, 0), Err(Error::ArgumentOutOfRange(_))));
        assert!(link.channel().written.is_empty());
    }

    #[test]
    fn test_pointer_tracking() {
        let mut link = link();
        assert_eq!(link.pointer(), None);
        link.set_pointer(0x4000).unwrap();
        link.store_indirect(0x12, true).unwrap();
        link.store_indirect(0x34, true).unwrap();
        assert_eq!(link.pointer(), Some(0x4002));
        link.store_indirect(0x00, false).unwrap();
        assert_eq!(link.pointer(), Some(0x4002));

        // SSTPR low: 0x68 framed as two bit-mode writes
        let [first, second] = frame::encode(opcode::SSTPR_LOW);
        assert_eq!(&link.channel().written[..6], &[0x1B, 7, first, 0x1B, 4, second]);
    }

    #[test]
    fn test_disconnect_requires_connection() {
        let mut link = link();
        assert!(matches!(
            link.disconnect(&Cancellation::new()),
            Err(Error::NotConnected)
        ));
        assert_eq!(link.state(), ConnectionState::NotConnected);
    }

    #[test]
    fn test_clock() {
        assert_eq!(LinkConfig::default().clock_hz(), 1_200_000);
    }
}
