//! MPSSE command encoding
//!
//! The FTDI Multi-Protocol Synchronous Serial Engine is driven by a byte
//! stream of opcodes and operands. [`MpsseCommandBuilder`] appends
//! operations to such a stream and keeps count of how many bytes the engine
//! will send back, so the whole batch can be written in one transfer and
//! the response read in another.

use bitflags::bitflags;

use crate::error::{Error, Result};

/// Set data bits low byte (ADBUS)
pub const SET_BITS_LOW: u8 = 0x80;
/// Read data bits low byte
pub const GET_BITS_LOW: u8 = 0x81;
/// Set data bits high byte (ACBUS)
pub const SET_BITS_HIGH: u8 = 0x82;
/// Read data bits high byte
pub const GET_BITS_HIGH: u8 = 0x83;
/// Connect TDI to TDO internally
pub const LOOPBACK_START: u8 = 0x84;
/// Disconnect TDI/TDO loopback
pub const LOOPBACK_END: u8 = 0x85;
/// Set TCK clock divisor
pub const TCK_DIVISOR: u8 = 0x86;
/// Flush the response buffer back to the host
pub const SEND_IMMEDIATE: u8 = 0x87;
/// Disable divide-by-5 prescaler (60 MHz base clock)
pub const DIS_DIV_5: u8 = 0x8A;
/// Enable divide-by-5 prescaler (12 MHz base clock)
pub const EN_DIV_5: u8 = 0x8B;

/// Maximum length of one byte-mode shift
pub const MAX_BYTE_SHIFT: usize = 65536;
/// Maximum length of one bit-mode shift
pub const MAX_BIT_SHIFT: u8 = 8;
/// Maximum length of one TMS shift
pub const MAX_TMS_SHIFT: u8 = 6;

bitflags! {
    /// Bits of a data-shifting opcode
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShiftFlags: u8 {
        /// Shift data out on TMS instead of TDI
        const WRITE_TMS = 0x40;
        /// Sample TDO
        const READ_TDO = 0x20;
        /// Drive TDI
        const WRITE_TDI = 0x10;
        /// Shift LSB first
        const LSB_FIRST = 0x08;
        /// Sample on the falling clock edge
        const READ_NEG = 0x04;
        /// Length counts bits rather than bytes
        const BIT_MODE = 0x02;
        /// Change output on the falling clock edge
        const WRITE_NEG = 0x01;
    }
}

impl ShiftFlags {
    /// Flags callers may pass to select bit order and clock edges
    pub const EDGES: ShiftFlags = ShiftFlags::LSB_FIRST
        .union(ShiftFlags::READ_NEG)
        .union(ShiftFlags::WRITE_NEG);
}

/// Encode a data-shifting opcode from its seven flags
pub fn shift_opcode(
    write_tms: bool,
    read_tdo: bool,
    write_tdi: bool,
    lsb_first: bool,
    read_neg: bool,
    bit_mode: bool,
    write_neg: bool,
) -> u8 {
    let mut flags = ShiftFlags::empty();
    flags.set(ShiftFlags::WRITE_TMS, write_tms);
    flags.set(ShiftFlags::READ_TDO, read_tdo);
    flags.set(ShiftFlags::WRITE_TDI, write_tdi);
    flags.set(ShiftFlags::LSB_FIRST, lsb_first);
    flags.set(ShiftFlags::READ_NEG, read_neg);
    flags.set(ShiftFlags::BIT_MODE, bit_mode);
    flags.set(ShiftFlags::WRITE_NEG, write_neg);
    flags.bits()
}

/// GPIO group selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpioBank {
    /// ADBUS0..7 (shares pins with the shift engine)
    Low,
    /// ACBUS0..7
    High,
}

/// A finished batch of MPSSE operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MpsseCommand {
    bytes: Vec<u8>,
    expected_response_length: usize,
}

impl MpsseCommand {
    /// Encoded command stream
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of bytes the engine will return for this command
    pub fn expected_response_length(&self) -> usize {
        self.expected_response_length
    }

    /// Whether the command contains no operations
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Builder for [`MpsseCommand`]
#[derive(Debug, Clone, Default)]
pub struct MpsseCommandBuilder {
    buffer: Vec<u8>,
    expected_response_length: usize,
}

fn check_range(data: &[u8], index: usize, length: usize) -> Result<&[u8]> {
    if index >= data.len() {
        return Err(Error::ArgumentOutOfRange("index"));
    }
    if length == 0 || data.len() - index < length {
        return Err(Error::ArgumentOutOfRange("length"));
    }
    Ok(&data[index..index + length])
}

impl MpsseCommandBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty builder with room for `capacity` command bytes
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
            expected_response_length: 0,
        }
    }

    /// Bytes the engine will return for the operations added so far
    pub fn expected_response_length(&self) -> usize {
        self.expected_response_length
    }

    fn push_byte_shift(&mut self, flags: ShiftFlags, length: usize) -> Result<()> {
        if length == 0 || length > MAX_BYTE_SHIFT {
            return Err(Error::ArgumentOutOfRange("length"));
        }
        let encoded = (length - 1) as u16;
        self.buffer.push(flags.bits());
        self.buffer.extend_from_slice(&encoded.to_le_bytes());
        if flags.contains(ShiftFlags::READ_TDO) {
            self.expected_response_length += length;
        }
        Ok(())
    }

    fn push_bit_shift(&mut self, flags: ShiftFlags, length: u8) -> Result<()> {
        if length == 0 || length > MAX_BIT_SHIFT {
            return Err(Error::ArgumentOutOfRange("length"));
        }
        self.buffer.push((flags | ShiftFlags::BIT_MODE).bits());
        self.buffer.push(length - 1);
        if flags.contains(ShiftFlags::READ_TDO) {
            self.expected_response_length += 1;
        }
        Ok(())
    }

    /// Shift `data[index..index + length]` out on TDI without sampling
    pub fn write_bytes_at(
        &mut self,
        mode: ShiftFlags,
        data: &[u8],
        index: usize,
        length: usize,
    ) -> Result<&mut Self> {
        let data = check_range(data, index, length)?;
        let flags = ShiftFlags::WRITE_TDI
            | (mode & (ShiftFlags::LSB_FIRST | ShiftFlags::WRITE_NEG));
        self.push_byte_shift(flags, data.len())?;
        self.buffer.extend_from_slice(data);
        Ok(self)
    }

    /// Shift all of `data` out on TDI without sampling
    pub fn write_bytes(&mut self, mode: ShiftFlags, data: &[u8]) -> Result<&mut Self> {
        self.write_bytes_at(mode, data, 0, data.len())
    }

    /// Shift `data[index..index + length]` out while sampling TDO
    pub fn exchange_bytes_at(
        &mut self,
        mode: ShiftFlags,
        data: &[u8],
        index: usize,
        length: usize,
    ) -> Result<&mut Self> {
        let data = check_range(data, index, length)?;
        let flags = ShiftFlags::WRITE_TDI | ShiftFlags::READ_TDO | (mode & ShiftFlags::EDGES);
        self.push_byte_shift(flags, data.len())?;
        self.buffer.extend_from_slice(data);
        Ok(self)
    }

    /// Shift all of `data` out while sampling TDO
    pub fn exchange_bytes(&mut self, mode: ShiftFlags, data: &[u8]) -> Result<&mut Self> {
        self.exchange_bytes_at(mode, data, 0, data.len())
    }

    /// Sample `length` bytes from TDO without driving TDI
    pub fn read_bytes(&mut self, mode: ShiftFlags, length: usize) -> Result<&mut Self> {
        let flags = ShiftFlags::READ_TDO | (mode & (ShiftFlags::LSB_FIRST | ShiftFlags::READ_NEG));
        self.push_byte_shift(flags, length)?;
        Ok(self)
    }

    /// Shift the low `length` bits of `data` out on TDI
    pub fn write_bits(&mut self, mode: ShiftFlags, data: u8, length: u8) -> Result<&mut Self> {
        let flags = ShiftFlags::WRITE_TDI
            | (mode & (ShiftFlags::LSB_FIRST | ShiftFlags::WRITE_NEG));
        self.push_bit_shift(flags, length)?;
        self.buffer.push(data);
        Ok(self)
    }

    /// Shift the low `length` bits of `data` out while sampling TDO
    pub fn exchange_bits(&mut self, mode: ShiftFlags, data: u8, length: u8) -> Result<&mut Self> {
        let flags = ShiftFlags::WRITE_TDI | ShiftFlags::READ_TDO | (mode & ShiftFlags::EDGES);
        self.push_bit_shift(flags, length)?;
        self.buffer.push(data);
        Ok(self)
    }

    /// Sample `length` bits from TDO
    pub fn read_bits(&mut self, mode: ShiftFlags, length: u8) -> Result<&mut Self> {
        let flags = ShiftFlags::READ_TDO | (mode & (ShiftFlags::LSB_FIRST | ShiftFlags::READ_NEG));
        self.push_bit_shift(flags, length)?;
        Ok(self)
    }

    fn push_tms(
        &mut self,
        flags: ShiftFlags,
        tdi_level: bool,
        data: u8,
        length: u8,
    ) -> Result<&mut Self> {
        if length == 0 || length > MAX_TMS_SHIFT {
            return Err(Error::ArgumentOutOfRange("length"));
        }
        self.buffer
            .push((flags | ShiftFlags::WRITE_TMS | ShiftFlags::LSB_FIRST).bits());
        self.buffer.push(length - 1);
        self.buffer
            .push((data & 0x7F) | if tdi_level { 0x80 } else { 0x00 });
        if flags.contains(ShiftFlags::READ_TDO) {
            self.expected_response_length += 1;
        }
        Ok(self)
    }

    /// Shift `length` bits of `data` out on TMS, holding TDI at `tdi_level`
    pub fn write_tms(
        &mut self,
        mode: ShiftFlags,
        tdi_level: bool,
        data: u8,
        length: u8,
    ) -> Result<&mut Self> {
        self.push_tms(mode & ShiftFlags::WRITE_NEG, tdi_level, data, length)
    }

    /// Shift bits out on TMS while sampling TDO
    pub fn exchange_tms(
        &mut self,
        mode: ShiftFlags,
        tdi_level: bool,
        data: u8,
        length: u8,
    ) -> Result<&mut Self> {
        let flags = ShiftFlags::READ_TDO | (mode & (ShiftFlags::READ_NEG | ShiftFlags::WRITE_NEG));
        self.push_tms(flags, tdi_level, data, length)
    }

    /// Drive a GPIO group: `value` levels on the pins selected by `direction`
    pub fn set_gpio(&mut self, bank: GpioBank, value: u8, direction: u8) -> &mut Self {
        let opcode = match bank {
            GpioBank::Low => SET_BITS_LOW,
            GpioBank::High => SET_BITS_HIGH,
        };
        self.buffer.extend_from_slice(&[opcode, value, direction]);
        self
    }

    /// Sample a GPIO group (one response byte)
    pub fn read_gpio(&mut self, bank: GpioBank) -> &mut Self {
        self.buffer.push(match bank {
            GpioBank::Low => GET_BITS_LOW,
            GpioBank::High => GET_BITS_HIGH,
        });
        self.expected_response_length += 1;
        self
    }

    /// Set TCK = base / ((1 + divisor) * 2)
    pub fn set_clock_divisor(&mut self, divisor: u16) -> &mut Self {
        self.buffer.push(TCK_DIVISOR);
        self.buffer.extend_from_slice(&divisor.to_le_bytes());
        self
    }

    /// Enable or disable the divide-by-5 prescaler of H-series parts
    pub fn clock_divide_by_5(&mut self, enable: bool) -> &mut Self {
        self.buffer.push(if enable { EN_DIV_5 } else { DIS_DIV_5 });
        self
    }

    /// Disconnect the internal TDI/TDO loopback
    pub fn disable_loopback(&mut self) -> &mut Self {
        self.buffer.push(LOOPBACK_END);
        self
    }

    /// Ask the engine to flush its response buffer now
    pub fn send_immediate(&mut self) -> &mut Self {
        self.buffer.push(SEND_IMMEDIATE);
        self
    }

    /// Finish the batch, leaving the builder empty
    pub fn build(&mut self) -> MpsseCommand {
        MpsseCommand {
            bytes: std::mem::take(&mut self.buffer),
            expected_response_length: std::mem::take(&mut self.expected_response_length),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shift_opcode_all_combinations() {
        for bits in 0u8..128 {
            let flag = |mask: u8| bits & mask != 0;
            let opcode = shift_opcode(
                flag(0x40),
                flag(0x20),
                flag(0x10),
                flag(0x08),
                flag(0x04),
                flag(0x02),
                flag(0x01),
            );
            assert_eq!(opcode, bits);
        }
    }

    #[test]
    fn test_byte_write_encoding() {
        let mut builder = MpsseCommandBuilder::new();
        builder
            .write_bytes(ShiftFlags::LSB_FIRST | ShiftFlags::WRITE_NEG, &[0xFF, 0xFF])
            .unwrap();
        let cmd = builder.build();
        assert_eq!(cmd.bytes(), &[0x19, 0x01, 0x00, 0xFF, 0xFF]);
        assert_eq!(cmd.expected_response_length(), 0);
    }

    #[test]
    fn test_exchange_counts_response() {
        let mut builder = MpsseCommandBuilder::new();
        builder
            .exchange_bytes(ShiftFlags::EDGES, &[0xFF; 19])
            .unwrap()
            .exchange_bits(ShiftFlags::EDGES, 0xFF, 3)
            .unwrap()
            .read_bytes(ShiftFlags::LSB_FIRST, 4)
            .unwrap()
            .read_gpio(GpioBank::Low);
        let cmd = builder.build();
        assert_eq!(cmd.bytes()[0], 0x3D);
        assert_eq!(&cmd.bytes()[1..3], &[18, 0]);
        assert_eq!(cmd.expected_response_length(), 19 + 1 + 4 + 1);
    }

    #[test]
    fn test_bit_write_encoding() {
        let mut builder = MpsseCommandBuilder::new();
        builder
            .write_bits(ShiftFlags::LSB_FIRST | ShiftFlags::WRITE_NEG, 0xA5, 8)
            .unwrap()
            .write_bits(ShiftFlags::LSB_FIRST | ShiftFlags::WRITE_NEG, 0x1A, 5)
            .unwrap();
        let cmd = builder.build();
        assert_eq!(cmd.bytes(), &[0x1B, 7, 0xA5, 0x1B, 4, 0x1A]);
    }

    #[test]
    fn test_length_limits() {
        let mut builder = MpsseCommandBuilder::new();
        assert!(builder.write_bits(ShiftFlags::empty(), 0, 0).is_err());
        assert!(builder.write_bits(ShiftFlags::empty(), 0, 9).is_err());
        assert!(builder.read_bytes(ShiftFlags::empty(), 0).is_err());
        assert!(builder.read_bytes(ShiftFlags::empty(), 65537).is_err());
        assert!(builder.write_tms(ShiftFlags::empty(), false, 0, 7).is_err());
        assert!(builder.write_bytes(ShiftFlags::empty(), &[]).is_err());
        assert!(builder.write_bytes_at(ShiftFlags::empty(), &[1, 2], 2, 1).is_err());
        assert!(builder.write_bytes_at(ShiftFlags::empty(), &[1, 2], 1, 2).is_err());
        assert!(builder.build().is_empty());

        builder.read_bytes(ShiftFlags::empty(), 65536).unwrap();
        let cmd = builder.build();
        assert_eq!(cmd.bytes(), &[0x20, 0xFF, 0xFF]);
        assert_eq!(cmd.expected_response_length(), 65536);
    }

    #[test]
    fn test_tms_encoding() {
        let mut builder = MpsseCommandBuilder::new();
        builder
            .write_tms(ShiftFlags::WRITE_NEG, true, 0xFF, 6)
            .unwrap()
            .exchange_tms(ShiftFlags::READ_NEG, false, 0x01, 1)
            .unwrap();
        let cmd = builder.build();
        assert_eq!(cmd.bytes(), &[0x49, 5, 0xFF, 0x6C, 0, 0x01]);
        assert_eq!(cmd.expected_response_length(), 1);
    }

    #[test]
    fn test_control_opcodes() {
        let mut builder = MpsseCommandBuilder::new();
        builder
            .clock_divide_by_5(true)
            .disable_loopback()
            .set_clock_divisor(4)
            .set_gpio(GpioBank::Low, 0x10, 0x1B)
            .set_gpio(GpioBank::High, 0x00, 0x00)
            .send_immediate();
        let cmd = builder.build();
        assert_eq!(
            cmd.bytes(),
            &[0x8B, 0x85, 0x86, 0x04, 0x00, 0x80, 0x10, 0x1B, 0x82, 0x00, 0x00, 0x87]
        );
        assert_eq!(cmd.expected_response_length(), 0);
    }
}
