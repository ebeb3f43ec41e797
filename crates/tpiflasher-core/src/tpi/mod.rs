//! Tiny Programming Interface
//!
//! TPI is a half-duplex asynchronous serial protocol on a single data line
//! (TPIDATA) clocked by the programmer (TPICLK). Every character is a
//! 12-bit frame: start bit, eight data bits LSB first, even parity, two
//! stop bits. The MPSSE engine only shifts synchronously, so frames are
//! built and recovered bit by bit in [`frame`].
//!
//! # Wiring
//!
//! | MPSSE pin | Signal  |
//! |-----------|---------|
//! | ADBUS0    | TPICLK  |
//! | ADBUS1    | TPIDATA (via resistor) |
//! | ADBUS2    | TPIDATA |
//! | ADBUS4    | #RESET  |

pub mod frame;
mod link;

pub use link::{ConnectionState, LinkConfig, TpiLink};

use crate::mpsse::ShiftFlags;

/// Shift mode for outbound frames: LSB first, change data on falling edge
pub const TPI_WRITE_MODE: ShiftFlags = ShiftFlags::LSB_FIRST.union(ShiftFlags::WRITE_NEG);

/// Shift mode for sampling: LSB first, both edges negative
pub const TPI_READ_MODE: ShiftFlags = ShiftFlags::EDGES;

/// Instruction opcodes
pub mod opcode {
    /// SLD: load data indirect
    pub const SLD: u8 = 0x20;
    /// SLD with pointer post-increment
    pub const SLD_POST_INC: u8 = 0x24;
    /// SST: store data indirect
    pub const SST: u8 = 0x60;
    /// SST with pointer post-increment
    pub const SST_POST_INC: u8 = 0x64;
    /// SSTPR: store pointer register low byte
    pub const SSTPR_LOW: u8 = 0x68;
    /// SSTPR: store pointer register high byte
    pub const SSTPR_HIGH: u8 = 0x69;
    /// SIN: read I/O space
    pub const SIN: u8 = 0x10;
    /// SOUT: write I/O space
    pub const SOUT: u8 = 0x90;
    /// SLDCS: load control/status register
    pub const SLDCS: u8 = 0x80;
    /// SSTCS: store control/status register
    pub const SSTCS: u8 = 0xC0;
    /// SKEY: key signaling
    pub const SKEY: u8 = 0xE0;
}

/// Control/status space registers
pub mod csr {
    /// TPI status register
    pub const TPISR: u8 = 0x00;
    /// TPI physical layer control register (guard time)
    pub const TPIPCR: u8 = 0x02;
    /// TPI identification register
    pub const TPIIR: u8 = 0x0F;
    /// NVM enabled flag in TPISR
    pub const NVMEN: u8 = 0x02;
    /// Value of TPIIR on every TPI device
    pub const TPI_IDENTIFIER: u8 = 0x80;
    /// TPIPCR value selecting the shortest guard time (2 idle bits)
    pub const GUARD_TIME_2_BITS: u8 = 0x07;
}

/// I/O space registers of the NVM controller
pub mod io {
    /// NVM control and status register
    pub const NVMCSR: u8 = 0x32;
    /// NVM command register
    pub const NVMCMD: u8 = 0x33;
    /// NVM busy flag in NVMCSR
    pub const NVMBSY: u8 = 0x80;
}

/// NVM programming enable key, in transmission order
pub const NVM_PROGRAM_ENABLE_KEY: [u8; 8] = [0xFF, 0x88, 0xD8, 0xCD, 0x45, 0xAB, 0x89, 0x12];

/// Data-space address of the signature row
pub const SIGNATURE_ADDRESS: u16 = 0x3FC0;

/// Highest I/O space address reachable with SIN/SOUT
pub const MAX_IO_ADDRESS: u8 = 0x3F;

/// Highest control/status space address
pub const MAX_CSR_ADDRESS: u8 = 0x0F;

/// SIN/SOUT opcode for an I/O address: `base | a[5:4] << 5 | a[3:0]`
pub fn io_opcode(base: u8, address: u8) -> u8 {
    base | ((address << 1) & 0x60) | (address & 0x0F)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_opcode() {
        assert_eq!(io_opcode(opcode::SIN, io::NVMCSR), 0x72);
        assert_eq!(io_opcode(opcode::SOUT, io::NVMCMD), 0xF3);
        assert_eq!(io_opcode(opcode::SIN, 0x00), 0x10);
        assert_eq!(io_opcode(opcode::SOUT, 0x3F), 0xFF);
    }
}
