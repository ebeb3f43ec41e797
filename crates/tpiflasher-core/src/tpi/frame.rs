//! Software UART framing over synchronous shifts
//!
//! Outbound, a frame is two bit-mode writes: one idle bit, the start bit
//! and data bits 0..5 in the first 8 clocks, then data bits 6..7, parity and
//! both stop bits in the next 5.
//!
//! Inbound, the target answers after its guard time, so the programmer
//! clocks out enough idle bits to cover the longest guard time plus one
//! frame and then searches the sampled bits for a start bit.

use super::{TPI_READ_MODE, TPI_WRITE_MODE};
use crate::error::{DecodeError, Result};
use crate::mpsse::MpsseCommandBuilder;

/// Idle bytes clocked while waiting for a response
///
/// 128 guard bits + 12 frame bits = 140 bits, rounded up to whole bytes.
pub const READ_WINDOW_LEN: usize = 19;

/// Number of low window bit positions searched for the start bit
const START_BIT_POSITIONS: u32 = 20;

const STOP_BITS: u32 = 0b11 << 10;

/// Even parity over `value` and an incoming parity bit
///
/// Returns 0 when the number of set bits is even.
pub fn even_parity(value: u8, parity: u8) -> u8 {
    let mut p = value ^ (parity & 1);
    p ^= p >> 4;
    p ^= p >> 2;
    p ^= p >> 1;
    p & 1
}

/// The two shift bytes for one outbound frame
pub fn encode(data: u8) -> [u8; 2] {
    let parity = even_parity(data, 0);
    // IDLE + START + DATA[0..5]
    let first = (data << 2) | 1;
    // DATA[6..7] + PARITY + SP1 + SP2
    let second = (data >> 6) | ((parity & 1) << 2) | 0x18;
    [first, second]
}

/// Append one outbound frame to `builder`
pub fn append_write(builder: &mut MpsseCommandBuilder, data: u8) -> Result<()> {
    let [first, second] = encode(data);
    builder
        .write_bits(TPI_WRITE_MODE, first, 8)?
        .write_bits(TPI_WRITE_MODE, second, 5)?;
    Ok(())
}

/// Append the idle-bit window that samples one inbound frame
pub fn append_read(builder: &mut MpsseCommandBuilder) -> Result<()> {
    builder.exchange_bytes(TPI_READ_MODE, &[0xFF; READ_WINDOW_LEN])?;
    Ok(())
}

/// Recover the data byte of the first frame in `response`
pub fn decode(response: &[u8]) -> std::result::Result<u8, DecodeError> {
    let head = response
        .iter()
        .position(|&b| b != 0xFF)
        .ok_or(DecodeError::NoFrameFound)?;
    if head + 1 >= response.len() {
        return Err(DecodeError::NoFrameFound);
    }

    // One byte of lead-in so a start bit near the top of the previous byte
    // boundary is still inside the window; bytes past the end read as idle.
    let start = head.saturating_sub(1);
    let mut window = [0xFFu8; 4];
    for (dst, src) in window.iter_mut().zip(&response[start..]) {
        *dst = *src;
    }
    let raw = u32::from_le_bytes(window);

    let offset = (0..START_BIT_POSITIONS)
        .find(|&bit| raw & (1 << bit) == 0)
        .ok_or(DecodeError::NoFrameFound)?;
    let frame = raw >> offset;

    if frame & STOP_BITS != STOP_BITS {
        return Err(DecodeError::FrameError);
    }

    let data = ((frame >> 1) & 0xFF) as u8;
    let parity = ((frame >> 9) & 1) as u8;
    if even_parity(data, parity) != 0 {
        return Err(DecodeError::ParityError);
    }

    Ok(data)
}
