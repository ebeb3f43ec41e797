//! Target side of the TPIDATA line, one clock at a time

use std::collections::VecDeque;

/// Start, 8 data, parity, 2 stop
const FRAME_BITS: u32 = 12;

/// Consecutive low bits that form a BREAK
const BREAK_BITS: u32 = 12;

/// Idle bits the target needs after #RESET goes low
const ENABLE_IDLE_BITS: u32 = 16;

/// How the next response frame should be damaged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFault {
    /// Flip the parity bit
    Parity,
    /// Pull both stop bits low
    StopBits,
}

/// What the receiver recognized on a clock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RxEvent {
    Frame(u8),
    Break,
    Error,
}

#[derive(Debug, Clone, Copy)]
enum RxState {
    /// Waiting for `needed` consecutive idle bits
    WaitIdle { needed: u32, seen: u32 },
    Idle,
    /// Collecting the 11 bits after the start bit
    Receiving { bits: u16, count: u32 },
    /// A bad frame was seen; only a BREAK recovers
    Error,
}

#[derive(Debug, Clone, Copy)]
struct Transmission {
    guard: u32,
    frame: u16,
    pos: u32,
}

pub(crate) struct SerialLine {
    enabled: bool,
    rx: RxState,
    zero_run: u32,
    queue: VecDeque<(u16, u32)>,
    tx: Option<Transmission>,
}

impl SerialLine {
    pub(crate) fn new() -> Self {
        Self {
            enabled: false,
            rx: RxState::Idle,
            zero_run: 0,
            queue: VecDeque::new(),
            tx: None,
        }
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// #RESET went low: listen once the line has idled long enough
    pub(crate) fn enable(&mut self) {
        self.enabled = true;
        self.rx = RxState::WaitIdle {
            needed: ENABLE_IDLE_BITS,
            seen: 0,
        };
        self.zero_run = 0;
        self.queue.clear();
        self.tx = None;
    }

    /// #RESET went high
    pub(crate) fn disable(&mut self) {
        self.enabled = false;
        self.queue.clear();
        self.tx = None;
    }

    /// Queue a response frame, sent after `guard` idle bits
    pub(crate) fn respond(&mut self, data: u8, guard: u32, fault: Option<ResponseFault>) {
        let parity = (data.count_ones() & 1) as u16;
        let mut frame = (u16::from(data) << 1) | (parity << 9) | (0b11 << 10);
        match fault {
            Some(ResponseFault::Parity) => frame ^= 1 << 9,
            Some(ResponseFault::StopBits) => frame &= !(0b11 << 10),
            None => {}
        }
        self.queue.push_back((frame, guard));
    }

    /// Advance one TPICLK period
    ///
    /// Returns the line level the programmer samples and anything the
    /// receiver completed on this clock.
    pub(crate) fn clock(&mut self, host_bit: bool) -> (bool, Option<RxEvent>) {
        if !self.enabled {
            return (host_bit, None);
        }
        match self.transmit_bit() {
            // The programmer only drives through a series resistor
            Some(bit) => (bit, None),
            None => (host_bit, self.receive_bit(host_bit)),
        }
    }

    /// The target's output on this clock, or `None` when not driving
    fn transmit_bit(&mut self) -> Option<bool> {
        if self.tx.is_none() {
            let (frame, guard) = self.queue.pop_front()?;
            self.tx = Some(Transmission {
                guard,
                frame,
                pos: 0,
            });
        }

        let tx = self.tx.as_mut()?;
        if tx.guard > 0 {
            tx.guard -= 1;
            return None;
        }
        let bit = (tx.frame >> tx.pos) & 1 == 1;
        tx.pos += 1;
        if tx.pos == FRAME_BITS {
            self.tx = None;
        }
        Some(bit)
    }

    fn receive_bit(&mut self, line: bool) -> Option<RxEvent> {
        if line {
            self.zero_run = 0;
        } else {
            self.zero_run += 1;
            if self.zero_run == BREAK_BITS {
                self.rx = RxState::WaitIdle { needed: 1, seen: 0 };
                return Some(RxEvent::Break);
            }
        }

        match self.rx {
            RxState::WaitIdle { needed, seen } => {
                self.rx = if !line {
                    RxState::WaitIdle { needed, seen: 0 }
                } else if seen + 1 >= needed {
                    RxState::Idle
                } else {
                    RxState::WaitIdle {
                        needed,
                        seen: seen + 1,
                    }
                };
                None
            }
            RxState::Idle => {
                if !line {
                    self.rx = RxState::Receiving { bits: 0, count: 0 };
                }
                None
            }
            RxState::Receiving { bits, count } => {
                let bits = bits | (u16::from(line) << count);
                let count = count + 1;
                if count < FRAME_BITS - 1 {
                    self.rx = RxState::Receiving { bits, count };
                    return None;
                }

                let data = (bits & 0xFF) as u8;
                let parity = u32::from((bits >> 8) & 1);
                let stops = (bits >> 9) & 0b11;
                if stops != 0b11 || (data.count_ones() + parity) % 2 != 0 {
                    self.rx = RxState::Error;
                    Some(RxEvent::Error)
                } else {
                    self.rx = RxState::Idle;
                    Some(RxEvent::Frame(data))
                }
            }
            RxState::Error => None,
        }
    }
}
