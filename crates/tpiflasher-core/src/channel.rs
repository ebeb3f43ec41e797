//! Raw byte channel to the MPSSE adapter

use std::io;

use crate::error::Result;
use crate::mpsse::MpsseCommand;

/// Blocking byte transport to an MPSSE engine
///
/// Both calls may transfer fewer bytes than requested. A return value of 0
/// means "nothing moved yet, try again"; it is not end-of-stream.
pub trait RawChannel {
    /// Write some of `data`, returning how many bytes were accepted
    fn write(&mut self, data: &[u8]) -> io::Result<usize>;

    /// Read into `buf`, returning how many bytes were filled
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

impl<T: RawChannel + ?Sized> RawChannel for Box<T> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        (**self).write(data)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read(buf)
    }
}

impl<T: RawChannel + ?Sized> RawChannel for &mut T {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        (**self).write(data)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read(buf)
    }
}

/// Write all of `data`, yielding while the channel accepts nothing
pub fn write_all<C: RawChannel + ?Sized>(channel: &mut C, data: &[u8]) -> Result<()> {
    let mut offset = 0;
    while offset < data.len() {
        let n = channel.write(&data[offset..])?;
        if n == 0 {
            std::thread::yield_now();
        }
        offset += n;
    }
    Ok(())
}

/// Fill `buf` completely, yielding while no data is available
pub fn read_exact<C: RawChannel + ?Sized>(channel: &mut C, buf: &mut [u8]) -> Result<()> {
    let mut offset = 0;
    while offset < buf.len() {
        let n = channel.read(&mut buf[offset..])?;
        if n == 0 {
            std::thread::yield_now();
        }
        offset += n;
    }
    Ok(())
}

/// Send a command and collect exactly its expected response
pub fn execute<C: RawChannel + ?Sized>(channel: &mut C, command: &MpsseCommand) -> Result<Vec<u8>> {
    write_all(channel, command.bytes())?;
    log::trace!("Sent {} bytes", command.bytes().len());

    let mut response = vec![0u8; command.expected_response_length()];
    if !response.is_empty() {
        read_exact(channel, &mut response)?;
        log::trace!("Received {} bytes", response.len());
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mpsse::{MpsseCommandBuilder, ShiftFlags};

    /// Loopback that moves at most one byte per call and stalls every other call
    struct Trickle {
        written: Vec<u8>,
        pending: Vec<u8>,
        stall: bool,
    }

    impl RawChannel for Trickle {
        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            self.stall = !self.stall;
            if self.stall {
                return Ok(0);
            }
            self.written.push(data[0]);
            Ok(1)
        }

        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.stall = !self.stall;
            if self.stall || self.pending.is_empty() {
                return Ok(0);
            }
            buf[0] = self.pending.remove(0);
            Ok(1)
        }
    }

    #[test]
    fn test_execute_retries_short_transfers() {
        let mut channel = Trickle {
            written: Vec::new(),
            pending: vec![0xAA, 0x55, 0x01],
            stall: false,
        };
        let mut builder = MpsseCommandBuilder::new();
        builder
            .exchange_bytes(ShiftFlags::EDGES, &[0xFF, 0xFF, 0xFF])
            .unwrap();
        let command = builder.build();

        let response = execute(&mut channel, &command).unwrap();
        assert_eq!(response, vec![0xAA, 0x55, 0x01]);
        assert_eq!(channel.written, command.bytes());
    }

    #[test]
    fn test_execute_propagates_io_error() {
        struct Broken;
        impl RawChannel for Broken {
            fn write(&mut self, _data: &[u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged"))
            }
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Ok(0)
            }
        }

        let mut builder = MpsseCommandBuilder::new();
        builder.send_immediate();
        let result = execute(&mut Broken, &builder.build());
        assert!(matches!(result, Err(crate::Error::Io(_))));
    }
}
