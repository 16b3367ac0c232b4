//! Blocking serial transport abstraction.
//!
//! The framed codec and everything above it only ever talks to a
//! [`SerialPort`] trait object — a single-threaded, synchronous
//! `Read + Write` with two independently configurable timeouts. This keeps
//! the core testable without real hardware ([`FakePort`]) and keeps the
//! async/non-blocking non-goal honest: there is no `Future` anywhere in this
//! crate.

use std::io::{self, Read, Write};
use std::time::Duration;

/// Reader-side baud-rate selector (0–4), matching the wire encoding used
/// when provisioning the coupler's own serial setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaudRate {
    B9600,
    B19200,
    B38400,
    B57600,
    B115200,
}

impl BaudRate {
    pub fn as_u32(self) -> u32 {
        match self {
            BaudRate::B9600 => 9600,
            BaudRate::B19200 => 19200,
            BaudRate::B38400 => 38400,
            BaudRate::B57600 => 57600,
            BaudRate::B115200 => 115200,
        }
    }

    /// 0–4, in the order listed in the protocol spec.
    pub fn reader_selector(self) -> u8 {
        match self {
            BaudRate::B9600 => 0,
            BaudRate::B19200 => 1,
            BaudRate::B38400 => 2,
            BaudRate::B57600 => 3,
            BaudRate::B115200 => 4,
        }
    }
}

/// A blocking byte-stream with independently configurable first-byte and
/// inter-byte read timeouts. `ExchangeRaw` (see [`crate::frame`]) is the
/// only consumer.
pub trait SerialPort: Read + Write {
    fn set_first_byte_timeout(&mut self, timeout: Duration) -> io::Result<()>;
    fn set_inter_byte_timeout(&mut self, timeout: Duration) -> io::Result<()>;
}

/// Real OS serial port, backed by `serial2`.
pub struct RealSerialPort {
    inner: serial2::SerialPort,
}

impl RealSerialPort {
    pub fn open(path: &str, baud: BaudRate) -> io::Result<Self> {
        let inner = serial2::SerialPort::open(path, baud.as_u32())?;
        Ok(Self { inner })
    }
}

impl Read for RealSerialPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Write for RealSerialPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl SerialPort for RealSerialPort {
    fn set_first_byte_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        // serial2 has a single read timeout; the two-phase receive protocol
        // in `frame.rs` re-sets it between the header read and the payload
        // read, so one knob suffices for both roles.
        self.inner.set_read_timeout(timeout)
    }

    fn set_inter_byte_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.inner.set_read_timeout(timeout)
    }
}

/// In-memory test double: pre-loaded response bytes, captured writes.
///
/// Mimics `serial2`'s timeout convention: a read that times out before
/// filling the caller's buffer returns `Ok(n)` with `n` possibly less than
/// requested (never an error), so the two-phase receive logic in
/// `frame.rs` must infer stalls from a short read, not from `io::Error`.
#[cfg(test)]
pub struct FakePort {
    pub to_read: std::collections::VecDeque<u8>,
    pub written: Vec<u8>,
    pub last_first_byte_timeout: Option<Duration>,
    pub last_inter_byte_timeout: Option<Duration>,
}

#[cfg(test)]
impl FakePort {
    pub fn new(bytes: impl IntoIterator<Item = u8>) -> Self {
        Self {
            to_read: bytes.into_iter().collect(),
            written: Vec::new(),
            last_first_byte_timeout: None,
            last_inter_byte_timeout: None,
        }
    }

    pub fn empty() -> Self {
        Self::new(std::iter::empty())
    }
}

#[cfg(test)]
impl Read for FakePort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut n = 0;
        while n < buf.len() {
            match self.to_read.pop_front() {
                Some(b) => {
                    buf[n] = b;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }
}

#[cfg(test)]
impl Write for FakePort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
impl SerialPort for FakePort {
    fn set_first_byte_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.last_first_byte_timeout = Some(timeout);
        Ok(())
    }

    fn set_inter_byte_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.last_inter_byte_timeout = Some(timeout);
        Ok(())
    }
}
