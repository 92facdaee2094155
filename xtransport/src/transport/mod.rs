//! Transport layer abstraction.
//!
//! The protocol engine does not know USB CDC vs UART vs TCP; it only
//! knows this trait. `read_nonblocking` never blocks and returns a
//! byte count directly (0 meaning "nothing available" rather than an
//! error path), and `write_all` reports a wire [`Status`] rather than
//! an internal [`Error`] since a write failure is something the
//! caller may want to fold directly into a NAK.
//!
//! - `LoopbackTransport`: in-memory loopback for testing
//! - `NullTransport`: discards all data (testing, overhead measurement)
//! - `BufferedTransport`: adds buffering to any transport
//! - `StdTransport`: wraps `std::io::Read + std::io::Write` (requires `std`)

use crate::buffer::RingBuffer;
use crate::error::Status;

/// Byte-oriented transport abstraction.
pub trait Transport {
    /// Copies any immediately-available bytes into `buf` without
    /// blocking, returning how many were copied (0 if none).
    fn read_nonblocking(&mut self, buf: &mut [u8]) -> usize;

    /// Writes `buf` in full, blocking the caller until the transport
    /// has accepted every byte. Returns [`Status::Success`] on
    /// completion or [`Status::Failed`] if the transport cannot make
    /// progress.
    fn write_all(&mut self, buf: &[u8]) -> Status;

    /// Whether the transport currently accepts writes.
    fn ready(&self) -> bool;
}

/// A loopback transport for testing: data written is immediately
/// available to be read back.
#[derive(Debug)]
pub struct LoopbackTransport<const N: usize> {
    buffer: RingBuffer<N>,
}

impl<const N: usize> LoopbackTransport<N> {
    pub const fn new() -> Self {
        Self {
            buffer: RingBuffer::new(),
        }
    }

    pub const fn available(&self) -> usize {
        self.buffer.len()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl<const N: usize> Default for LoopbackTransport<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> Transport for LoopbackTransport<N> {
    fn read_nonblocking(&mut self, buf: &mut [u8]) -> usize {
        self.buffer.read(buf)
    }

    fn write_all(&mut self, buf: &[u8]) -> Status {
        match self.buffer.write_all(buf) {
            Ok(()) => Status::Success,
            Err(_) => Status::Overflow,
        }
    }

    fn ready(&self) -> bool {
        !self.buffer.is_full()
    }
}

/// A transport that discards all writes and never has data to read.
/// Useful for measuring dispatch overhead in isolation.
#[derive(Debug, Default)]
pub struct NullTransport {
    bytes_written: usize,
}

impl NullTransport {
    pub const fn new() -> Self {
        Self { bytes_written: 0 }
    }

    pub const fn bytes_written(&self) -> usize {
        self.bytes_written
    }

    pub fn reset(&mut self) {
        self.bytes_written = 0;
    }
}

impl Transport for NullTransport {
    fn read_nonblocking(&mut self, _buf: &mut [u8]) -> usize {
        0
    }

    fn write_all(&mut self, buf: &[u8]) -> Status {
        self.bytes_written += buf.len();
        Status::Success
    }

    fn ready(&self) -> bool {
        true
    }
}

/// Adds read/write buffering to any underlying transport.
#[derive(Debug)]
pub struct BufferedTransport<T, const RS: usize, const WS: usize> {
    inner: T,
    read_buf: RingBuffer<RS>,
    write_buf: RingBuffer<WS>,
}

impl<T: Transport, const RS: usize, const WS: usize> BufferedTransport<T, RS, WS> {
    pub const fn new(inner: T) -> Self {
        Self {
            inner,
            read_buf: RingBuffer::new(),
            write_buf: RingBuffer::new(),
        }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }

    fn fill_read_buffer(&mut self) {
        if self.read_buf.is_full() {
            return;
        }
        let mut temp = [0u8; 256];
        let n = self.inner.read_nonblocking(&mut temp);
        if n > 0 {
            self.read_buf.write(&temp[..n]);
        }
    }

    fn drain_write_buffer(&mut self) -> Status {
        let mut temp = [0u8; 256];
        while !self.write_buf.is_empty() {
            let n = self.write_buf.peek(&mut temp);
            let status = self.inner.write_all(&temp[..n]);
            if status != Status::Success {
                return status;
            }
            self.write_buf.skip(n);
        }
        Status::Success
    }
}

impl<T: Transport, const RS: usize, const WS: usize> Transport for BufferedTransport<T, RS, WS> {
    fn read_nonblocking(&mut self, buf: &mut [u8]) -> usize {
        self.fill_read_buffer();
        self.read_buf.read(buf)
    }

    fn write_all(&mut self, buf: &[u8]) -> Status {
        if self.write_buf.write_all(buf).is_err() {
            return Status::Overflow;
        }
        self.drain_write_buffer()
    }

    fn ready(&self) -> bool {
        self.inner.ready() && !self.write_buf.is_full()
    }
}

/// Wraps any `std::io::Read + std::io::Write` type, for host-side use
/// (e.g. a serial port or TCP socket) outside `no_std` targets.
#[cfg(feature = "std")]
#[derive(Debug)]
pub struct StdTransport<T> {
    inner: T,
}

#[cfg(feature = "std")]
impl<T> StdTransport<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

#[cfg(feature = "std")]
impl<T: std::io::Read + std::io::Write> Transport for StdTransport<T> {
    fn read_nonblocking(&mut self, buf: &mut [u8]) -> usize {
        match std::io::Read::read(&mut self.inner, buf) {
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => 0,
            Err(e) => {
                log::warn!("transport read error: {e}");
                0
            }
        }
    }

    fn write_all(&mut self, buf: &[u8]) -> Status {
        match std::io::Write::write_all(&mut self.inner, buf)
            .and_then(|()| std::io::Write::flush(&mut self.inner))
        {
            Ok(()) => Status::Success,
            Err(e) => {
                log::warn!("transport write error: {e}");
                Status::Failed
            }
        }
    }

    fn ready(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_reads_back_what_was_written() {
        let mut transport: LoopbackTransport<1024> = LoopbackTransport::new();
        assert_eq!(transport.write_all(b"Hello, World!"), Status::Success);

        let mut buf = [0u8; 32];
        let n = transport.read_nonblocking(&mut buf);
        assert_eq!(&buf[..n], b"Hello, World!");
    }

    #[test]
    fn null_transport_counts_writes_and_never_has_data() {
        let mut transport = NullTransport::new();
        assert_eq!(transport.write_all(b"Test data"), Status::Success);
        assert_eq!(transport.bytes_written(), 9);

        let mut buf = [0u8; 32];
        assert_eq!(transport.read_nonblocking(&mut buf), 0);
    }

    #[test]
    fn buffered_transport_roundtrips() {
        let inner: LoopbackTransport<1024> = LoopbackTransport::new();
        let mut transport: BufferedTransport<_, 256, 256> = BufferedTransport::new(inner);

        assert_eq!(transport.write_all(b"Buffered test"), Status::Success);

        let mut buf = [0u8; 32];
        let n = transport.read_nonblocking(&mut buf);
        assert_eq!(&buf[..n], b"Buffered test");
    }
}
