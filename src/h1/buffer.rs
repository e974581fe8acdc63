//! Incremental byte buffers.
//!
//! [`ReadBuffer`] never blocks, a read either succeeds completely or leaves the buffer untouched,
//! so it can be driven one readiness event at a time.
use std::io;

use bytes::{Buf, Bytes, BytesMut};

const DEFAULT_CAPACITY: usize = 512;

/// Default maximum size of a single write handed to the sink.
pub const DEFAULT_WRITE_SIZE: usize = 64 * 1024;

// ===== ReadBuffer =====

/// Append-only byte accumulator with all-or-nothing reads.
#[derive(Debug, Default)]
pub struct ReadBuffer {
    buffer: BytesMut,
}

impl ReadBuffer {
    pub fn new() -> Self {
        Self { buffer: BytesMut::with_capacity(DEFAULT_CAPACITY) }
    }

    /// Append received bytes.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Returns the number of buffered bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Consume exactly `n` bytes, or nothing if fewer are buffered.
    pub fn read(&mut self, n: usize) -> Option<Bytes> {
        if self.buffer.len() < n {
            return None;
        }
        Some(self.buffer.split_to(n).freeze())
    }

    /// Consume bytes up to and including the first `delimiter`, or nothing if it is not buffered
    /// yet.
    pub fn read_until(&mut self, delimiter: &[u8]) -> Option<Bytes> {
        if delimiter.is_empty() {
            return Some(Bytes::new());
        }
        let at = self
            .buffer
            .windows(delimiter.len())
            .position(|window| window == delimiter)?;
        Some(self.buffer.split_to(at + delimiter.len()).freeze())
    }

    /// Consume one LF terminated line of at most `max` bytes.
    ///
    /// When no LF is found within the first `max` bytes and at least `max` bytes are buffered,
    /// exactly `max` bytes are returned so the caller can detect the overlong line.
    pub fn read_line(&mut self, max: usize) -> Option<Bytes> {
        let window = &self.buffer[..self.buffer.len().min(max)];
        match window.iter().position(|&b| b == b'\n') {
            Some(lf) => Some(self.buffer.split_to(lf + 1).freeze()),
            None if self.buffer.len() >= max => Some(self.buffer.split_to(max).freeze()),
            None => None,
        }
    }

    /// Consume everything buffered.
    pub fn read_all(&mut self) -> Bytes {
        self.buffer.split().freeze()
    }
}

// ===== WriteBuffer =====

/// Pending outgoing bytes, handed to a non-blocking sink in bounded segments.
#[derive(Debug)]
pub struct WriteBuffer {
    data: Bytes,
    write_size: usize,
}

impl WriteBuffer {
    pub fn new(data: Bytes) -> Self {
        Self::with_write_size(data, DEFAULT_WRITE_SIZE)
    }

    pub fn with_write_size(data: Bytes, write_size: usize) -> Self {
        Self { data, write_size: write_size.max(1) }
    }

    /// Returns the number of bytes not yet accepted by the sink.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Hand bytes to `sink` until everything is written or the sink accepts nothing.
    ///
    /// Errors from the sink, including [`io::ErrorKind::WouldBlock`], are returned as is, bytes
    /// accepted before the error stay consumed.
    pub fn write_with<F>(&mut self, mut sink: F) -> io::Result<usize>
    where
        F: FnMut(&[u8]) -> io::Result<usize>,
    {
        let mut written = 0;

        while !self.data.is_empty() {
            let end = self.data.len().min(self.write_size);
            let n = sink(&self.data[..end])?;
            if n == 0 {
                break;
            }
            self.data.advance(n.min(end));
            written += n.min(end);
        }

        Ok(written)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_read_exactly() {
        let mut buf = ReadBuffer::new();
        buf.feed(b"hel");
        assert_eq!(buf.read(5), None);
        assert_eq!(buf.len(), 3);

        buf.feed(b"lo world");
        assert_eq!(buf.read(5).as_deref(), Some(&b"hello"[..]));
        assert_eq!(buf.read(0).as_deref(), Some(&b""[..]));
        assert_eq!(buf.read_all().as_ref(), b" world");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_read_until() {
        let mut buf = ReadBuffer::new();
        buf.feed(b"a\r");
        assert_eq!(buf.read_until(b"\r\n"), None);

        buf.feed(b"\nb\r\n");
        assert_eq!(buf.read_until(b"\r\n").as_deref(), Some(&b"a\r\n"[..]));
        assert_eq!(buf.read_until(b"\r\n").as_deref(), Some(&b"b\r\n"[..]));
        assert_eq!(buf.read_until(b"\r\n"), None);
    }

    #[test]
    fn test_read_line() {
        let mut buf = ReadBuffer::new();
        buf.feed(b"GET / HT");
        assert_eq!(buf.read_line(64), None);

        buf.feed(b"TP/1.1\r\nHost");
        assert_eq!(buf.read_line(64).as_deref(), Some(&b"GET / HTTP/1.1\r\n"[..]));
        assert_eq!(buf.read_line(64), None);

        // no LF within the limit
        assert_eq!(buf.read_line(3).as_deref(), Some(&b"Hos"[..]));
        assert_eq!(buf.read_all().as_ref(), b"t");

        buf.feed(b"abcdef\n");
        assert_eq!(buf.read_line(7).as_deref(), Some(&b"abcdef\n"[..]));
    }

    #[test]
    fn test_write_with() {
        let mut out = Vec::new();
        let mut wb = WriteBuffer::with_write_size(Bytes::from_static(b"hello world"), 4);

        // accept at most 3 bytes per call, then stall
        let mut budget = 2;
        let n = wb
            .write_with(|chunk| {
                if budget == 0 {
                    return Err(io::ErrorKind::WouldBlock.into());
                }
                budget -= 1;
                let n = chunk.len().min(3);
                out.extend_from_slice(&chunk[..n]);
                Ok(n)
            })
            .unwrap_err();
        assert_eq!(n.kind(), io::ErrorKind::WouldBlock);
        assert_eq!(out, b"hello ");
        assert_eq!(wb.remaining(), 5);

        let n = wb
            .write_with(|chunk| {
                out.extend_from_slice(chunk);
                Ok(chunk.len())
            })
            .unwrap();
        assert_eq!(n, 5);
        assert!(wb.is_empty());
        assert_eq!(out, b"hello world");
    }
}
