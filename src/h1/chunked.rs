//! Chunked transfer coding.
//!
//! ```text
//! chunked-body = *chunk last-chunk trailer-section CRLF
//! chunk        = chunk-size [ chunk-ext ] CRLF chunk-data CRLF
//! last-chunk   = 1*("0") [ chunk-ext ] CRLF
//! ```
//!
//! [httpwg](https://httpwg.org/specs/rfc9112.html#chunked.encoding)
use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::matches;

/// The zero sized chunk followed by an empty trailer section.
pub const LAST_CHUNK: &[u8] = b"0\r\n\r\n";

const MAX_CHUNK_SIZE: u64 = u64::MAX >> 1;

/// Default limit of a chunk-size line, extensions included.
pub const DEFAULT_MAX_SIZE_LINE: usize = 4096;

/// Default limit of the trailer section.
pub const DEFAULT_MAX_TRAILER_SIZE: usize = 64 * 1024;

// ===== Error =====

/// Malformed chunked body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkedError {
    /// chunk-size is not a hexadecimal number.
    InvalidChunkSize,
    /// chunk-size line exceeds the configured limit.
    SizeLineTooLong,
    /// chunk-size exceeds the configured limit.
    ChunkTooLarge,
    /// chunk-data is not followed by CRLF.
    MissingCrlf,
    /// Trailer section exceeds the configured limit.
    TrailerTooLarge,
}

impl std::error::Error for ChunkedError {}

impl std::fmt::Display for ChunkedError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(match self {
            Self::InvalidChunkSize => "invalid chunk size",
            Self::SizeLineTooLong => "chunk size line too long",
            Self::ChunkTooLarge => "chunk too large",
            Self::MissingCrlf => "missing CRLF after chunk data",
            Self::TrailerTooLarge => "trailer section too large",
        })
    }
}

/// Parse a complete chunk-size line, the line terminator included.
///
/// Chunk extensions are ignored.
pub fn parse_chunk_size(line: &[u8]) -> Result<u64, ChunkedError> {
    let Some(line) = line.strip_suffix(b"\r\n") else {
        return Err(ChunkedError::InvalidChunkSize);
    };

    let size = match line.iter().position(|&b| b == b';') {
        Some(semi) => &line[..semi],
        None => line,
    };
    let size = matches::trim_ows(size);

    // 16 hex digits overflow `MAX_CHUNK_SIZE` anyway
    if size.is_empty() || size.len() > 16 || !size.iter().all(u8::is_ascii_hexdigit) {
        return Err(ChunkedError::InvalidChunkSize);
    }

    let size = size
        .iter()
        .fold(0u64, |acc, &b| acc << 4 | (b as char).to_digit(16).unwrap_or(0) as u64);

    if size > MAX_CHUNK_SIZE {
        return Err(ChunkedError::ChunkTooLarge);
    }

    Ok(size)
}

// ===== Decoder =====

/// One decoding result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    /// Part of a chunk's data, a single chunk may be split across several results.
    Data(Bytes),
    /// The last chunk and the trailer section have been consumed.
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Size,
    Data(u64),
    DataCrlf,
    Trailer,
    Done,
}

/// Incremental chunked body decoder.
///
/// Bytes are consumed from the caller's buffer as they become decodable, bytes after the end of
/// the body are left in the buffer.
#[derive(Debug, Clone)]
pub struct ChunkedDecoder {
    phase: Phase,
    max_chunk_size: Option<u64>,
    max_size_line: usize,
    max_trailer_size: usize,
    trailers: BytesMut,
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        Self {
            phase: Phase::Size,
            max_chunk_size: None,
            max_size_line: DEFAULT_MAX_SIZE_LINE,
            max_trailer_size: DEFAULT_MAX_TRAILER_SIZE,
            trailers: BytesMut::new(),
        }
    }

    pub fn with_max_chunk_size(mut self, max: u64) -> Self {
        self.max_chunk_size = Some(max);
        self
    }

    pub fn with_max_size_line(mut self, max: usize) -> Self {
        self.max_size_line = max;
        self
    }

    pub fn with_max_trailer_size(mut self, max: usize) -> Self {
        self.max_trailer_size = max;
        self
    }

    /// Returns `true` if the whole body has been decoded.
    pub fn is_done(&self) -> bool {
        self.phase == Phase::Done
    }

    /// Returns the raw trailer section, terminated by the empty line, once decoding is done.
    ///
    /// The result can be validated with [`parse_trailers`].
    ///
    /// [`parse_trailers`]: crate::h1::parser::parse_trailers
    pub fn take_trailers(&mut self) -> Option<Bytes> {
        self.is_done().then(|| self.trailers.split().freeze())
    }

    /// Decode from `buffer`.
    ///
    /// Returns `Ok(None)` if more bytes are required.
    pub fn decode(&mut self, buffer: &mut BytesMut) -> Result<Option<Chunk>, ChunkedError> {
        loop {
            match self.phase {
                Phase::Size => {
                    let Some(line) = take_line(buffer, self.max_size_line)? else {
                        return Ok(None);
                    };
                    let size = parse_chunk_size(&line)?;
                    if self.max_chunk_size.is_some_and(|max| size > max) {
                        return Err(ChunkedError::ChunkTooLarge);
                    }
                    self.phase = match size {
                        0 => Phase::Trailer,
                        size => Phase::Data(size),
                    };
                }
                Phase::Data(remaining) => {
                    if buffer.is_empty() {
                        return Ok(None);
                    }
                    let n = remaining.min(buffer.len() as u64);
                    self.phase = match remaining - n {
                        0 => Phase::DataCrlf,
                        left => Phase::Data(left),
                    };
                    return Ok(Some(Chunk::Data(buffer.split_to(n as usize).freeze())));
                }
                Phase::DataCrlf => {
                    match buffer.first_chunk::<2>() {
                        Some(b"\r\n") => buffer.advance(2),
                        Some(_) => return Err(ChunkedError::MissingCrlf),
                        None if buffer.first().is_some_and(|&b| b != b'\r') => {
                            return Err(ChunkedError::MissingCrlf);
                        }
                        None => return Ok(None),
                    }
                    self.phase = Phase::Size;
                }
                Phase::Trailer => {
                    let limit = self.max_trailer_size.saturating_sub(self.trailers.len());
                    let Some(line) = take_line(buffer, limit).map_err(|_| ChunkedError::TrailerTooLarge)?
                    else {
                        return Ok(None);
                    };
                    self.trailers.extend_from_slice(&line);
                    if &line[..] == b"\r\n" {
                        self.phase = Phase::Done;
                        return Ok(Some(Chunk::End));
                    }
                }
                Phase::Done => return Ok(Some(Chunk::End)),
            }
        }
    }
}

/// Split one CRLF terminated line off `buffer`.
fn take_line(buffer: &mut BytesMut, max: usize) -> Result<Option<BytesMut>, ChunkedError> {
    match buffer.windows(2).position(|w| w == b"\r\n") {
        Some(at) if at + 2 > max => Err(ChunkedError::SizeLineTooLong),
        Some(at) => Ok(Some(buffer.split_to(at + 2))),
        None if buffer.len() > max => Err(ChunkedError::SizeLineTooLong),
        None => Ok(None),
    }
}

// ===== Encoder =====

/// Frame `data` as a single chunk.
///
/// Empty data would read as the last chunk, so it is encoded as nothing.
pub fn encode_chunk(data: &[u8]) -> Bytes {
    if data.is_empty() {
        return Bytes::new();
    }

    let mut buf = BytesMut::with_capacity(data.len() + 16 + 4);
    write_hex(data.len() as u64, &mut buf);
    buf.put_slice(b"\r\n");
    buf.put_slice(data);
    buf.put_slice(b"\r\n");
    buf.freeze()
}

fn write_hex(value: u64, buf: &mut BytesMut) {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";

    let mut digits = [0u8; 16];
    let mut i = digits.len();
    let mut value = value;
    loop {
        i -= 1;
        digits[i] = HEX[(value & 0xf) as usize];
        value >>= 4;
        if value == 0 {
            break;
        }
    }
    buf.put_slice(&digits[i..]);
}

#[cfg(test)]
mod test {
    use super::*;

    fn decode_all(decoder: &mut ChunkedDecoder, buffer: &mut BytesMut) -> Vec<Chunk> {
        let mut out = Vec::new();
        while let Some(chunk) = decoder.decode(buffer).unwrap() {
            let end = chunk == Chunk::End;
            out.push(chunk);
            if end {
                break;
            }
        }
        out
    }

    #[test]
    fn test_decode_single_chunk() {
        let mut buffer = BytesMut::from(&b"5\r\nhello\r\n0\r\n\r\n"[..]);
        let mut decoder = ChunkedDecoder::new();

        let chunks = decode_all(&mut decoder, &mut buffer);
        assert_eq!(chunks, [Chunk::Data(Bytes::from_static(b"hello")), Chunk::End]);
        assert!(buffer.is_empty());
        assert!(decoder.is_done());
        assert_eq!(decoder.take_trailers().as_deref(), Some(&b"\r\n"[..]));
    }

    #[test]
    fn test_decode_incremental() {
        let input = b"4;ext=1\r\nwiki\r\n5\r\npedia\r\n0\r\nX-Sum: 1\r\n\r\nGET";
        let mut decoder = ChunkedDecoder::new();
        let mut buffer = BytesMut::new();
        let mut body = Vec::new();
        let mut ended = false;

        for &byte in input {
            buffer.put_u8(byte);
            while let Some(chunk) = decoder.decode(&mut buffer).unwrap() {
                match chunk {
                    Chunk::Data(data) => body.extend_from_slice(&data),
                    Chunk::End => {
                        ended = true;
                        break;
                    }
                }
            }
            if ended {
                break;
            }
        }

        assert!(ended);
        assert_eq!(body, b"wikipedia");
        assert_eq!(decoder.take_trailers().as_deref(), Some(&b"X-Sum: 1\r\n\r\n"[..]));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_decode_leftover() {
        let mut buffer = BytesMut::from(&b"1\r\na\r\n0\r\n\r\nGET / HTTP/1.1"[..]);
        let mut decoder = ChunkedDecoder::new();
        let chunks = decode_all(&mut decoder, &mut buffer);
        assert_eq!(chunks.len(), 2);
        assert_eq!(&buffer[..], b"GET / HTTP/1.1");
    }

    #[test]
    fn test_decode_errors() {
        let cases: &[(&[u8], ChunkedError)] = &[
            (b"z\r\n", ChunkedError::InvalidChunkSize),
            (b"\r\n", ChunkedError::InvalidChunkSize),
            (b"3\r\nabcX", ChunkedError::MissingCrlf),
            (b"3\r\nabc\rX", ChunkedError::MissingCrlf),
            (b"11111111111111111\r\n", ChunkedError::InvalidChunkSize),
            (b"ffffffffffffffff\r\n", ChunkedError::ChunkTooLarge),
        ];

        for (input, expected) in cases {
            let mut buffer = BytesMut::from(*input);
            let mut decoder = ChunkedDecoder::new();
            let result = loop {
                match decoder.decode(&mut buffer) {
                    Ok(Some(Chunk::Data(_))) => continue,
                    other => break other,
                }
            };
            assert_eq!(result, Err(*expected), "input: {:?}", String::from_utf8_lossy(input));
        }

        let mut buffer = BytesMut::from(&b"10\r\n"[..]);
        let mut decoder = ChunkedDecoder::new().with_max_chunk_size(8);
        assert_eq!(decoder.decode(&mut buffer), Err(ChunkedError::ChunkTooLarge));

        let mut buffer = BytesMut::from(&b"1;aaaaaaaaaaaaaaaa"[..]);
        let mut decoder = ChunkedDecoder::new().with_max_size_line(8);
        assert_eq!(decoder.decode(&mut buffer), Err(ChunkedError::SizeLineTooLong));
    }

    #[test]
    fn test_encode_chunk() {
        assert_eq!(encode_chunk(b"hello").as_ref(), b"5\r\nhello\r\n");
        assert_eq!(encode_chunk(&[b'x'; 26]).as_ref()[..4], *b"1A\r\n");
        assert!(encode_chunk(b"").is_empty());

        let mut body = BytesMut::new();
        body.extend_from_slice(&encode_chunk(b"hello"));
        body.extend_from_slice(LAST_CHUNK);
        let chunks = decode_all(&mut ChunkedDecoder::new(), &mut body);
        assert_eq!(chunks, [Chunk::Data(Bytes::from_static(b"hello")), Chunk::End]);
    }
}
