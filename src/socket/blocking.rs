//! Blocking connection.
use std::io::{self, BufRead, BufReader, Read, Write};
use std::sync::Arc;

use bytes::Bytes;

use super::SocketAddress;
use crate::h1::io::log_event;
use crate::h1::{CoroConfig, CoroServer, HandleResult, Io, LogEvent, Step};
use crate::handler::Handler;

/// Upper bound of the up front allocation for a body read.
const MAX_PREALLOC: usize = 64 * 1024;

type LogHook = Box<dyn Fn(&LogEvent) + Send + Sync>;

/// HTTP connection over blocking streams.
pub struct BlockingConnection {
    client_address: SocketAddress,
    handler: Arc<dyn Handler>,
    config: Arc<CoroConfig>,
    keep_alive: bool,
    log: LogHook,
}

impl BlockingConnection {
    pub fn new(
        client_address: SocketAddress,
        handler: Arc<dyn Handler>,
        config: Arc<CoroConfig>,
    ) -> Self {
        Self {
            client_address,
            handler,
            config,
            keep_alive: true,
            log: Box::new(log_event),
        }
    }

    /// Run further exchanges for as long as they keep the connection alive, enabled by default.
    pub fn with_keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// Replace the default logger.
    pub fn with_log_hook<F>(mut self, f: F) -> Self
    where
        F: Fn(&LogEvent) + Send + Sync + 'static,
    {
        self.log = Box::new(f);
        self
    }

    /// Serve a bidirectional stream until the connection closes.
    pub fn serve<S: Read + Write>(&self, stream: S) -> io::Result<()> {
        self.serve_buffered(&mut BufStream::new(stream))
    }

    /// Serve separate read and write halves until the connection closes.
    pub fn handle<R: BufRead, W: Write>(&self, reader: &mut R, writer: &mut W) -> io::Result<()> {
        self.serve_buffered(&mut SplitStream { reader, writer })
    }

    fn serve_buffered<S: BufRead + Write>(&self, stream: &mut S) -> io::Result<()> {
        loop {
            let result = self.handle_one(stream)?;
            if !self.keep_alive || !result.keep_alive() {
                return Ok(());
            }
        }
    }

    /// Run exactly one exchange.
    pub fn handle_one<S: BufRead + Write>(&self, stream: &mut S) -> io::Result<HandleResult> {
        let mut server = CoroServer::new(
            self.client_address.clone(),
            self.handler.clone(),
            self.config.clone(),
        );

        let mut input = None;
        loop {
            let step = server.resume(input.take()).map_err(io::Error::other)?;
            match step {
                Step::Done(result) => return Ok(result),
                Step::Io(Io::Log(event)) => (self.log)(&event),
                Step::Io(Io::Write(bytes)) => {
                    stream.write_all(&bytes)?;
                    stream.flush()?;
                }
                Step::Io(Io::ReadExactly(n)) => {
                    let mut buf = Vec::with_capacity(n.min(MAX_PREALLOC));
                    (&mut *stream).take(n as u64).read_to_end(&mut buf)?;
                    input = Some(Bytes::from(buf));
                }
                Step::Io(Io::ReadLine(max)) => {
                    let mut buf = Vec::new();
                    (&mut *stream).take(max as u64).read_until(b'\n', &mut buf)?;
                    input = Some(Bytes::from(buf));
                }
            }
        }
    }
}

impl std::fmt::Debug for BlockingConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("BlockingConnection")
            .field("client_address", &self.client_address)
            .field("keep_alive", &self.keep_alive)
            .finish_non_exhaustive()
    }
}

// ===== Streams =====

/// Buffered reads and unbuffered writes over one stream.
#[derive(Debug)]
pub struct BufStream<S> {
    inner: BufReader<S>,
}

impl<S: Read> BufStream<S> {
    pub fn new(stream: S) -> Self {
        Self { inner: BufReader::new(stream) }
    }

    pub fn into_inner(self) -> S {
        self.inner.into_inner()
    }
}

impl<S: Read> Read for BufStream<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<S: Read> BufRead for BufStream<S> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.inner.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.inner.consume(amt);
    }
}

impl<S: Write> Write for BufStream<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.get_mut().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.get_mut().flush()
    }
}

struct SplitStream<'a, R, W> {
    reader: &'a mut R,
    writer: &'a mut W,
}

impl<R: BufRead, W> Read for SplitStream<'_, R, W> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

impl<R: BufRead, W> BufRead for SplitStream<'_, R, W> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.reader.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.reader.consume(amt);
    }
}

impl<R, W: Write> Write for SplitStream<'_, R, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use super::*;
    use crate::handler::{HandlerError, HandlerRequest, HandlerResponse, handler_fn};

    fn echo() -> Arc<dyn Handler> {
        Arc::new(handler_fn(|req: HandlerRequest| match req.method.as_str() {
            "GET" | "POST" => {
                let body = req.body.unwrap_or_default();
                Ok(HandlerResponse::new(200).with_data(body))
            }
            _ => Err(HandlerError::UnsupportedMethod),
        }))
    }

    fn connection() -> BlockingConnection {
        let address = SocketAddress::Inet(([127, 0, 0, 1], 40000).into());
        BlockingConnection::new(address, echo(), Arc::default()).with_log_hook(|_| {})
    }

    #[test]
    fn test_handle() {
        let mut reader = Cursor::new(
            b"POST / HTTP/1.1\r\nHost: h\r\nContent-Length: 4\r\n\r\nping\
              GET / HTTP/1.1\r\nHost: h\r\nConnection: close\r\n\r\n"
                .to_vec(),
        );
        let mut writer = Vec::new();

        connection().handle(&mut reader, &mut writer).unwrap();

        let output = String::from_utf8(writer).unwrap();
        assert_eq!(output.matches("HTTP/1.1 200 OK\r\n").count(), 2);
        assert!(output.contains("\r\n\r\nping"));
        assert!(output.ends_with("\r\nConnection: close\r\n\r\n"));
    }

    #[test]
    fn test_eof_stops() {
        let mut reader = Cursor::new(b"GET / HTTP/1.1\r\nHost: h\r\n\r\n".to_vec());
        let mut writer = Vec::new();

        connection().handle(&mut reader, &mut writer).unwrap();

        assert_eq!(String::from_utf8(writer).unwrap().matches("HTTP/1.1 200 OK").count(), 1);
    }

    #[test]
    fn test_without_keep_alive() {
        let mut reader = Cursor::new(
            b"GET / HTTP/1.1\r\nHost: h\r\n\r\nGET / HTTP/1.1\r\nHost: h\r\n\r\n".to_vec(),
        );
        let mut writer = Vec::new();

        connection()
            .with_keep_alive(false)
            .handle(&mut reader, &mut writer)
            .unwrap();

        assert_eq!(String::from_utf8(writer).unwrap().matches("HTTP/1.1 200 OK").count(), 1);
    }

    #[test]
    fn test_handle_one_result() {
        let request = b"PUT / HTTP/1.1\r\nHost: h\r\n\r\n";
        let mut stream = BufStream::new(Cursor::new(request.to_vec()));
        let result = connection().handle_one(&mut stream).unwrap();
        assert!(!result.keep_alive());

        // the cursor was read to its end, the response follows the request
        let cursor = stream.into_inner();
        let output = String::from_utf8_lossy(&cursor.get_ref()[request.len()..]);
        assert!(output.starts_with("HTTP/1.1 501 Not Implemented\r\n"));
    }
}
