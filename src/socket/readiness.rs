//! Readiness driven connection.
//!
//! [`ReadinessConnection`] never blocks. The event loop asks what the connection is interested
//! in with [`wants_read`][ReadinessConnection::wants_read] and
//! [`wants_write`][ReadinessConnection::wants_write], then reports readiness with
//! [`on_readable`][ReadinessConnection::on_readable] and
//! [`on_writable`][ReadinessConnection::on_writable]. [`drive`] is such a loop on tokio.
use std::io;
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{Interest, Ready};
use tokio::net::TcpStream;

#[cfg(unix)]
use tokio::net::UnixStream;

use super::SocketAddress;
use crate::h1::buffer::{ReadBuffer, WriteBuffer};
use crate::h1::io::log_event;
use crate::h1::{CoroConfig, CoroServer, Io, LogEvent, Step};
use crate::handler::Handler;


const READ_SIZE: usize = 16 * 1024;

// ===== Socket =====

/// Socket with non-blocking transfers.
pub trait NonBlockingSocket {
    /// Receive into `buf`, [`io::ErrorKind::WouldBlock`] if nothing is available.
    fn try_recv(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Send from `buf`, [`io::ErrorKind::WouldBlock`] if the socket cannot accept anything.
    fn try_send(&self, buf: &[u8]) -> io::Result<usize>;
}

/// [`NonBlockingSocket`] that can wait for readiness.
pub trait ReadinessSocket: NonBlockingSocket {
    fn ready(&self, interest: Interest) -> impl Future<Output = io::Result<Ready>> + Send;
}

impl NonBlockingSocket for TcpStream {
    #[inline]
    fn try_recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.try_read(buf)
    }

    #[inline]
    fn try_send(&self, buf: &[u8]) -> io::Result<usize> {
        self.try_write(buf)
    }
}

impl ReadinessSocket for TcpStream {
    fn ready(&self, interest: Interest) -> impl Future<Output = io::Result<Ready>> + Send {
        TcpStream::ready(self, interest)
    }
}

#[cfg(unix)]
impl NonBlockingSocket for UnixStream {
    #[inline]
    fn try_recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.try_read(buf)
    }

    #[inline]
    fn try_send(&self, buf: &[u8]) -> io::Result<usize> {
        self.try_write(buf)
    }
}

#[cfg(unix)]
impl ReadinessSocket for UnixStream {
    fn ready(&self, interest: Interest) -> impl Future<Output = io::Result<Ready>> + Send {
        UnixStream::ready(self, interest)
    }
}

// ===== Connection =====

type LogHook = Box<dyn Fn(&LogEvent) + Send + Sync>;

/// HTTP connection over a non-blocking socket.
///
/// Exchanges run back to back on the same buffers for as long as they keep the connection
/// alive.
pub struct ReadinessConnection {
    client_address: SocketAddress,
    handler: Arc<dyn Handler>,
    config: Arc<CoroConfig>,
    server: Option<CoroServer>,
    read_buffer: ReadBuffer,
    /// Read the exchange is suspended on.
    waiting: Option<Io>,
    write_buffer: Option<WriteBuffer>,
    log: LogHook,
    started: bool,
    closed: bool,
}

impl ReadinessConnection {
    pub fn new(
        client_address: SocketAddress,
        handler: Arc<dyn Handler>,
        config: Arc<CoroConfig>,
    ) -> Self {
        Self {
            client_address,
            handler,
            config,
            server: None,
            read_buffer: ReadBuffer::new(),
            waiting: None,
            write_buffer: None,
            log: Box::new(log_event),
            started: false,
            closed: false,
        }
    }

    /// Replace the default logger.
    pub fn with_log_hook<F>(mut self, f: F) -> Self
    where
        F: Fn(&LogEvent) + Send + Sync + 'static,
    {
        self.log = Box::new(f);
        self
    }

    pub fn client_address(&self) -> &SocketAddress {
        &self.client_address
    }

    /// Start the first exchange, subsequent calls do nothing.
    pub fn start(&mut self) -> io::Result<()> {
        if self.started || self.closed {
            return Ok(());
        }
        self.started = true;
        self.server = Some(self.new_server());
        self.pump(None)
    }

    /// Returns `true` if the exchange waits for more bytes.
    pub fn wants_read(&self) -> bool {
        !self.closed && self.waiting.is_some()
    }

    /// Returns `true` if there are pending bytes to send.
    pub fn wants_write(&self) -> bool {
        !self.closed && self.write_buffer.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Release the exchange and buffers, streamed response content is closed.
    pub fn close(&mut self) {
        self.closed = true;
        self.server = None;
        self.waiting = None;
        self.write_buffer = None;
    }

    /// Receive what is available and continue the exchange if it was waiting on it.
    pub fn on_readable<S: NonBlockingSocket + ?Sized>(&mut self, sock: &S) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }

        let mut buf = [0u8; READ_SIZE];
        match sock.try_recv(&mut buf) {
            Ok(0) => {
                crate::log::debug!("{} closed by peer", self.client_address);
                self.close();
                return Ok(());
            }
            Ok(n) => self.read_buffer.feed(&buf[..n]),
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(()),
            Err(err) if err.kind() == io::ErrorKind::ConnectionReset => {
                self.close();
                return Ok(());
            }
            Err(err) => {
                self.close();
                return Err(err);
            }
        }

        if let Some(io) = self.waiting.take() {
            match self.try_read(&io) {
                Some(bytes) => self.pump(Some(bytes))?,
                None => self.waiting = Some(io),
            }
        }

        Ok(())
    }

    /// Send pending bytes and continue the exchange once they are all sent.
    pub fn on_writable<S: NonBlockingSocket + ?Sized>(&mut self, sock: &S) -> io::Result<()> {
        let Some(write_buffer) = self.write_buffer.as_mut() else {
            return Ok(());
        };

        match write_buffer.write_with(|bytes| sock.try_send(bytes)) {
            Ok(_) => {}
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(()),
            Err(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::ConnectionReset | io::ErrorKind::BrokenPipe
                ) =>
            {
                self.close();
                return Ok(());
            }
            Err(err) => {
                self.close();
                return Err(err);
            }
        }

        if write_buffer.is_empty() {
            self.write_buffer = None;
            self.pump(None)?;
        }

        Ok(())
    }

    fn new_server(&self) -> CoroServer {
        CoroServer::new(
            self.client_address.clone(),
            self.handler.clone(),
            self.config.clone(),
        )
    }

    fn try_read(&mut self, io: &Io) -> Option<Bytes> {
        match *io {
            Io::ReadExactly(n) => self.read_buffer.read(n),
            Io::ReadLine(max) => self.read_buffer.read_line(max),
            Io::Write(_) | Io::Log(_) => None,
        }
    }

    /// Resume the exchange until it suspends on something that is not ready yet.
    fn pump(&mut self, mut input: Option<Bytes>) -> io::Result<()> {
        loop {
            let Some(server) = self.server.as_mut() else {
                return Ok(());
            };

            let step = match server.resume(input.take()) {
                Ok(step) => step,
                Err(err) => {
                    crate::log::error!("{}: {err}", self.client_address);
                    self.close();
                    return Err(io::Error::other(err));
                }
            };

            match step {
                Step::Io(Io::Log(event)) => (self.log)(&event),
                Step::Io(Io::Write(bytes)) => {
                    self.write_buffer = Some(WriteBuffer::new(bytes));
                    return Ok(());
                }
                Step::Io(io) => match self.try_read(&io) {
                    Some(bytes) => input = Some(bytes),
                    None => {
                        self.waiting = Some(io);
                        return Ok(());
                    }
                },
                Step::Done(result) if result.keep_alive() => {
                    self.server = Some(self.new_server());
                }
                Step::Done(_) => {
                    self.close();
                    return Ok(());
                }
            }
        }
    }
}

impl std::fmt::Debug for ReadinessConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("ReadinessConnection")
            .field("client_address", &self.client_address)
            .field("server", &self.server)
            .field("waiting", &self.waiting)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

/// Serve `conn` on `stream` until it is closed.
pub async fn drive<S: ReadinessSocket>(stream: &S, conn: &mut ReadinessConnection) -> io::Result<()> {
    conn.start()?;

    while !conn.is_closed() {
        let interest = if conn.wants_write() {
            Interest::WRITABLE
        } else if conn.wants_read() {
            Interest::READABLE
        } else {
            break;
        };

        let ready = stream.ready(interest).await?;

        if ready.is_readable() || ready.is_read_closed() {
            conn.on_readable(stream)?;
        }
        if ready.is_writable() || ready.is_write_closed() {
            conn.on_writable(stream)?;
        }
    }

    conn.close();
    Ok(())
}
