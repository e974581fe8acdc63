//! Sockets and connection drivers.
//!
//! - [`readiness`] drives exchanges from readiness events of non-blocking sockets.
//! - [`blocking`] drives exchanges over blocking streams.
use std::future::poll_fn;
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::task::{Context, Poll};

use socket2::SockRef;
use tokio::io::{Interest, Ready};
use tokio::net::{TcpListener, TcpStream};

#[cfg(unix)]
use tokio::net::{UnixListener, UnixStream};

pub mod readiness;
pub mod blocking;

pub use blocking::BlockingConnection;
pub use readiness::{NonBlockingSocket, ReadinessConnection, ReadinessSocket, drive};

// ===== SocketAddress =====

/// Address of a connected peer or a bound socket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SocketAddress {
    Inet(SocketAddr),
    /// Unix domain socket, unnamed sockets have no path.
    Unix(Option<PathBuf>),
}

impl From<SocketAddr> for SocketAddress {
    fn from(addr: SocketAddr) -> Self {
        Self::Inet(addr)
    }
}

#[cfg(unix)]
impl From<tokio::net::unix::SocketAddr> for SocketAddress {
    fn from(addr: tokio::net::unix::SocketAddr) -> Self {
        Self::Unix(addr.as_pathname().map(Path::to_path_buf))
    }
}

#[cfg(unix)]
impl From<std::os::unix::net::SocketAddr> for SocketAddress {
    fn from(addr: std::os::unix::net::SocketAddr) -> Self {
        Self::Unix(addr.as_pathname().map(Path::to_path_buf))
    }
}

impl std::fmt::Display for SocketAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Inet(addr) => write!(f, "{addr}"),
            Self::Unix(Some(path)) => write!(f, "{}", path.display()),
            Self::Unix(None) => f.write_str("(unnamed)"),
        }
    }
}

// ===== Listener =====

/// Bound listening socket.
#[derive(Debug)]
pub enum Listener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(UnixListener),
}

impl Listener {
    pub fn poll_accept(&self, cx: &mut Context) -> Poll<io::Result<(Stream, SocketAddress)>> {
        match self {
            Self::Tcp(listener) => listener
                .poll_accept(cx)
                .map_ok(|(io, addr)| (Stream::Tcp(io), addr.into())),
            #[cfg(unix)]
            Self::Unix(listener) => listener
                .poll_accept(cx)
                .map_ok(|(io, addr)| (Stream::Unix(io), addr.into())),
        }
    }

    pub async fn accept(&self) -> io::Result<(Stream, SocketAddress)> {
        poll_fn(|cx| self.poll_accept(cx)).await
    }

    pub fn local_addr(&self) -> io::Result<SocketAddress> {
        match self {
            Self::Tcp(listener) => listener.local_addr().map(Into::into),
            #[cfg(unix)]
            Self::Unix(listener) => listener.local_addr().map(Into::into),
        }
    }
}

// ===== Stream =====

/// Accepted non-blocking connection.
#[derive(Debug)]
pub enum Stream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl Stream {
    /// Shut down both directions, a connection the peer already closed is not an error.
    pub fn shutdown(&self) -> io::Result<()> {
        let sock = match self {
            Self::Tcp(io) => SockRef::from(io),
            #[cfg(unix)]
            Self::Unix(io) => SockRef::from(io),
        };
        match sock.shutdown(std::net::Shutdown::Both) {
            Err(err) if err.kind() != io::ErrorKind::NotConnected => Err(err),
            _ => Ok(()),
        }
    }

    /// Convert into a blocking stream.
    pub fn into_std(self) -> io::Result<StdStream> {
        match self {
            Self::Tcp(io) => {
                let io = io.into_std()?;
                io.set_nonblocking(false)?;
                Ok(StdStream::Tcp(io))
            }
            #[cfg(unix)]
            Self::Unix(io) => {
                let io = io.into_std()?;
                io.set_nonblocking(false)?;
                Ok(StdStream::Unix(io))
            }
        }
    }
}

impl NonBlockingSocket for Stream {
    fn try_recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(io) => io.try_read(buf),
            #[cfg(unix)]
            Self::Unix(io) => io.try_read(buf),
        }
    }

    fn try_send(&self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(io) => io.try_write(buf),
            #[cfg(unix)]
            Self::Unix(io) => io.try_write(buf),
        }
    }
}

impl ReadinessSocket for Stream {
    async fn ready(&self, interest: Interest) -> io::Result<Ready> {
        match self {
            Self::Tcp(io) => io.ready(interest).await,
            #[cfg(unix)]
            Self::Unix(io) => io.ready(interest).await,
        }
    }
}

/// Blocking connection.
#[derive(Debug)]
pub enum StdStream {
    Tcp(std::net::TcpStream),
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
}

impl StdStream {
    pub fn shutdown(&self, how: std::net::Shutdown) -> io::Result<()> {
        match self {
            Self::Tcp(io) => io.shutdown(how),
            #[cfg(unix)]
            Self::Unix(io) => io.shutdown(how),
        }
    }

    pub fn set_timeout(&self, timeout: Option<std::time::Duration>) -> io::Result<()> {
        match self {
            Self::Tcp(io) => {
                io.set_read_timeout(timeout)?;
                io.set_write_timeout(timeout)
            }
            #[cfg(unix)]
            Self::Unix(io) => {
                io.set_read_timeout(timeout)?;
                io.set_write_timeout(timeout)
            }
        }
    }

    /// Disable Nagle's algorithm, unix sockets have none.
    pub fn set_nodelay(&self, nodelay: bool) -> io::Result<()> {
        match self {
            Self::Tcp(io) => io.set_nodelay(nodelay),
            #[cfg(unix)]
            Self::Unix(_) => Ok(()),
        }
    }
}

impl Read for StdStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(io) => io.read(buf),
            #[cfg(unix)]
            Self::Unix(io) => io.read(buf),
        }
    }
}

impl Write for StdStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(io) => io.write(buf),
            #[cfg(unix)]
            Self::Unix(io) => io.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Tcp(io) => io.flush(),
            #[cfg(unix)]
            Self::Unix(io) => io.flush(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn test_stream_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut client = std::net::TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (io, _) = listener.accept().await.unwrap();
        let stream = Stream::Tcp(io);

        stream.shutdown().unwrap();

        // eof while the stream is still open
        let mut buf = Vec::new();
        assert_eq!(client.read_to_end(&mut buf).unwrap(), 0);

        drop(client);
        stream.shutdown().unwrap();
    }
}
