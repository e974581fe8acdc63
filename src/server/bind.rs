//! Listening socket configuration.
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::str::FromStr;

use tokio::net::TcpSocket;

#[cfg(unix)]
use socket2::SockRef;
#[cfg(unix)]
use tokio::net::UnixListener;

use crate::socket::Listener;

/// Where to listen.
///
/// Parsed from strings:
///
/// - `"8000"`, a bare port on all interfaces
/// - `"127.0.0.1:8000"`, `"[::1]:8000"`
/// - `"localhost:8000"`, resolved when binding
/// - `"/run/app.sock"`, `"./app.sock"` or `"unix:app.sock"`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BindSpec {
    Tcp(SocketAddr),
    HostPort(String, u16),
    Unix(PathBuf),
}

impl BindSpec {
    pub fn port(port: u16) -> Self {
        Self::Tcp(SocketAddr::from(([0, 0, 0, 0], port)))
    }
}

impl FromStr for BindSpec {
    type Err = BindSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        if let Some(path) = s.strip_prefix("unix:") {
            if path.is_empty() {
                return Err(BindSpecError(s.to_owned()));
            }
            return Ok(Self::Unix(PathBuf::from(path)));
        }
        if s.starts_with('/') || s.starts_with('.') {
            return Ok(Self::Unix(PathBuf::from(s)));
        }
        if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
            let port = s.parse().map_err(|_| BindSpecError(s.to_owned()))?;
            return Ok(Self::port(port));
        }
        if let Ok(addr) = s.parse::<SocketAddr>() {
            return Ok(Self::Tcp(addr));
        }

        let Some((host, port)) = s.rsplit_once(':') else {
            return Err(BindSpecError(s.to_owned()));
        };
        let Ok(port) = port.parse() else {
            return Err(BindSpecError(s.to_owned()));
        };
        if host.is_empty() || host.contains(':') {
            return Err(BindSpecError(s.to_owned()));
        }

        Ok(Self::HostPort(host.to_owned(), port))
    }
}

impl std::fmt::Display for BindSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Tcp(addr) => write!(f, "{addr}"),
            Self::HostPort(host, port) => write!(f, "{host}:{port}"),
            Self::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

/// Invalid [`BindSpec`] string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindSpecError(String);

impl std::error::Error for BindSpecError {}

impl std::fmt::Display for BindSpecError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "invalid bind address: {:?}", self.0)
    }
}

// ===== Binder =====

/// Creates the listening socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binder {
    pub spec: BindSpec,
    pub listen_backlog: u32,
    /// `SO_REUSEADDR`, tcp only.
    pub allow_reuse_address: bool,
    /// `SO_REUSEPORT`, tcp on unix only.
    pub allow_reuse_port: bool,
    /// Let child processes inherit the socket, clears `FD_CLOEXEC`, unix only.
    pub set_inheritable: bool,
}

impl Binder {
    pub fn new(spec: BindSpec) -> Self {
        Self {
            spec,
            listen_backlog: 128,
            allow_reuse_address: true,
            allow_reuse_port: false,
            set_inheritable: false,
        }
    }

    /// Bind and listen.
    ///
    /// Must be called within a tokio runtime context.
    pub fn bind(&self) -> io::Result<Listener> {
        let listener = match &self.spec {
            BindSpec::Tcp(addr) => self.bind_tcp(*addr),
            BindSpec::HostPort(host, port) => {
                let addr = (host.as_str(), *port).to_socket_addrs()?.next().ok_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::AddrNotAvailable,
                        format!("{host}:{port} resolved to no address"),
                    )
                })?;
                self.bind_tcp(addr)
            }
            #[cfg(unix)]
            BindSpec::Unix(path) => UnixListener::bind(path).map(Listener::Unix),
            #[cfg(not(unix))]
            BindSpec::Unix(_) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "unix sockets are not supported on this platform",
            )),
        }?;

        if self.set_inheritable {
            inheritable(&listener)?;
        }
        Ok(listener)
    }

    fn bind_tcp(&self, addr: SocketAddr) -> io::Result<Listener> {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };

        socket.set_reuseaddr(self.allow_reuse_address)?;
        #[cfg(all(unix, not(any(target_os = "solaris", target_os = "illumos", target_os = "cygwin"))))]
        socket.set_reuseport(self.allow_reuse_port)?;

        socket.bind(addr)?;
        let listener = socket.listen(self.listen_backlog)?;
        crate::log::info!("listening on {}", self.spec);
        Ok(Listener::Tcp(listener))
    }
}

#[cfg(unix)]
fn inheritable(listener: &Listener) -> io::Result<()> {
    let sock = match listener {
        Listener::Tcp(listener) => SockRef::from(listener),
        Listener::Unix(listener) => SockRef::from(listener),
    };
    sock.set_cloexec(false)
}

#[cfg(not(unix))]
fn inheritable(_: &Listener) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "inheritable listening sockets are not supported on this platform",
    ))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_bind_spec() {
        let ok = |s: &str| s.parse::<BindSpec>().unwrap();

        assert_eq!(ok("8000"), BindSpec::Tcp(SocketAddr::from(([0, 0, 0, 0], 8000))));
        assert_eq!(ok("127.0.0.1:80"), BindSpec::Tcp(SocketAddr::from(([127, 0, 0, 1], 80))));
        assert_eq!(ok("[::1]:80"), BindSpec::Tcp("[::1]:80".parse().unwrap()));
        assert_eq!(ok("localhost:8080"), BindSpec::HostPort("localhost".into(), 8080));
        assert_eq!(ok("/run/app.sock"), BindSpec::Unix("/run/app.sock".into()));
        assert_eq!(ok("./app.sock"), BindSpec::Unix("./app.sock".into()));
        assert_eq!(ok("unix:app.sock"), BindSpec::Unix("app.sock".into()));

        for s in ["", "localhost", "host:port", ":80", "99999", "unix:", "::1:80"] {
            assert!(s.parse::<BindSpec>().is_err(), "{s:?}");
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(BindSpec::HostPort("h".into(), 1).to_string(), "h:1");
        assert_eq!(BindSpec::Unix("/a.sock".into()).to_string(), "unix:/a.sock");
    }

    /// `flags:` of `/proc/self/fdinfo`, octal.
    #[cfg(target_os = "linux")]
    fn fd_flags(fd: std::os::fd::RawFd) -> u32 {
        let info = std::fs::read_to_string(format!("/proc/self/fdinfo/{fd}")).unwrap();
        let flags = info.lines().find_map(|line| line.strip_prefix("flags:")).unwrap();
        u32::from_str_radix(flags.trim(), 8).unwrap()
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_inheritable() {
        use std::os::fd::AsRawFd;
        const O_CLOEXEC: u32 = 0o2000000;

        let raw_fd = |listener: &Listener| match listener {
            Listener::Tcp(listener) => listener.as_raw_fd(),
            Listener::Unix(listener) => listener.as_raw_fd(),
        };

        let mut binder = Binder::new("127.0.0.1:0".parse().unwrap());
        let listener = binder.bind().unwrap();
        assert_ne!(fd_flags(raw_fd(&listener)) & O_CLOEXEC, 0);

        binder.set_inheritable = true;
        let listener = binder.bind().unwrap();
        assert_eq!(fd_flags(raw_fd(&listener)) & O_CLOEXEC, 0);
    }

    #[tokio::test]
    async fn test_bind_tcp() {
        let binder = Binder::new("127.0.0.1:0".parse().unwrap());
        let listener = binder.bind().unwrap();
        let crate::socket::SocketAddress::Inet(addr) = listener.local_addr().unwrap() else {
            panic!("expected inet address");
        };
        assert!(addr.port() != 0);
    }
}
