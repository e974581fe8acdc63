//! Directives exchanged between [`CoroServer`] and the driver of a connection.
//!
//! [`CoroServer`]: super::CoroServer
use bytes::Bytes;

use crate::handler::BoxError;
use crate::http::{StatusCode, Version};
use crate::socket::SocketAddress;

/// One suspension point of an exchange.
#[derive(Debug)]
pub enum Io {
    /// Resume with exactly `n` bytes, fewer only at end of stream.
    ReadExactly(usize),
    /// Resume with one LF terminated line of at most `max` bytes, or the first `max` bytes if no
    /// LF comes within them, empty at end of stream.
    ReadLine(usize),
    /// Write the bytes, then resume with `None`.
    Write(Bytes),
    /// Report the event, then resume with `None`.
    Log(LogEvent),
}

/// Returned by [`CoroServer::resume`].
///
/// [`CoroServer::resume`]: super::CoroServer::resume
#[derive(Debug)]
pub enum Step {
    Io(Io),
    Done(HandleResult),
}

/// Outcome of one exchange.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandleResult {
    pub close_reason: Option<CloseReason>,
}

impl HandleResult {
    /// Returns `true` if another exchange may run on the same connection.
    pub fn keep_alive(&self) -> bool {
        self.close_reason.is_none()
    }
}

/// Why the connection must be closed after an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloseReason {
    /// The response asked for it.
    Response,
    /// The peer sent nothing, or the stream ended before a complete request.
    Internal,
}

// ===== LogEvent =====

/// Event worth logging, emitted through [`Io::Log`].
#[derive(Debug, Clone)]
pub enum LogEvent {
    ParsedRequest(RequestLog),
    Error(HttpError),
}

/// Summary of a successfully parsed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLog {
    pub client_address: SocketAddress,
    pub method: String,
    pub path: String,
    pub version: Version,
}

/// An error answered with an error page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpError {
    pub version: Version,
    pub status: StatusCode,
    pub message: String,
    pub explain: String,
    pub method: Option<String>,
}

impl HttpError {
    pub(crate) fn new(version: Version, status: StatusCode) -> Self {
        Self {
            version,
            status,
            message: status.reason().to_owned(),
            explain: status.explain().to_owned(),
            method: None,
        }
    }

    pub(crate) fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub(crate) fn with_method(mut self, method: &str) -> Self {
        self.method = Some(method.to_owned());
        self
    }
}

impl std::fmt::Display for HttpError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "code {}, message {}", self.status.as_u16(), self.message)
    }
}

/// Log an event through the crate logger.
#[cfg_attr(not(feature = "log"), allow(unused_variables))]
pub fn log_event(event: &LogEvent) {
    match event {
        LogEvent::ParsedRequest(request) => {
            crate::log::info!(
                "{} \"{} {} {}\"",
                request.client_address,
                request.method,
                request.path,
                request.version
            );
        }
        LogEvent::Error(error) => {
            crate::log::warning!("{} {error}", error.version);
        }
    }
}

// ===== ExchangeError =====

/// Unrecoverable exchange error, the connection must be terminated.
#[derive(Debug)]
pub enum ExchangeError {
    /// The handler failed with something other than an unsupported method.
    Handler(BoxError),
    /// The driver broke the resumption protocol, or the handler returned an unusable response.
    Protocol(&'static str),
}

impl std::error::Error for ExchangeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Handler(err) => Some(err.as_ref()),
            Self::Protocol(_) => None,
        }
    }
}

impl std::fmt::Display for ExchangeError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Handler(err) => write!(f, "handler error: {err}"),
            Self::Protocol(msg) => write!(f, "protocol error: {msg}"),
        }
    }
}
