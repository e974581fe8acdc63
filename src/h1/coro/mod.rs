//! Suspendable HTTP/1.x exchange.
//!
//! [`CoroServer`] runs one request/response exchange without doing any I/O itself. Every time
//! it needs bytes, wants to write, or has something to log, it suspends with an [`Io`]
//! directive and waits for the driver to [`resume`][CoroServer::resume] it.
//!
//! ```text
//! resume(None)              -> Io(ReadLine(..))
//! resume(Some(line))        -> Io(ReadLine(..))      header lines ...
//! resume(Some(b"\r\n"))     -> Io(Log(ParsedRequest))
//! resume(None)              -> Io(ReadExactly(n))    request body, if any
//! resume(Some(body))        -> Io(Write(head))
//! resume(None)              -> Io(Write(content))    zero or more
//! resume(None)              -> Done(HandleResult)
//! ```
use std::mem;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};

use super::chunked::{DEFAULT_MAX_SIZE_LINE, parse_chunk_size};
use super::io::{
    CloseReason, ExchangeError, HandleResult, HttpError, Io, LogEvent, RequestLog, Step,
};
use super::parser::{
    ErrorKind, HeaderFieldError, ParseError, ParsedMessage, ParserConfig, ParserMode,
    SemanticError, StartLineError, parse_message, parse_request_line, parse_trailers,
};
use super::response::{
    CONTINUE, DEFAULT_CONTENT_TYPE, DEFAULT_ERROR_CONTENT_TYPE, DEFAULT_ERROR_MESSAGE, Response,
    error_response,
};
use crate::handler::{Handler, HandlerError, HandlerRequest, HandlerResponse};
use crate::headers::{Headers, latin1_decode};
use crate::http::{StatusCode, Version};
use crate::socket::SocketAddress;


/// TLS records start with the handshake content type.
const TLS_HANDSHAKE: u8 = 0x16;

// ===== Config =====

/// [`CoroServer`] configuration.
#[derive(Debug, Clone)]
pub struct CoroConfig {
    /// Highest protocol version answered with.
    pub server_version: Version,
    /// Maximum length of the request line and of each header line.
    pub max_line: usize,
    /// Maximum number of header lines, trailer lines are counted separately.
    pub max_headers: usize,
    /// Maximum request content length, `None` for unlimited.
    ///
    /// Applies to `Content-Length` and to the decoded size of a chunked body. A chunked body is
    /// collected in memory, so without a limit its size is bounded only by the peer.
    pub max_body_size: Option<u64>,
    /// `Content-Type` of responses that do not carry one.
    pub default_content_type: String,
    /// Error page, `{code}`, `{message}` and `{explain}` are substituted.
    pub error_message_format: String,
    pub error_content_type: String,
    pub parser: ParserConfig,
}

impl Default for CoroConfig {
    fn default() -> Self {
        Self {
            server_version: Version::HTTP_11,
            max_line: 65536,
            max_headers: 100,
            max_body_size: None,
            default_content_type: DEFAULT_CONTENT_TYPE.to_owned(),
            error_message_format: DEFAULT_ERROR_MESSAGE.to_owned(),
            error_content_type: DEFAULT_ERROR_CONTENT_TYPE.to_owned(),
            parser: ParserConfig::default(),
        }
    }
}

// ===== CoroServer =====

/// One HTTP exchange as a resumable state machine.
///
/// A server is used for exactly one exchange, the returned [`HandleResult`] tells whether the
/// driver may start another one on the same connection.
pub struct CoroServer {
    client_address: SocketAddress,
    handler: Arc<dyn Handler>,
    config: Arc<CoroConfig>,
    phase: Phase,
}

#[derive(Debug)]
enum Phase {
    Init,
    RequestLine,
    Headers { head: BytesMut, lines: usize },
    /// `ParsedRequest` is being logged.
    Logged(Box<Exchange>),
    /// `100 Continue` is being written.
    Continue(Box<Exchange>),
    Body(Box<Exchange>),
    ChunkSize(Box<Exchange>),
    ChunkData(Box<Exchange>, usize),
    Trailer(Box<Exchange>),
    /// The error event is being logged.
    ErrorLogged(Box<Response>),
    Writing(Box<Response>),
    Done,
}

/// A parsed request waiting for its content.
#[derive(Debug)]
struct Exchange {
    parsed: ParsedMessage,
    method: String,
    path: String,
    request_version: Version,
    /// Version of the response.
    version: Version,
    body: Option<Bytes>,
    chunks: BytesMut,
    trailer: BytesMut,
    trailer_lines: usize,
    trailers: Option<Headers>,
}

impl CoroServer {
    pub fn new(
        client_address: SocketAddress,
        handler: Arc<dyn Handler>,
        config: Arc<CoroConfig>,
    ) -> Self {
        Self {
            client_address,
            handler,
            config,
            phase: Phase::Init,
        }
    }

    pub fn client_address(&self) -> &SocketAddress {
        &self.client_address
    }

    /// Returns `true` if the exchange finished.
    pub fn is_done(&self) -> bool {
        matches!(self.phase, Phase::Done)
    }

    /// Advance the exchange.
    ///
    /// The first call takes `None`. Reads are answered with `Some`, an empty buffer signals end
    /// of stream. Writes and logs are answered with `None`.
    pub fn resume(&mut self, input: Option<Bytes>) -> Result<Step, ExchangeError> {
        match mem::replace(&mut self.phase, Phase::Done) {
            Phase::Init => {
                let max = self.config.max_line + 1;
                self.suspend(Phase::RequestLine, Io::ReadLine(max))
            }
            Phase::RequestLine => self.on_request_line(read_input(input)?),
            Phase::Headers { head, lines } => self.on_header_line(head, lines, read_input(input)?),
            Phase::Logged(ex) => self.begin_body(ex),
            Phase::Continue(ex) => self.read_body(ex),
            Phase::Body(ex) => self.on_body(ex, read_input(input)?),
            Phase::ChunkSize(ex) => self.on_chunk_size(ex, read_input(input)?),
            Phase::ChunkData(ex, n) => self.on_chunk_data(ex, n, read_input(input)?),
            Phase::Trailer(ex) => self.on_trailer_line(ex, read_input(input)?),
            Phase::ErrorLogged(res) => Ok(self.write_head(res)),
            Phase::Writing(res) => Ok(self.write_next(res)),
            Phase::Done => Err(ExchangeError::Protocol("exchange already finished")),
        }
    }

    fn suspend(&mut self, phase: Phase, io: Io) -> Result<Step, ExchangeError> {
        self.phase = phase;
        Ok(Step::Io(io))
    }

    fn close_internal(&mut self) -> Result<Step, ExchangeError> {
        self.phase = Phase::Done;
        Ok(Step::Done(HandleResult {
            close_reason: Some(CloseReason::Internal),
        }))
    }

    /// Log the error, then answer with the error page.
    fn fail(&mut self, err: HttpError) -> Result<Step, ExchangeError> {
        let res = error_response(
            &err,
            &self.config.error_message_format,
            &self.config.error_content_type,
        );
        self.suspend(
            Phase::ErrorLogged(Box::new(res)),
            Io::Log(LogEvent::Error(err)),
        )
    }

    fn fail_exchange(
        &mut self,
        ex: &Exchange,
        status: StatusCode,
        message: Option<String>,
    ) -> Result<Step, ExchangeError> {
        let mut err = HttpError::new(ex.version, status).with_method(&ex.method);
        if let Some(message) = message {
            err = err.with_message(message);
        }
        self.fail(err)
    }

    // ===== Head =====

    fn on_request_line(&mut self, line: Bytes) -> Result<Step, ExchangeError> {
        let version = self.config.server_version;

        if line.len() > self.config.max_line {
            return self.fail(HttpError::new(version, StatusCode::URI_TOO_LONG));
        }
        if line.iter().all(u8::is_ascii_whitespace) {
            return self.close_internal();
        }
        if line[0] == TLS_HANDSHAKE {
            return self.fail(
                HttpError::new(version, StatusCode::BAD_REQUEST)
                    .with_message("Bad request version (TLS handshake)"),
            );
        }
        if !line.ends_with(b"\n") {
            return self.close_internal();
        }

        let max = self.config.max_line + 1;
        let head = BytesMut::from(&line[..]);
        self.suspend(Phase::Headers { head, lines: 0 }, Io::ReadLine(max))
    }

    fn on_header_line(
        &mut self,
        mut head: BytesMut,
        lines: usize,
        line: Bytes,
    ) -> Result<Step, ExchangeError> {
        let version = self.config.server_version;

        if line.len() > self.config.max_line {
            return self.fail(
                HttpError::new(version, StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE)
                    .with_message("Line too long"),
            );
        }
        if !line.ends_with(b"\n") {
            return self.close_internal();
        }

        head.extend_from_slice(&line);
        if is_blank_line(&line) {
            return self.on_head(head.freeze());
        }

        let lines = lines + 1;
        if lines > self.config.max_headers {
            return self.fail(
                HttpError::new(version, StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE)
                    .with_message("Too many headers"),
            );
        }

        let max = self.config.max_line + 1;
        self.suspend(Phase::Headers { head, lines }, Io::ReadLine(max))
    }

    fn on_head(&mut self, head: Bytes) -> Result<Step, ExchangeError> {
        let server_version = self.config.server_version;

        let parsed = match parse_message(&head, ParserMode::Request, &self.config.parser) {
            Ok(parsed) => parsed,
            Err(err) => {
                let version = self.error_version(&head);
                return self.fail(
                    HttpError::new(version, parse_error_status(&err)).with_message(err.to_string()),
                );
            }
        };

        let Some(line) = parsed.request_line.as_ref() else {
            return self.fail(HttpError::new(server_version, StatusCode::BAD_REQUEST));
        };

        let method = line.method.clone();
        let path = request_path(&latin1_decode(&line.target));
        let request_version = line.version;

        let log = RequestLog {
            client_address: self.client_address.clone(),
            method: method.clone(),
            path: path.clone(),
            version: request_version,
        };

        let ex = Exchange {
            parsed,
            method,
            path,
            request_version,
            version: request_version.min(server_version),
            body: None,
            chunks: BytesMut::new(),
            trailer: BytesMut::new(),
            trailer_lines: 0,
            trailers: None,
        };

        self.suspend(
            Phase::Logged(Box::new(ex)),
            Io::Log(LogEvent::ParsedRequest(log)),
        )
    }

    /// Version answering a malformed head, the request version once the request line is valid.
    fn error_version(&self, head: &[u8]) -> Version {
        let server_version = self.config.server_version;
        let line = head.split_inclusive(|&b| b == b'\n').next().unwrap_or_default();
        match parse_request_line(line, &self.config.parser) {
            Ok(line) => line.version.min(server_version),
            Err(_) => server_version,
        }
    }

    // ===== Body =====

    fn begin_body(&mut self, ex: Box<Exchange>) -> Result<Step, ExchangeError> {
        let prepared = &ex.parsed.prepared;

        let too_large = match (self.config.max_body_size, prepared.content_length) {
            (Some(max), Some(len)) => len > max,
            _ => false,
        };
        if too_large {
            return self.fail_exchange(&ex, StatusCode::CONTENT_TOO_LARGE, None);
        }

        if prepared.expects_continue() && ex.version >= Version::HTTP_11 {
            let io = Io::Write(Bytes::from_static(CONTINUE));
            return self.suspend(Phase::Continue(ex), io);
        }

        self.read_body(ex)
    }

    fn read_body(&mut self, mut ex: Box<Exchange>) -> Result<Step, ExchangeError> {
        if ex.parsed.prepared.is_chunked() {
            return self.suspend(Phase::ChunkSize(ex), Io::ReadLine(DEFAULT_MAX_SIZE_LINE));
        }

        match ex.parsed.prepared.content_length {
            None => self.call_handler(ex),
            Some(0) => {
                ex.body = Some(Bytes::new());
                self.call_handler(ex)
            }
            Some(len) => match usize::try_from(len) {
                Ok(n) => self.suspend(Phase::Body(ex), Io::ReadExactly(n)),
                Err(_) => self.fail_exchange(&ex, StatusCode::CONTENT_TOO_LARGE, None),
            },
        }
    }

    fn on_body(&mut self, mut ex: Box<Exchange>, data: Bytes) -> Result<Step, ExchangeError> {
        if Some(data.len() as u64) != ex.parsed.prepared.content_length {
            return self.close_internal();
        }
        ex.body = Some(data);
        self.call_handler(ex)
    }

    fn on_chunk_size(&mut self, ex: Box<Exchange>, line: Bytes) -> Result<Step, ExchangeError> {
        if line.is_empty() || (!line.ends_with(b"\n") && line.len() < DEFAULT_MAX_SIZE_LINE) {
            return self.close_internal();
        }

        let size = match parse_chunk_size(&line) {
            Ok(size) => size,
            Err(err) => {
                return self.fail_exchange(&ex, StatusCode::BAD_REQUEST, Some(err.to_string()));
            }
        };

        if size == 0 {
            let max = self.config.max_line + 1;
            return self.suspend(Phase::Trailer(ex), Io::ReadLine(max));
        }

        let too_large = self
            .config
            .max_body_size
            .is_some_and(|max| ex.chunks.len() as u64 + size > max);
        if too_large {
            return self.fail_exchange(&ex, StatusCode::CONTENT_TOO_LARGE, None);
        }

        match usize::try_from(size + 2) {
            Ok(n) => self.suspend(Phase::ChunkData(ex, n), Io::ReadExactly(n)),
            Err(_) => self.fail_exchange(&ex, StatusCode::CONTENT_TOO_LARGE, None),
        }
    }

    fn on_chunk_data(
        &mut self,
        mut ex: Box<Exchange>,
        n: usize,
        data: Bytes,
    ) -> Result<Step, ExchangeError> {
        if data.len() != n {
            return self.close_internal();
        }
        let Some(chunk) = data.strip_suffix(b"\r\n") else {
            let message = "missing CRLF after chunk data".to_owned();
            return self.fail_exchange(&ex, StatusCode::BAD_REQUEST, Some(message));
        };

        ex.chunks.extend_from_slice(chunk);
        self.suspend(Phase::ChunkSize(ex), Io::ReadLine(DEFAULT_MAX_SIZE_LINE))
    }

    fn on_trailer_line(&mut self, mut ex: Box<Exchange>, line: Bytes) -> Result<Step, ExchangeError> {
        if line.len() > self.config.max_line {
            let message = "Line too long".to_owned();
            return self.fail_exchange(&ex, StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE, Some(message));
        }
        if !line.ends_with(b"\n") {
            return self.close_internal();
        }

        ex.trailer.extend_from_slice(&line);

        if !is_blank_line(&line) {
            ex.trailer_lines += 1;
            if ex.trailer_lines > self.config.max_headers {
                let message = "Too many trailer fields".to_owned();
                return self.fail_exchange(&ex, StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE, Some(message));
            }
            let max = self.config.max_line + 1;
            return self.suspend(Phase::Trailer(ex), Io::ReadLine(max));
        }

        match parse_trailers(&ex.trailer, &self.config.parser) {
            Ok(trailers) => {
                if !trailers.headers.is_empty() {
                    ex.trailers = Some(trailers.headers);
                }
                ex.body = Some(ex.chunks.split().freeze());
                self.call_handler(ex)
            }
            Err(err) => self.fail_exchange(&ex, StatusCode::BAD_REQUEST, Some(err.to_string())),
        }
    }

    // ===== Handler =====

    fn call_handler(&mut self, ex: Box<Exchange>) -> Result<Step, ExchangeError> {
        let Exchange {
            parsed,
            method,
            path,
            request_version,
            version,
            body,
            trailers,
            ..
        } = *ex;

        let keep_alive = parsed.prepared.keep_alive;

        let request = HandlerRequest {
            client_address: self.client_address.clone(),
            method: method.clone(),
            path,
            version: request_version,
            headers: parsed.headers,
            body,
            trailers,
        };

        match self.handler.handle(request) {
            Ok(res) => self.respond(version, keep_alive, res),
            Err(HandlerError::UnsupportedMethod) => self.fail(
                HttpError::new(version, StatusCode::NOT_IMPLEMENTED)
                    .with_message(format!("Unsupported method ('{method}')"))
                    .with_method(&method),
            ),
            Err(HandlerError::Other(err)) => Err(ExchangeError::Handler(err)),
        }
    }

    fn respond(
        &mut self,
        version: Version,
        keep_alive: bool,
        res: HandlerResponse,
    ) -> Result<Step, ExchangeError> {
        let HandlerResponse {
            status,
            headers,
            data,
            close_connection,
        } = res;

        // dropping `data` closes streamed content
        let Some(status) = StatusCode::from_u16(status) else {
            return Err(ExchangeError::Protocol("handler returned an invalid status code"));
        };

        let mut response = Response::new(version, status);
        response.headers.extend(headers.unwrap_or_default());
        response.data = data;
        response.close_connection = close_connection.unwrap_or(false) || !keep_alive;
        response.preprocess(&self.config.default_content_type);

        Ok(self.write_head(Box::new(response)))
    }

    // ===== Response =====

    fn write_head(&mut self, res: Box<Response>) -> Step {
        let head = res.head();
        if head.is_empty() {
            return self.write_next(res);
        }
        self.phase = Phase::Writing(res);
        Step::Io(Io::Write(head))
    }

    fn write_next(&mut self, mut res: Box<Response>) -> Step {
        match res.next_write() {
            Some(bytes) => {
                self.phase = Phase::Writing(res);
                Step::Io(Io::Write(bytes))
            }
            None => {
                res.close();
                self.phase = Phase::Done;
                Step::Done(HandleResult {
                    close_reason: res.close_connection.then_some(CloseReason::Response),
                })
            }
        }
    }
}

impl std::fmt::Debug for CoroServer {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("CoroServer")
            .field("client_address", &self.client_address)
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

fn read_input(input: Option<Bytes>) -> Result<Bytes, ExchangeError> {
    input.ok_or(ExchangeError::Protocol("read resumed without input"))
}

fn is_blank_line(line: &[u8]) -> bool {
    matches!(line, b"\r\n" | b"\n")
}

/// Status answering a malformed head.
fn parse_error_status(err: &ParseError) -> StatusCode {
    if err.is_length_exceeded() {
        return StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE;
    }
    match err.kind() {
        ErrorKind::StartLineError(StartLineError::UnsupportedHttpVersion) => {
            StatusCode::HTTP_VERSION_NOT_SUPPORTED
        }
        ErrorKind::HeaderFieldError(HeaderFieldError::TooManyHeaders) => {
            StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE
        }
        ErrorKind::SemanticError(SemanticError::InvalidExpect) => StatusCode::EXPECTATION_FAILED,
        _ => StatusCode::BAD_REQUEST,
    }
}

/// A target starting with `//` would read as a network path, keep a single slash.
fn request_path(target: &str) -> String {
    if target.starts_with("//") {
        format!("/{}", target.trim_start_matches('/'))
    } else {
        target.to_owned()
    }
}
