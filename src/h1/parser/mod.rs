//! Strict HTTP/1.x message head parser.
//!
//! [`parse_message`] works on a complete head, start line and header fields up to and including
//! the empty line. The parser does no I/O and never waits for more input, callers are expected
//! to collect the whole block first, see [`CoroServer`] for an incremental reader built on top.
//!
//! Defaults are maximally strict, every tolerance in [`ParserConfig`] is opt-in.
//!
//! [`CoroServer`]: crate::h1::coro::CoroServer
use bytes::Bytes;

use crate::headers::{Headers, latin1_decode};
use crate::http::Version;

mod error;
mod context;
mod start;
mod field;
mod values;
mod prepare;
mod trailers;

pub use error::{
    EncodingError, ErrorKind, HeaderFieldError, ParseError, SemanticError, StartLineError,
};
pub use prepare::{AcceptEncodingItem, AcceptItem, Authorization, ContentType, PreparedHeaders};
pub use trailers::{FORBIDDEN_TRAILER_FIELDS, ParsedTrailers, parse_trailers};

use context::Context;

#[cfg(test)]
mod test;

/// Parser strictness knobs.
///
/// The default is maximally strict. Options prefixed with `allow_` relax a rule, options
/// prefixed with `reject_` tighten one further.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParserConfig {
    /// Accept obsolete line folding, continuation lines are joined with a single SP.
    pub allow_obs_fold: bool,
    /// Accept whitespace between field name and colon. Dangerous, upstreams may disagree on
    /// the field name.
    pub allow_space_before_colon: bool,
    /// Accept repeated identical `Content-Length` values.
    pub allow_multiple_content_lengths: bool,
    /// Accept `Content-Length` together with `Transfer-Encoding`.
    pub allow_content_length_with_te: bool,
    /// Accept LF as line terminator.
    pub allow_bare_lf: bool,
    /// Accept HTTP/1.1 requests without `Host`.
    pub allow_missing_host: bool,
    /// Accept repeated identical `Host` fields.
    pub allow_multiple_hosts: bool,
    /// Accept transfer codings outside the registered set.
    pub allow_unknown_transfer_encoding: bool,
    /// Accept fields with an empty value.
    pub allow_empty_header_values: bool,
    /// Accept CR not followed by LF inside field values.
    pub allow_bare_cr_in_value: bool,
    /// Accept responses whose `Transfer-Encoding` does not end in `chunked`.
    pub allow_te_without_chunked_in_response: bool,
    /// Accept `Transfer-Encoding` in HTTP/1.0 messages.
    pub allow_transfer_encoding_http10: bool,
    /// Reject comma separated lists inside a single `Content-Length` field.
    pub reject_multi_value_content_length: bool,
    /// Reject bytes `0x80..=0xFF` in field values.
    pub reject_obs_text: bool,
    /// Reject obs-text in the request target, allowing only VCHAR.
    pub reject_non_visible_ascii_request_target: bool,
    /// Maximum number of header fields.
    pub max_header_count: usize,
    /// Maximum length of one header line, after unfolding.
    pub max_header_length: Option<usize>,
    /// Maximum number of digits of a `Content-Length` value.
    pub max_content_length_str_len: Option<usize>,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            allow_obs_fold: false,
            allow_space_before_colon: false,
            allow_multiple_content_lengths: false,
            allow_content_length_with_te: false,
            allow_bare_lf: false,
            allow_missing_host: false,
            allow_multiple_hosts: false,
            allow_unknown_transfer_encoding: false,
            allow_empty_header_values: true,
            allow_bare_cr_in_value: false,
            allow_te_without_chunked_in_response: false,
            allow_transfer_encoding_http10: false,
            reject_multi_value_content_length: false,
            reject_obs_text: false,
            reject_non_visible_ascii_request_target: false,
            max_header_count: 128,
            max_header_length: Some(8192),
            max_content_length_str_len: None,
        }
    }
}

/// Kind of parsed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Request,
    Response,
}

/// What the parser expects to find.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ParserMode {
    Request,
    Response,
    /// A start line beginning with `HTTP/` is a response, anything else a request.
    #[default]
    Auto,
}

/// `method SP request-target SP HTTP-version`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    pub method: String,
    pub target: Bytes,
    pub version: Version,
}

/// `HTTP-version SP status-code SP reason-phrase`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub version: Version,
    pub status: u16,
    /// Latin-1 decoded.
    pub reason: String,
}

/// One field line after unfolding, value stripped of surrounding whitespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawHeader {
    pub name: Bytes,
    pub value: Bytes,
}

/// A parsed message head.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedMessage {
    pub kind: MessageKind,
    pub request_line: Option<RequestLine>,
    pub status_line: Option<StatusLine>,
    pub raw_headers: Vec<RawHeader>,
    pub headers: Headers,
    pub prepared: PreparedHeaders,
}

impl ParsedMessage {
    /// Returns the protocol version of the start line.
    pub fn version(&self) -> Version {
        match (&self.request_line, &self.status_line) {
            (Some(line), _) => line.version,
            (None, Some(line)) => line.version,
            (None, None) => Version::HTTP_11,
        }
    }
}

/// Reusable parser holding a configuration.
#[derive(Debug, Clone, Default)]
pub struct Parser {
    config: ParserConfig,
}

impl Parser {
    pub fn new(config: ParserConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// Parse a complete message head, see [`parse_message`].
    pub fn parse(&self, data: &[u8], mode: ParserMode) -> Result<ParsedMessage, ParseError> {
        parse_message(data, mode, &self.config)
    }

    /// Parse a complete trailer section, see [`parse_trailers`].
    pub fn parse_trailers(&self, data: &[u8]) -> Result<ParsedTrailers, ParseError> {
        parse_trailers(data, &self.config)
    }
}

/// Parse a complete message head.
///
/// `data` must contain exactly the start line, the header fields, and the terminating empty line.
pub fn parse_message(
    data: &[u8],
    mode: ParserMode,
    config: &ParserConfig,
) -> Result<ParsedMessage, ParseError> {
    let mut ctx = Context::new(data, config);

    ctx.verify_terminator()?;

    let start_line_end = ctx.find_line_end(0)?;
    let start_line = &data[..start_line_end];

    let kind = match mode {
        ParserMode::Request => MessageKind::Request,
        ParserMode::Response => MessageKind::Response,
        ParserMode::Auto if start_line.starts_with(b"HTTP/") => MessageKind::Response,
        ParserMode::Auto => MessageKind::Request,
    };

    let (request_line, status_line, version) = match kind {
        MessageKind::Request => {
            let line = start::parse_request_line(start_line, config)?;
            let version = line.version;
            (Some(line), None, version)
        }
        MessageKind::Response => {
            let line = start::parse_status_line(start_line)?;
            let version = line.version;
            (None, Some(line), version)
        }
    };

    let header_start = start_line_end + ctx.line_ending_len(start_line_end);
    let raw_headers = field::parse_header_fields(&mut ctx, header_start, 1)?;
    let headers = normalize(&raw_headers);
    let prepared = prepare::prepare_headers(&headers, kind, version, config)?;

    Ok(ParsedMessage {
        kind,
        request_line,
        status_line,
        raw_headers,
        headers,
        prepared,
    })
}

/// Parse a lone request line, with or without its line terminator.
pub fn parse_request_line(line: &[u8], config: &ParserConfig) -> Result<RequestLine, ParseError> {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    start::parse_request_line(line, config)
}

fn normalize(raw_headers: &[RawHeader]) -> Headers {
    let mut headers = Headers::new();
    for raw in raw_headers {
        // field names are validated tokens, hence ASCII
        headers.append(&latin1_decode(&raw.name), latin1_decode(&raw.value));
    }
    headers
}
