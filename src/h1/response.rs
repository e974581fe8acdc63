//! Response assembly and serialization.
use std::mem;

use bytes::{BufMut, Bytes, BytesMut};

use super::chunked::{LAST_CHUNK, encode_chunk};
use super::io::HttpError;
use crate::handler::ResponseData;
use crate::headers::latin1_encode;
use crate::http::{HttpDate, StatusCode, Version};

/// Default error page, `{code}`, `{message}` and `{explain}` are substituted.
pub const DEFAULT_ERROR_MESSAGE: &str = "\
<!DOCTYPE HTML>
<html lang=\"en\">
    <head>
        <meta charset=\"utf-8\">
        <title>Error response</title>
    </head>
    <body>
        <h1>Error response</h1>
        <p>Error code: {code}</p>
        <p>Message: {message}.</p>
        <p>Error code explanation: {code} - {explain}.</p>
    </body>
</html>
";

pub const DEFAULT_ERROR_CONTENT_TYPE: &str = "text/html;charset=utf-8";

pub const DEFAULT_CONTENT_TYPE: &str = "text/plain";

/// Interim response sent before reading the body of an `Expect: 100-continue` request.
pub const CONTINUE: &[u8] = b"HTTP/1.1 100 Continue\r\n\r\n";

/// A response ready to be written.
#[derive(Debug)]
pub(crate) struct Response {
    pub(crate) version: Version,
    pub(crate) status: StatusCode,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) data: Option<ResponseData>,
    pub(crate) close_connection: bool,
    /// Content is framed with the chunked coding, the last chunk is still due.
    pub(crate) chunked: bool,
}

impl Response {
    pub(crate) fn new(version: Version, status: StatusCode) -> Self {
        Self {
            version,
            status,
            headers: vec![("Date".to_owned(), HttpDate::now().to_string())],
            data: None,
            close_connection: false,
            chunked: false,
        }
    }

    pub(crate) fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub(crate) fn push_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.push((name.to_owned(), value.into()));
    }

    /// Fill in framing headers, and settle whether the connection closes afterwards.
    pub(crate) fn preprocess(&mut self, default_content_type: &str) {
        if self.header("content-type").is_none() {
            self.push_header("Content-Type", default_content_type);
        }

        if self.header("content-length").is_none() {
            match self.data.as_ref().map(ResponseData::len) {
                None => {}
                Some(Some(len)) => {
                    self.push_header("Content-Length", itoa::Buffer::new().format(len));
                }
                Some(None) if self.header("transfer-encoding").is_some() => {}
                Some(None) if self.version >= Version::HTTP_11 => {
                    self.push_header("Transfer-Encoding", "chunked");
                    self.chunked = true;
                }
                // content ends when the connection does
                Some(None) => self.close_connection = true,
            }
        }

        let close = self
            .header("connection")
            .is_some_and(|value| value.split(',').any(|t| t.trim().eq_ignore_ascii_case("close")));
        if close {
            self.close_connection = true;
        }

        if self.close_connection && self.header("connection").is_none() {
            self.push_header("Connection", "close");
        }
    }

    /// Serialize the status line and header fields.
    ///
    /// HTTP/0.9 responses have no head, an empty buffer is returned.
    pub(crate) fn head(&self) -> Bytes {
        if self.version < Version::HTTP_10 {
            return Bytes::new();
        }

        let mut buf = BytesMut::with_capacity(256);
        buf.put_slice(self.version.as_str().as_bytes());
        buf.put_u8(b' ');
        buf.put_slice(itoa::Buffer::new().format(self.status.as_u16()).as_bytes());
        buf.put_u8(b' ');
        buf.put_slice(self.status.reason().as_bytes());
        buf.put_slice(b"\r\n");

        for (name, value) in &self.headers {
            buf.put_slice(&latin1_encode(name));
            buf.put_slice(b": ");
            buf.put_slice(&latin1_encode(value));
            buf.put_slice(b"\r\n");
        }

        buf.put_slice(b"\r\n");
        buf.freeze()
    }

    /// Returns the next piece of content to write.
    pub(crate) fn next_write(&mut self) -> Option<Bytes> {
        match self.data.as_mut()? {
            ResponseData::Bytes(bytes) => {
                let bytes = mem::take(bytes);
                self.data = None;
                (!bytes.is_empty()).then_some(bytes)
            }
            ResponseData::Streamed(streamed) => {
                for chunk in streamed.by_ref() {
                    if chunk.is_empty() {
                        continue;
                    }
                    return Some(if self.chunked { encode_chunk(&chunk) } else { chunk });
                }
                if mem::take(&mut self.chunked) {
                    return Some(Bytes::from_static(LAST_CHUNK));
                }
                None
            }
        }
    }

    /// Release streamed content.
    pub(crate) fn close(&mut self) {
        if let Some(ResponseData::Streamed(streamed)) = &mut self.data {
            streamed.close();
        }
    }
}

/// Build the error page response, the connection always closes afterwards.
pub(crate) fn error_response(err: &HttpError, format: &str, content_type: &str) -> Response {
    let mut res = Response::new(err.version, err.status);
    res.push_header("Connection", "close");
    res.close_connection = true;

    // 1xx, 204, 205 and 304 never carry content
    if !err.status.is_bodiless() {
        let body = format
            .replace("{code}", itoa::Buffer::new().format(err.status.as_u16()))
            .replace("{message}", &html_escape(&err.message))
            .replace("{explain}", &html_escape(&err.explain));

        res.push_header("Content-Type", content_type);
        res.push_header("Content-Length", itoa::Buffer::new().format(body.len()));

        if err.method.as_deref() != Some("HEAD") && !body.is_empty() {
            res.data = Some(ResponseData::Bytes(Bytes::from(body)));
        }
    }

    res
}

/// Escape `&`, `<` and `>`.
pub(crate) fn html_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            ch => out.push(ch),
        }
    }
    out
}
