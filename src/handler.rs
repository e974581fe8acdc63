//! Application handler boundary.
//!
//! A [`Handler`] maps one fully read request to a response. It is shared by every connection,
//! possibly across threads.
use std::sync::Arc;

use bytes::Bytes;

use crate::headers::Headers;
use crate::http::Version;
use crate::socket::SocketAddress;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

// ===== Handler =====

pub trait Handler: Send + Sync {
    fn handle(&self, request: HandlerRequest) -> Result<HandlerResponse, HandlerError>;
}

impl<H: Handler + ?Sized> Handler for Arc<H> {
    #[inline]
    fn handle(&self, request: HandlerRequest) -> Result<HandlerResponse, HandlerError> {
        (**self).handle(request)
    }
}

impl<H: Handler + ?Sized> Handler for Box<H> {
    #[inline]
    fn handle(&self, request: HandlerRequest) -> Result<HandlerResponse, HandlerError> {
        (**self).handle(request)
    }
}

/// Create [`Handler`] from a function.
pub fn handler_fn<F>(f: F) -> HandlerFn<F>
where
    F: Fn(HandlerRequest) -> Result<HandlerResponse, HandlerError> + Send + Sync,
{
    HandlerFn { f }
}

/// [`Handler`] returned by [`handler_fn`].
#[derive(Clone)]
pub struct HandlerFn<F> {
    f: F,
}

impl<F> Handler for HandlerFn<F>
where
    F: Fn(HandlerRequest) -> Result<HandlerResponse, HandlerError> + Send + Sync,
{
    #[inline]
    fn handle(&self, request: HandlerRequest) -> Result<HandlerResponse, HandlerError> {
        (self.f)(request)
    }
}

impl<F> std::fmt::Debug for HandlerFn<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("HandlerFn").finish_non_exhaustive()
    }
}

// ===== Request =====

/// Request handed to a [`Handler`].
#[derive(Debug, Clone)]
pub struct HandlerRequest {
    pub client_address: SocketAddress,
    pub method: String,
    /// Request target, a leading `//` is reduced to a single `/`.
    pub path: String,
    pub version: Version,
    pub headers: Headers,
    /// Message content, `None` if the request declared no body.
    pub body: Option<Bytes>,
    /// Trailer section of a chunked request body.
    pub trailers: Option<Headers>,
}

// ===== Response =====

/// Response returned by a [`Handler`].
#[derive(Debug, Default)]
pub struct HandlerResponse {
    pub status: u16,
    pub headers: Option<Vec<(String, String)>>,
    pub data: Option<ResponseData>,
    pub close_connection: Option<bool>,
}

impl HandlerResponse {
    pub fn new(status: u16) -> Self {
        Self { status, ..Default::default() }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .get_or_insert_with(Vec::new)
            .push((name.into(), value.into()));
        self
    }

    pub fn with_data(mut self, data: impl Into<Bytes>) -> Self {
        self.data = Some(ResponseData::Bytes(data.into()));
        self
    }

    pub fn with_streamed(mut self, data: StreamedData) -> Self {
        self.data = Some(ResponseData::Streamed(data));
        self
    }

    pub fn with_close_connection(mut self, close: bool) -> Self {
        self.close_connection = Some(close);
        self
    }

    /// Release the response data.
    pub fn close(&mut self) {
        if let Some(ResponseData::Streamed(data)) = &mut self.data {
            data.close();
        }
    }
}

/// Response content.
#[derive(Debug)]
pub enum ResponseData {
    Bytes(Bytes),
    Streamed(StreamedData),
}

impl ResponseData {
    /// Returns the content length if it is known up front.
    pub fn len(&self) -> Option<u64> {
        match self {
            Self::Bytes(bytes) => Some(bytes.len() as u64),
            Self::Streamed(data) => data.length(),
        }
    }
}

type ChunkIter = Box<dyn Iterator<Item = Bytes> + Send>;

type OnClose = Box<dyn FnOnce() + Send>;

/// Lazily produced response content.
///
/// The data is closed exactly once: explicitly with [`close`][StreamedData::close], or when it
/// is dropped. Closing drops the chunk source and runs the close callback.
pub struct StreamedData {
    iter: Option<ChunkIter>,
    length: Option<u64>,
    on_close: Option<OnClose>,
    closed: bool,
}

impl StreamedData {
    pub fn new<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = Bytes>,
        I::IntoIter: Send + 'static,
    {
        Self {
            iter: Some(Box::new(iter.into_iter())),
            length: None,
            on_close: None,
            closed: false,
        }
    }

    /// Declare the total length of all chunks.
    pub fn with_length(mut self, length: u64) -> Self {
        self.length = Some(length);
        self
    }

    /// Run `f` when the data is closed.
    pub fn on_close<F>(mut self, f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.on_close = Some(Box::new(f));
        self
    }

    pub fn length(&self) -> Option<u64> {
        self.length
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Release the chunk source, subsequent calls do nothing.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.iter = None;
        if let Some(on_close) = self.on_close.take() {
            on_close();
        }
    }
}

impl Iterator for StreamedData {
    type Item = Bytes;

    fn next(&mut self) -> Option<Self::Item> {
        let chunk = self.iter.as_mut()?.next();
        if chunk.is_none() {
            // fuse
            self.iter = None;
        }
        chunk
    }
}

impl Drop for StreamedData {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for StreamedData {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("StreamedData")
            .field("length", &self.length)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

// ===== Error =====

/// Error returned by a [`Handler`].
#[derive(Debug)]
pub enum HandlerError {
    /// The handler does not implement the request method, answered with `501 Not Implemented`.
    UnsupportedMethod,
    /// Any other failure, the connection is terminated.
    Other(BoxError),
}

impl HandlerError {
    pub fn other(err: impl Into<BoxError>) -> Self {
        Self::Other(err.into())
    }
}

impl std::error::Error for HandlerError {}

impl std::fmt::Display for HandlerError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::UnsupportedMethod => f.write_str("unsupported method"),
            Self::Other(err) => write!(f, "{err}"),
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn test_streamed_data_closes_once() {
        let closed = Arc::new(AtomicUsize::new(0));

        let counter = closed.clone();
        let mut data = StreamedData::new(vec![Bytes::from_static(b"a"), Bytes::from_static(b"b")])
            .on_close(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });

        assert_eq!(data.next().as_deref(), Some(&b"a"[..]));
        data.close();
        data.close();
        assert_eq!(data.next(), None);
        drop(data);
        assert_eq!(closed.load(Ordering::SeqCst), 1);

        let counter = closed.clone();
        let data = StreamedData::new(Vec::new()).on_close(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        drop(data);
        assert_eq!(closed.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_response_builder() {
        let res = HandlerResponse::new(200)
            .with_header("X-A", "1")
            .with_data("hi")
            .with_close_connection(true);
        assert_eq!(res.status, 200);
        assert_eq!(res.headers.as_deref(), Some(&[("X-A".to_owned(), "1".to_owned())][..]));
        assert_eq!(res.data.as_ref().and_then(ResponseData::len), Some(2));
        assert_eq!(res.close_connection, Some(true));

        let res = HandlerResponse::new(200).with_streamed(StreamedData::new(Vec::new()));
        assert_eq!(res.data.as_ref().and_then(ResponseData::len), None);
    }
}
