//! HTTP/1.x Protocol.
//!
//! - [`parser`] contains the strict message head parser.
//! - [`chunked`] contains the chunked transfer coding.
//! - [`buffer`] contains incremental read and write buffers.
//! - [`coro`] contains the integration of all the components above into a resumable exchange,
//!   driven through the directives in [`io`].

pub mod parser;
pub mod chunked;
pub mod buffer;
pub mod io;
mod response;
pub mod coro;

pub use coro::{CoroConfig, CoroServer};
pub use io::{CloseReason, ExchangeError, HandleResult, HttpError, Io, LogEvent, RequestLog, Step};
pub use response::{CONTINUE, DEFAULT_CONTENT_TYPE, DEFAULT_ERROR_CONTENT_TYPE, DEFAULT_ERROR_MESSAGE};
