//! HTTP/1.x Server Engine
//!
//! The protocol lives in [`h1::CoroServer`], a resumable exchange that performs no IO itself.
//! It is driven by either of the adapters in [`socket`], and served by [`server::SocketServer`].
#![warn(missing_debug_implementations)]

mod matches;
mod log;

pub mod http;
pub mod headers;
pub mod h1;
pub mod handler;
pub mod socket;
pub mod server;

pub use handler::{Handler, HandlerError, HandlerRequest, HandlerResponse, handler_fn};
pub use h1::{CoroConfig, CoroServer};
pub use server::{Binder, BindSpec, Dispatch, SocketServer};
