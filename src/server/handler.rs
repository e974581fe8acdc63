//! Composable handlers of accepted sockets.
//!
//! A typical blocking chain, outermost first:
//!
//! ```text
//! ThreadingSocketHandler      one thread per connection
//! StandardSocketHandler       socket options, guaranteed close
//! CallbackWrappedSocketHandler
//! HttpSocketHandler           HTTP exchanges over the socket
//! ```
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::h1::CoroConfig;
use crate::handler::Handler;
use crate::socket::{BlockingConnection, SocketAddress, StdStream};

const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

// ===== Connection =====

/// Blocking byte stream of an accepted connection.
pub trait ConnectionStream: Read + Write + Send + std::fmt::Debug {
    /// Shut down both directions.
    fn shutdown(&self) -> io::Result<()>;

    /// Read and write timeout, `None` blocks indefinitely.
    fn set_timeout(&self, timeout: Option<Duration>) -> io::Result<()>;

    fn set_nodelay(&self, nodelay: bool) -> io::Result<()>;
}

impl ConnectionStream for StdStream {
    fn shutdown(&self) -> io::Result<()> {
        StdStream::shutdown(self, std::net::Shutdown::Both)
    }

    fn set_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        StdStream::set_timeout(self, timeout)
    }

    fn set_nodelay(&self, nodelay: bool) -> io::Result<()> {
        StdStream::set_nodelay(self, nodelay)
    }
}

/// Accepted connection handed through the handler chain.
///
/// The stream is closed at most once, either by [`close`][SocketConnection::close] or on drop.
#[derive(Debug)]
pub struct SocketConnection {
    address: SocketAddress,
    stream: Option<Box<dyn ConnectionStream>>,
}

impl SocketConnection {
    pub fn new(address: SocketAddress, stream: impl ConnectionStream + 'static) -> Self {
        Self {
            address,
            stream: Some(Box::new(stream)),
        }
    }

    pub fn address(&self) -> &SocketAddress {
        &self.address
    }

    /// Returns [`io::ErrorKind::NotConnected`] once the stream is closed or moved out.
    pub fn stream(&mut self) -> io::Result<&mut dyn ConnectionStream> {
        match self.stream.as_mut() {
            Some(stream) => Ok(stream.as_mut()),
            None => Err(not_connected()),
        }
    }

    pub fn take_stream(&mut self) -> io::Result<Box<dyn ConnectionStream>> {
        self.stream.take().ok_or_else(not_connected)
    }

    pub fn set_stream(&mut self, stream: Box<dyn ConnectionStream>) {
        self.stream = Some(stream);
    }

    /// Move the connection out, leaving a closed one behind.
    pub fn detach(&mut self) -> SocketConnection {
        SocketConnection {
            address: self.address.clone(),
            stream: self.stream.take(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.stream.is_none()
    }

    /// Shut down both directions, then close. A peer that is already gone is not an error.
    pub fn close(&mut self) -> io::Result<()> {
        let Some(stream) = self.stream.take() else {
            return Ok(());
        };
        match stream.shutdown() {
            Err(err) if err.kind() != io::ErrorKind::NotConnected => Err(err),
            _ => Ok(()),
        }
    }
}

fn not_connected() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "connection is closed")
}

// ===== SocketHandler =====

pub trait SocketHandler: Send + Sync {
    fn handle(&self, conn: &mut SocketConnection) -> io::Result<()>;
}

impl<H: SocketHandler + ?Sized> SocketHandler for Arc<H> {
    #[inline]
    fn handle(&self, conn: &mut SocketConnection) -> io::Result<()> {
        (**self).handle(conn)
    }
}

impl<H: SocketHandler + ?Sized> SocketHandler for Box<H> {
    #[inline]
    fn handle(&self, conn: &mut SocketConnection) -> io::Result<()> {
        (**self).handle(conn)
    }
}

/// Create [`SocketHandler`] from a function.
pub fn socket_handler_fn<F>(f: F) -> SocketHandlerFn<F>
where
    F: Fn(&mut SocketConnection) -> io::Result<()> + Send + Sync,
{
    SocketHandlerFn { f }
}

/// [`SocketHandler`] returned by [`socket_handler_fn`].
#[derive(Clone)]
pub struct SocketHandlerFn<F> {
    f: F,
}

impl<F> SocketHandler for SocketHandlerFn<F>
where
    F: Fn(&mut SocketConnection) -> io::Result<()> + Send + Sync,
{
    #[inline]
    fn handle(&self, conn: &mut SocketConnection) -> io::Result<()> {
        (self.f)(conn)
    }
}

impl<F> std::fmt::Debug for SocketHandlerFn<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("SocketHandlerFn").finish_non_exhaustive()
    }
}

// ===== Standard =====

/// Applies socket options, and always closes the connection afterwards.
#[derive(Debug)]
pub struct StandardSocketHandler<H> {
    handler: H,
    pub timeout: Option<Duration>,
    pub disable_nagle_algorithm: bool,
    /// Leave the connection open, for handlers that keep it beyond the call.
    pub no_close: bool,
}

impl<H> StandardSocketHandler<H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            timeout: None,
            disable_nagle_algorithm: false,
            no_close: false,
        }
    }
}

impl<H: SocketHandler> StandardSocketHandler<H> {
    fn prepare_and_handle(&self, conn: &mut SocketConnection) -> io::Result<()> {
        let stream = conn.stream()?;
        if self.timeout.is_some() {
            stream.set_timeout(self.timeout)?;
        }
        if self.disable_nagle_algorithm {
            stream.set_nodelay(true)?;
        }
        self.handler.handle(conn)
    }
}

impl<H: SocketHandler> SocketHandler for StandardSocketHandler<H> {
    fn handle(&self, conn: &mut SocketConnection) -> io::Result<()> {
        let result = self.prepare_and_handle(conn);
        if self.no_close {
            return result;
        }
        let closed = conn.close();
        result.and(closed)
    }
}

// ===== Ssl =====

type WrapFn = dyn Fn(Box<dyn ConnectionStream>) -> io::Result<Box<dyn ConnectionStream>> + Send + Sync;

/// Replaces the stream with one produced by a wrap function, typically a TLS session.
pub struct SslWrapSocketHandler<H> {
    handler: H,
    wrap: Box<WrapFn>,
}

impl<H> SslWrapSocketHandler<H> {
    pub fn new<F>(handler: H, wrap: F) -> Self
    where
        F: Fn(Box<dyn ConnectionStream>) -> io::Result<Box<dyn ConnectionStream>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            handler,
            wrap: Box::new(wrap),
        }
    }
}

impl<H: SocketHandler> SocketHandler for SslWrapSocketHandler<H> {
    fn handle(&self, conn: &mut SocketConnection) -> io::Result<()> {
        let stream = conn.take_stream()?;
        conn.set_stream((self.wrap)(stream)?);
        self.handler.handle(conn)
    }
}

impl<H: std::fmt::Debug> std::fmt::Debug for SslWrapSocketHandler<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("SslWrapSocketHandler")
            .field("handler", &self.handler)
            .finish_non_exhaustive()
    }
}

type ErrorPredicate = dyn Fn(&io::Error) -> bool + Send + Sync;

/// Swallows the errors a predicate recognizes, typically failed TLS handshakes.
pub struct SslErrorSuppressingHandler<H> {
    handler: H,
    is_suppressed: Box<ErrorPredicate>,
}

impl<H> SslErrorSuppressingHandler<H> {
    pub fn new<F>(handler: H, is_suppressed: F) -> Self
    where
        F: Fn(&io::Error) -> bool + Send + Sync + 'static,
    {
        Self {
            handler,
            is_suppressed: Box::new(is_suppressed),
        }
    }
}

impl<H: SocketHandler> SocketHandler for SslErrorSuppressingHandler<H> {
    fn handle(&self, conn: &mut SocketConnection) -> io::Result<()> {
        match self.handler.handle(conn) {
            Err(err) if (self.is_suppressed)(&err) => {
                crate::log::debug!("{}: suppressed {err}", conn.address());
                Ok(())
            }
            result => result,
        }
    }
}

impl<H: std::fmt::Debug> std::fmt::Debug for SslErrorSuppressingHandler<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("SslErrorSuppressingHandler")
            .field("handler", &self.handler)
            .finish_non_exhaustive()
    }
}

// ===== Callbacks =====

type ConnectionHook = Box<dyn Fn(&mut SocketConnection) -> io::Result<()> + Send + Sync>;

type ErrorHook = Box<dyn Fn(&mut SocketConnection, &io::Error) -> bool + Send + Sync>;

type FinallyHook = Box<dyn Fn(&mut SocketConnection) + Send + Sync>;

/// Runs hooks around the wrapped handler.
///
/// `on_error` returns `true` to suppress the error. `after` runs only on success, `finally`
/// always runs last.
pub struct CallbackWrappedSocketHandler<H> {
    handler: H,
    before: Option<ConnectionHook>,
    after: Option<ConnectionHook>,
    on_error: Option<ErrorHook>,
    finally: Option<FinallyHook>,
}

impl<H> CallbackWrappedSocketHandler<H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            before: None,
            after: None,
            on_error: None,
            finally: None,
        }
    }

    pub fn before<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut SocketConnection) -> io::Result<()> + Send + Sync + 'static,
    {
        self.before = Some(Box::new(f));
        self
    }

    pub fn after<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut SocketConnection) -> io::Result<()> + Send + Sync + 'static,
    {
        self.after = Some(Box::new(f));
        self
    }

    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut SocketConnection, &io::Error) -> bool + Send + Sync + 'static,
    {
        self.on_error = Some(Box::new(f));
        self
    }

    pub fn finally<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut SocketConnection) + Send + Sync + 'static,
    {
        self.finally = Some(Box::new(f));
        self
    }
}

impl<H: SocketHandler> CallbackWrappedSocketHandler<H> {
    fn run(&self, conn: &mut SocketConnection) -> io::Result<()> {
        if let Some(before) = &self.before {
            before(conn)?;
        }
        self.handler.handle(conn)
    }
}

impl<H: SocketHandler> SocketHandler for CallbackWrappedSocketHandler<H> {
    fn handle(&self, conn: &mut SocketConnection) -> io::Result<()> {
        let result = match self.run(conn) {
            Ok(()) => match &self.after {
                Some(after) => after(conn),
                None => Ok(()),
            },
            Err(err) => match &self.on_error {
                Some(on_error) if on_error(conn, &err) => Ok(()),
                _ => Err(err),
            },
        };

        if let Some(finally) = &self.finally {
            finally(conn);
        }

        result
    }
}

impl<H: std::fmt::Debug> std::fmt::Debug for CallbackWrappedSocketHandler<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("CallbackWrappedSocketHandler")
            .field("handler", &self.handler)
            .finish_non_exhaustive()
    }
}

// ===== Http =====

/// Serves HTTP exchanges over the connection with the blocking driver.
pub struct HttpSocketHandler {
    handler: Arc<dyn Handler>,
    config: Arc<CoroConfig>,
    keep_alive: bool,
}

impl HttpSocketHandler {
    pub fn new(handler: Arc<dyn Handler>, config: Arc<CoroConfig>) -> Self {
        Self {
            handler,
            config,
            keep_alive: true,
        }
    }

    pub fn with_keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }
}

impl SocketHandler for HttpSocketHandler {
    fn handle(&self, conn: &mut SocketConnection) -> io::Result<()> {
        let address = conn.address().clone();
        let stream = conn.stream()?;
        BlockingConnection::new(address, self.handler.clone(), self.config.clone())
            .with_keep_alive(self.keep_alive)
            .serve(stream)
    }
}

impl std::fmt::Debug for HttpSocketHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("HttpSocketHandler")
            .field("config", &self.config)
            .field("keep_alive", &self.keep_alive)
            .finish_non_exhaustive()
    }
}

// ===== Executor =====

/// Unit of work handed to an executor.
pub type Task = Box<dyn FnOnce() + Send>;

type ExecuteFn = dyn Fn(Task) -> io::Result<()> + Send + Sync;

/// Hands each connection to an externally supplied executor, such as a thread pool.
pub struct ExecutorSocketHandler<H> {
    handler: Arc<H>,
    execute: Box<ExecuteFn>,
}

impl<H> ExecutorSocketHandler<H> {
    pub fn new<F>(handler: H, execute: F) -> Self
    where
        F: Fn(Task) -> io::Result<()> + Send + Sync + 'static,
    {
        Self {
            handler: Arc::new(handler),
            execute: Box::new(execute),
        }
    }
}

impl<H: SocketHandler + 'static> SocketHandler for ExecutorSocketHandler<H> {
    fn handle(&self, conn: &mut SocketConnection) -> io::Result<()> {
        let mut conn = conn.detach();
        let handler = self.handler.clone();
        (self.execute)(Box::new(move || run_detached(&*handler, &mut conn)))
    }
}

impl<H: std::fmt::Debug> std::fmt::Debug for ExecutorSocketHandler<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("ExecutorSocketHandler")
            .field("handler", &self.handler)
            .finish_non_exhaustive()
    }
}

#[cfg_attr(not(feature = "log"), allow(unused_variables))]
fn run_detached<H: SocketHandler + ?Sized>(handler: &H, conn: &mut SocketConnection) {
    if let Err(err) = handler.handle(conn) {
        crate::log::error!("{}: {err}", conn.address());
    }
}

// ===== Threading =====

/// Runs each connection on its own thread.
#[derive(Debug)]
pub struct ThreadingSocketHandler<H> {
    handler: Arc<H>,
    shutdown_timeout: Option<Duration>,
    threads: Mutex<Vec<JoinHandle<()>>>,
    is_shutdown: AtomicBool,
}

impl<H> ThreadingSocketHandler<H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler: Arc::new(handler),
            shutdown_timeout: None,
            threads: Mutex::new(Vec::new()),
            is_shutdown: AtomicBool::new(false),
        }
    }

    /// Default timeout of a blocking [`shutdown`][Self::shutdown].
    pub fn with_shutdown_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    fn threads(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.threads.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns `true` if any connection thread is still running.
    pub fn is_alive(&self) -> bool {
        let mut threads = self.threads();
        reap(&mut threads);
        !threads.is_empty()
    }

    /// Wait for all connection threads, `None` waits indefinitely.
    pub fn join(&self, timeout: Option<Duration>) -> io::Result<()> {
        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        loop {
            if !self.is_alive() {
                return Ok(());
            }
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "connection threads still running",
                ));
            }
            thread::sleep(JOIN_POLL_INTERVAL);
        }
    }

    /// Refuse further connections, optionally waiting for running ones.
    ///
    /// A `None` timeout falls back to the configured shutdown timeout.
    pub fn shutdown(&self, block: bool, timeout: Option<Duration>) -> io::Result<()> {
        self.is_shutdown.store(true, Ordering::SeqCst);
        if block {
            self.join(timeout.or(self.shutdown_timeout))
        } else {
            Ok(())
        }
    }
}

/// Drop finished threads, a panicked connection does not affect the others.
fn reap(threads: &mut Vec<JoinHandle<()>>) {
    let mut i = 0;
    while i < threads.len() {
        if threads[i].is_finished() {
            if threads.swap_remove(i).join().is_err() {
                crate::log::error!("connection thread panicked");
            }
        } else {
            i += 1;
        }
    }
}

impl<H: SocketHandler + 'static> SocketHandler for ThreadingSocketHandler<H> {
    fn handle(&self, conn: &mut SocketConnection) -> io::Result<()> {
        let mut threads = self.threads();
        if self.is_shutdown.load(Ordering::SeqCst) {
            return Err(io::Error::other("threading handler is shut down"));
        }
        reap(&mut threads);

        let mut conn = conn.detach();
        let handler = self.handler.clone();
        let thread = thread::Builder::new()
            .name("corohttp-conn".to_owned())
            .spawn(move || run_detached(&*handler, &mut conn))?;
        threads.push(thread);

        Ok(())
    }
}
