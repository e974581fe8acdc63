//! Server shell.
//!
//! [`SocketServer`] owns the listening socket and dispatches accepted connections either to a
//! blocking [`SocketHandler`] chain or to readiness driven tasks on its own runtime.
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Runtime;
use tokio::task::JoinSet;

use crate::h1::CoroConfig;
use crate::handler::Handler;
use crate::socket::{Listener, ReadinessConnection, SocketAddress, Stream, drive};

pub mod bind;
pub mod handler;

pub use bind::{BindSpec, BindSpecError, Binder};
pub use handler::{
    CallbackWrappedSocketHandler, ConnectionStream, ExecutorSocketHandler, HttpSocketHandler,
    SocketConnection, SocketHandler, SslErrorSuppressingHandler, SslWrapSocketHandler,
    StandardSocketHandler, ThreadingSocketHandler, socket_handler_fn,
};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// How accepted connections are served.
pub enum Dispatch {
    /// Blocking handler chain, called on the polling thread.
    Blocking(Arc<dyn SocketHandler>),
    /// Readiness driven HTTP connections, spawned on the server runtime.
    Readiness {
        handler: Arc<dyn Handler>,
        config: Arc<CoroConfig>,
    },
}

impl Dispatch {
    pub fn blocking(handler: impl SocketHandler + 'static) -> Self {
        Self::Blocking(Arc::new(handler))
    }

    pub fn readiness(handler: impl Handler + 'static, config: CoroConfig) -> Self {
        Self::Readiness {
            handler: Arc::new(handler),
            config: Arc::new(config),
        }
    }
}

impl std::fmt::Debug for Dispatch {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Blocking(_) => f.write_str("Blocking"),
            Self::Readiness { config, .. } => {
                f.debug_struct("Readiness").field("config", config).finish_non_exhaustive()
            }
        }
    }
}

/// Outcome of one [`SocketServer::poll`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollEvent {
    /// Nothing was accepted within the interval.
    Timeout,
    Connection,
    /// Accepting or dispatching failed, the error went to the error hook.
    Error,
    Shutdown,
}

// ===== Shutdown =====

#[derive(Debug, Default)]
struct ShutdownState {
    should_shutdown: AtomicBool,
    running: Mutex<bool>,
    stopped: Condvar,
}

impl ShutdownState {
    fn should_shutdown(&self) -> bool {
        self.should_shutdown.load(Ordering::SeqCst)
    }

    fn running(&self) -> MutexGuard<'_, bool> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Marks the server loop as running until dropped.
struct RunningGuard<'a>(&'a ShutdownState);

impl<'a> RunningGuard<'a> {
    fn new(state: &'a ShutdownState) -> Self {
        *state.running() = true;
        Self(state)
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        *self.0.running() = false;
        self.0.stopped.notify_all();
    }
}

/// Requests shutdown of a [`SocketServer`] from another thread.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    state: Arc<ShutdownState>,
    timeout: Option<Duration>,
}

impl ShutdownHandle {
    /// Ask the server loop to stop, optionally waiting for it to exit.
    ///
    /// A `None` timeout falls back to the server shutdown timeout. Returns
    /// [`io::ErrorKind::TimedOut`] if the loop is still running when the timeout elapses.
    pub fn shutdown(&self, block: bool, timeout: Option<Duration>) -> io::Result<()> {
        self.state.should_shutdown.store(true, Ordering::SeqCst);
        if !block {
            return Ok(());
        }

        let running = self.state.running();
        match timeout.or(self.timeout) {
            None => {
                let _running = self
                    .state
                    .stopped
                    .wait_while(running, |running| *running)
                    .unwrap_or_else(PoisonError::into_inner);
                Ok(())
            }
            Some(timeout) => {
                let (_running, result) = self
                    .state
                    .stopped
                    .wait_timeout_while(running, timeout, |running| *running)
                    .unwrap_or_else(PoisonError::into_inner);
                if result.timed_out() {
                    Err(io::Error::new(io::ErrorKind::TimedOut, "server loop still running"))
                } else {
                    Ok(())
                }
            }
        }
    }
}

// ===== SocketServer =====

type ErrorHook = Box<dyn Fn(&io::Error) + Send + Sync>;

/// Listening socket with its accept loop.
pub struct SocketServer {
    runtime: Runtime,
    listener: Listener,
    dispatch: Dispatch,
    on_error: ErrorHook,
    poll_interval: Duration,
    state: Arc<ShutdownState>,
    shutdown_timeout: Option<Duration>,
    /// Readiness driven connections still in flight.
    tasks: JoinSet<()>,
    drain_timeout: Duration,
}

impl SocketServer {
    /// Bind the listener and create the server runtime.
    pub fn bind(binder: &Binder, dispatch: Dispatch) -> io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
        let listener = {
            let _enter = runtime.enter();
            binder.bind()?
        };

        Ok(Self {
            runtime,
            listener,
            dispatch,
            on_error: Box::new(log_error),
            poll_interval: DEFAULT_POLL_INTERVAL,
            state: Arc::default(),
            shutdown_timeout: None,
            tasks: JoinSet::new(),
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        })
    }

    /// Upper bound of one wait for a connection, 500ms by default.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Default timeout of a blocking shutdown.
    pub fn with_shutdown_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// How long [`run`][Self::run] lets readiness driven connections finish after shutdown, 5s
    /// by default. Connections still open afterwards are aborted.
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Replace the default error logger.
    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&io::Error) + Send + Sync + 'static,
    {
        self.on_error = Box::new(f);
        self
    }

    pub fn local_addr(&self) -> io::Result<SocketAddress> {
        self.listener.local_addr()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            state: self.state.clone(),
            timeout: self.shutdown_timeout,
        }
    }

    /// Request shutdown without waiting.
    pub fn shutdown(&self) {
        self.state.should_shutdown.store(true, Ordering::SeqCst);
    }

    /// Wait up to `interval` for one connection and dispatch it.
    ///
    /// `None` uses the configured poll interval.
    pub fn poll(&mut self, interval: Option<Duration>) -> PollEvent {
        if self.state.should_shutdown() {
            return PollEvent::Shutdown;
        }

        // reap finished connections
        while self.tasks.try_join_next().is_some() {}

        let interval = interval.unwrap_or(self.poll_interval);
        let accepted = self
            .runtime
            .block_on(tokio::time::timeout(interval, self.listener.accept()));

        // shutdown requested during the wait
        if self.state.should_shutdown() {
            return PollEvent::Shutdown;
        }

        let result = match accepted {
            Err(_elapsed) => return PollEvent::Timeout,
            Ok(Ok((stream, address))) => self.dispatch(stream, address),
            Ok(Err(err)) => Err(err),
        };

        match result {
            Ok(()) => PollEvent::Connection,
            Err(err) => {
                (self.on_error)(&err);
                PollEvent::Error
            }
        }
    }

    /// Poll until shutdown is requested.
    pub fn run(&mut self) {
        let state = self.state.clone();
        let _running = RunningGuard::new(&state);
        while self.poll(None) != PollEvent::Shutdown {}
        self.drain();
        crate::log::info!("server stopped");
    }

    /// Wait for in flight readiness driven connections, up to the drain timeout.
    fn drain(&mut self) {
        if self.tasks.is_empty() {
            return;
        }

        let tasks = &mut self.tasks;
        let drained = self.runtime.block_on(tokio::time::timeout(self.drain_timeout, async {
            while tasks.join_next().await.is_some() {}
        }));

        if drained.is_err() {
            crate::log::warning!("aborting {} connection(s) after drain timeout", self.tasks.len());
            self.tasks.abort_all();
            let tasks = &mut self.tasks;
            self.runtime.block_on(async { while tasks.join_next().await.is_some() {} });
        }
    }

    fn dispatch(&mut self, stream: Stream, address: SocketAddress) -> io::Result<()> {
        crate::log::debug!("accepted {address}");
        match &self.dispatch {
            Dispatch::Blocking(handler) => {
                let mut conn = SocketConnection::new(address, stream.into_std()?);
                handler.handle(&mut conn)
            }
            Dispatch::Readiness { handler, config } => {
                let mut conn = ReadinessConnection::new(address, handler.clone(), config.clone());
                let task = async move {
                    if let Err(err) = drive(&stream, &mut conn).await {
                        crate::log::error!("{}: {err}", conn.client_address());
                    }
                    if let Err(err) = stream.shutdown() {
                        crate::log::debug!("{}: shutdown: {err}", conn.client_address());
                    }
                };
                self.tasks.spawn_on(task, self.runtime.handle());
                Ok(())
            }
        }
    }
}

impl std::fmt::Debug for SocketServer {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("SocketServer")
            .field("listener", &self.listener)
            .field("dispatch", &self.dispatch)
            .field("poll_interval", &self.poll_interval)
            .field("tasks", &self.tasks.len())
            .finish_non_exhaustive()
    }
}

#[cfg_attr(not(feature = "log"), allow(unused_variables))]
fn log_error(err: &io::Error) {
    crate::log::error!("accept: {err}");
}

#[cfg(test)]
mod test {
    use std::io::{Read, Write};
    use std::net::TcpStream;
    use std::thread;
    use std::time::Instant;

    use super::*;
    use crate::handler::{HandlerRequest, HandlerResponse, handler_fn};

    fn loopback() -> Binder {
        Binder::new("127.0.0.1:0".parse().unwrap())
    }

    fn inet(server: &SocketServer) -> std::net::SocketAddr {
        match server.local_addr().unwrap() {
            SocketAddress::Inet(addr) => addr,
            addr => panic!("unexpected {addr:?}"),
        }
    }

    fn hello() -> Dispatch {
        Dispatch::readiness(
            handler_fn(|_: HandlerRequest| Ok(HandlerResponse::new(200).with_data("hi"))),
            CoroConfig::default(),
        )
    }

    #[test]
    fn test_poll_timeout_and_shutdown() {
        let mut server = SocketServer::bind(&loopback(), hello()).unwrap();

        let start = Instant::now();
        assert_eq!(server.poll(Some(Duration::from_millis(20))), PollEvent::Timeout);
        assert!(start.elapsed() >= Duration::from_millis(20));

        server.shutdown();
        assert_eq!(server.poll(None), PollEvent::Shutdown);
    }

    #[test]
    fn test_poll_connection() {
        let mut server = SocketServer::bind(&loopback(), hello()).unwrap();
        let addr = inet(&server);

        let client = thread::spawn(move || {
            let mut stream = TcpStream::connect(addr).unwrap();
            stream
                .write_all(b"GET / HTTP/1.1\r\nHost: h\r\nConnection: close\r\n\r\n")
                .unwrap();
            let mut response = String::new();
            stream.read_to_string(&mut response).unwrap();
            response
        });

        assert_eq!(server.poll(Some(Duration::from_secs(10))), PollEvent::Connection);
        while !client.is_finished() {
            server.poll(Some(Duration::from_millis(10)));
        }

        let response = client.join().unwrap();
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response.ends_with("\r\n\r\nhi"));
    }

    #[test]
    fn test_shutdown_handle() {
        let mut server = SocketServer::bind(&loopback(), hello())
            .unwrap()
            .with_poll_interval(Duration::from_millis(10));
        let handle = server.shutdown_handle();

        let (tx, rx) = std::sync::mpsc::channel();
        let thread = thread::spawn(move || {
            tx.send(()).unwrap();
            server.run();
        });

        rx.recv().unwrap();
        handle.shutdown(true, Some(Duration::from_secs(10))).unwrap();
        thread.join().unwrap();
    }

    #[test]
    fn test_shutdown_drains_connections() {
        let mut server = SocketServer::bind(&loopback(), hello())
            .unwrap()
            .with_poll_interval(Duration::from_millis(10));
        let addr = inet(&server);

        let mut stream = TcpStream::connect(addr).unwrap();
        stream.write_all(b"GET / HTTP/1.1\r\nHost: h\r\n").unwrap();
        assert_eq!(server.poll(Some(Duration::from_secs(10))), PollEvent::Connection);
        server.shutdown();

        // the head completes after shutdown was requested
        let client = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            stream.write_all(b"Connection: close\r\n\r\n").unwrap();
            let mut response = String::new();
            stream.read_to_string(&mut response).unwrap();
            response
        });

        server.run();
        let response = client.join().unwrap();
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"), "{response}");
        assert!(response.ends_with("\r\n\r\nhi"));
    }

    #[test]
    fn test_drain_timeout_aborts() {
        let mut server = SocketServer::bind(&loopback(), hello())
            .unwrap()
            .with_drain_timeout(Duration::from_millis(20));
        let addr = inet(&server);

        // idle keep-alive connection
        let mut stream = TcpStream::connect(addr).unwrap();
        assert_eq!(server.poll(Some(Duration::from_secs(10))), PollEvent::Connection);
        server.shutdown();

        let start = Instant::now();
        server.run();
        assert!(start.elapsed() < Duration::from_secs(10));
        assert!(server.tasks.is_empty());

        drop(server);
        let mut rest = Vec::new();
        assert_eq!(stream.read_to_end(&mut rest).unwrap(), 0);
    }

    #[test]
    fn test_accept_error_hook() {
        let errors = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        let counter = errors.clone();
        let failing = socket_handler_fn(|_| Err(io::Error::other("refused")));
        let mut server = SocketServer::bind(&loopback(), Dispatch::blocking(failing))
            .unwrap()
            .on_error(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        let addr = inet(&server);

        let _client = TcpStream::connect(addr).unwrap();
        assert_eq!(server.poll(Some(Duration::from_secs(10))), PollEvent::Error);
        assert_eq!(errors.load(Ordering::SeqCst), 1);
    }
}
