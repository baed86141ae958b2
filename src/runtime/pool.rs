//! Connection pool.
//!
//! Owns a fixed set of connections to one endpoint, each paired with its
//! own [`RateLimiter`]. Outgoing lines go through [`ConnectionPool::send`],
//! which picks the least recently used connection unless told otherwise.
//! Incoming lines are handled by the dispatch loop in `event_loop`.
//!
//! ## Locking
//!
//! One send lock covers connection selection, the usage order, the rate
//! limiters and the write itself. A send that is waiting for its bucket to
//! refill therefore holds up every other sender in the pool. Each
//! connection's stream sits behind its own mutex so the dispatch loop can
//! read while a sender writes elsewhere.

use super::buffer::LineBuffer;
use super::error::PoolError;
use super::limiter::RateLimiter;
use super::registry::{Event, EventRegistry, HandlerResult, Params, SETUP_KEY, WILDCARD_KEY};
use super::transport::{Connector, Transport};
use super::usage::UsageOrder;
use crate::protocol::{encode_line, parse, CommandTable, Encoding, Message, ParseError, Part};
use mio::{Interest, Poll, Token, Waker};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Poll token reserved for the shutdown waker.
pub(super) const WAKER_TOKEN: Token = Token(usize::MAX);

/// Shortest sleep while waiting for a token.
const MIN_ADMISSION_WAIT: Duration = Duration::from_millis(1);

/// Longest sleep between shutdown checks while waiting for a token.
const MAX_ADMISSION_WAIT: Duration = Duration::from_millis(100);

/// Settings for [`ConnectionPool::connect`].
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub host: String,
    pub port: u16,
    /// Number of connections to open.
    pub connections: usize,
    pub tls: bool,
    /// Token bucket size per connection.
    pub capacity: f64,
    /// Tokens added per second per connection.
    pub fill_rate: f64,
    /// Default encoding for outgoing text and incoming lines.
    pub encoding: Encoding,
    pub connect_timeout: Duration,
    /// Longest partial line kept while waiting for its terminator.
    pub max_line_length: usize,
    pub commands: CommandTable,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6667,
            connections: 1,
            tls: false,
            capacity: 23.0,
            fill_rate: 1.73,
            encoding: Encoding::Utf8,
            connect_timeout: Duration::from_secs(30),
            max_line_length: 8192,
            commands: CommandTable::new(),
        }
    }
}

impl PoolConfig {
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.connections == 0 {
            return Err(PoolError::InvalidSettings(
                "at least one connection is required".into(),
            ));
        }
        if !self.capacity.is_finite() || self.capacity < 1.0 {
            return Err(PoolError::InvalidSettings(format!(
                "bucket capacity must hold at least one token, got {}",
                self.capacity
            )));
        }
        if !self.fill_rate.is_finite() || self.fill_rate <= 0.0 {
            return Err(PoolError::InvalidSettings(format!(
                "fill rate must be positive, got {}",
                self.fill_rate
            )));
        }
        if self.max_line_length == 0 {
            return Err(PoolError::InvalidSettings(
                "max line length must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Per-call overrides for [`ConnectionPool::send_with`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SendOptions {
    /// Connection to use instead of the least recently used one.
    pub target: Option<usize>,
    /// Encoding to use instead of the pool default.
    pub encoding: Option<Encoding>,
}

/// Stops a running pool from another thread.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    requested: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

impl ShutdownHandle {
    /// Ask the dispatch loop to return and pending rate-limited sends to abort.
    pub fn shutdown(&self) -> io::Result<()> {
        self.requested.store(true, Ordering::SeqCst);
        self.waker.wake()
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

pub(super) struct Connection {
    pub peer: SocketAddr,
    pub transport: Mutex<Transport>,
}

/// State guarded by the send lock.
struct SendState {
    usage: UsageOrder,
    limiters: Vec<RateLimiter>,
}

pub struct ConnectionPool {
    pub(super) connections: Vec<Connection>,
    pub(super) registry: EventRegistry,
    pub(super) commands: CommandTable,
    pub(super) encoding: Encoding,
    pub(super) max_line_length: usize,
    /// Taken by the first call to `run`.
    pub(super) poll: Mutex<Option<Poll>>,
    pub(super) shutdown: ShutdownHandle,
    senders: Mutex<SendState>,
}

impl ConnectionPool {
    /// Open `config.connections` connections to the configured endpoint.
    ///
    /// Fails without opening anything if the settings are invalid or TLS is
    /// requested but not compiled in. Any single connection failing fails
    /// the whole pool.
    pub fn connect(config: PoolConfig) -> Result<Self, PoolError> {
        config.validate()?;
        let connector = Connector::new(&config)?;

        info!(
            host = %config.host,
            port = config.port,
            connections = config.connections,
            tls = config.tls,
            "Connecting pool"
        );

        let poll = Poll::new().map_err(PoolError::Poll)?;
        let waker = Waker::new(poll.registry(), WAKER_TOKEN).map_err(PoolError::Poll)?;

        let mut connections = Vec::with_capacity(config.connections);
        for index in 0..config.connections {
            let (mut transport, peer) = connector.open(index)?;
            poll.registry()
                .register(transport.source(), Token(index), Interest::READABLE)
                .map_err(|source| PoolError::Io { index, source })?;

            debug!(index, peer = %peer, "Connection established");
            connections.push(Connection {
                peer,
                transport: Mutex::new(transport),
            });
        }

        let now = Instant::now();
        let limiters = (0..config.connections)
            .map(|_| RateLimiter::new_at(config.capacity, config.fill_rate, now))
            .collect();

        Ok(Self {
            connections,
            registry: EventRegistry::new(),
            commands: config.commands,
            encoding: config.encoding,
            max_line_length: config.max_line_length,
            poll: Mutex::new(Some(poll)),
            shutdown: ShutdownHandle {
                requested: Arc::new(AtomicBool::new(false)),
                waker: Arc::new(waker),
            },
            senders: Mutex::new(SendState {
                usage: UsageOrder::new(config.connections),
                limiters,
            }),
        })
    }

    /// Number of connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Remote address of connection `index`.
    pub fn peer(&self, index: usize) -> Option<SocketAddr> {
        self.connections.get(index).map(|conn| conn.peer)
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn registry(&self) -> &EventRegistry {
        &self.registry
    }

    /// Register a handler for `key`. See [`EventRegistry::register`].
    pub fn on<F>(&mut self, key: &str, handler: F)
    where
        F: Fn(&ConnectionPool, &Event<'_>, &Params) -> HandlerResult + Send + Sync + 'static,
    {
        self.registry.register(key, handler);
    }

    /// Register a handler for `key` with fixed parameters.
    pub fn on_with<F>(&mut self, key: &str, params: Params, handler: F)
    where
        F: Fn(&ConnectionPool, &Event<'_>, &Params) -> HandlerResult + Send + Sync + 'static,
    {
        self.registry.register_with(key, params, handler);
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Send one line on the least recently used connection.
    ///
    /// Returns the index of the connection used.
    pub fn send(&self, parts: &[Part<'_>]) -> Result<usize, PoolError> {
        self.send_with(parts, SendOptions::default())
    }

    /// Send one line on connection `target`.
    pub fn send_to(&self, target: usize, parts: &[Part<'_>]) -> Result<usize, PoolError> {
        self.send_with(
            parts,
            SendOptions {
                target: Some(target),
                ..SendOptions::default()
            },
        )
    }

    /// Send one line, blocking until the chosen connection's bucket admits it.
    ///
    /// The chosen connection becomes the most recently used one whether it
    /// was picked or given as `target`.
    pub fn send_with(&self, parts: &[Part<'_>], options: SendOptions) -> Result<usize, PoolError> {
        let encoding = options.encoding.unwrap_or(self.encoding);
        let line = encode_line(parts, encoding)?;

        let mut state = lock(&self.senders);
        let index = match options.target {
            Some(target) if target >= self.connections.len() => {
                return Err(PoolError::UnknownConnection(target));
            }
            Some(target) => {
                state.usage.touch(target);
                target
            }
            None => state.usage.least_recent().ok_or_else(|| {
                PoolError::InvalidSettings("pool has no connections".into())
            })?,
        };

        self.admit(&mut state.limiters[index], index)?;

        trace!(index, line = %String::from_utf8_lossy(&line).trim_end(), "Sending");
        lock(&self.connections[index].transport)
            .write_line(&line)
            .map_err(|source| PoolError::Io { index, source })?;

        Ok(index)
    }

    /// Wait until `limiter` yields one token.
    fn admit(&self, limiter: &mut RateLimiter, index: usize) -> Result<(), PoolError> {
        loop {
            let now = Instant::now();
            if limiter.consume_at(1.0, now) {
                return Ok(());
            }
            if self.shutdown.is_requested() {
                return Err(PoolError::Shutdown);
            }

            let wait = limiter
                .time_until(1.0, now)
                .clamp(MIN_ADMISSION_WAIT, MAX_ADMISSION_WAIT);
            trace!(index, wait_ms = wait.as_millis() as u64, "Rate limited");
            thread::sleep(wait);
        }
    }

    /// Parse one received line and dispatch it. Unparseable lines are skipped.
    pub(super) fn dispatch_line(&self, index: usize, raw: &[u8]) -> Result<(), PoolError> {
        let text = self.encoding.decode(raw);
        let message = match parse(&text, &self.commands) {
            Ok(message) => message,
            Err(ParseError::Empty) => {
                trace!(index, "Skipping empty line");
                return Ok(());
            }
            Err(e) => {
                warn!(index, error = %e, line = %text.trim_end(), "Skipping unparseable line");
                return Ok(());
            }
        };

        debug!(
            index,
            prefix = message.prefix.as_deref().unwrap_or(""),
            command = %message.command,
            args = ?message.args,
            "Received"
        );
        self.dispatch(index, &message)
    }

    /// Run wildcard handlers, then handlers registered for the message's command.
    ///
    /// A received `setup` command only reaches wildcard handlers; setup
    /// handlers run once per connection from `run`. Handler errors are
    /// returned as-is and not retried; panics unwind.
    pub fn dispatch(&self, index: usize, message: &Message) -> Result<(), PoolError> {
        let event = Event {
            index,
            prefix: message.prefix.as_deref(),
            command: &message.command,
            args: &message.args,
        };
        self.invoke(WILDCARD_KEY, &event)?;
        if message.command == SETUP_KEY {
            return Ok(());
        }
        self.invoke(&message.command, &event)
    }

    pub(super) fn invoke(&self, key: &str, event: &Event<'_>) -> Result<(), PoolError> {
        for binding in self.registry.handlers(key) {
            (binding.handler)(self, event, &binding.params).map_err(|source| {
                PoolError::Handler {
                    key: key.to_string(),
                    index: event.index,
                    source,
                }
            })?;
        }
        Ok(())
    }

    pub(super) fn line_buffers(&self) -> Vec<LineBuffer> {
        (0..self.connections.len())
            .map(|_| LineBuffer::new(self.max_line_length))
            .collect()
    }
}

/// Lock ignoring poisoning. Guarded state is updated in single steps, so a
/// panicking holder cannot leave it half-written.
pub(super) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
