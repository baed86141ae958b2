//! Connection pool runtime.
//!
//! A single thread multiplexes every connection through mio (epoll on
//! Linux, kqueue on macOS) while any number of threads send through the
//! pool. Building blocks:
//! - `RateLimiter`: per-connection token bucket
//! - `EventRegistry`: handlers keyed by message type
//! - `LineBuffer`: per-connection line reassembly
//! - `Transport`: plain or TLS stream over a non-blocking socket
//! - `ConnectionPool`: construction, sends, dispatch and the event loop

mod buffer;
mod error;
mod event_loop;
mod limiter;
mod pool;
mod registry;
mod transport;
mod usage;

pub use error::PoolError;
pub use limiter::RateLimiter;
pub use pool::{ConnectionPool, PoolConfig, SendOptions, ShutdownHandle};
pub use registry::{
    Event, EventRegistry, Handler, HandlerError, HandlerResult, Params, SETUP_KEY, WILDCARD_KEY,
};
