//! tandem: a multi-connection line-protocol client.
//!
//! Opens several connections to one server, rate-limits what is sent on
//! each, parses incoming lines and hands them to registered handlers.
//!
//! ```no_run
//! use tandem::{ConnectionPool, PoolConfig};
//!
//! let mut pool = ConnectionPool::connect(PoolConfig {
//!     host: "irc.example.net".into(),
//!     connections: 3,
//!     ..PoolConfig::default()
//! })?;
//!
//! pool.on("setup", |pool, event, _params| {
//!     let nick = format!("bot{}", event.index);
//!     pool.send_to(event.index, &["NICK".into(), nick.into()])?;
//!     Ok(())
//! });
//! pool.on("ping", |pool, event, _params| {
//!     pool.send_to(event.index, &["PONG".into(), event.arg(0).into()])?;
//!     Ok(())
//! });
//!
//! pool.run()?;
//! # Ok::<(), tandem::PoolError>(())
//! ```

pub mod config;
pub mod protocol;
pub mod runtime;

pub use protocol::{CommandTable, Encoding, Message, ParseError, Part};
pub use runtime::{
    ConnectionPool, Event, EventRegistry, Params, PoolConfig, PoolError, RateLimiter,
    SendOptions, ShutdownHandle, SETUP_KEY, WILDCARD_KEY,
};
