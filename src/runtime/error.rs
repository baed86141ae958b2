//! Errors surfaced by the connection pool.

use crate::protocol::EncodeError;
use super::registry::HandlerError;
use std::io;
use std::net::SocketAddr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PoolError {
    /// Pool settings that can never work (zero connections, empty bucket, ...).
    #[error("invalid pool settings: {0}")]
    InvalidSettings(String),

    #[error("encryption requested but this build has no TLS support (enable the `tls` feature)")]
    TlsUnavailable,

    #[error("no '{}' handler registered; connections cannot be set up", super::registry::SETUP_KEY)]
    MissingSetupHandler,

    #[error("failed to resolve '{host}': {source}")]
    Resolve {
        host: String,
        #[source]
        source: io::Error,
    },

    #[error("connection {index} to {addr} failed: {source}")]
    Connect {
        index: usize,
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("no connection with index {0}")]
    UnknownConnection(usize),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error("I/O error on connection {index}: {source}")]
    Io {
        index: usize,
        #[source]
        source: io::Error,
    },

    #[error("connection {index} closed by peer")]
    ConnectionClosed { index: usize },

    #[error("poll failed: {0}")]
    Poll(#[source] io::Error),

    #[error("handler for '{key}' failed on connection {index}: {source}")]
    Handler {
        key: String,
        index: usize,
        #[source]
        source: HandlerError,
    },

    #[error("dispatch loop already started")]
    AlreadyRunning,

    #[error("pool is shutting down")]
    Shutdown,
}
