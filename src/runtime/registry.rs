//! Event registry.
//!
//! Maps lower-cased message types to the handlers registered for them, in
//! registration order. Two keys are special:
//! - [`WILDCARD_KEY`] (`""`): runs for every dispatched message, before the
//!   type-specific handlers.
//! - [`SETUP_KEY`] (`"setup"`): runs once per connection when the pool
//!   starts, before any message is received.

use super::pool::ConnectionPool;
use std::collections::{BTreeMap, HashMap};
use std::error::Error;
use std::fmt;

/// Key whose handlers see every message.
pub const WILDCARD_KEY: &str = "";

/// Key whose handlers perform per-connection setup.
pub const SETUP_KEY: &str = "setup";

/// Error type handlers may return. It aborts the dispatch loop.
pub type HandlerError = Box<dyn Error + Send + Sync>;

pub type HandlerResult = Result<(), HandlerError>;

/// A registered callback.
pub type Handler =
    Box<dyn Fn(&ConnectionPool, &Event<'_>, &Params) -> HandlerResult + Send + Sync>;

/// What a handler is invoked with.
#[derive(Debug, Clone, Copy)]
pub struct Event<'a> {
    /// Index of the connection the message arrived on.
    pub index: usize,
    pub prefix: Option<&'a str>,
    /// Canonical command name (or [`SETUP_KEY`] during setup).
    pub command: &'a str,
    pub args: &'a [String],
}

impl<'a> Event<'a> {
    /// The setup event for one connection.
    pub fn setup(index: usize) -> Self {
        Self {
            index,
            prefix: None,
            command: SETUP_KEY,
            args: &[],
        }
    }

    /// Argument at `position`, if present.
    pub fn arg(&self, position: usize) -> Option<&'a str> {
        self.args.get(position).map(String::as_str)
    }
}

/// Fixed keyword parameters bound to a handler at registration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(BTreeMap<String, String>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// A handler together with its bound parameters.
pub(crate) struct Binding {
    pub handler: Handler,
    pub params: Params,
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// Append-only handler table.
///
/// Registration needs `&mut self`; once the owning pool is shared and
/// running the table is read-only.
#[derive(Debug, Default)]
pub struct EventRegistry {
    handlers: HashMap<String, Vec<Binding>>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `key` (matched case-insensitively).
    pub fn register<F>(&mut self, key: &str, handler: F)
    where
        F: Fn(&ConnectionPool, &Event<'_>, &Params) -> HandlerResult + Send + Sync + 'static,
    {
        self.register_with(key, Params::new(), handler);
    }

    /// Register `handler` under `key` with fixed parameters.
    pub fn register_with<F>(&mut self, key: &str, params: Params, handler: F)
    where
        F: Fn(&ConnectionPool, &Event<'_>, &Params) -> HandlerResult + Send + Sync + 'static,
    {
        self.handlers
            .entry(key.to_lowercase())
            .or_default()
            .push(Binding {
                handler: Box::new(handler),
                params,
            });
    }

    /// Handlers for `key` in registration order. `key` must already be lower-cased.
    pub(crate) fn handlers(&self, key: &str) -> &[Binding] {
        self.handlers.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, key: &str) -> bool {
        !self.handlers(key).is_empty()
    }

    /// Total number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
