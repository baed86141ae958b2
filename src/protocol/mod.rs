//! Wire-level pieces of the line protocol.
//!
//! - `parser`: turns one received line into a [`Message`]
//! - `commands`: synonym table applied to parsed command names
//! - `encoding`: text encodings and outgoing line assembly
//!
//! ## Line Format
//!
//! ```text
//! [:prefix] command arg arg ... [:trailing argument with spaces]\r\n
//! ```

pub mod commands;
pub mod encoding;
pub mod parser;

pub use commands::CommandTable;
pub use encoding::{encode_line, EncodeError, Encoding, Part};
pub use parser::{parse, Message, ParseError};

/// Terminator appended to every outgoing line.
pub const LINE_TERMINATOR: &[u8] = b"\r\n";
