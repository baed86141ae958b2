//! Line parser.
//!
//! Splits a received line into an optional prefix, a normalized command
//! name and its arguments. A `:`-marked argument swallows the rest of the
//! line, embedded whitespace included.

use super::commands::CommandTable;
use thiserror::Error;

/// Marks the sender prefix at the start of a line.
const PREFIX_MARKER: char = ':';

/// Marks the final argument that extends to the end of the line.
const TRAILING_MARKER: char = ':';

/// A parsed protocol line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Sender prefix with the marker removed.
    pub prefix: Option<String>,
    /// Lower-cased command after synonym lookup.
    pub command: String,
    pub args: Vec<String>,
}

/// Why a line could not be turned into a [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("empty line")]
    Empty,
    #[error("line has no command")]
    MissingCommand,
}

/// Marks the end of a line; stripped before parsing.
const LINE_ENDINGS: &[char] = &['\r', '\n'];

/// Parse one line. A leftover `\r` or `\n` at the end is ignored; any other
/// trailing whitespace belongs to the last argument.
pub fn parse(line: &str, commands: &CommandTable) -> Result<Message, ParseError> {
    let line = line.trim_end_matches(LINE_ENDINGS).trim_start();
    if line.is_empty() {
        return Err(ParseError::Empty);
    }

    let (prefix, rest) = match line.strip_prefix(PREFIX_MARKER) {
        Some(stripped) => {
            let (prefix, rest) = next_token(stripped);
            (Some(prefix.to_string()), rest)
        }
        None => (None, line),
    };

    let (command, mut rest) = next_token(rest);
    if command.is_empty() {
        return Err(ParseError::MissingCommand);
    }
    let command = commands.canonical(&command.to_lowercase()).to_string();

    let mut args = Vec::new();
    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            break;
        }
        if let Some(trailing) = rest.strip_prefix(TRAILING_MARKER) {
            args.push(trailing.to_string());
            break;
        }
        let (arg, remaining) = next_token(rest);
        args.push(arg.to_string());
        rest = remaining;
    }

    Ok(Message {
        prefix,
        command,
        args,
    })
}

/// Split off the first whitespace-delimited token.
fn next_token(input: &str) -> (&str, &str) {
    let input = input.trim_start();
    match input.find(char::is_whitespace) {
        Some(end) => (&input[..end], &input[end..]),
        None => (input, ""),
    }
}
