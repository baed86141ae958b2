//! Per-connection line reassembly.
//!
//! Bytes are appended as they are read; complete lines are split off the
//! front while a trailing partial line stays buffered for the next read.
//! Lines longer than the limit are dropped whole, including any tail that
//! arrives after the buffered part was discarded.

use bytes::{Buf, Bytes, BytesMut};
use std::mem;

const LINE_FEED: u8 = b'\n';

/// Pending bytes for one connection.
#[derive(Debug)]
pub(crate) struct LineBuffer {
    pending: BytesMut,
    max_line_length: usize,
    /// The head of the current line was dropped; skip up to the next `\n`.
    discarding: bool,
    /// Bytes dropped since the last `discard_oversized`.
    discarded: usize,
}

impl LineBuffer {
    /// Create a buffer that drops lines longer than `max_line_length`.
    pub fn new(max_line_length: usize) -> Self {
        Self {
            pending: BytesMut::with_capacity(max_line_length.min(4096)),
            max_line_length,
            discarding: false,
            discarded: 0,
        }
    }

    pub fn extend(&mut self, data: &[u8]) {
        self.pending.extend_from_slice(data);
    }

    /// Split off the next complete line, without its `\n`.
    pub fn next_line(&mut self) -> Option<Bytes> {
        loop {
            let Some(end) = self.pending.iter().position(|&b| b == LINE_FEED) else {
                if self.discarding {
                    self.discarded += self.pending.len();
                    self.pending.clear();
                }
                return None;
            };

            let line = self.pending.split_to(end).freeze();
            self.pending.advance(1);

            if mem::take(&mut self.discarding) || line.len() > self.max_line_length {
                self.discarded += end + 1;
                continue;
            }
            return Some(line);
        }
    }

    /// Drop a partial line that has outgrown the limit, and report every
    /// byte dropped since the previous call.
    ///
    /// Only meaningful once every complete line has been taken. The rest of
    /// a dropped partial line is skipped when it arrives.
    pub fn discard_oversized(&mut self) -> Option<usize> {
        if self.pending.len() > self.max_line_length {
            self.discarded += self.pending.len();
            self.pending.clear();
            self.discarding = true;
        }
        match mem::take(&mut self.discarded) {
            0 => None,
            dropped => Some(dropped),
        }
    }

    /// Bytes held that do not yet form a complete line.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
