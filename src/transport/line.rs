//! Newline-delimited control line reassembly.
//!
//! TCP delivers arbitrary byte runs; [`LineBuffer`] accumulates them and
//! yields complete, trimmed lines. Incomplete trailing bytes stay buffered
//! until the next read.

// ============================================================================
// Imports
// ============================================================================

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Longest control line accepted before the buffer is discarded.
pub const MAX_LINE_LEN: usize = 64 * 1024;

// ============================================================================
// LineBuffer
// ============================================================================

/// Accumulates bytes and splits them into control lines.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
    /// Bytes already searched for a newline.
    scanned: usize,
}

impl LineBuffer {
    /// Creates an empty buffer.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends received bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the pending partial line exceeds
    /// [`MAX_LINE_LEN`]. The buffer is cleared in that case.
    pub fn extend(&mut self, bytes: &[u8]) -> Result<()> {
        self.buf.extend_from_slice(bytes);

        let pending = self.pending_partial_len();
        if pending > MAX_LINE_LEN {
            self.clear();
            return Err(Error::protocol(format!(
                "control line exceeds {MAX_LINE_LEN} bytes ({pending} buffered)"
            )));
        }
        Ok(())
    }

    /// Removes and returns the next complete non-empty line, trimmed.
    ///
    /// Invalid UTF-8 is replaced rather than rejected; the JSON parser
    /// decides whether the line is usable.
    pub fn next_line(&mut self) -> Option<String> {
        loop {
            let offset = self.buf[self.scanned..].iter().position(|b| *b == b'\n');
            let Some(offset) = offset else {
                self.scanned = self.buf.len();
                return None;
            };

            let end = self.scanned + offset;
            let raw: Vec<u8> = self.buf.drain(..=end).collect();
            self.scanned = 0;

            let line = String::from_utf8_lossy(&raw[..end]).trim().to_string();
            if !line.is_empty() {
                return Some(line);
            }
        }
    }

    /// Number of buffered bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns `true` if nothing is buffered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Discards all buffered bytes.
    #[inline]
    pub fn clear(&mut self) {
        self.buf.clear();
        self.scanned = 0;
    }

    /// Length of the bytes after the last newline.
    fn pending_partial_len(&self) -> usize {
        match self.buf.iter().rposition(|b| *b == b'\n') {
            Some(pos) => self.buf.len() - pos - 1,
            None => self.buf.len(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
