//! Handshake negotiation.
//!
//! Every new connection starts with exactly one control line from the
//! device describing its capabilities. The handshake read is a dedicated
//! single-line read that completes before the receiver loop starts; bytes
//! that arrive behind the handshake line are returned to the caller so the
//! receiver loop can pick them up.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::protocol::{Capabilities, Handshake};

use super::line::LineBuffer;

// ============================================================================
// Constants
// ============================================================================

/// Read size used while waiting for the handshake line.
const READ_CHUNK: usize = 256;

// ============================================================================
// Negotiation
// ============================================================================

/// Reads and validates the handshake line.
///
/// # Returns
///
/// The negotiated [`Capabilities`] and a [`LineBuffer`] holding any bytes
/// received after the handshake line.
///
/// # Errors
///
/// - [`Error::ConnectionTimeout`] if no line arrives within `handshake_timeout`
/// - [`Error::ConnectionClosed`] if the peer closes before sending a line
/// - [`Error::Handshake`] if the line is malformed or incomplete
/// - [`Error::Io`] on read failure
pub async fn negotiate<R>(
    reader: &mut R,
    handshake_timeout: Duration,
) -> Result<(Capabilities, LineBuffer)>
where
    R: AsyncRead + Unpin,
{
    let mut lines = LineBuffer::new();

    let line = timeout(handshake_timeout, read_first_line(reader, &mut lines))
        .await
        .map_err(|_| {
            warn!(
                timeout_ms = handshake_timeout.as_millis() as u64,
                "No handshake received"
            );
            Error::connection_timeout(handshake_timeout.as_millis() as u64)
        })??;

    debug!(%line, "Handshake line received");

    let capabilities = Handshake::parse(&line)?.into_capabilities()?;
    Ok((capabilities, lines))
}

/// Reads until the first complete line is buffered.
async fn read_first_line<R>(reader: &mut R, lines: &mut LineBuffer) -> Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        if let Some(line) = lines.next_line() {
            return Ok(line);
        }

        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Err(Error::ConnectionClosed);
        }

        lines
            .extend(&chunk[..n])
            .map_err(|e| Error::handshake(e.to_string()))?;
    }
}

// ============================================================================
// Tests
// ============================================================================
