//! Single-attempt frame transfer.
//!
//! One attempt walks the device through:
//!
//! ```text
//! client                                   device
//!   |-- {"command":"DISPLAY",...}\n ---------->|
//!   |<--------------- {"status":"ready",...} --|
//!   |-- payload (chunked raw bytes) ---------->|
//!   |<------------------ {"status":"ok",...} --|
//! ```
//!
//! Each wait is registered before the write that provokes it, so an
//! acknowledgement arriving faster than the writer returns is not lost.

// ============================================================================
// Imports
// ============================================================================

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, error, trace, warn};

use crate::error::{Error, Result, TransferPhase};
use crate::identifiers::ScreenId;
use crate::protocol::{DisplayHeader, ResponseCode, Status};
use crate::transport::Link;

use super::core::ClientInner;
use super::options::ClientOptions;

// ============================================================================
// TransferSession
// ============================================================================

/// One transfer attempt of one frame.
#[derive(Debug)]
pub(crate) struct TransferSession<'a> {
    pub(crate) screen_id: &'a ScreenId,
    pub(crate) payload: &'a [u8],
    pub(crate) chunk_size: usize,
}

impl TransferSession<'_> {
    /// Runs the attempt on `link` with the timeouts from `options`.
    ///
    /// # Errors
    ///
    /// - [`Error::ResponseTimeout`] if an acknowledgement is missing
    /// - [`Error::DeviceRejected`] if the device answers with a non-OK code
    /// - [`Error::Io`] of kind `TimedOut` if the device stops reading
    /// - [`Error::ConnectionClosed`] or [`Error::Io`] on transport failure
    pub(crate) async fn run(&self, link: &Link, options: &ClientOptions) -> Result<()> {
        let header = DisplayHeader::new(self.payload.len(), self.screen_id).to_line()?;

        // Phase 1: header and ready.
        let ready = link.register(Status::Ready);
        bounded_write(options.write_timeout, "header", link.write_all(header.as_bytes())).await?;
        trace!(length = self.payload.len(), screen_id = %self.screen_id, "Header sent");

        let response = ready.wait(options.ready_timeout).await?;
        classify_ready(response.status, response.code)?;

        // Phase 2: payload and completion.
        let ack = link.register(Status::Ok);
        let stream = async {
            for chunk in self.payload.chunks(self.chunk_size) {
                link.write_all(chunk).await?;
            }
            Ok::<_, Error>(())
        };
        bounded_write(options.write_timeout, "payload", stream).await?;
        trace!(bytes = self.payload.len(), "Payload sent");

        let response = ack.wait(options.ack_timeout).await?;
        classify_completion(response.status, response.code)
    }
}

/// Fails `write` with a fatal `TimedOut` I/O error once `limit` passes.
async fn bounded_write(
    limit: Duration,
    what: &'static str,
    write: impl Future<Output = Result<()>>,
) -> Result<()> {
    match timeout(limit, write).await {
        Ok(result) => result,
        Err(_) => {
            warn!(what, timeout_ms = limit.as_millis() as u64, "Device stopped reading");
            Err(Error::Io(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("{what} write timed out after {}ms", limit.as_millis()),
            )))
        }
    }
}

/// Maps the acknowledgement to a header to the attempt's outcome.
fn classify_ready(status: Status, code: ResponseCode) -> Result<()> {
    if status == Status::Ready && code.is_ok() {
        return Ok(());
    }
    let code = if code.is_ok() {
        ResponseCode::missing()
    } else {
        code
    };
    Err(Error::device_rejected(TransferPhase::Ready, code))
}

/// Maps a completion acknowledgement to the attempt's outcome.
fn classify_completion(status: Status, code: ResponseCode) -> Result<()> {
    if status == Status::Ok && code.is_ok() {
        return Ok(());
    }
    // An error status without a code still fails the attempt.
    let code = if code.is_ok() {
        ResponseCode::missing()
    } else {
        code
    };
    Err(Error::device_rejected(TransferPhase::Completion, code))
}

/// Lengths of the writes used to stream `len` bytes in `chunk_size` pieces.
///
/// # Panics
///
/// Panics if `chunk_size` is zero.
pub fn chunk_lengths(len: usize, chunk_size: usize) -> impl Iterator<Item = usize> {
    assert!(chunk_size > 0, "chunk_size must be non-zero");
    let full = len / chunk_size;
    let rest = len % chunk_size;
    std::iter::repeat_n(chunk_size, full).chain((rest > 0).then_some(rest))
}

// ============================================================================
// Attempt Execution
// ============================================================================

impl ClientInner {
    /// Runs one attempt under the send lock.
    ///
    /// A fatal failure tears the link down and schedules a reconnect before
    /// returning.
    pub(crate) async fn transfer_once(
        self: &Arc<Self>,
        screen_id: &ScreenId,
        payload: &[u8],
    ) -> Result<()> {
        let _send = self.send_lock.lock().await;

        let link = self.current_link().ok_or(Error::NotReady)?;
        let session = TransferSession {
            screen_id,
            payload,
            chunk_size: self.options.chunk_size,
        };

        let result = session.run(&link, &self.options).await;

        match &result {
            Ok(()) => debug!(generation = %link.generation(), bytes = payload.len(), "Frame delivered"),
            Err(e) if e.is_fatal() => {
                if e.is_connection_error() {
                    warn!(generation = %link.generation(), error = %e, "Link failed during transfer");
                } else {
                    error!(generation = %link.generation(), error = %e, "Device reported a fatal error");
                }
                self.drop_link(link.generation(), "fatal transfer failure");
            }
            Err(e) => debug!(generation = %link.generation(), error = %e, "Transfer attempt failed"),
        }
        result
    }
}

// ============================================================================
// Tests
// ============================================================================
