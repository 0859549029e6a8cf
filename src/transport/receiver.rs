//! Receiver loop.
//!
//! One task per link continuously drains the read half of the stream,
//! reassembles control lines and routes them:
//!
//! - `command` present: handed to the event sink (never awaited)
//! - `status` present: delivered to the link's [`Correlator`]
//! - anything else, or malformed JSON: logged and discarded
//!
//! Each read is bounded by a short poll interval so the stop flag is seen
//! promptly. A zero-byte read means the device closed the connection; a run
//! of consecutive read errors is treated the same way. Both set the `lost`
//! flag and report through the loss handler, unless the loop was stopped
//! locally.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use crate::identifiers::LinkGeneration;
use crate::protocol::{DeviceEvent, Incoming};

use super::correlator::Correlator;
use super::line::LineBuffer;

// ============================================================================
// Constants
// ============================================================================

/// Size of each read from the stream.
const READ_CHUNK: usize = 1024;

// ============================================================================
// Types
// ============================================================================

/// Receives device events. Must not block.
pub type EventSink = Arc<dyn Fn(DeviceEvent) + Send + Sync>;

/// Called once when the link is lost without a local stop.
pub type LossHandler = Arc<dyn Fn(LinkGeneration) + Send + Sync>;

/// Why the receiver loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverExit {
    /// Stop flag observed.
    Stopped,
    /// Device closed the connection.
    PeerClosed,
    /// Too many consecutive read errors.
    ReadErrors,
}

// ============================================================================
// ReceiverLoop
// ============================================================================

/// State of one receiver loop.
pub struct ReceiverLoop<R> {
    pub(crate) reader: R,
    pub(crate) lines: LineBuffer,
    pub(crate) generation: LinkGeneration,
    pub(crate) correlator: Arc<Correlator>,
    pub(crate) on_event: EventSink,
    pub(crate) on_lost: LossHandler,
    pub(crate) stop: Arc<AtomicBool>,
    pub(crate) lost: Arc<AtomicBool>,
    pub(crate) poll_interval: Duration,
    pub(crate) max_read_errors: u32,
}

impl<R> ReceiverLoop<R>
where
    R: AsyncRead + Unpin,
{
    /// Runs until stopped or the connection is lost.
    pub async fn run(mut self) -> ReceiverExit {
        debug!(generation = %self.generation, "Receiver loop started");

        // Lines that arrived together with the handshake.
        self.drain_lines();

        let mut chunk = [0u8; READ_CHUNK];
        let mut read_errors = 0u32;

        let exit = loop {
            if self.stop.load(Ordering::SeqCst) {
                break ReceiverExit::Stopped;
            }

            match timeout(self.poll_interval, self.reader.read(&mut chunk)).await {
                // Poll timeout; check the stop flag again
                Err(_) => continue,

                Ok(Ok(0)) => {
                    warn!(generation = %self.generation, "Connection closed by device");
                    break ReceiverExit::PeerClosed;
                }

                Ok(Ok(n)) => {
                    read_errors = 0;
                    if let Err(e) = self.lines.extend(&chunk[..n]) {
                        warn!(error = %e, "Discarding oversized control line");
                    }
                    self.drain_lines();
                }

                Ok(Err(e)) => {
                    read_errors += 1;
                    warn!(
                        generation = %self.generation,
                        error = %e,
                        read_errors,
                        max = self.max_read_errors,
                        "Receiver read error"
                    );
                    if read_errors >= self.max_read_errors {
                        break ReceiverExit::ReadErrors;
                    }
                }
            }
        };

        if exit != ReceiverExit::Stopped && !self.stop.load(Ordering::SeqCst) {
            self.lost.store(true, Ordering::SeqCst);
            (self.on_lost)(self.generation);
        }

        info!(generation = %self.generation, ?exit, "Receiver loop stopped");
        exit
    }

    /// Routes every complete buffered line.
    fn drain_lines(&mut self) {
        while let Some(line) = self.lines.next_line() {
            self.route(&line);
        }
    }

    /// Routes one control line.
    fn route(&self, line: &str) {
        trace!(%line, "Control line received");

        match Incoming::parse(line) {
            Ok(Incoming::Event(event)) => {
                debug!(?event, "Device event");
                (self.on_event)(event);
            }
            Ok(Incoming::Response(response)) => {
                let status = response.status.clone();
                let code = response.code;
                if self.correlator.deliver(response).is_none() {
                    debug!(%status, %code, "No waiter for response, dropped");
                }
            }
            Ok(Incoming::Unrecognized(value)) => {
                debug!(%value, "Ignoring unrecognized message");
            }
            Err(e) => {
                warn!(error = %e, %line, "Discarding malformed control line");
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
