//! Pending-response correlation.
//!
//! A caller that expects an acknowledgement registers a [`PendingWait`]
//! *before* writing the message that provokes it, then awaits it with a
//! timeout. The receiver loop hands each parsed [`Response`] to
//! [`Correlator::deliver`].
//!
//! # Matching
//!
//! Waits are keyed by [`WaitId`], never by status text. A response goes to
//! exactly one waiter: the oldest one expecting its status. Responses with
//! status `error` go to the oldest waiter regardless of what it expects, so a
//! device rejection resolves the wait instead of letting it time out.
//! Responses nobody waits for are dropped.
//!
//! # Cleanup
//!
//! A [`PendingWait`] deregisters itself on drop, so every exit path
//! (match, timeout, connection loss, cancelled future) removes it.

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::identifiers::WaitId;
use crate::protocol::{Response, Status};

// ============================================================================
// Types
// ============================================================================

/// One registered waiter.
struct Waiter {
    expected: Status,
    tx: oneshot::Sender<Response>,
}

/// Waiters ordered by registration.
type WaiterMap = BTreeMap<WaitId, Waiter>;

// ============================================================================
// Correlator
// ============================================================================

/// Routes acknowledgements to the callers waiting for them.
#[derive(Default)]
pub struct Correlator {
    waiters: Mutex<WaiterMap>,
}

impl Correlator {
    /// Creates an empty correlator.
    #[inline]
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers a wait for a response with the `expected` status.
    #[must_use]
    pub fn register(self: &Arc<Self>, expected: Status) -> PendingWait {
        let id = WaitId::next();
        let (tx, rx) = oneshot::channel();

        self.waiters.lock().insert(
            id,
            Waiter {
                expected: expected.clone(),
                tx,
            },
        );
        trace!(%id, status = %expected, "Wait registered");

        PendingWait {
            id,
            expected,
            rx,
            correlator: Arc::clone(self),
        }
    }

    /// Delivers a response to the oldest matching waiter.
    ///
    /// Returns the id of the waiter that received it, or `None` if the
    /// response was dropped.
    pub fn deliver(&self, response: Response) -> Option<WaitId> {
        let (id, waiter) = {
            let mut waiters = self.waiters.lock();
            let id = waiters
                .iter()
                .find(|(_, w)| w.expected == response.status || response.status == Status::Error)
                .map(|(id, _)| *id)?;
            (id, waiters.remove(&id)?)
        };

        match waiter.tx.send(response) {
            Ok(()) => {
                trace!(%id, "Response delivered");
                Some(id)
            }
            Err(response) => {
                debug!(%id, status = %response.status, "Waiter gone before delivery");
                None
            }
        }
    }

    /// Fails every outstanding wait with [`Error::ConnectionClosed`].
    ///
    /// Returns the number of waits failed.
    pub fn fail_all(&self) -> usize {
        let drained = std::mem::take(&mut *self.waiters.lock());
        let count = drained.len();
        if count > 0 {
            debug!(count, "Failed pending waits");
        }
        count
    }

    /// Number of outstanding waits.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.waiters.lock().len()
    }

    fn remove(&self, id: WaitId) {
        self.waiters.lock().remove(&id);
    }
}

// ============================================================================
// PendingWait
// ============================================================================

/// A registered wait for one acknowledgement.
///
/// Deregisters itself when dropped.
pub struct PendingWait {
    id: WaitId,
    expected: Status,
    rx: oneshot::Receiver<Response>,
    correlator: Arc<Correlator>,
}

impl PendingWait {
    /// Returns the wait's id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> WaitId {
        self.id
    }

    /// Waits up to `wait_timeout` for the response.
    ///
    /// # Errors
    ///
    /// - [`Error::ResponseTimeout`] if nothing arrives in time
    /// - [`Error::ConnectionClosed`] if the link is torn down while waiting
    pub async fn wait(mut self, wait_timeout: Duration) -> Result<Response> {
        match timeout(wait_timeout, &mut self.rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => Err(Error::response_timeout(
                self.expected.clone(),
                wait_timeout.as_millis() as u64,
            )),
        }
    }
}

impl Drop for PendingWait {
    fn drop(&mut self) {
        self.correlator.remove(self.id);
    }
}

// ============================================================================
// Tests
// ============================================================================
