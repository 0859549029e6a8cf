//! Reconnect policy and background reconnect loop.
//!
//! After a connection loss or a fatal transfer failure the client
//! reconnects in the background, following a backoff schedule:
//!
//! | Attempt | Default delay |
//! |---------|---------------|
//! | 0 | 1 s |
//! | 1 | 2 s |
//! | 2 | 5 s |
//! | 3 | 10 s |
//! | 4+ | 15 s |
//!
//! Every iteration sleeps first and then connects. The loop ends on
//! success, on shutdown, or once the policy's total duration is exceeded.
//! At most one loop runs per client.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};

use super::core::ClientInner;
use super::options::millis;

// ============================================================================
// Defaults
// ============================================================================

const DEFAULT_SCHEDULE: [Duration; 5] = [
    Duration::from_secs(1),
    Duration::from_secs(2),
    Duration::from_secs(5),
    Duration::from_secs(10),
    Duration::from_secs(15),
];
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(15);
const DEFAULT_MAX_DURATION: Duration = Duration::from_secs(180);

// ============================================================================
// ReconnectPolicy
// ============================================================================

/// Backoff schedule for background reconnects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    #[serde(rename = "schedule_ms", with = "millis::list")]
    schedule: Vec<Duration>,

    #[serde(rename = "max_delay_ms", with = "millis")]
    max_delay: Duration,

    #[serde(rename = "max_duration_ms", with = "millis::option")]
    max_duration: Option<Duration>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            schedule: DEFAULT_SCHEDULE.to_vec(),
            max_delay: DEFAULT_MAX_DELAY,
            max_duration: Some(DEFAULT_MAX_DURATION),
        }
    }
}

impl ReconnectPolicy {
    /// Creates a policy from an explicit schedule.
    ///
    /// `max_delay` defaults to the largest entry; `max_duration` to 180 s.
    #[must_use]
    pub fn new(schedule: impl IntoIterator<Item = Duration>) -> Self {
        let schedule: Vec<Duration> = schedule.into_iter().collect();
        let max_delay = schedule.iter().copied().max().unwrap_or(DEFAULT_MAX_DELAY);
        Self {
            schedule,
            max_delay,
            max_duration: Some(DEFAULT_MAX_DURATION),
        }
    }

    /// Caps every delay at `max_delay`.
    #[inline]
    #[must_use]
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Gives up after `max_duration` of continuous reconnecting.
    #[inline]
    #[must_use]
    pub fn with_max_duration(mut self, max_duration: Duration) -> Self {
        self.max_duration = Some(max_duration);
        self
    }

    /// Reconnects until closed.
    #[inline]
    #[must_use]
    pub fn indefinite(mut self) -> Self {
        self.max_duration = None;
        self
    }

    /// Returns the delay before attempt `attempt` (zero-based).
    ///
    /// Attempts past the end of the schedule reuse its last entry.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let Some(last) = self.schedule.len().checked_sub(1) else {
            return self.max_delay;
        };
        let index = (attempt as usize).min(last);
        self.schedule[index].min(self.max_delay)
    }

    /// Returns the delay schedule.
    #[inline]
    #[must_use]
    pub fn schedule(&self) -> &[Duration] {
        &self.schedule
    }

    /// Returns the delay cap.
    #[inline]
    #[must_use]
    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Returns the total reconnect budget, `None` if unbounded.
    #[inline]
    #[must_use]
    pub fn max_duration(&self) -> Option<Duration> {
        self.max_duration
    }

    /// Checks the policy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an empty schedule.
    pub fn validate(&self) -> Result<()> {
        if self.schedule.is_empty() {
            return Err(Error::config("reconnect schedule must not be empty"));
        }
        Ok(())
    }
}

// ============================================================================
// ReconnectState
// ============================================================================

/// Shared bookkeeping for the reconnect loop.
#[derive(Debug)]
pub(crate) struct ReconnectState {
    /// Zero-based attempt index into the schedule.
    pub(crate) attempt: AtomicU32,
    /// Cleared by `close`; no new loop starts afterwards.
    pub(crate) enabled: AtomicBool,
    /// Set while a loop is active.
    pub(crate) running: AtomicBool,
    pub(crate) scheduled: AtomicU64,
    pub(crate) completed: AtomicU64,
    pub(crate) shutdown: Notify,
}

impl ReconnectState {
    pub(crate) fn new() -> Self {
        Self {
            attempt: AtomicU32::new(0),
            enabled: AtomicBool::new(true),
            running: AtomicBool::new(false),
            scheduled: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            shutdown: Notify::new(),
        }
    }

    /// Stops any loop and prevents new ones.
    pub(crate) fn disable(&self) {
        self.enabled.store(false, Ordering::SeqCst);
        self.shutdown.notify_waiters();
    }

    #[inline]
    pub(crate) fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Reconnect Loop
// ============================================================================

impl ClientInner {
    /// Starts the reconnect loop unless one is running or reconnect is off.
    pub(crate) fn schedule_reconnect(self: &Arc<Self>, reason: &str) {
        if !self.reconnect.is_enabled() {
            debug!(reason, "Reconnect disabled, not scheduling");
            return;
        }
        if self.reconnect.running.swap(true, Ordering::SeqCst) {
            debug!(reason, "Reconnect already in progress");
            return;
        }

        self.reconnect.scheduled.fetch_add(1, Ordering::SeqCst);
        info!(reason, "Reconnect scheduled");

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            // A successful install releases the flag itself.
            if !inner.reconnect_loop().await {
                inner.reconnect.running.store(false, Ordering::SeqCst);
            }
        });
    }

    /// Returns `true` once a new link has been installed.
    async fn reconnect_loop(self: &Arc<Self>) -> bool {
        let policy = &self.options.reconnect;
        let started = Instant::now();

        loop {
            // Armed before the check so a shutdown in between still wakes the sleep.
            let shutdown = self.reconnect.shutdown.notified();
            tokio::pin!(shutdown);
            shutdown.as_mut().enable();

            if !self.reconnect.is_enabled() {
                debug!("Reconnect loop stopped by shutdown");
                return false;
            }
            if let Some(limit) = policy.max_duration()
                && started.elapsed() >= limit
            {
                error!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Giving up reconnecting"
                );
                return false;
            }

            let attempt = self.reconnect.attempt.load(Ordering::SeqCst);
            let delay = policy.delay_for(attempt);
            debug!(attempt, delay_ms = delay.as_millis() as u64, "Waiting before reconnect");

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = &mut shutdown => {
                    debug!("Reconnect loop woken by shutdown");
                    return false;
                }
            }
            if !self.reconnect.is_enabled() {
                return false;
            }

            match self.establish(true).await {
                Ok(()) => {
                    self.reconnect.completed.fetch_add(1, Ordering::SeqCst);
                    info!(attempt, "Reconnected");
                    return true;
                }
                Err(e) => {
                    self.reconnect.attempt.fetch_add(1, Ordering::SeqCst);
                    warn!(attempt, error = %e, "Reconnect attempt failed");
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
