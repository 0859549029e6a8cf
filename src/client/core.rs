//! Display client and connection lifecycle.
//!
//! The [`DisplayClient`] owns everything that belongs to one device target:
//! the current [`Link`], the send lock, counters, event handlers and the
//! reconnect state. Nothing is global; dropping or closing the client
//! tears it all down.
//!
//! # State
//!
//! ```text
//! Disconnected --establish--> HandshakePending --ok--> Ready(link)
//!      ^                              |                    |
//!      +------------ failure ---------+                    |
//!      +------ loss / fatal failure / failure threshold ---+
//! ```
//!
//! Link state is mutated by the owner (connect, close), the receiver loop
//! (peer closed) and the transfer path (fatal failure). All three take the
//! link out of the state under one lock and close it outside the lock,
//! keyed by generation, so a link is never closed twice.
//!
//! # Example
//!
//! ```no_run
//! use display_link::DisplayClient;
//!
//! # async fn example() -> display_link::Result<()> {
//! let client = DisplayClient::builder("192.168.1.50", 8080).connect().await?;
//!
//! client.on_next_screen(|last| println!("device finished {last}"));
//!
//! let frame = vec![0u8; 128 * 128 * 2];
//! let outcome = client.display(&frame).await;
//! println!("{outcome:?}");
//!
//! client.close().await;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::identifiers::{LinkGeneration, ScreenId};
use crate::protocol::{Capabilities, DeviceEvent};
use crate::transport::{Link, LinkConfig, LossHandler};

use super::builder::DisplayClientBuilder;
use super::dispatch::EventDispatcher;
use super::options::ClientOptions;
use super::reconnect::ReconnectState;

// ============================================================================
// Public Types
// ============================================================================

/// Connection state as seen by the owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No link; a reconnect may be pending.
    Disconnected,
    /// Connected, waiting for the handshake.
    HandshakePending,
    /// Handshake done; frames can be sent.
    Ready,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("disconnected"),
            Self::HandshakePending => f.write_str("handshake-pending"),
            Self::Ready => f.write_str("ready"),
        }
    }
}

/// Result of one [`DisplayClient::display`] call.
#[derive(Debug)]
pub enum DisplayOutcome {
    /// Device acknowledged the frame.
    Delivered {
        /// Attempts used, including the successful one.
        attempts: u32,
    },

    /// Every attempt failed; the frame was dropped.
    Dropped {
        /// Attempts made.
        attempts: u32,
        /// Failure of the last attempt.
        reason: Error,
    },

    /// No negotiated link; nothing was sent.
    NotReady,
}

impl DisplayOutcome {
    /// Returns `true` if the frame was delivered.
    #[inline]
    #[must_use]
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }

    /// Returns the number of attempts made.
    #[inline]
    #[must_use]
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Delivered { attempts } | Self::Dropped { attempts, .. } => *attempts,
            Self::NotReady => 0,
        }
    }
}

/// Counters describing the client's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientStats {
    /// Frames acknowledged by the device.
    pub frames_delivered: u64,
    /// Frames dropped after exhausting their attempts.
    pub frames_dropped: u64,
    /// Dropped frames since the last delivery or reconnect.
    pub consecutive_failures: u32,
    /// Reconnect loops started.
    pub reconnects_scheduled: u64,
    /// Reconnect loops that installed a new link.
    pub reconnects: u64,
    /// Time of the last delivered frame.
    pub last_success: Option<Instant>,
}

// ============================================================================
// ClientInner
// ============================================================================

/// Link slot.
pub(crate) enum LinkState {
    Disconnected,
    HandshakePending,
    Ready(Arc<Link>),
}

/// Shared client state.
pub(crate) struct ClientInner {
    pub(crate) link_config: LinkConfig,
    pub(crate) options: ClientOptions,

    /// Never held across an await.
    pub(crate) state: Mutex<LinkState>,

    /// Held for exactly one transfer attempt.
    pub(crate) send_lock: tokio::sync::Mutex<()>,

    pub(crate) screen_id: RwLock<ScreenId>,
    pub(crate) dispatcher: Arc<EventDispatcher>,
    pub(crate) reconnect: ReconnectState,

    /// Cleared by `close`.
    pub(crate) running: AtomicBool,

    pub(crate) consecutive_failures: AtomicU32,
    pub(crate) frames_delivered: AtomicU64,
    pub(crate) frames_dropped: AtomicU64,
    pub(crate) last_success: Mutex<Option<Instant>>,
}

impl ClientInner {
    pub(crate) fn new(link_config: LinkConfig, options: ClientOptions) -> Arc<Self> {
        Arc::new(Self {
            link_config,
            options,
            state: Mutex::new(LinkState::Disconnected),
            send_lock: tokio::sync::Mutex::new(()),
            screen_id: RwLock::new(ScreenId::default()),
            dispatcher: EventDispatcher::new(),
            reconnect: ReconnectState::new(),
            running: AtomicBool::new(true),
            consecutive_failures: AtomicU32::new(0),
            frames_delivered: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
            last_success: Mutex::new(None),
        })
    }

    // ========================================================================
    // Link Lifecycle
    // ========================================================================

    /// Opens a link and installs it as the current one.
    ///
    /// With `reconnecting` set, the reconnect flag is released at install
    /// time so a loss right after install can schedule a fresh loop.
    pub(crate) async fn establish(self: &Arc<Self>, reconnecting: bool) -> Result<()> {
        {
            let mut state = self.state.lock();
            if matches!(*state, LinkState::Disconnected) {
                *state = LinkState::HandshakePending;
            }
        }

        let weak = Arc::downgrade(self);
        let on_lost: LossHandler = Arc::new(move |generation| {
            if let Some(inner) = weak.upgrade() {
                inner.drop_link(generation, "connection lost");
            }
        });

        let link = match Link::open(&self.link_config, self.dispatcher.sink(), on_lost).await {
            Ok(link) => link,
            Err(e) => {
                let mut state = self.state.lock();
                if matches!(*state, LinkState::HandshakePending) {
                    *state = LinkState::Disconnected;
                }
                warn!(
                    host = %self.link_config.host,
                    port = self.link_config.port,
                    error = %e,
                    "Connect failed"
                );
                return Err(e);
            }
        };

        let installed = {
            let mut state = self.state.lock();
            if !self.running.load(Ordering::SeqCst) || link.is_lost() {
                if matches!(*state, LinkState::HandshakePending) {
                    *state = LinkState::Disconnected;
                }
                None
            } else {
                let previous = std::mem::replace(&mut *state, LinkState::Ready(Arc::clone(&link)));
                if reconnecting {
                    self.reconnect.running.store(false, Ordering::SeqCst);
                }
                self.reconnect.attempt.store(0, Ordering::SeqCst);
                self.consecutive_failures.store(0, Ordering::SeqCst);
                Some(previous)
            }
        };

        match installed {
            Some(previous) => {
                if let LinkState::Ready(old) = previous {
                    old.close();
                }
                info!(generation = %link.generation(), capabilities = %link.capabilities(), "Client ready");
                Ok(())
            }
            None => {
                debug!(generation = %link.generation(), "Discarding link lost before install");
                link.close();
                Err(Error::ConnectionClosed)
            }
        }
    }

    /// Returns the current link if Ready.
    pub(crate) fn current_link(&self) -> Option<Arc<Link>> {
        match &*self.state.lock() {
            LinkState::Ready(link) => Some(Arc::clone(link)),
            _ => None,
        }
    }

    /// Takes the link out of the state if it is still the current one.
    fn take_link(&self, generation: LinkGeneration) -> Option<Arc<Link>> {
        let mut state = self.state.lock();
        let current = matches!(&*state, LinkState::Ready(link) if link.generation() == generation);
        if !current {
            return None;
        }
        match std::mem::replace(&mut *state, LinkState::Disconnected) {
            LinkState::Ready(link) => Some(link),
            _ => None,
        }
    }

    /// Tears down link `generation` and schedules a reconnect.
    ///
    /// Does nothing if that link is no longer current.
    pub(crate) fn drop_link(self: &Arc<Self>, generation: LinkGeneration, reason: &str) {
        let Some(link) = self.take_link(generation) else {
            debug!(%generation, reason, "Link already torn down");
            return;
        };

        warn!(%generation, reason, "Dropping device link");
        link.close();

        if self.running.load(Ordering::SeqCst) {
            self.schedule_reconnect(reason);
        }
    }

    /// Stops reconnecting and tears down the current link.
    ///
    /// Returns the link that was closed. Only the first call does anything.
    pub(crate) fn shutdown(&self) -> Option<Arc<Link>> {
        if !self.running.swap(false, Ordering::SeqCst) {
            debug!("Display client already closed");
            return None;
        }

        self.reconnect.disable();

        let link = match std::mem::replace(&mut *self.state.lock(), LinkState::Disconnected) {
            LinkState::Ready(link) => Some(link),
            _ => None,
        };
        if let Some(link) = &link {
            link.close();
        }

        info!("Display client closed");
        link
    }

    // ========================================================================
    // Retry Policy
    // ========================================================================

    /// Sends one frame with retries. Never fails; see [`DisplayOutcome`].
    pub(crate) async fn display(self: &Arc<Self>, payload: &[u8]) -> DisplayOutcome {
        if !self.running.load(Ordering::SeqCst) || self.current_link().is_none() {
            debug!(bytes = payload.len(), "Not ready, frame skipped");
            return DisplayOutcome::NotReady;
        }

        let screen_id = self.screen_id.read().clone();
        let max_attempts = self.options.max_attempts;
        let mut last_error = Error::NotReady;
        let mut attempts = 0;

        for attempt in 1..=max_attempts {
            attempts = attempt;
            match self.transfer_once(&screen_id, payload).await {
                Ok(()) => {
                    self.record_success();
                    return DisplayOutcome::Delivered { attempts };
                }
                Err(Error::NotReady) if attempt == 1 => {
                    debug!("Link dropped before the first attempt");
                    return DisplayOutcome::NotReady;
                }
                Err(e) => {
                    warn!(attempt, max_attempts, error = %e, "Transfer attempt failed");
                    let retry = e.is_retriable();
                    last_error = e;
                    if !retry {
                        break;
                    }
                    if attempt < max_attempts {
                        tokio::time::sleep(self.options.retry_delay).await;
                    }
                }
            }
        }

        self.record_failure(attempts, &last_error);
        DisplayOutcome::Dropped {
            attempts,
            reason: last_error,
        }
    }

    fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
        self.frames_delivered.fetch_add(1, Ordering::SeqCst);
        *self.last_success.lock() = Some(Instant::now());
    }

    fn record_failure(self: &Arc<Self>, attempts: u32, reason: &Error) {
        self.frames_dropped.fetch_add(1, Ordering::SeqCst);
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        error!(attempts, failures, error = %reason, "Frame dropped");

        if failures >= self.options.failure_threshold
            && let Some(link) = self.current_link()
        {
            warn!(failures, threshold = self.options.failure_threshold, "Failure threshold reached");
            self.drop_link(link.generation(), "consecutive failures");
        }
    }
}

// ============================================================================
// DisplayClient
// ============================================================================

/// Client for one WiFi display device.
///
/// Created with [`DisplayClient::builder`]. Frames are sent with
/// [`display`](Self::display), which retries internally and never fails.
/// The client reconnects in the background after connection loss.
pub struct DisplayClient {
    pub(crate) inner: Arc<ClientInner>,
}

impl fmt::Debug for DisplayClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisplayClient")
            .field("host", &self.inner.link_config.host)
            .field("port", &self.inner.link_config.port)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl DisplayClient {
    /// Creates a builder for a device at `host:port`.
    #[inline]
    #[must_use]
    pub fn builder(host: impl Into<String>, port: u16) -> DisplayClientBuilder {
        DisplayClientBuilder::new(host, port)
    }

    // ========================================================================
    // Frames
    // ========================================================================

    /// Sends a frame for the current screen id.
    pub async fn display(&self, payload: &[u8]) -> DisplayOutcome {
        self.inner.display(payload).await
    }

    /// Sets the screen id and sends a frame for it.
    pub async fn display_screen(
        &self,
        payload: &[u8],
        screen_id: impl Into<ScreenId>,
    ) -> DisplayOutcome {
        self.set_screen_id(screen_id);
        self.inner.display(payload).await
    }

    /// Sends an all-zero frame sized for the device.
    pub async fn clear(&self) -> DisplayOutcome {
        let Some(capabilities) = self.capabilities() else {
            return DisplayOutcome::NotReady;
        };
        let frame = vec![0u8; capabilities.frame_len()];
        self.inner.display(&frame).await
    }

    // ========================================================================
    // Screen Id
    // ========================================================================

    /// Sets the screen id used by [`display`](Self::display).
    pub fn set_screen_id(&self, screen_id: impl Into<ScreenId>) {
        *self.inner.screen_id.write() = screen_id.into();
    }

    /// Returns the current screen id.
    #[must_use]
    pub fn screen_id(&self) -> ScreenId {
        self.inner.screen_id.read().clone()
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// Calls `handler` with the last rendered screen id whenever the device
    /// asks for the next screen.
    pub fn on_next_screen<F>(&self, handler: F)
    where
        F: Fn(ScreenId) + Send + Sync + 'static,
    {
        self.inner.dispatcher.on_next_screen(handler);
    }

    /// Calls `handler` whenever the device asks the client to stop sending.
    pub fn on_stop_sending<F>(&self, handler: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.dispatcher.on_stop_sending(handler);
    }

    /// Calls `handler` for every device event.
    pub fn set_event_handler<F>(&self, handler: F)
    where
        F: Fn(DeviceEvent) + Send + Sync + 'static,
    {
        self.inner.dispatcher.set_fallback(handler);
    }

    /// Removes all event handlers.
    pub fn clear_event_handlers(&self) {
        self.inner.dispatcher.clear();
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Returns the capabilities negotiated on the current link.
    #[must_use]
    pub fn capabilities(&self) -> Option<Capabilities> {
        self.inner
            .current_link()
            .map(|link| link.capabilities().clone())
    }

    /// Returns the connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        match &*self.inner.state.lock() {
            LinkState::Disconnected => ConnectionState::Disconnected,
            LinkState::HandshakePending => ConnectionState::HandshakePending,
            LinkState::Ready(_) => ConnectionState::Ready,
        }
    }

    /// Returns `true` if frames can be sent.
    #[inline]
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state() == ConnectionState::Ready
    }

    /// Returns a snapshot of the client's counters.
    #[must_use]
    pub fn stats(&self) -> ClientStats {
        let inner = &self.inner;
        ClientStats {
            frames_delivered: inner.frames_delivered.load(Ordering::SeqCst),
            frames_dropped: inner.frames_dropped.load(Ordering::SeqCst),
            consecutive_failures: inner.consecutive_failures.load(Ordering::SeqCst),
            reconnects_scheduled: inner.reconnect.scheduled.load(Ordering::SeqCst),
            reconnects: inner.reconnect.completed.load(Ordering::SeqCst),
            last_success: *inner.last_success.lock(),
        }
    }

    // ========================================================================
    // Shutdown
    // ========================================================================

    /// Closes the client.
    ///
    /// Stops reconnecting, tears down the link and waits briefly for the
    /// receiver loop. An in-flight [`display`](Self::display) fails on its
    /// own. Calling this again does nothing.
    pub async fn close(&self) {
        if let Some(link) = self.inner.shutdown() {
            link.join_receiver(self.inner.options.close_timeout).await;
        }
    }
}

impl Drop for DisplayClient {
    fn drop(&mut self) {
        self.inner.shutdown();
    }
}

// ============================================================================
// Tests
// ============================================================================
