//! Device-event dispatch.
//!
//! The receiver loop hands every [`DeviceEvent`] to the dispatcher, which
//! looks up the registered handler and runs it on a blocking task. The
//! receiver never waits for a handler, so a slow owner callback cannot
//! stall acknowledgement routing.
//!
//! Handlers can be replaced or cleared at any time; an event uses the
//! handler registered when it arrived.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::identifiers::ScreenId;
use crate::protocol::{DeviceEvent, EventKind};
use crate::transport::EventSink;

// ============================================================================
// Types
// ============================================================================

/// Handler invoked for one device event.
pub type EventHandler = Arc<dyn Fn(DeviceEvent) + Send + Sync>;

// ============================================================================
// EventDispatcher
// ============================================================================

/// Routes device events to owner callbacks.
#[derive(Default)]
pub struct EventDispatcher {
    /// Per-kind handlers.
    handlers: RwLock<FxHashMap<EventKind, EventHandler>>,
    /// Receives every event, after any per-kind handler.
    fallback: RwLock<Option<EventHandler>>,
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("kinds", &self.handlers.read().keys().collect::<Vec<_>>())
            .field("fallback", &self.fallback.read().is_some())
            .finish()
    }
}

impl EventDispatcher {
    /// Creates a dispatcher with no handlers.
    #[inline]
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Sets the handler for next-screen requests.
    pub fn on_next_screen<F>(&self, handler: F)
    where
        F: Fn(ScreenId) + Send + Sync + 'static,
    {
        self.set(
            EventKind::NextScreen,
            Arc::new(move |event| {
                if let DeviceEvent::NextScreenRequested { last } = event {
                    handler(last);
                }
            }),
        );
    }

    /// Sets the handler for stop-sending requests.
    pub fn on_stop_sending<F>(&self, handler: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.set(EventKind::StopSending, Arc::new(move |_| handler()));
    }

    /// Sets a handler that receives every event.
    pub fn set_fallback<F>(&self, handler: F)
    where
        F: Fn(DeviceEvent) + Send + Sync + 'static,
    {
        *self.fallback.write() = Some(Arc::new(handler));
    }

    /// Removes every handler.
    pub fn clear(&self) {
        self.handlers.write().clear();
        *self.fallback.write() = None;
    }

    fn set(&self, kind: EventKind, handler: EventHandler) {
        self.handlers.write().insert(kind, handler);
    }

    /// Runs the handlers for `event` without waiting for them.
    pub fn dispatch(&self, event: DeviceEvent) {
        let specific = self.handlers.read().get(&event.kind()).cloned();
        let fallback = self.fallback.read().clone();

        if specific.is_none() && fallback.is_none() {
            debug!(?event, "No handler for device event");
            return;
        }

        trace!(kind = ?event.kind(), "Dispatching device event");
        tokio::task::spawn_blocking(move || {
            if let Some(handler) = specific {
                handler(event.clone());
            }
            if let Some(handler) = fallback {
                handler(event);
            }
        });
    }

    /// Returns a sink that feeds this dispatcher.
    #[must_use]
    pub fn sink(self: &Arc<Self>) -> EventSink {
        let dispatcher = Arc::clone(self);
        Arc::new(move |event| dispatcher.dispatch(event))
    }
}

// ============================================================================
// Tests
// ============================================================================
