//! Display client.
//!
//! This module contains the owner-facing client and the policies around
//! the transport layer.
//!
//! # Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`DisplayClient`] | Sends frames, owns the link and its counters |
//! | [`DisplayClientBuilder`] | Validates configuration and connects |
//! | [`ClientOptions`] | Timeouts, chunking and retry settings |
//! | [`ReconnectPolicy`] | Backoff schedule for background reconnects |
//! | [`EventDispatcher`] | Runs owner callbacks for device events |
//!
//! # Frame Delivery
//!
//! [`DisplayClient::display`] runs up to `max_attempts` transfer attempts
//! with `retry_delay` between them. Attempts are serialized so two payloads
//! never interleave on the wire. Completion codes decide what happens next:
//!
//! | Code | Effect |
//! |------|--------|
//! | `OK` | Delivered |
//! | `FRAGMENT_MISSING`, unknown, timeout | Retry on the same link |
//! | `BAD_FORMAT`, `INTERNAL_ERROR` | Drop the link, reconnect |
//!
//! After `failure_threshold` dropped frames in a row the link is dropped
//! and renegotiated even if every failure was transient.

// ============================================================================
// Modules
// ============================================================================

mod builder;
mod core;
mod dispatch;
mod options;
mod reconnect;
mod transfer;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::DisplayClientBuilder;
pub use self::core::{ClientStats, ConnectionState, DisplayClient, DisplayOutcome};
pub use dispatch::{EventDispatcher, EventHandler};
pub use options::ClientOptions;
pub use reconnect::ReconnectPolicy;
pub use transfer::chunk_lengths;
