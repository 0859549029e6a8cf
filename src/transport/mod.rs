//! TCP transport layer.
//!
//! This module handles the byte stream between the client and the display
//! device: connecting, the capability handshake, line reassembly, the
//! receiver loop and acknowledgement correlation.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐                              ┌──────────────────┐
//! │  DisplayClient   │          TCP stream          │  Display device  │
//! │                  │  JSON lines + raw payloads   │                  │
//! │  Link ──────────►│─────────────────────────────►│                  │
//! │  ReceiverLoop ◄──│◄─────────────────────────────│                  │
//! │   ├─ Correlator  │   acks, events (JSON lines)  │                  │
//! │   └─ EventSink   │                              │                  │
//! └──────────────────┘                              └──────────────────┘
//! ```
//!
//! # Link Lifecycle
//!
//! 1. `Link::open` - TCP connect (bounded by the handshake timeout)
//! 2. `negotiate` - read exactly one handshake line, validate capabilities
//! 3. `ReceiverLoop::run` - spawned; routes acks and events
//! 4. `Link::write_all` / `Link::register` - used by the transfer protocol
//! 5. `Link::close` - stop receiving, fail pending waits, shut down writes
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `correlator` | Pending-response waits keyed by `WaitId` |
//! | `handshake` | Single-line capability negotiation |
//! | `line` | Newline-delimited reassembly |
//! | `link` | Connected link and teardown |
//! | `receiver` | Background receive and routing loop |

// ============================================================================
// Submodules
// ============================================================================

/// Pending-response correlation.
pub mod correlator;

/// Handshake negotiation.
pub mod handshake;

/// Control line reassembly.
pub mod line;

/// Negotiated device link.
pub mod link;

/// Background receiver loop.
pub mod receiver;

// ============================================================================
// Re-exports
// ============================================================================

pub use correlator::{Correlator, PendingWait};
pub use handshake::negotiate;
pub use line::{LineBuffer, MAX_LINE_LEN};
pub use link::{Link, LinkConfig};
pub use receiver::{EventSink, LossHandler, ReceiverExit, ReceiverLoop};
