//! Display Link - resilient frame delivery for WiFi displays.
//!
//! This library sends raw frame buffers to an embedded display device over
//! TCP and keeps the connection alive across resets, WiFi drops and device
//! rejections.
//!
//! # Architecture
//!
//! The device speaks a small line protocol:
//!
//! - **Control lines**: newline-terminated JSON in both directions
//! - **Payload**: raw bytes following a `ready` acknowledgement, sized by
//!   the preceding header
//!
//! Key design principles:
//!
//! - Each [`DisplayClient`] owns one link, its receiver loop and its counters
//! - A link's capabilities are fixed by its handshake; reconnects renegotiate
//! - Acknowledgements are correlated to the exact wait that expects them
//! - Frame delivery never fails loudly; outcomes are reported as values
//!
//! # Quick Start
//!
//! ```no_run
//! use display_link::{DisplayClient, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = DisplayClient::builder("192.168.1.50", 8080)
//!         .connect()
//!         .await?;
//!
//!     client.on_next_screen(|last| println!("device asks for the screen after {last}"));
//!
//!     if let Some(caps) = client.capabilities() {
//!         let frame = vec![0xFFu8; caps.frame_len()];
//!         let outcome = client.display_screen(&frame, "white").await;
//!         println!("{outcome:?}");
//!     }
//!
//!     client.close().await;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | [`DisplayClient`], builder, options, retry and reconnect policies |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Control line message types |
//! | [`transport`] | TCP link, handshake, receiver loop and correlation (internal) |

// ============================================================================
// Modules
// ============================================================================

/// Owner-facing client.
///
/// Use [`DisplayClient::builder()`] to configure and connect a client.
pub mod client;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
///
/// Newtype wrappers for screen ids, wait ids and link generations.
pub mod identifiers;

/// Control line protocol types.
///
/// Handshake, acknowledgement, header and device event structures.
pub mod protocol;

/// TCP transport layer.
///
/// Internal module handling the link lifecycle and acknowledgement routing.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Client types
pub use client::{
    ClientOptions, ClientStats, ConnectionState, DisplayClient, DisplayClientBuilder,
    DisplayOutcome, ReconnectPolicy,
};

// Error types
pub use error::{Error, Result, TransferPhase};

// Identifier types
pub use identifiers::ScreenId;

// Protocol types
pub use protocol::{Capabilities, DeviceEvent, ResponseCode};
