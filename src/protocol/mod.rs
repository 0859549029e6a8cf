//! Control-plane message types.
//!
//! Control messages are single-line JSON objects terminated by `\n`. A raw
//! binary payload follows a `ready` acknowledgement with no further framing;
//! the device relies on the `length` declared in the header.
//!
//! # Message Flow
//!
//! | Message | Direction | Purpose |
//! |---------|-----------|---------|
//! | [`Handshake`] | Device → Client | Capabilities, once per connection |
//! | [`DisplayHeader`] | Client → Device | Announces a frame payload |
//! | [`Response`] (`ready`) | Device → Client | Device is ready for the payload |
//! | [`Response`] (`ok`) | Device → Client | Completion result |
//! | [`DeviceEvent`] | Device → Client | Asynchronous device request |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `code` | Outcome code taxonomy |
//! | `event` | Device-initiated requests |
//! | `message` | Handshake, header, response and line classification |

// ============================================================================
// Submodules
// ============================================================================

/// Outcome code taxonomy.
pub mod code;

/// Device-initiated event types.
pub mod event;

/// Handshake, header and response message types.
pub mod message;

// ============================================================================
// Re-exports
// ============================================================================

pub use code::ResponseCode;
pub use event::{DeviceEvent, EventKind};
pub use message::{Capabilities, DisplayHeader, Handshake, Incoming, Response, Status};
