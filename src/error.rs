//! Error types for the display link client.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! Internal operations return [`Result<T>`] which uses [`Error`]. The
//! owner-facing [`DisplayClient::display`](crate::DisplayClient::display)
//! never returns an error; failures are folded into a
//! [`DisplayOutcome`](crate::DisplayOutcome) at the retry boundary.
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Connectivity | [`Error::Connection`], [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`], [`Error::Io`] |
//! | Protocol | [`Error::Handshake`], [`Error::Protocol`], [`Error::Json`] |
//! | Device | [`Error::DeviceRejected`] |
//! | Transient | [`Error::ResponseTimeout`], [`Error::NotReady`] |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::io::{Error as IoError, ErrorKind};
use std::result::Result as StdResult;

use thiserror::Error;

use crate::protocol::{ResponseCode, Status};

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// TransferPhase
// ============================================================================

/// The acknowledgement phase a device rejection was received in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferPhase {
    /// Device refused to accept the payload after the header.
    Ready,
    /// Device reported a failed completion after the payload.
    Completion,
}

impl fmt::Display for TransferPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready => f.write_str("ready"),
            Self::Completion => f.write_str("completion"),
        }
    }
}

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when client options fail validation.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// TCP connection failed.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Connect or handshake did not complete in time.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Connection closed by the peer or torn down locally.
    #[error("Connection closed")]
    ConnectionClosed,

    /// No negotiated connection is available.
    #[error("Device link is not ready")]
    NotReady,

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Handshake line missing, malformed, or incomplete.
    #[error("Handshake failed: {message}")]
    Handshake {
        /// Description of the handshake failure.
        message: String,
    },

    /// Protocol violation or unexpected message.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    // ========================================================================
    // Transfer Errors
    // ========================================================================
    /// Expected acknowledgement did not arrive.
    #[error("No '{status}' response within {timeout_ms}ms")]
    ResponseTimeout {
        /// Status that was awaited.
        status: Status,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Device answered with a non-OK code.
    #[error("Device rejected {phase} phase with {code}")]
    DeviceRejected {
        /// Phase of the transfer the code was received in.
        phase: TransferPhase,
        /// Code reported by the device.
        code: ResponseCode,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a handshake error.
    #[inline]
    pub fn handshake(message: impl Into<String>) -> Self {
        Self::Handshake {
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a response timeout error.
    #[inline]
    pub fn response_timeout(status: Status, timeout_ms: u64) -> Self {
        Self::ResponseTimeout { status, timeout_ms }
    }

    /// Creates a device rejection error.
    #[inline]
    pub fn device_rejected(phase: TransferPhase, code: ResponseCode) -> Self {
        Self::DeviceRejected { phase, code }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this error ends the current connection.
    ///
    /// Fatal errors tear the link down and schedule a reconnect:
    /// transport failures and completion codes `BAD_FORMAT` or
    /// `INTERNAL_ERROR`.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::DeviceRejected {
                phase: TransferPhase::Completion,
                code,
            } => code.is_fatal(),
            Self::Io(_) | Self::ConnectionClosed | Self::Connection { .. } => true,
            _ => false,
        }
    }

    /// Returns `true` if another attempt on the same connection may succeed.
    #[inline]
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        !self.is_fatal() && !matches!(self, Self::Config { .. } | Self::NotReady)
    }

    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::ConnectionTimeout { .. } | Self::ResponseTimeout { .. } => true,
            Self::Io(e) => e.kind() == ErrorKind::TimedOut,
            _ => false,
        }
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::Io(_)
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::connection("refused");
        assert_eq!(err.to_string(), "Connection failed: refused");

        let err = Error::response_timeout(Status::Ready, 5000);
        assert_eq!(err.to_string(), "No 'ready' response within 5000ms");

        let err = Error::device_rejected(TransferPhase::Completion, ResponseCode::BadFormat);
        assert_eq!(
            err.to_string(),
            "Device rejected completion phase with BAD_FORMAT"
        );
    }

    #[test]
    fn test_completion_codes_fatality() {
        let fatal = [ResponseCode::BadFormat, ResponseCode::InternalError];
        for code in fatal {
            assert!(Error::device_rejected(TransferPhase::Completion, code).is_fatal());
        }

        let transient = [
            ResponseCode::FragmentMissing,
            ResponseCode::AuthFailed,
            ResponseCode::Unknown(-1),
        ];
        for code in transient {
            let err = Error::device_rejected(TransferPhase::Completion, code);
            assert!(!err.is_fatal());
            assert!(err.is_retriable());
        }
    }

    #[test]
    fn test_ready_phase_rejection_is_never_fatal() {
        let err = Error::device_rejected(TransferPhase::Ready, ResponseCode::InternalError);
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_io_errors_are_fatal() {
        let err: Error = IoError::new(ErrorKind::BrokenPipe, "pipe").into();
        assert!(err.is_fatal());
        assert!(err.is_connection_error());
        assert!(!err.is_retriable());
    }

    #[test]
    fn test_is_timeout() {
        assert!(Error::response_timeout(Status::Ok, 10).is_timeout());
        assert!(Error::connection_timeout(10).is_timeout());
        assert!(!Error::NotReady.is_timeout());
    }

    #[test]
    fn test_not_ready_is_not_retriable() {
        assert!(!Error::NotReady.is_retriable());
        assert!(!Error::NotReady.is_fatal());
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
