//! Outcome code taxonomy carried on every acknowledgement.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// ResponseCode
// ============================================================================

/// Outcome code reported by the device.
///
/// Encoded on the wire as an integer. Codes outside the known taxonomy are
/// preserved in [`ResponseCode::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum ResponseCode {
    /// Success.
    Ok,
    /// Header or payload was malformed.
    BadFormat,
    /// Authentication failed (unused by the current firmware).
    AuthFailed,
    /// Payload arrived incomplete.
    FragmentMissing,
    /// Device-side failure.
    InternalError,
    /// Code outside the taxonomy, or missing (`-1`).
    Unknown(i64),
}

impl ResponseCode {
    /// Code assumed when a response carries no `code` field.
    #[inline]
    #[must_use]
    pub const fn missing() -> Self {
        Self::Unknown(-1)
    }

    /// Returns `true` for [`ResponseCode::Ok`].
    #[inline]
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Returns `true` if a completion with this code requires a reconnect.
    #[inline]
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::BadFormat | Self::InternalError)
    }
}

impl From<i64> for ResponseCode {
    fn from(value: i64) -> Self {
        match value {
            0 => Self::Ok,
            1 => Self::BadFormat,
            2 => Self::AuthFailed,
            3 => Self::FragmentMissing,
            4 => Self::InternalError,
            other => Self::Unknown(other),
        }
    }
}

impl From<ResponseCode> for i64 {
    fn from(code: ResponseCode) -> Self {
        match code {
            ResponseCode::Ok => 0,
            ResponseCode::BadFormat => 1,
            ResponseCode::AuthFailed => 2,
            ResponseCode::FragmentMissing => 3,
            ResponseCode::InternalError => 4,
            ResponseCode::Unknown(other) => other,
        }
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => f.write_str("OK"),
            Self::BadFormat => f.write_str("BAD_FORMAT"),
            Self::AuthFailed => f.write_str("AUTH_FAILED"),
            Self::FragmentMissing => f.write_str("FRAGMENT_MISSING"),
            Self::InternalError => f.write_str("INTERNAL_ERROR"),
            Self::Unknown(code) => write!(f, "UNKNOWN({code})"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
