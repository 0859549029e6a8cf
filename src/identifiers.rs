//! Type-safe identifiers.
//!
//! Newtype wrappers keep correlation keys, link generations, and screen
//! tokens from being mixed up.
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`WaitId`] | Key of one pending response wait |
//! | [`LinkGeneration`] | Sequence number of a negotiated connection |
//! | [`ScreenId`] | Opaque token attached to a frame |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

// ============================================================================
// Counters
// ============================================================================

static NEXT_WAIT_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

// ============================================================================
// WaitId
// ============================================================================

/// Unique, monotonically increasing key of a pending response wait.
///
/// Ordering follows registration order, so the oldest waiter sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WaitId(u64);

impl WaitId {
    /// Allocates the next wait id.
    #[inline]
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_WAIT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw sequence number.
    #[inline]
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for WaitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wait#{}", self.0)
    }
}

// ============================================================================
// LinkGeneration
// ============================================================================

/// Sequence number of a successfully negotiated connection.
///
/// Teardown is keyed by generation so a link can only be closed once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LinkGeneration(u64);

impl LinkGeneration {
    /// Allocates the next generation.
    #[inline]
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_GENERATION.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw sequence number.
    #[inline]
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for LinkGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// ScreenId
// ============================================================================

/// Opaque screen token, echoed by the device when it asks for the next screen.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScreenId(String);

impl ScreenId {
    /// Creates a screen id from any string.
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ScreenId {
    fn default() -> Self {
        Self::new("screen1")
    }
}

impl fmt::Display for ScreenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ScreenId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ScreenId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_ids_are_increasing() {
        let a = WaitId::next();
        let b = WaitId::next();
        assert!(b > a);
        assert_ne!(a, b);
    }

    #[test]
    fn test_generations_are_unique() {
        let a = LinkGeneration::next();
        let b = LinkGeneration::next();
        assert!(b.as_u64() > a.as_u64());
    }

    #[test]
    fn test_screen_id_serializes_as_string() {
        let id = ScreenId::new("main");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"main\"");
        assert_eq!(ScreenId::default().as_str(), "screen1");
        assert_eq!(ScreenId::from("x").to_string(), "x");
    }
}
