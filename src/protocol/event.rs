//! Device-initiated event types.
//!
//! Events are requests the device sends on its own, outside any transfer.
//! They carry a `command` field instead of a `status` field.
//!
//! | Command | Payload | Meaning |
//! |---------|---------|---------|
//! | `REQUEST_NEXT_SCREEN` | `last` | User asked for the next screen |
//! | `REQUEST_STOP_SENDING` | none | Device wants the client to pause |

// ============================================================================
// Imports
// ============================================================================

use serde_json::Value;

use crate::identifiers::ScreenId;

// ============================================================================
// Constants
// ============================================================================

const NEXT_SCREEN: &str = "REQUEST_NEXT_SCREEN";
const STOP_SENDING: &str = "REQUEST_STOP_SENDING";

// ============================================================================
// DeviceEvent
// ============================================================================

/// A request sent by the device outside of a transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    /// Device asks for the screen after `last`.
    NextScreenRequested {
        /// Last screen the device reports having rendered.
        last: ScreenId,
    },

    /// Device asks the client to stop sending frames.
    StopSendingRequested,
}

impl DeviceEvent {
    /// Builds an event from a `command` value and its enclosing message.
    ///
    /// Returns `None` for commands the client does not understand.
    #[must_use]
    pub fn from_command(command: &str, message: &Value) -> Option<Self> {
        match command {
            NEXT_SCREEN => {
                let last = message
                    .get("last")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                Some(Self::NextScreenRequested {
                    last: ScreenId::new(last),
                })
            }
            STOP_SENDING => Some(Self::StopSendingRequested),
            _ => None,
        }
    }

    /// Returns the kind of this event.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::NextScreenRequested { .. } => EventKind::NextScreen,
            Self::StopSendingRequested => EventKind::StopSending,
        }
    }
}

// ============================================================================
// EventKind
// ============================================================================

/// Discriminant of a [`DeviceEvent`], used for handler lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// [`DeviceEvent::NextScreenRequested`].
    NextScreen,
    /// [`DeviceEvent::StopSendingRequested`].
    StopSending,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_next_screen_carries_last() {
        let msg = json!({ "command": "REQUEST_NEXT_SCREEN", "last": "stats" });
        let event = DeviceEvent::from_command("REQUEST_NEXT_SCREEN", &msg).expect("known");
        assert_eq!(
            event,
            DeviceEvent::NextScreenRequested {
                last: ScreenId::new("stats")
            }
        );
        assert_eq!(event.kind(), EventKind::NextScreen);
    }

    #[test]
    fn test_next_screen_without_last_is_empty() {
        let msg = json!({ "command": "REQUEST_NEXT_SCREEN" });
        let event = DeviceEvent::from_command("REQUEST_NEXT_SCREEN", &msg).expect("known");
        assert_eq!(
            event,
            DeviceEvent::NextScreenRequested {
                last: ScreenId::new("")
            }
        );
    }

    #[test]
    fn test_stop_sending() {
        let msg = json!({ "command": "REQUEST_STOP_SENDING" });
        let event = DeviceEvent::from_command("REQUEST_STOP_SENDING", &msg).expect("known");
        assert_eq!(event.kind(), EventKind::StopSending);
    }

    #[test]
    fn test_unknown_command() {
        assert!(DeviceEvent::from_command("REBOOT", &json!({})).is_none());
    }
}
