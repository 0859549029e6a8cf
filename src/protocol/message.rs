//! Handshake, header and response message types.
//!
//! Also classifies each received control line into an [`Incoming`] value
//! for the receiver loop.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::ScreenId;

use super::{DeviceEvent, ResponseCode};

// ============================================================================
// Status
// ============================================================================

/// The `status` field of a device response.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Status {
    /// Device is ready (handshake, or ready for payload).
    Ready,
    /// Transfer completed; `code` holds the result.
    Ok,
    /// Device rejected the request; `code` holds the reason.
    Error,
    /// Any other status string.
    Other(String),
}

impl Status {
    /// Returns the wire form of the status.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Ready => "ready",
            Self::Ok => "ok",
            Self::Error => "error",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for Status {
    fn from(value: String) -> Self {
        match value.as_str() {
            "ready" => Self::Ready,
            "ok" => Self::Ok,
            "error" => Self::Error,
            _ => Self::Other(value),
        }
    }
}

impl From<Status> for String {
    fn from(status: Status) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Response
// ============================================================================

/// An acknowledgement from the device.
///
/// # Format
///
/// ```json
/// { "status": "ok", "code": 0, "message": "displayed", "lastScreen": "screen1" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// Acknowledgement phase.
    pub status: Status,

    /// Outcome code; missing codes decode as `Unknown(-1)`.
    #[serde(default = "ResponseCode::missing")]
    pub code: ResponseCode,

    /// Free-text explanation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Screen the device just rendered.
    #[serde(
        default,
        rename = "lastScreen",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_screen: Option<ScreenId>,
}

impl Response {
    /// Creates a bare response with the given status and code.
    #[inline]
    #[must_use]
    pub fn new(status: Status, code: ResponseCode) -> Self {
        Self {
            status,
            code,
            message: None,
            last_screen: None,
        }
    }
}

// ============================================================================
// Handshake
// ============================================================================

/// The first line a device sends on every new connection.
///
/// # Format
///
/// ```json
/// { "status": "ready", "code": 0, "width": 128, "height": 128,
///   "format": "RGB565", "endianness": "little" }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handshake {
    /// Must be `ready`.
    #[serde(default)]
    pub status: Option<Status>,
    /// Must be `0`.
    #[serde(default)]
    pub code: Option<ResponseCode>,
    /// Panel width in pixels.
    #[serde(default)]
    pub width: Option<u32>,
    /// Panel height in pixels.
    #[serde(default)]
    pub height: Option<u32>,
    /// Pixel layout tag, e.g. `RGB565`.
    #[serde(default)]
    pub format: Option<String>,
    /// Byte order tag, e.g. `little`.
    #[serde(default)]
    pub endianness: Option<String>,
}

impl Handshake {
    /// Parses a handshake line.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Handshake`] if the line is not a JSON object of the
    /// expected shape.
    pub fn parse(line: &str) -> Result<Self> {
        serde_json::from_str(line).map_err(|e| Error::handshake(format!("invalid JSON: {e}")))
    }

    /// Validates the handshake and extracts device capabilities.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Handshake`] if the status is not `ready`, the code is
    /// not `OK`, or any capability field is absent, zero or empty.
    pub fn into_capabilities(self) -> Result<Capabilities> {
        if self.status != Some(Status::Ready) {
            return Err(Error::handshake(format!(
                "unexpected status {:?}",
                self.status.as_ref().map(Status::as_str)
            )));
        }
        if self.code != Some(ResponseCode::Ok) {
            return Err(Error::handshake(format!("unexpected code {:?}", self.code)));
        }

        let width = self.width.filter(|w| *w > 0);
        let height = self.height.filter(|h| *h > 0);
        let format = self.format.filter(|f| !f.is_empty());
        let endianness = self.endianness.filter(|e| !e.is_empty());

        match (width, height, format, endianness) {
            (Some(width), Some(height), Some(format), Some(endianness)) => Ok(Capabilities {
                width,
                height,
                format,
                endianness,
            }),
            _ => Err(Error::handshake("incomplete capability fields")),
        }
    }
}

// ============================================================================
// Capabilities
// ============================================================================

/// Device capabilities negotiated by one handshake.
///
/// Fixed for the lifetime of a connection; a reconnect replaces them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Panel width in pixels.
    pub width: u32,
    /// Panel height in pixels.
    pub height: u32,
    /// Pixel layout tag.
    pub format: String,
    /// Byte order tag.
    pub endianness: String,
}

impl Capabilities {
    /// Bytes per pixel implied by the format tag.
    ///
    /// Unknown formats are assumed to be 16-bit.
    #[must_use]
    pub fn bytes_per_pixel(&self) -> usize {
        match self.format.to_ascii_uppercase().as_str() {
            "RGB888" | "BGR888" => 3,
            "ARGB8888" | "RGBA8888" | "BGRA8888" => 4,
            "MONO8" | "GRAY8" => 1,
            _ => 2,
        }
    }

    /// Size in bytes of one full frame.
    #[inline]
    #[must_use]
    pub fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * self.bytes_per_pixel()
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{} {} {}",
            self.width, self.height, self.format, self.endianness
        )
    }
}

// ============================================================================
// DisplayHeader
// ============================================================================

/// Header announcing one frame payload.
///
/// # Format
///
/// ```json
/// { "command": "DISPLAY", "length": 32768, "screen_id": "screen1" }
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct DisplayHeader<'a> {
    command: &'static str,
    /// Payload byte count.
    pub length: usize,
    /// Screen the payload belongs to.
    pub screen_id: &'a ScreenId,
}

impl<'a> DisplayHeader<'a> {
    /// Creates a header for a payload of `length` bytes.
    #[inline]
    #[must_use]
    pub fn new(length: usize, screen_id: &'a ScreenId) -> Self {
        Self {
            command: "DISPLAY",
            length,
            screen_id,
        }
    }

    /// Serializes the header as a newline-terminated control line.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    pub fn to_line(&self) -> Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

// ============================================================================
// Incoming
// ============================================================================

/// Classification of one received control line.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    /// Device-initiated request (`command` present).
    Event(DeviceEvent),
    /// Acknowledgement (`status` present).
    Response(Response),
    /// Valid JSON the client has no use for.
    Unrecognized(Value),
}

impl Incoming {
    /// Parses and classifies a trimmed control line.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the line is not valid JSON or a status
    /// message has malformed fields.
    pub fn parse(line: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(line)?;

        if let Some(command) = value.get("command").filter(|c| !c.is_null()) {
            let event = command
                .as_str()
                .and_then(|c| DeviceEvent::from_command(c, &value));
            return Ok(match event {
                Some(event) => Self::Event(event),
                None => Self::Unrecognized(value),
            });
        }

        if value.get("status").is_some_and(|s| !s.is_null()) {
            let response: Response = serde_json::from_value(value)?;
            return Ok(Self::Response(response));
        }

        Ok(Self::Unrecognized(value))
    }
}

// ============================================================================
// Tests
// ============================================================================
