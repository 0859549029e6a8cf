//! Client timing, retry and transfer options.
//!
//! Provides a type-safe interface for the knobs of the transfer protocol,
//! the retry policy and the receiver loop. Reconnect settings live in
//! [`ReconnectPolicy`].
//!
//! Options serialize with durations as milliseconds, so they can be loaded
//! from a JSON config file:
//!
//! ```json
//! { "ready_timeout_ms": 3000, "max_attempts": 5,
//!   "reconnect": { "schedule_ms": [500, 1000], "max_delay_ms": 1000, "max_duration_ms": null } }
//! ```
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use display_link::ClientOptions;
//!
//! let options = ClientOptions::new()
//!     .with_max_attempts(5)
//!     .with_ready_timeout(Duration::from_secs(2))
//!     .with_chunk_size(1024);
//! assert_eq!(options.max_attempts, 5);
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::reconnect::ReconnectPolicy;

// ============================================================================
// Defaults
// ============================================================================

const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);
const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(2);
const DEFAULT_CHUNK_SIZE: usize = 4096;
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_FAILURE_THRESHOLD: u32 = 3;
const DEFAULT_MAX_READ_ERRORS: u32 = 3;

// ============================================================================
// ClientOptions
// ============================================================================

/// Options for a [`DisplayClient`](crate::DisplayClient).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientOptions {
    /// Bound on TCP connect and on the handshake read.
    #[serde(rename = "handshake_timeout_ms", with = "millis")]
    pub handshake_timeout: Duration,

    /// Wait for the `ready` acknowledgement after a header.
    #[serde(rename = "ready_timeout_ms", with = "millis")]
    pub ready_timeout: Duration,

    /// Wait for the completion acknowledgement after a payload.
    #[serde(rename = "ack_timeout_ms", with = "millis")]
    pub ack_timeout: Duration,

    /// Bound on writing one header or one whole payload; a device that
    /// stops reading fails the link after this long.
    #[serde(rename = "write_timeout_ms", with = "millis")]
    pub write_timeout: Duration,

    /// Receiver loop read timeout; bounds how quickly shutdown is observed.
    #[serde(rename = "poll_interval_ms", with = "millis")]
    pub poll_interval: Duration,

    /// Pause between transfer attempts of one frame.
    #[serde(rename = "retry_delay_ms", with = "millis")]
    pub retry_delay: Duration,

    /// How long `close` waits for the receiver loop to stop.
    #[serde(rename = "close_timeout_ms", with = "millis")]
    pub close_timeout: Duration,

    /// Payload bytes per write.
    pub chunk_size: usize,

    /// Transfer attempts per frame.
    pub max_attempts: u32,

    /// Consecutive dropped frames that force a reconnect.
    pub failure_threshold: u32,

    /// Consecutive receiver read errors that end the connection.
    pub max_read_errors: u32,

    /// Reconnect backoff.
    pub reconnect: ReconnectPolicy,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            ready_timeout: DEFAULT_READY_TIMEOUT,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            retry_delay: DEFAULT_RETRY_DELAY,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            max_read_errors: DEFAULT_MAX_READ_ERRORS,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ClientOptions {
    /// Creates options with default settings.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses options from a JSON document; missing keys take defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the document is invalid.
    pub fn from_json(json: &str) -> Result<Self> {
        let options: Self =
            serde_json::from_str(json).map_err(|e| Error::config(format!("invalid options: {e}")))?;
        options.validate()?;
        Ok(options)
    }

    /// Sets the handshake timeout.
    #[inline]
    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Sets the `ready` acknowledgement timeout.
    #[inline]
    #[must_use]
    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    /// Sets the completion acknowledgement timeout.
    #[inline]
    #[must_use]
    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }

    /// Sets the header and payload write timeout.
    #[inline]
    #[must_use]
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Sets the receiver poll interval.
    #[inline]
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the pause between attempts.
    #[inline]
    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Sets how long `close` waits for the receiver loop.
    #[inline]
    #[must_use]
    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    /// Sets the payload chunk size.
    #[inline]
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Sets the number of attempts per frame.
    #[inline]
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the dropped-frame count that forces a reconnect.
    #[inline]
    #[must_use]
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Sets the consecutive read error limit.
    #[inline]
    #[must_use]
    pub fn with_max_read_errors(mut self, limit: u32) -> Self {
        self.max_read_errors = limit;
        self
    }

    /// Sets the reconnect policy.
    #[inline]
    #[must_use]
    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ClientOptions {
    /// Checks the options for values that would stall or break the client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first invalid option.
    pub fn validate(&self) -> Result<()> {
        let timeouts = [
            ("handshake_timeout", self.handshake_timeout),
            ("ready_timeout", self.ready_timeout),
            ("ack_timeout", self.ack_timeout),
            ("write_timeout", self.write_timeout),
            ("poll_interval", self.poll_interval),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, d)| d.is_zero()) {
            return Err(Error::config(format!("{name} must be greater than zero")));
        }
        if self.chunk_size == 0 {
            return Err(Error::config("chunk_size must be greater than zero"));
        }
        if self.max_attempts == 0 {
            return Err(Error::config("max_attempts must be at least 1"));
        }
        if self.failure_threshold == 0 {
            return Err(Error::config("failure_threshold must be at least 1"));
        }
        if self.max_read_errors == 0 {
            return Err(Error::config("max_read_errors must be at least 1"));
        }
        self.reconnect.validate()
    }
}

// ============================================================================
// Serde Helpers
// ============================================================================

/// Durations as integer milliseconds.
pub(crate) mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }

    /// `Option<Duration>` as nullable milliseconds.
    pub mod option {
        use std::time::Duration;

        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            value: &Option<Duration>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Duration>, D::Error> {
            Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
        }
    }

    /// `Vec<Duration>` as a list of milliseconds.
    pub mod list {
        use std::time::Duration;

        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            value: &[Duration],
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            serializer.collect_seq(value.iter().map(|d| d.as_millis() as u64))
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Vec<Duration>, D::Error> {
            Ok(Vec::<u64>::deserialize(deserializer)?
                .into_iter()
                .map(Duration::from_millis)
                .collect())
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ClientOptions::default();
        assert_eq!(options.handshake_timeout, Duration::from_secs(5));
        assert_eq!(options.ready_timeout, Duration::from_secs(5));
        assert_eq!(options.ack_timeout, Duration::from_secs(5));
        assert_eq!(options.chunk_size, 4096);
        assert_eq!(options.max_attempts, 3);
        assert_eq!(options.retry_delay, Duration::from_millis(500));
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_builder_chain() {
        let options = ClientOptions::new()
            .with_chunk_size(512)
            .with_max_attempts(7)
            .with_failure_threshold(2)
            .with_retry_delay(Duration::ZERO);
        assert_eq!(options.chunk_size, 512);
        assert_eq!(options.max_attempts, 7);
        assert_eq!(options.failure_threshold, 2);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_zero_values() {
        assert!(ClientOptions::new().with_chunk_size(0).validate().is_err());
        assert!(ClientOptions::new().with_max_attempts(0).validate().is_err());
        let err = ClientOptions::new()
            .with_ack_timeout(Duration::ZERO)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("ack_timeout"));
        let err = ClientOptions::new()
            .with_write_timeout(Duration::ZERO)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("write_timeout"));
    }

    #[test]
    fn test_from_json_partial() {
        let options = ClientOptions::from_json(
            r#"{ "ready_timeout_ms": 250, "max_attempts": 5,
                 "reconnect": { "schedule_ms": [100, 200], "max_delay_ms": 150, "max_duration_ms": null } }"#,
        )
        .expect("valid");
        assert_eq!(options.ready_timeout, Duration::from_millis(250));
        assert_eq!(options.max_attempts, 5);
        assert_eq!(options.ack_timeout, Duration::from_secs(5));
        assert_eq!(options.reconnect.max_duration(), None);
        assert_eq!(options.reconnect.delay_for(1), Duration::from_millis(150));
    }

    #[test]
    fn test_from_json_invalid() {
        assert!(matches!(
            ClientOptions::from_json(r#"{ "chunk_size": 0 }"#),
            Err(Error::Config { .. })
        ));
        assert!(ClientOptions::from_json("not json").is_err());
    }

    #[test]
    fn test_json_roundtrip_uses_millis() {
        let json = serde_json::to_value(ClientOptions::default()).unwrap();
        assert_eq!(json["ready_timeout_ms"], 5000);
        assert_eq!(json["write_timeout_ms"], 10_000);
        assert_eq!(json["reconnect"]["schedule_ms"][0], 1000);
        assert_eq!(json["reconnect"]["max_duration_ms"], 180_000);
    }
}
