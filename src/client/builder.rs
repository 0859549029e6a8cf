//! Builder pattern for client configuration.
//!
//! Provides a fluent API for configuring and connecting a [`DisplayClient`].
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use display_link::{DisplayClient, ReconnectPolicy};
//!
//! # async fn example() -> display_link::Result<()> {
//! let client = DisplayClient::builder("esp32-display.local", 8080)
//!     .max_attempts(5)
//!     .chunk_size(2048)
//!     .reconnect(ReconnectPolicy::default().indefinite())
//!     .screen_id("clock")
//!     .connect()
//!     .await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::identifiers::ScreenId;
use crate::transport::LinkConfig;

use super::core::{ClientInner, DisplayClient};
use super::options::ClientOptions;
use super::reconnect::ReconnectPolicy;

// ============================================================================
// DisplayClientBuilder
// ============================================================================

/// Builder for configuring a [`DisplayClient`].
///
/// Use [`DisplayClient::builder()`] to create a new builder.
#[derive(Debug, Clone)]
pub struct DisplayClientBuilder {
    host: String,
    port: u16,
    screen_id: ScreenId,
    options: ClientOptions,
}

impl DisplayClientBuilder {
    /// Creates a builder for a device at `host:port` with default options.
    #[inline]
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            screen_id: ScreenId::default(),
            options: ClientOptions::default(),
        }
    }

    /// Replaces all options.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the initial screen id.
    #[inline]
    #[must_use]
    pub fn screen_id(mut self, screen_id: impl Into<ScreenId>) -> Self {
        self.screen_id = screen_id.into();
        self
    }

    /// Sets the connect and handshake timeout.
    #[inline]
    #[must_use]
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.options.handshake_timeout = timeout;
        self
    }

    /// Sets both acknowledgement timeouts.
    #[inline]
    #[must_use]
    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.options.ready_timeout = timeout;
        self.options.ack_timeout = timeout;
        self
    }

    /// Sets the payload chunk size.
    #[inline]
    #[must_use]
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.options.chunk_size = chunk_size;
        self
    }

    /// Sets the number of attempts per frame.
    #[inline]
    #[must_use]
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.options.max_attempts = attempts;
        self
    }

    /// Sets the pause between attempts.
    #[inline]
    #[must_use]
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.options.retry_delay = delay;
        self
    }

    /// Sets the reconnect policy.
    #[inline]
    #[must_use]
    pub fn reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.options.reconnect = policy;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the host is empty or an option is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::config("host must not be empty"));
        }
        self.options.validate()
    }

    /// Connects to the device.
    ///
    /// A failed first connect is not an error: the client is returned
    /// disconnected and keeps reconnecting in the background.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if validation fails.
    pub async fn connect(self) -> Result<DisplayClient> {
        self.validate()?;

        let link_config = LinkConfig {
            host: self.host,
            port: self.port,
            handshake_timeout: self.options.handshake_timeout,
            poll_interval: self.options.poll_interval,
            max_read_errors: self.options.max_read_errors,
        };
        let inner = ClientInner::new(link_config, self.options);
        *inner.screen_id.write() = self.screen_id;

        match inner.establish(false).await {
            Ok(()) => info!(
                host = %inner.link_config.host,
                port = inner.link_config.port,
                "Connected to display"
            ),
            Err(e) => {
                warn!(error = %e, "Initial connect failed, reconnecting in background");
                inner.schedule_reconnect("initial connect failed");
            }
        }

        Ok(DisplayClient { inner })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_uses_defaults() {
        let builder = DisplayClientBuilder::new("10.0.0.2", 8080);
        assert_eq!(builder.options, ClientOptions::default());
        assert_eq!(builder.screen_id.as_str(), "screen1");
        assert!(builder.validate().is_ok());
    }

    #[test]
    fn test_setters() {
        let builder = DisplayClientBuilder::new("10.0.0.2", 8080)
            .chunk_size(1024)
            .max_attempts(4)
            .response_timeout(Duration::from_secs(2))
            .screen_id("news");
        assert_eq!(builder.options.chunk_size, 1024);
        assert_eq!(builder.options.max_attempts, 4);
        assert_eq!(builder.options.ready_timeout, Duration::from_secs(2));
        assert_eq!(builder.options.ack_timeout, Duration::from_secs(2));
        assert_eq!(builder.screen_id.as_str(), "news");
    }

    #[test]
    fn test_validate_rejects_empty_host() {
        let result = DisplayClientBuilder::new("  ", 8080).validate();
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_validate_rejects_empty_schedule() {
        let result = DisplayClientBuilder::new("10.0.0.2", 8080)
            .reconnect(ReconnectPolicy::new([]))
            .validate();
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[tokio::test]
    async fn test_connect_fails_on_invalid_config() {
        let result = DisplayClientBuilder::new("10.0.0.2", 8080)
            .max_attempts(0)
            .connect()
            .await;
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_builder_is_clone() {
        let builder = DisplayClientBuilder::new("10.0.0.2", 8080).chunk_size(16);
        let cloned = builder.clone();
        assert_eq!(cloned.options.chunk_size, 16);
    }
}
