//! Reconnection and buffering options.
//!
//! Provides a type-safe interface for configuring how a
//! [`ReconnectingSocket`](crate::ReconnectingSocket) reconnects and how much
//! it buffers while disconnected. Options are captured at construction and
//! never change afterwards.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use reconnecting_socket::ReconnectOptions;
//!
//! let options = ReconnectOptions::new()
//!     .with_reconnection_delay(Duration::from_millis(500))
//!     .with_reconnection_attempts(10)
//!     .with_message_queue_size(64);
//!
//! // Or from JSON, using camelCase keys and milliseconds:
//! let options = ReconnectOptions::from_json(r#"{ "reconnectionDelay": 500 }"#)?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ============================================================================
// Defaults
// ============================================================================

/// Default base reconnection delay.
pub const DEFAULT_RECONNECTION_DELAY: Duration = Duration::from_millis(1000);

/// Default cap on the computed reconnection delay.
pub const DEFAULT_RECONNECTION_DELAY_MAX: Duration = Duration::from_millis(5000);

/// Default jitter fraction.
pub const DEFAULT_RANDOMIZATION_FACTOR: f64 = 0.5;

/// Default handshake deadline for one connection attempt.
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_millis(4000);

// ============================================================================
// ReconnectOptions
// ============================================================================

/// Socket configuration options.
///
/// Serialized field names are camelCase and durations are milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct ReconnectOptions {
    /// Reconnect automatically after close or error.
    ///
    /// The initial connect happens regardless.
    pub reconnection: bool,

    /// Base delay used by the backoff policy.
    #[serde(with = "millis")]
    pub reconnection_delay: Duration,

    /// Cap on the computed delay before jitter.
    #[serde(with = "millis")]
    pub reconnection_delay_max: Duration,

    /// Maximum automatic attempts before giving up.
    pub reconnection_attempts: u32,

    /// Jitter fraction in `0.0..=1.0` applied to the capped delay.
    pub randomization_factor: f64,

    /// Maximum number of messages buffered while disconnected.
    pub message_queue_size: usize,

    /// Time allowed for a transport to open before the attempt counts as failed.
    #[serde(with = "millis")]
    pub connection_timeout: Duration,
}

impl Default for ReconnectOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl ReconnectOptions {
    /// Creates options with default settings.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            reconnection: true,
            reconnection_delay: DEFAULT_RECONNECTION_DELAY,
            reconnection_delay_max: DEFAULT_RECONNECTION_DELAY_MAX,
            reconnection_attempts: u32::MAX,
            randomization_factor: DEFAULT_RANDOMIZATION_FACTOR,
            message_queue_size: usize::MAX,
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
        }
    }

    /// Parses options from a JSON object.
    ///
    /// Missing keys take their default values; unknown keys are rejected.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if the document is malformed
    /// - [`Error::Config`] if the values fail [`validate`](Self::validate)
    pub fn from_json(json: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ReconnectOptions {
    /// Enables or disables automatic reconnection.
    #[inline]
    #[must_use]
    pub fn with_reconnection(mut self, enabled: bool) -> Self {
        self.reconnection = enabled;
        self
    }

    /// Sets the base reconnection delay.
    #[inline]
    #[must_use]
    pub fn with_reconnection_delay(mut self, delay: Duration) -> Self {
        self.reconnection_delay = delay;
        self
    }

    /// Sets the maximum reconnection delay.
    #[inline]
    #[must_use]
    pub fn with_reconnection_delay_max(mut self, delay: Duration) -> Self {
        self.reconnection_delay_max = delay;
        self
    }

    /// Sets the maximum number of automatic attempts.
    #[inline]
    #[must_use]
    pub fn with_reconnection_attempts(mut self, attempts: u32) -> Self {
        self.reconnection_attempts = attempts;
        self
    }

    /// Sets the jitter fraction.
    #[inline]
    #[must_use]
    pub fn with_randomization_factor(mut self, factor: f64) -> Self {
        self.randomization_factor = factor;
        self
    }

    /// Sets the maximum number of queued outbound messages.
    #[inline]
    #[must_use]
    pub fn with_message_queue_size(mut self, size: usize) -> Self {
        self.message_queue_size = size;
        self
    }

    /// Sets the handshake deadline for each attempt.
    #[inline]
    #[must_use]
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ReconnectOptions {
    /// Validates the options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if:
    /// - `randomization_factor` is outside `0.0..=1.0` or not finite
    /// - `reconnection_delay_max` is below `reconnection_delay`
    /// - `connection_timeout` is zero
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.randomization_factor) {
            return Err(Error::config(format!(
                "randomizationFactor must be within 0.0..=1.0, got {}",
                self.randomization_factor
            )));
        }

        if self.reconnection_delay_max < self.reconnection_delay {
            return Err(Error::config(format!(
                "reconnectionDelayMax ({}ms) must not be below reconnectionDelay ({}ms)",
                self.reconnection_delay_max.as_millis(),
                self.reconnection_delay.as_millis()
            )));
        }

        if self.connection_timeout.is_zero() {
            return Err(Error::config("connectionTimeout must be greater than zero"));
        }

        Ok(())
    }
}

// ============================================================================
// Serde Helpers
// ============================================================================

/// Serializes a [`Duration`] as whole milliseconds.
mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

// ============================================================================
// Tests
// ============================================================================
