//! Lifecycle and message events.
//!
//! Events flow from the live transport through the supervisor into the
//! listener registry. Each [`Event`] has an [`EventKind`] which is the key
//! used for listener lookup.
//!
//! # Event Types
//!
//! | Kind | Name | Payload |
//! |------|------|---------|
//! | [`EventKind::Open`] | `open` | none |
//! | [`EventKind::Close`] | `close` | [`CloseEvent`] |
//! | [`EventKind::Error`] | `error` | [`ErrorEvent`] |
//! | [`EventKind::Message`] | `message` | [`Message`] |
//! | [`EventKind::Exhausted`] | `exhausted` | attempt count |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::message::Message;

// ============================================================================
// Constants
// ============================================================================

/// Normal closure.
pub const CLOSE_NORMAL: u16 = 1000;

/// Reserved code reported when a connection drops without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;

// ============================================================================
// EventKind
// ============================================================================

/// Event type names used as listener table keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// Transport finished its handshake.
    Open,
    /// Transport closed.
    Close,
    /// Transport reported a failure.
    Error,
    /// Message received.
    Message,
    /// Automatic reconnection gave up after the configured attempts.
    Exhausted,
}

impl EventKind {
    /// All event kinds, in declaration order.
    pub const ALL: [EventKind; 5] = [
        Self::Open,
        Self::Close,
        Self::Error,
        Self::Message,
        Self::Exhausted,
    ];

    /// Returns the event type name.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Close => "close",
            Self::Error => "error",
            Self::Message => "message",
            Self::Exhausted => "exhausted",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == name)
            .ok_or_else(|| Error::invalid_argument(format!("Unknown event type: {name}")))
    }
}

// ============================================================================
// CloseEvent
// ============================================================================

/// Details of a transport closure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseEvent {
    /// Close code from the close frame, or 1006 if none was received.
    pub code: u16,
    /// Close reason from the close frame.
    pub reason: String,
    /// Whether the closing handshake completed.
    pub was_clean: bool,
}

impl CloseEvent {
    /// Creates a close event.
    #[inline]
    #[must_use]
    pub fn new(code: u16, reason: impl Into<String>, was_clean: bool) -> Self {
        Self {
            code,
            reason: reason.into(),
            was_clean,
        }
    }

    /// Creates the event reported when a connection drops without a close frame.
    #[inline]
    #[must_use]
    pub fn abnormal() -> Self {
        Self::new(CLOSE_ABNORMAL, "", false)
    }
}

// ============================================================================
// ErrorEvent
// ============================================================================

/// Details of a transport failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorEvent {
    /// Human-readable failure description.
    pub message: String,
}

impl ErrorEvent {
    /// Creates an error event.
    #[inline]
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

// ============================================================================
// Event
// ============================================================================

/// An event delivered to listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Connection opened.
    Open,
    /// Connection closed.
    Close(CloseEvent),
    /// Connection failed.
    Error(ErrorEvent),
    /// Message received.
    Message(Message),
    /// Reconnection stopped after `attempts` automatic attempts.
    Exhausted {
        /// Configured maximum of automatic attempts.
        attempts: u32,
    },
}

impl Event {
    /// Returns the kind used for listener lookup.
    #[inline]
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Open => EventKind::Open,
            Self::Close(_) => EventKind::Close,
            Self::Error(_) => EventKind::Error,
            Self::Message(_) => EventKind::Message,
            Self::Exhausted { .. } => EventKind::Exhausted,
        }
    }

    /// Returns the event type name.
    #[inline]
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        self.kind().as_str()
    }

    /// Returns the message payload, if this is a message event.
    #[inline]
    #[must_use]
    pub fn as_message(&self) -> Option<&Message> {
        match self {
            Self::Message(message) => Some(message),
            _ => None,
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
    fn test_kind_names_round_trip() {
        for kind in EventKind::ALL {
            assert_eq!(kind.as_str().parse::<EventKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let err = "reconnect".parse::<EventKind>().unwrap_err();
        assert!(err.to_string().contains("reconnect"));
    }

    #[test]
    fn test_kind_serde_lowercase() {
        let json = serde_json::to_string(&EventKind::Exhausted).unwrap();
        assert_eq!(json, "\"exhausted\"");
    }

    #[test]
    fn test_event_kind_mapping() {
        assert_eq!(Event::Open.kind(), EventKind::Open);
        assert_eq!(Event::Close(CloseEvent::abnormal()).type_name(), "close");
        assert_eq!(
            Event::Error(ErrorEvent::new("boom")).kind(),
            EventKind::Error
        );
        assert_eq!(
            Event::Message(Message::text("x")).kind(),
            EventKind::Message
        );
        assert_eq!(Event::Exhausted { attempts: 3 }.type_name(), "exhausted");
    }

    #[test]
    fn test_abnormal_close() {
        let event = CloseEvent::abnormal();
        assert_eq!(event.code, CLOSE_ABNORMAL);
        assert!(!event.was_clean);
        assert!(event.reason.is_empty());
    }

    #[test]
    fn test_as_message() {
        let event = Event::Message(Message::text("payload"));
        assert_eq!(event.as_message(), Some(&Message::text("payload")));
        assert_eq!(Event::Open.as_message(), None);
    }
}
