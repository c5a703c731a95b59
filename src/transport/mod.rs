//! Transport abstraction.
//!
//! The socket never speaks the wire protocol itself. It opens transports
//! through a [`Connector`], talks to the live one through [`Transport`], and
//! learns about its lifecycle from a per-handle stream of
//! [`TransportEvent`]s.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐   open(url, protocols)   ┌─────────────────┐
//! │  ReconnectingSocket  │─────────────────────────►│    Connector    │
//! │                      │                          └────────┬────────┘
//! │  send / close        │   Box<dyn Transport>              │
//! │  ───────────────────►│◄──────────────────────────────────┘
//! │                      │   TransportEvents (Open, Message,
//! │  event pump task     │◄── Error, Close) per handle
//! └──────────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | `tokio-tungstenite` transport and its event loop |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use url::Url;

use crate::error::Result;
use crate::protocol::{CloseEvent, Message};

// ============================================================================
// Submodules
// ============================================================================

/// WebSocket transport on `tokio-tungstenite`.
pub mod connection;

#[cfg(test)]
pub(crate) mod mock;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{TungsteniteConnector, TungsteniteTransport};

// ============================================================================
// ReadyState
// ============================================================================

/// Connection readiness, numbered like the WebSocket API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ReadyState {
    /// Handshake in progress.
    Connecting = 0,
    /// Ready to send.
    Open = 1,
    /// Closing handshake in progress.
    Closing = 2,
    /// Closed or never opened.
    Closed = 3,
}

impl ReadyState {
    /// Returns the numeric value.
    #[inline]
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Converts a numeric value, treating unknown values as `Closed`.
    #[inline]
    #[must_use]
    pub const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Open,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

impl fmt::Display for ReadyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "CONNECTING",
            Self::Open => "OPEN",
            Self::Closing => "CLOSING",
            Self::Closed => "CLOSED",
        };
        f.write_str(name)
    }
}

// ============================================================================
// BinaryType
// ============================================================================

/// Preferred representation for incoming binary frames.
///
/// This is a framing hint forwarded to every transport handle; it survives
/// reconnection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinaryType {
    /// Opaque blob.
    #[default]
    Blob,
    /// Contiguous byte buffer.
    ArrayBuffer,
}

// ============================================================================
// TransportEvent
// ============================================================================

/// Lifecycle notification from one transport handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Handshake completed.
    Open,
    /// Message received.
    Message(Message),
    /// Transport failed. A `Close` usually follows.
    Error(String),
    /// Transport closed. No further events follow.
    Close(CloseEvent),
}

/// Receiving side of a transport's event stream.
pub type TransportEvents = mpsc::UnboundedReceiver<TransportEvent>;

// ============================================================================
// Traits
// ============================================================================

/// Opens transport handles.
///
/// `open` must return immediately with a handle in the `Connecting` state;
/// the outcome of the handshake is reported as a [`TransportEvent`].
pub trait Connector: Send + Sync + 'static {
    /// Starts opening a transport to `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the attempt cannot even be started (for example a
    /// malformed protocol list). Handshake failures are reported as events.
    fn open(&self, url: &Url, protocols: &[String])
    -> Result<(Box<dyn Transport>, TransportEvents)>;
}

/// One live transport handle.
pub trait Transport: Send + Sync {
    /// Returns the transport's own readiness.
    fn ready_state(&self) -> ReadyState;

    /// Sends a message.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport is not open or has terminated.
    fn send(&self, message: Message) -> Result<()>;

    /// Starts the closing handshake. Calling it on a closed transport is a no-op.
    fn close(&self, code: Option<u16>, reason: Option<&str>);

    /// Returns the sub-protocol selected by the server.
    fn protocol(&self) -> String {
        String::new()
    }

    /// Returns the extensions negotiated with the server.
    fn extensions(&self) -> String {
        String::new()
    }

    /// Returns bytes accepted by `send` but not yet written.
    fn buffered_amount(&self) -> usize {
        0
    }

    /// Applies the binary framing preference.
    fn set_binary_type(&self, binary_type: BinaryType);

    /// Returns the binary framing preference.
    fn binary_type(&self) -> BinaryType;
}

// ============================================================================
// Tests
// ============================================================================
