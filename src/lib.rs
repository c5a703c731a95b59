//! Reconnecting WebSocket - a WebSocket handle that survives connection loss.
//!
//! This library wraps a WebSocket client connection in a handle that keeps
//! its identity across reconnects: listeners, the binary framing preference
//! and unsent messages all carry over to the next underlying connection.
//!
//! # Architecture
//!
//! The socket follows a supervisor model:
//!
//! - **Supervisor**: pure state machine owning the live transport, the retry
//!   count and the outbound queue
//! - **Transport**: one underlying connection, opened through a [`Connector`]
//!   and reporting its lifecycle as [`TransportEvent`]s
//! - **Listeners**: callbacks keyed by [`EventKind`], invoked outside all locks
//!
//! Key design principles:
//!
//! - At most one live transport at a time; events from replaced transports are ignored
//! - Messages sent while disconnected are queued and flushed in order on open
//! - Reconnection delays grow linearly up to a cap, with random jitter
//! - An explicit [`close`](ReconnectingSocket::close) suppresses reconnection
//!
//! # Quick Start
//!
//! ```no_run
//! use reconnecting_socket::{EventKind, Listener, ReconnectOptions, ReconnectingSocket, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let options = ReconnectOptions::new().with_reconnection_attempts(20);
//!     let socket = ReconnectingSocket::new("ws://127.0.0.1:9000/chat", ["chat"], options)?;
//!
//!     socket.on_open(|| println!("connected"));
//!     socket.on_message(|message| println!("received: {:?}", message.as_text()));
//!     socket.add_event_listener(
//!         EventKind::Close,
//!         Listener::new(|event| println!("closed: {event:?}")),
//!     );
//!
//!     // Queued until the connection opens, then flushed in order.
//!     socket.send("hello")?;
//!
//!     tokio::signal::ctrl_c().await.ok();
//!     socket.close(None, Some("shutting down"))?;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`socket`] | [`ReconnectingSocket`], options, backoff, queue and listeners |
//! | [`protocol`] | [`Message`] payloads and [`Event`] types |
//! | [`transport`] | [`Connector`] / [`Transport`] traits and the `tokio-tungstenite` transport |
//! | [`error`] | Error types and [`Result`] alias |

// ============================================================================
// Modules
// ============================================================================

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Message payloads and events.
///
/// Defines what callers send and what listeners receive.
pub mod protocol;

/// Reconnecting socket.
///
/// Use [`ReconnectingSocket::new()`] or [`ReconnectingSocket::builder()`]
/// to create a socket.
pub mod socket;

/// Transport abstraction and the WebSocket transport.
///
/// Implement [`Connector`] to plug in a different transport.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Socket types
pub use socket::{Backoff, Listener, ReconnectOptions, ReconnectingSocket, SocketBuilder};

// Protocol types
pub use protocol::{CloseEvent, ErrorEvent, Event, EventKind, Message};

// Transport types
pub use transport::{
    BinaryType, Connector, ReadyState, Transport, TransportEvent, TransportEvents,
    TungsteniteConnector, TungsteniteTransport,
};

// Error types
pub use error::{Error, Result};
