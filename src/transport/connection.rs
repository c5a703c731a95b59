//! WebSocket transport and event loop.
//!
//! [`TungsteniteConnector`] opens client connections with
//! `tokio-tungstenite`. Each connection is driven by one spawned task that
//! performs the handshake, forwards outgoing frames and reports lifecycle
//! changes as [`TransportEvent`]s.
//!
//! # Event Loop
//!
//! The task handles, in order:
//!
//! - The opening handshake, which a close request can abort
//! - Incoming text and binary frames, forwarded as `Message` events
//! - Outgoing messages and close requests from [`TungsteniteTransport`]
//! - A final `Close` event once the stream has ended
//!
//! Dropping the [`TungsteniteTransport`] closes the command channel, which
//! starts the closing handshake.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::{Request, Response};
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing::{debug, trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::protocol::{CloseEvent, Message};

use super::{BinaryType, Connector, ReadyState, Transport, TransportEvent, TransportEvents};

// ============================================================================
// Constants
// ============================================================================

/// Reported when the peer's close frame carried no status code.
const CLOSE_NO_STATUS: u16 = 1005;

/// Handshake request header listing the requested sub-protocols.
const SEC_WEBSOCKET_PROTOCOL: &str = "Sec-WebSocket-Protocol";

/// Handshake response header listing the accepted extensions.
const SEC_WEBSOCKET_EXTENSIONS: &str = "Sec-WebSocket-Extensions";

// ============================================================================
// ConnectionCommand
// ============================================================================

/// Internal commands for the event loop.
#[derive(Debug)]
enum ConnectionCommand {
    /// Write a data frame.
    Send(Message),
    /// Start the closing handshake, or abort the opening one.
    Close {
        code: Option<u16>,
        reason: Option<String>,
    },
}

// ============================================================================
// Shared State
// ============================================================================

/// State shared between the transport handle and its event loop.
#[derive(Debug)]
struct Shared {
    /// [`ReadyState`] as its numeric value.
    state: AtomicU8,
    /// Bytes accepted by `send` but not yet written.
    buffered: AtomicUsize,
    /// Sub-protocol selected by the server.
    protocol: Mutex<String>,
    /// Extensions accepted by the server.
    extensions: Mutex<String>,
    /// Binary framing preference.
    binary_type: Mutex<BinaryType>,
}

impl Shared {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(ReadyState::Connecting.as_u8()),
            buffered: AtomicUsize::new(0),
            protocol: Mutex::new(String::new()),
            extensions: Mutex::new(String::new()),
            binary_type: Mutex::new(BinaryType::default()),
        }
    }

    #[inline]
    fn state(&self) -> ReadyState {
        ReadyState::from_u8(self.state.load(Ordering::Acquire))
    }

    #[inline]
    fn set_state(&self, state: ReadyState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    /// Records the negotiated headers from the handshake response.
    fn record_response(&self, response: &Response) {
        let header = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|value| value.to_str().ok())
                .unwrap_or_default()
                .to_owned()
        };

        *self.protocol.lock() = header(SEC_WEBSOCKET_PROTOCOL);
        *self.extensions.lock() = header(SEC_WEBSOCKET_EXTENSIONS);
    }
}

// ============================================================================
// TungsteniteConnector
// ============================================================================

/// Opens WebSocket client connections with `tokio-tungstenite`.
///
/// Used by default when no connector is given to
/// [`SocketBuilder`](crate::SocketBuilder).
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

impl TungsteniteConnector {
    /// Creates a connector.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Builds the handshake request for `url`.
    fn request(url: &Url, protocols: &[String]) -> Result<Request> {
        let mut request = url.as_str().into_client_request()?;

        if !protocols.is_empty() {
            let value = HeaderValue::from_str(&protocols.join(", ")).map_err(|e| {
                Error::invalid_argument(format!("Invalid sub-protocol list: {e}"))
            })?;
            request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, value);
        }

        Ok(request)
    }
}

impl Connector for TungsteniteConnector {
    fn open(
        &self,
        url: &Url,
        protocols: &[String],
    ) -> Result<(Box<dyn Transport>, TransportEvents)> {
        let request = Self::request(url, protocols)?;
        let runtime = Handle::try_current()
            .map_err(|e| Error::config(format!("No tokio runtime for transport: {e}")))?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared::new());

        runtime.spawn(run_event_loop(
            request,
            command_rx,
            event_tx,
            Arc::clone(&shared),
        ));

        debug!(%url, "WebSocket connection started");

        let transport = TungsteniteTransport { command_tx, shared };
        Ok((Box::new(transport), event_rx))
    }
}

// ============================================================================
// TungsteniteTransport
// ============================================================================

/// Handle to one `tokio-tungstenite` connection.
///
/// All operations are non-blocking; frames are written by the event loop.
#[derive(Debug)]
pub struct TungsteniteTransport {
    /// Channel for sending commands to the event loop.
    command_tx: mpsc::UnboundedSender<ConnectionCommand>,
    /// State shared with the event loop.
    shared: Arc<Shared>,
}

impl Transport for TungsteniteTransport {
    fn ready_state(&self) -> ReadyState {
        self.shared.state()
    }

    fn send(&self, message: Message) -> Result<()> {
        let state = self.shared.state();
        if state != ReadyState::Open {
            return Err(Error::invalid_state(format!("Cannot send while {state}")));
        }

        let size = message.len();
        self.shared.buffered.fetch_add(size, Ordering::AcqRel);

        if self
            .command_tx
            .send(ConnectionCommand::Send(message))
            .is_err()
        {
            self.shared.buffered.fetch_sub(size, Ordering::AcqRel);
            return Err(Error::ConnectionClosed);
        }

        Ok(())
    }

    fn close(&self, code: Option<u16>, reason: Option<&str>) {
        let state = self.shared.state();
        if matches!(state, ReadyState::Closing | ReadyState::Closed) {
            return;
        }

        self.shared.set_state(ReadyState::Closing);
        let _ = self.command_tx.send(ConnectionCommand::Close {
            code,
            reason: reason.map(str::to_owned),
        });
    }

    fn protocol(&self) -> String {
        self.shared.protocol.lock().clone()
    }

    fn extensions(&self) -> String {
        self.shared.extensions.lock().clone()
    }

    fn buffered_amount(&self) -> usize {
        self.shared.buffered.load(Ordering::Acquire)
    }

    fn set_binary_type(&self, binary_type: BinaryType) {
        *self.shared.binary_type.lock() = binary_type;
    }

    fn binary_type(&self) -> BinaryType {
        *self.shared.binary_type.lock()
    }
}

// ============================================================================
// Event Loop
// ============================================================================

/// Drives one connection from handshake to final close.
async fn run_event_loop(
    request: Request,
    mut command_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
    events: mpsc::UnboundedSender<TransportEvent>,
    shared: Arc<Shared>,
) {
    let emit = |event: TransportEvent| {
        let _ = events.send(event);
    };

    // Opening handshake
    let handshake = connect_async(request);
    tokio::pin!(handshake);

    let ws_stream = loop {
        tokio::select! {
            result = &mut handshake => {
                match result {
                    Ok((stream, response)) => {
                        shared.record_response(&response);
                        break stream;
                    }
                    Err(e) => {
                        debug!(error = %e, "WebSocket handshake failed");
                        shared.set_state(ReadyState::Closed);
                        emit(TransportEvent::Error(format!("Handshake failed: {e}")));
                        emit(TransportEvent::Close(CloseEvent::abnormal()));
                        return;
                    }
                }
            }

            command = command_rx.recv() => {
                match command {
                    Some(ConnectionCommand::Send(_)) => {
                        trace!("Discarding message sent during handshake");
                    }
                    Some(ConnectionCommand::Close { .. }) | None => {
                        debug!("Handshake aborted");
                        shared.set_state(ReadyState::Closed);
                        emit(TransportEvent::Close(CloseEvent::abnormal()));
                        return;
                    }
                }
            }
        }
    };

    shared.set_state(ReadyState::Open);
    emit(TransportEvent::Open);

    let (mut ws_write, mut ws_read) = ws_stream.split();
    let mut close_event: Option<CloseEvent> = None;
    let mut command_closed = false;

    loop {
        tokio::select! {
            // Incoming frames
            frame = ws_read.next() => {
                match frame {
                    Some(Ok(WsMessage::Text(text))) => {
                        emit(TransportEvent::Message(Message::Text(text.as_str().to_owned())));
                    }

                    Some(Ok(WsMessage::Binary(data))) => {
                        emit(TransportEvent::Message(Message::Binary(data.to_vec())));
                    }

                    Some(Ok(WsMessage::Close(frame))) => {
                        let event = match frame {
                            Some(frame) => CloseEvent::new(u16::from(frame.code), frame.reason.as_str(), true),
                            None => CloseEvent::new(CLOSE_NO_STATUS, "", true),
                        };
                        debug!(code = event.code, "Close frame received");
                        close_event = Some(event);
                        shared.set_state(ReadyState::Closing);
                    }

                    // Ping, Pong and raw frames
                    Some(Ok(_)) => {}

                    Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) | None => {
                        debug!("WebSocket stream ended");
                        break;
                    }

                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket read failed");
                        emit(TransportEvent::Error(e.to_string()));
                        break;
                    }
                }
            }

            // Commands from the transport handle
            command = command_rx.recv(), if !command_closed => {
                match command {
                    Some(ConnectionCommand::Send(message)) => {
                        let size = message.len();
                        let result = ws_write.send(WsMessage::from(message)).await;
                        shared.buffered.fetch_sub(size, Ordering::AcqRel);

                        if let Err(e) = result {
                            warn!(error = %e, "WebSocket write failed");
                            emit(TransportEvent::Error(e.to_string()));
                            break;
                        }
                        trace!(size, "Frame sent");
                    }

                    Some(ConnectionCommand::Close { code, reason }) => {
                        let frame = code.map(|code| CloseFrame {
                            code: CloseCode::from(code),
                            reason: reason.unwrap_or_default().into(),
                        });

                        if let Err(e) = ws_write.send(WsMessage::Close(frame)).await {
                            debug!(error = %e, "Failed to send close frame");
                            break;
                        }
                    }

                    None => {
                        debug!("Transport handle dropped, closing");
                        command_closed = true;
                        let _ = ws_write.close().await;
                    }
                }
            }
        }
    }

    shared.set_state(ReadyState::Closed);
    emit(TransportEvent::Close(
        close_event.unwrap_or_else(CloseEvent::abnormal),
    ));

    debug!("Event loop terminated");
}

// ============================================================================
// Tests
// ============================================================================
