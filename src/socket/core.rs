//! The reconnecting socket.
//!
//! [`ReconnectingSocket`] behaves like a WebSocket handle that survives
//! connection loss. It composes the [`Supervisor`] state machine, the
//! listener registry and a [`Connector`] that produces transports.
//!
//! # Background Tasks
//!
//! Each scheduled attempt is a tokio task that sleeps out its backoff
//! delay, re-checks that it is still the pending attempt, opens a transport
//! and then pumps that transport's events until the handle is replaced or
//! closes. Tasks hold only a weak reference to the socket, so dropping the
//! last [`ReconnectingSocket`] clone tears everything down.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::time::{Instant, sleep, timeout_at};
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::protocol::{CLOSE_NORMAL, CloseEvent, ErrorEvent, Event, EventKind, Message};
use crate::transport::{BinaryType, Connector, ReadyState, TransportEvent, TransportEvents};

use super::builder::SocketBuilder;
use super::listeners::{Listener, ListenerRegistry, invoke};
use super::options::ReconnectOptions;
use super::supervisor::{AttemptDecision, SendOutcome, Supervisor, Trigger};

#[cfg(test)]
use super::supervisor::Phase;

// ============================================================================
// Constants
// ============================================================================

/// Maximum close reason length in bytes.
const MAX_CLOSE_REASON_BYTES: usize = 123;

// ============================================================================
// Inner
// ============================================================================

/// Shared state behind every [`ReconnectingSocket`] clone.
struct Inner {
    /// Endpoint, reused for every attempt.
    url: Url,
    /// Requested sub-protocols.
    protocols: Vec<String>,
    /// Options captured at construction.
    options: ReconnectOptions,
    /// Produces transport handles.
    connector: Arc<dyn Connector>,
    /// Runtime that background tasks are spawned on.
    runtime: Handle,
    /// Lifecycle state. Never held across an await or during dispatch.
    supervisor: Mutex<Supervisor>,
    /// Listener table. Never held during dispatch.
    listeners: Mutex<ListenerRegistry>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        debug!(url = %self.url, "Socket dropped, closing transport");
        self.supervisor.get_mut().shutdown();
    }
}

// ============================================================================
// ReconnectingSocket
// ============================================================================

/// A WebSocket-like handle with automatic reconnection.
///
/// Cloning is cheap and every clone refers to the same connection.
///
/// # Example
///
/// ```no_run
/// use reconnecting_socket::{ReconnectOptions, ReconnectingSocket};
///
/// # async fn example() -> reconnecting_socket::Result<()> {
/// let socket = ReconnectingSocket::new(
///     "ws://127.0.0.1:9000/feed",
///     ["v1.feed"],
///     ReconnectOptions::default(),
/// )?;
///
/// socket.on_message(|message| println!("received {} bytes", message.len()));
///
/// // Queued until the first connection opens.
/// socket.send("subscribe")?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ReconnectingSocket {
    inner: Arc<Inner>,
}

impl fmt::Debug for ReconnectingSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReconnectingSocket")
            .field("url", &self.inner.url.as_str())
            .field("ready_state", &self.ready_state())
            .field("retry_count", &self.retry_count())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// ReconnectingSocket - Constructors
// ============================================================================

impl ReconnectingSocket {
    /// Readiness value while connecting.
    pub const CONNECTING: u8 = ReadyState::Connecting as u8;
    /// Readiness value while open.
    pub const OPEN: u8 = ReadyState::Open as u8;
    /// Readiness value while closing.
    pub const CLOSING: u8 = ReadyState::Closing as u8;
    /// Readiness value once closed.
    pub const CLOSED: u8 = ReadyState::Closed as u8;

    /// Creates a socket on the default WebSocket transport and starts connecting.
    ///
    /// # Errors
    ///
    /// See [`SocketBuilder::build`].
    pub fn new(
        url: impl Into<String>,
        protocols: impl IntoIterator<Item = impl Into<String>>,
        options: ReconnectOptions,
    ) -> Result<Self> {
        Self::builder(url).protocols(protocols).options(options).build()
    }

    /// Returns a builder for a socket connecting to `url`.
    #[inline]
    #[must_use]
    pub fn builder(url: impl Into<String>) -> SocketBuilder {
        SocketBuilder::new(url)
    }

    /// Creates the socket and schedules the initial attempt.
    pub(crate) fn start(
        url: Url,
        protocols: Vec<String>,
        options: ReconnectOptions,
        connector: Arc<dyn Connector>,
        runtime: Handle,
        binary_type: BinaryType,
    ) -> Self {
        let supervisor = Supervisor::new(&options, binary_type);
        let inner = Arc::new(Inner {
            url,
            protocols,
            options,
            connector,
            runtime,
            supervisor: Mutex::new(supervisor),
            listeners: Mutex::new(ListenerRegistry::new()),
        });

        info!(url = %inner.url, "Socket created");
        inner.schedule_connect(Trigger::Initial);

        Self { inner }
    }
}

// ============================================================================
// ReconnectingSocket - Operations
// ============================================================================

impl ReconnectingSocket {
    /// Sends a message, or queues it until the next successful open.
    ///
    /// Messages beyond `message_queue_size` are dropped silently.
    ///
    /// # Errors
    ///
    /// Returns the transport's error if forwarding to an open connection fails.
    pub fn send(&self, data: impl Into<Message>) -> Result<()> {
        let outcome = self.inner.supervisor.lock().send(data.into())?;
        if outcome == SendOutcome::Dropped {
            debug!(url = %self.inner.url, "Message dropped, queue full");
        }
        Ok(())
    }

    /// Closes the connection and stops reconnecting.
    ///
    /// `code` defaults to 1000. A pending attempt is abandoned when its
    /// timer fires.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for codes other than 1000 or
    /// 3000..=4999, or reasons longer than 123 bytes.
    pub fn close(&self, code: Option<u16>, reason: Option<&str>) -> Result<()> {
        let code = code.unwrap_or(CLOSE_NORMAL);
        validate_close(Some(code), reason)?;

        debug!(url = %self.inner.url, code, "Close requested");
        self.inner.supervisor.lock().close_by_user(code, reason);
        Ok(())
    }

    /// Closes the current connection and connects again immediately.
    ///
    /// Resets the retry count, clears a previous close request and works
    /// even when automatic reconnection is disabled or exhausted. A no-op
    /// while an attempt is already pending.
    ///
    /// # Errors
    ///
    /// Same validation as [`close`](Self::close).
    pub fn reconnect(&self, code: Option<u16>, reason: Option<&str>) -> Result<()> {
        validate_close(code, reason)?;

        let proceed = self
            .inner
            .supervisor
            .lock()
            .begin_manual_reconnect(code, reason);
        if proceed {
            debug!(url = %self.inner.url, "Manual reconnect");
            self.inner.schedule_connect(Trigger::Manual);
        }
        Ok(())
    }

    /// Registers a listener. Registering the same listener twice makes it fire twice.
    pub fn add_event_listener(&self, kind: EventKind, listener: Listener) {
        self.inner.listeners.lock().add(kind, listener);
    }

    /// Removes every registration of `listener` for `kind`.
    pub fn remove_event_listener(&self, kind: EventKind, listener: &Listener) {
        self.inner.listeners.lock().remove(kind, listener);
    }

    /// Sets or clears the primary handler for `kind`. It fires before listeners.
    pub fn set_handler(&self, kind: EventKind, handler: Option<Listener>) {
        self.inner.listeners.lock().set_primary(kind, handler);
    }

    /// Sets the primary `open` handler.
    pub fn on_open(&self, handler: impl Fn() + Send + Sync + 'static) {
        self.set_handler(EventKind::Open, Some(Listener::new(move |_| handler())));
    }

    /// Sets the primary `close` handler.
    pub fn on_close(&self, handler: impl Fn(&CloseEvent) + Send + Sync + 'static) {
        self.set_handler(
            EventKind::Close,
            Some(Listener::new(move |event| {
                if let Event::Close(close) = event {
                    handler(close);
                }
            })),
        );
    }

    /// Sets the primary `error` handler.
    pub fn on_error(&self, handler: impl Fn(&ErrorEvent) + Send + Sync + 'static) {
        self.set_handler(
            EventKind::Error,
            Some(Listener::new(move |event| {
                if let Event::Error(error) = event {
                    handler(error);
                }
            })),
        );
    }

    /// Sets the primary `message` handler.
    pub fn on_message(&self, handler: impl Fn(&Message) + Send + Sync + 'static) {
        self.set_handler(
            EventKind::Message,
            Some(Listener::new(move |event| {
                if let Event::Message(message) = event {
                    handler(message);
                }
            })),
        );
    }

    /// Delivers `event` to the handlers registered for its kind.
    ///
    /// Delivery is synchronous and cannot be cancelled, so this always
    /// returns `true`.
    pub fn dispatch_event(&self, event: &Event) -> bool {
        self.inner.dispatch(event);
        true
    }
}

// ============================================================================
// ReconnectingSocket - Accessors
// ============================================================================

impl ReconnectingSocket {
    /// Returns the endpoint URL.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.inner.url
    }

    /// Returns the options the socket was created with.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &ReconnectOptions {
        &self.inner.options
    }

    /// Returns the sub-protocol selected by the server, or an empty string.
    #[must_use]
    pub fn protocol(&self) -> String {
        self.inner.supervisor.lock().protocol()
    }

    /// Returns the extensions selected by the server, or an empty string.
    #[must_use]
    pub fn extensions(&self) -> String {
        self.inner.supervisor.lock().extensions()
    }

    /// Returns the current readiness.
    #[must_use]
    pub fn ready_state(&self) -> ReadyState {
        self.inner.supervisor.lock().ready_state()
    }

    /// Returns the binary framing preference.
    #[must_use]
    pub fn binary_type(&self) -> BinaryType {
        self.inner.supervisor.lock().binary_type()
    }

    /// Sets the binary framing preference for this and every later connection.
    pub fn set_binary_type(&self, binary_type: BinaryType) {
        self.inner.supervisor.lock().set_binary_type(binary_type);
    }

    /// Returns queued bytes plus bytes buffered by the live transport.
    #[must_use]
    pub fn buffered_amount(&self) -> usize {
        self.inner.supervisor.lock().buffered_amount()
    }

    /// Returns the number of automatic attempts since the last successful open.
    #[must_use]
    pub fn retry_count(&self) -> u32 {
        self.inner.supervisor.lock().retry_count()
    }

    #[cfg(test)]
    fn phase(&self) -> Phase {
        self.inner.supervisor.lock().phase()
    }
}

// ============================================================================
// Inner - Connect Path
// ============================================================================

impl Inner {
    /// Enters the connect path.
    fn schedule_connect(self: &Arc<Self>, trigger: Trigger) {
        let decision = self.supervisor.lock().begin_attempt(trigger);

        match decision {
            AttemptDecision::Scheduled {
                attempt,
                delay,
                retry,
            } => {
                debug!(attempt, retry, ?delay, ?trigger, "Connection attempt scheduled");
                let weak = Arc::downgrade(self);
                let connection_timeout = self.options.connection_timeout;
                self.runtime
                    .spawn(run_attempt(weak, attempt, delay, connection_timeout));
            }
            AttemptDecision::InProgress => {
                trace!(?trigger, "Connection attempt already pending");
            }
            AttemptDecision::CloseRequested => {
                debug!("Close requested, not reconnecting");
            }
            AttemptDecision::Disabled => {
                debug!("Reconnection disabled, staying closed");
            }
            AttemptDecision::Exhausted { attempts } => {
                warn!(url = %self.url, attempts, "Reconnection attempts exhausted");
                self.dispatch(&Event::Exhausted { attempts });
            }
        }
    }

    /// Opens a transport for `attempt` if it is still pending.
    ///
    /// The connector runs outside the state lock.
    fn open_transport(self: &Arc<Self>, attempt: u64) -> Option<(u64, TransportEvents)> {
        if !self.supervisor.lock().is_pending(attempt) {
            debug!(attempt, "Connection attempt superseded");
            return None;
        }

        let (transport, events) = match self.connector.open(&self.url, &self.protocols) {
            Ok(opened) => opened,
            Err(e) => {
                warn!(url = %self.url, attempt, error = %e, "Failed to open transport");
                if self.supervisor.lock().fail_attempt(attempt) {
                    self.dispatch(&Event::Error(ErrorEvent::new(e.to_string())));
                    self.schedule_connect(Trigger::Automatic);
                }
                return None;
            }
        };

        let attached = self.supervisor.lock().attach(attempt, transport);
        match attached {
            Ok(generation) => {
                debug!(url = %self.url, attempt, generation, "Transport attached");
                Some((generation, events))
            }
            Err(transport) => {
                debug!(attempt, "Attempt superseded while opening, discarding transport");
                transport.close(None, None);
                None
            }
        }
    }

    // ========================================================================
    // Transport Events
    // ========================================================================

    /// Applies one transport event.
    ///
    /// Returns `false` once `generation` is no longer the live handle.
    fn handle_event(self: &Arc<Self>, generation: u64, event: TransportEvent) -> bool {
        match event {
            TransportEvent::Open => {
                let flushed = self.supervisor.lock().on_open(generation);
                if let Some(flushed) = flushed {
                    info!(url = %self.url, generation, flushed, "Connection open");
                    self.dispatch(&Event::Open);
                }
            }

            TransportEvent::Message(message) => {
                if !self.supervisor.lock().is_current(generation) {
                    return false;
                }
                trace!(generation, size = message.len(), "Message received");
                self.dispatch(&Event::Message(message));
            }

            TransportEvent::Error(message) => {
                if !self.supervisor.lock().is_current(generation) {
                    return false;
                }
                warn!(url = %self.url, generation, error = %message, "Transport error");
                self.dispatch(&Event::Error(ErrorEvent::new(message)));

                let forced = self.supervisor.lock().begin_forced_reconnect(generation);
                if forced {
                    self.schedule_connect(Trigger::Automatic);
                }
            }

            TransportEvent::Close(close) => {
                if !self.supervisor.lock().on_close(generation) {
                    return false;
                }
                info!(
                    url = %self.url,
                    generation,
                    code = close.code,
                    clean = close.was_clean,
                    "Connection closed"
                );
                self.dispatch(&Event::Close(close));
                self.schedule_connect(Trigger::Automatic);
            }
        }

        self.supervisor.lock().is_current(generation)
    }

    /// Delivers an event to its handlers, primary first.
    fn dispatch(&self, event: &Event) {
        let handlers = self.listeners.lock().handlers(event.kind());
        if handlers.is_empty() {
            return;
        }

        let panicked = invoke(&handlers, event);
        if panicked > 0 {
            warn!(event = event.type_name(), panicked, "Handlers panicked during dispatch");
        }
    }
}

// ============================================================================
// Background Tasks
// ============================================================================

/// Waits out the backoff delay, opens the transport and pumps its events.
async fn run_attempt(
    weak: Weak<Inner>,
    attempt: u64,
    delay: Duration,
    connection_timeout: Duration,
) {
    sleep(delay).await;

    let opened = match weak.upgrade() {
        Some(inner) => inner.open_transport(attempt),
        None => return,
    };

    if let Some((generation, events)) = opened {
        pump_events(weak, generation, events, connection_timeout).await;
    }
}

/// Forwards one handle's events until it is replaced or closes.
///
/// If the handle does not open within `connection_timeout`, a synthetic
/// error is injected, which forces a reconnect.
async fn pump_events(
    weak: Weak<Inner>,
    generation: u64,
    mut events: TransportEvents,
    connection_timeout: Duration,
) {
    let deadline = Instant::now().checked_add(connection_timeout);
    let mut opened = false;

    loop {
        let next = match deadline {
            Some(deadline) if !opened => match timeout_at(deadline, events.recv()).await {
                Ok(event) => event,
                Err(_) => Some(TransportEvent::Error(format!(
                    "Connection timeout after {}ms",
                    connection_timeout.as_millis()
                ))),
            },
            _ => events.recv().await,
        };

        // A stream that ends without a close event counts as an abnormal close.
        let (event, ended) = match next {
            Some(event) => (event, false),
            None => {
                debug!(generation, "Transport event stream ended without close");
                (TransportEvent::Close(CloseEvent::abnormal()), true)
            }
        };
        opened |= event == TransportEvent::Open;

        let Some(inner) = weak.upgrade() else {
            break;
        };
        if !inner.handle_event(generation, event) || ended {
            break;
        }
    }

    trace!(generation, "Event pump finished");
}

// ============================================================================
// Validation
// ============================================================================

/// Checks a close code and reason against the WebSocket API rules.
fn validate_close(code: Option<u16>, reason: Option<&str>) -> Result<()> {
    if let Some(code) = code
        && code != CLOSE_NORMAL
        && !(3000..=4999).contains(&code)
    {
        return Err(Error::invalid_argument(format!(
            "Close code must be 1000 or within 3000..=4999, got {code}"
        )));
    }

    if let Some(reason) = reason
        && reason.len() > MAX_CLOSE_REASON_BYTES
    {
        return Err(Error::invalid_argument(format!(
            "Close reason must be at most {MAX_CLOSE_REASON_BYTES} bytes, got {}",
            reason.len()
        )));
    }

    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
