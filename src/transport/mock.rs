//! In-memory transport for tests.
//!
//! [`MockConnector`] records every handle it opens. Tests drive a handle's
//! lifecycle through [`MockHandle`] and inspect what the socket sent or
//! closed.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use url::Url;

use crate::error::{Error, Result};
use crate::protocol::{CloseEvent, Message};

use super::{BinaryType, Connector, ReadyState, Transport, TransportEvent, TransportEvents};

/// Recorded close call.
pub(crate) type CloseCall = (Option<u16>, Option<String>);

// ============================================================================
// MockConnector
// ============================================================================

#[derive(Clone, Default)]
pub(crate) struct MockConnector {
    state: Arc<Mutex<ConnectorState>>,
}

#[derive(Default)]
struct ConnectorState {
    handles: Vec<MockHandle>,
    failures: usize,
}

impl MockConnector {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Number of transports opened so far.
    pub(crate) fn open_count(&self) -> usize {
        self.state.lock().handles.len()
    }

    pub(crate) fn handle(&self, index: usize) -> MockHandle {
        self.state.lock().handles[index].clone()
    }

    pub(crate) fn last(&self) -> MockHandle {
        self.state
            .lock()
            .handles
            .last()
            .cloned()
            .expect("no transport opened")
    }

    /// Makes the next `count` calls to `open` fail.
    pub(crate) fn fail_next_opens(&self, count: usize) {
        self.state.lock().failures = count;
    }
}

impl Connector for MockConnector {
    fn open(
        &self,
        url: &Url,
        protocols: &[String],
    ) -> Result<(Box<dyn Transport>, TransportEvents)> {
        let mut state = self.state.lock();
        if state.failures > 0 {
            state.failures -= 1;
            return Err(Error::connection("mock open failure"));
        }

        let (events, receiver) = mpsc::unbounded_channel();
        let shared = Arc::new(MockShared {
            url: url.clone(),
            protocols: protocols.to_vec(),
            ready_state: Mutex::new(ReadyState::Connecting),
            sent: Mutex::new(Vec::new()),
            closes: Mutex::new(Vec::new()),
            binary_type: Mutex::new(BinaryType::default()),
            buffered: AtomicUsize::new(0),
        });
        state.handles.push(MockHandle {
            events: Arc::new(Mutex::new(Some(events))),
            shared: Arc::clone(&shared),
        });

        Ok((Box::new(MockTransport { shared }), receiver))
    }
}

// ============================================================================
// MockTransport
// ============================================================================

struct MockShared {
    url: Url,
    protocols: Vec<String>,
    ready_state: Mutex<ReadyState>,
    sent: Mutex<Vec<Message>>,
    closes: Mutex<Vec<CloseCall>>,
    binary_type: Mutex<BinaryType>,
    buffered: AtomicUsize,
}

struct MockTransport {
    shared: Arc<MockShared>,
}

impl Transport for MockTransport {
    fn ready_state(&self) -> ReadyState {
        *self.shared.ready_state.lock()
    }

    fn send(&self, message: Message) -> Result<()> {
        let state = self.ready_state();
        if state != ReadyState::Open {
            return Err(Error::invalid_state(format!("Cannot send while {state}")));
        }
        self.shared.sent.lock().push(message);
        Ok(())
    }

    fn close(&self, code: Option<u16>, reason: Option<&str>) {
        self.shared
            .closes
            .lock()
            .push((code, reason.map(str::to_owned)));

        let mut state = self.shared.ready_state.lock();
        if matches!(*state, ReadyState::Connecting | ReadyState::Open) {
            *state = ReadyState::Closing;
        }
    }

    fn protocol(&self) -> String {
        self.shared.protocols.first().cloned().unwrap_or_default()
    }

    fn buffered_amount(&self) -> usize {
        self.shared.buffered.load(Ordering::SeqCst)
    }

    fn set_binary_type(&self, binary_type: BinaryType) {
        *self.shared.binary_type.lock() = binary_type;
    }

    fn binary_type(&self) -> BinaryType {
        *self.shared.binary_type.lock()
    }
}

// ============================================================================
// MockHandle
// ============================================================================

/// Test-side control of one opened transport.
#[derive(Clone)]
pub(crate) struct MockHandle {
    events: Arc<Mutex<Option<mpsc::UnboundedSender<TransportEvent>>>>,
    shared: Arc<MockShared>,
}

impl MockHandle {
    pub(crate) fn url(&self) -> Url {
        self.shared.url.clone()
    }

    pub(crate) fn protocols(&self) -> Vec<String> {
        self.shared.protocols.clone()
    }

    /// Completes the handshake.
    pub(crate) fn open(&self) {
        self.set_ready_state(ReadyState::Open);
        self.emit(TransportEvent::Open);
    }

    pub(crate) fn message(&self, message: impl Into<Message>) {
        self.emit(TransportEvent::Message(message.into()));
    }

    pub(crate) fn error(&self, message: &str) {
        self.emit(TransportEvent::Error(message.to_owned()));
    }

    /// Closes from the remote side with a clean close frame.
    pub(crate) fn remote_close(&self, code: u16, reason: &str) {
        self.set_ready_state(ReadyState::Closed);
        self.emit(TransportEvent::Close(CloseEvent::new(code, reason, true)));
    }

    /// Drops the connection without a close frame.
    pub(crate) fn drop_connection(&self) {
        self.set_ready_state(ReadyState::Closed);
        self.emit(TransportEvent::Close(CloseEvent::abnormal()));
    }

    /// Drops the event sender without reporting a close.
    pub(crate) fn hang_up(&self) {
        self.events.lock().take();
    }

    fn emit(&self, event: TransportEvent) {
        if let Some(events) = self.events.lock().as_ref() {
            let _ = events.send(event);
        }
    }

    pub(crate) fn set_ready_state(&self, state: ReadyState) {
        *self.shared.ready_state.lock() = state;
    }

    pub(crate) fn ready_state(&self) -> ReadyState {
        *self.shared.ready_state.lock()
    }

    pub(crate) fn set_buffered(&self, bytes: usize) {
        self.shared.buffered.store(bytes, Ordering::SeqCst);
    }

    pub(crate) fn sent(&self) -> Vec<Message> {
        self.shared.sent.lock().clone()
    }

    pub(crate) fn closes(&self) -> Vec<CloseCall> {
        self.shared.closes.lock().clone()
    }

    pub(crate) fn binary_type(&self) -> BinaryType {
        *self.shared.binary_type.lock()
    }
}
