//! Connection lifecycle state machine.
//!
//! [`Supervisor`] holds everything that changes as connections come and go:
//! the phase, the live transport handle, the retry count and the outbound
//! queue. It performs no I/O and spawns nothing; the socket core calls into
//! it under a lock and acts on the returned decisions.
//!
//! # Phases
//!
//! ```text
//!            construct / reconnect()
//!  Idle ───────────────────────────────► Connecting{attempt}
//!   ▲                                         │ timer fires, transport opened
//!   │ exhausted / disabled                    ▼
//!   │                                    Handshaking
//!   │                                         │ TransportEvent::Open
//!   │                                         ▼
//!   └──────────── close event ◄──────────── Open
//!                                             │ error event
//!   close()  ──► ClosingByUser                ▼
//!                                    ClosingForReconnect ──► Connecting
//! ```
//!
//! `Connecting` doubles as the connect guard: while it holds, further
//! triggers are no-ops. `ClosingByUser` is the close-requested flag: the
//! automatic connect path refuses to proceed from it.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::error::Result;
use crate::protocol::{CLOSE_NORMAL, Message};
use crate::transport::{BinaryType, ReadyState, Transport};

use super::backoff::Backoff;
use super::options::ReconnectOptions;
use super::queue::OutboundQueue;

// ============================================================================
// Phase
// ============================================================================

/// Lifecycle phase of the socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No attempt pending and no usable connection.
    Idle,
    /// An attempt is waiting out its backoff delay.
    Connecting {
        /// Token identifying the pending attempt.
        attempt: u64,
    },
    /// A transport is attached and performing its handshake.
    Handshaking,
    /// The attached transport is open.
    Open,
    /// The caller asked to close; no automatic reconnection.
    ClosingByUser,
    /// The current transport is being discarded so a new one can be opened.
    ClosingForReconnect,
}

// ============================================================================
// Trigger / Decisions
// ============================================================================

/// What started a connect cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Construction.
    Initial,
    /// Transport close or error.
    Automatic,
    /// Explicit `reconnect()`.
    Manual,
}

/// Outcome of [`Supervisor::begin_attempt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptDecision {
    /// A timer should be started for `attempt`.
    Scheduled {
        /// Token of the new attempt.
        attempt: u64,
        /// Backoff delay.
        delay: Duration,
        /// Retry count after this attempt was counted.
        retry: u32,
    },
    /// Another attempt is already pending.
    InProgress,
    /// The caller requested close.
    CloseRequested,
    /// Automatic reconnection is disabled.
    Disabled,
    /// The retry budget is spent.
    Exhausted {
        /// Number of automatic attempts that were allowed.
        attempts: u32,
    },
}

/// Outcome of [`Supervisor::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Forwarded to the open transport.
    Sent,
    /// Buffered until the next open.
    Queued,
    /// Dropped because the queue is full.
    Dropped,
}

// ============================================================================
// AttachedHandle
// ============================================================================

/// The live transport and the generation its events are tagged with.
struct AttachedHandle {
    transport: Box<dyn Transport>,
    generation: u64,
}

// ============================================================================
// Supervisor
// ============================================================================

/// Mutable connection state for one socket.
pub struct Supervisor {
    phase: Phase,
    handle: Option<AttachedHandle>,
    retry_count: u32,
    last_attempt: u64,
    last_generation: u64,
    binary_type: BinaryType,
    queue: OutboundQueue,
    backoff: Backoff,
    reconnection: bool,
    max_attempts: u32,
}

impl Supervisor {
    /// Creates an idle supervisor.
    #[must_use]
    pub fn new(options: &ReconnectOptions, binary_type: BinaryType) -> Self {
        Self {
            phase: Phase::Idle,
            handle: None,
            retry_count: 0,
            last_attempt: 0,
            last_generation: 0,
            binary_type,
            queue: OutboundQueue::new(options.message_queue_size),
            backoff: Backoff::from_options(options),
            reconnection: options.reconnection,
            max_attempts: options.reconnection_attempts,
        }
    }

    // ========================================================================
    // Connect Path
    // ========================================================================

    /// Decides whether a connect attempt may start and, if so, reserves it.
    ///
    /// Automatic attempts count against the retry budget before it is
    /// checked. Initial and manual attempts reset the count and skip the
    /// delay. Any handle still attached is detached.
    pub fn begin_attempt(&mut self, trigger: Trigger) -> AttemptDecision {
        if matches!(self.phase, Phase::Connecting { .. }) {
            return AttemptDecision::InProgress;
        }

        let delay = match trigger {
            Trigger::Automatic => {
                if self.phase == Phase::ClosingByUser {
                    return AttemptDecision::CloseRequested;
                }
                if !self.reconnection {
                    self.detach();
                    self.phase = Phase::Idle;
                    return AttemptDecision::Disabled;
                }

                self.retry_count = self.retry_count.saturating_add(1);
                if self.retry_count > self.max_attempts {
                    self.detach();
                    self.phase = Phase::Idle;
                    return AttemptDecision::Exhausted {
                        attempts: self.max_attempts,
                    };
                }
                self.backoff.delay(self.retry_count)
            }
            Trigger::Initial | Trigger::Manual => {
                self.retry_count = 0;
                Duration::ZERO
            }
        };

        self.detach();
        self.last_attempt += 1;
        self.phase = Phase::Connecting {
            attempt: self.last_attempt,
        };

        AttemptDecision::Scheduled {
            attempt: self.last_attempt,
            delay,
            retry: self.retry_count,
        }
    }

    /// Returns `true` if `attempt` is still the pending attempt.
    #[inline]
    #[must_use]
    pub fn is_pending(&self, attempt: u64) -> bool {
        self.phase == Phase::Connecting { attempt }
    }

    /// Attaches a freshly opened transport for `attempt`.
    ///
    /// Returns the handle's generation, or hands the transport back if the
    /// attempt was superseded while the transport was being opened.
    pub fn attach(
        &mut self,
        attempt: u64,
        transport: Box<dyn Transport>,
    ) -> std::result::Result<u64, Box<dyn Transport>> {
        if !self.is_pending(attempt) {
            return Err(transport);
        }

        transport.set_binary_type(self.binary_type);
        self.last_generation += 1;
        self.handle = Some(AttachedHandle {
            transport,
            generation: self.last_generation,
        });
        self.phase = Phase::Handshaking;
        Ok(self.last_generation)
    }

    /// Releases the guard after the connector failed to produce a transport.
    ///
    /// Returns `false` if the attempt was already superseded.
    pub fn fail_attempt(&mut self, attempt: u64) -> bool {
        if !self.is_pending(attempt) {
            return false;
        }
        self.phase = Phase::ClosingForReconnect;
        true
    }

    // ========================================================================
    // Transport Events
    // ========================================================================

    /// Returns `true` if `generation` is the attached handle.
    #[inline]
    #[must_use]
    pub fn is_current(&self, generation: u64) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| handle.generation == generation)
    }

    /// Handles a transport open: resets the retry count and flushes the queue.
    ///
    /// Returns the number of flushed messages, or `None` if the event should
    /// not be dispatched.
    pub fn on_open(&mut self, generation: u64) -> Option<usize> {
        if !self.is_current(generation) || self.phase != Phase::Handshaking {
            return None;
        }

        self.retry_count = 0;
        self.phase = Phase::Open;

        let handle = self.handle.as_ref()?;
        let pending = self.queue.drain();
        let count = pending.len();
        for message in pending {
            if let Err(e) = handle.transport.send(message) {
                warn!(generation, error = %e, "Failed to flush queued message");
            }
        }

        Some(count)
    }

    /// Handles a transport close: detaches the handle.
    ///
    /// Returns `false` for stale generations.
    pub fn on_close(&mut self, generation: u64) -> bool {
        if !self.is_current(generation) {
            return false;
        }

        self.handle = None;
        if self.phase != Phase::ClosingByUser {
            self.phase = Phase::Idle;
        }
        true
    }

    /// Discards the current handle after a transport error.
    ///
    /// Clears any close request. The handle is closed without code or reason
    /// unless it already reports `Closed`. Returns `false` for stale
    /// generations.
    pub fn begin_forced_reconnect(&mut self, generation: u64) -> bool {
        if !self.is_current(generation) {
            return false;
        }

        self.phase = Phase::ClosingForReconnect;
        if let Some(handle) = self.handle.take()
            && handle.transport.ready_state() != ReadyState::Closed
        {
            debug!(generation, "Closing failed transport before reconnecting");
            handle.transport.close(None, None);
        }
        true
    }

    // ========================================================================
    // Caller Operations
    // ========================================================================

    /// Sends or buffers a message.
    ///
    /// # Errors
    ///
    /// Returns the transport's error if forwarding to an open transport fails.
    pub fn send(&mut self, message: Message) -> Result<SendOutcome> {
        if self.phase == Phase::Open
            && let Some(handle) = &self.handle
            && handle.transport.ready_state() == ReadyState::Open
        {
            handle.transport.send(message)?;
            return Ok(SendOutcome::Sent);
        }

        if self.queue.push(message) {
            trace!(queued = self.queue.len(), "Message queued");
            Ok(SendOutcome::Queued)
        } else {
            Ok(SendOutcome::Dropped)
        }
    }

    /// Records a close request and forwards it to the live handle.
    pub fn close_by_user(&mut self, code: u16, reason: Option<&str>) {
        self.phase = Phase::ClosingByUser;
        if let Some(handle) = &self.handle {
            handle.transport.close(Some(code), reason);
        }
    }

    /// Discards the current handle for an explicit reconnect.
    ///
    /// Returns `false` if an attempt is already pending.
    pub fn begin_manual_reconnect(&mut self, code: Option<u16>, reason: Option<&str>) -> bool {
        if matches!(self.phase, Phase::Connecting { .. }) {
            return false;
        }

        self.phase = Phase::ClosingForReconnect;
        if let Some(handle) = self.handle.take()
            && handle.transport.ready_state() != ReadyState::Closed
        {
            handle.transport.close(code, reason);
        }
        true
    }

    /// Closes the live handle and drops everything queued.
    pub fn shutdown(&mut self) {
        self.phase = Phase::ClosingByUser;
        if let Some(handle) = self.handle.take()
            && handle.transport.ready_state() != ReadyState::Closed
        {
            handle.transport.close(Some(CLOSE_NORMAL), None);
        }
        self.queue.clear();
    }

    /// Sets the binary framing preference and applies it to the live handle.
    pub fn set_binary_type(&mut self, binary_type: BinaryType) {
        self.binary_type = binary_type;
        if let Some(handle) = &self.handle {
            handle.transport.set_binary_type(binary_type);
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Returns the current phase.
    #[inline]
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Returns the retry count.
    #[inline]
    #[must_use]
    pub const fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Returns the binary framing preference.
    #[inline]
    #[must_use]
    pub const fn binary_type(&self) -> BinaryType {
        self.binary_type
    }

    /// Returns the number of queued messages.
    #[inline]
    #[must_use]
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Returns the readiness reported to callers.
    ///
    /// Mirrors the live transport. Without one, a pending or imminent
    /// attempt reads as `Connecting` and anything else as `Closed`.
    #[must_use]
    pub fn ready_state(&self) -> ReadyState {
        if let Some(handle) = &self.handle {
            return handle.transport.ready_state();
        }
        match self.phase {
            Phase::Connecting { .. } | Phase::Handshaking | Phase::ClosingForReconnect => {
                ReadyState::Connecting
            }
            Phase::Idle | Phase::Open | Phase::ClosingByUser => ReadyState::Closed,
        }
    }

    /// Returns queued bytes plus the transport's own buffered bytes.
    #[must_use]
    pub fn buffered_amount(&self) -> usize {
        let transport = self
            .handle
            .as_ref()
            .map_or(0, |handle| handle.transport.buffered_amount());
        self.queue.buffered_amount() + transport
    }

    /// Returns the negotiated sub-protocol, or an empty string.
    #[must_use]
    pub fn protocol(&self) -> String {
        self.handle
            .as_ref()
            .map(|handle| handle.transport.protocol())
            .unwrap_or_default()
    }

    /// Returns the negotiated extensions, or an empty string.
    #[must_use]
    pub fn extensions(&self) -> String {
        self.handle
            .as_ref()
            .map(|handle| handle.transport.extensions())
            .unwrap_or_default()
    }

    /// Drops the attached handle without closing it.
    fn detach(&mut self) {
        if let Some(handle) = self.handle.take() {
            trace!(generation = handle.generation, "Detached transport handle");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::transport::Connector;
    use crate::transport::mock::MockConnector;

    fn options() -> ReconnectOptions {
        ReconnectOptions::new()
            .with_reconnection_delay(Duration::from_millis(100))
            .with_reconnection_delay_max(Duration::from_millis(1000))
            .with_randomization_factor(0.0)
    }

    fn url() -> url::Url {
        url::Url::parse("ws://example.test/socket").unwrap()
    }

    /// Runs an initial attempt through to `Handshaking`, returning the generation.
    fn attach_new(supervisor: &mut Supervisor, connector: &MockConnector) -> u64 {
        let AttemptDecision::Scheduled { attempt, .. } = supervisor.begin_attempt(Trigger::Manual)
        else {
            panic!("attempt should be scheduled");
        };
        let (transport, _events) = connector.open(&url(), &[]).unwrap();
        supervisor.attach(attempt, transport).ok().unwrap()
    }

    #[test]
    fn test_initial_attempt_is_immediate() {
        let mut supervisor = Supervisor::new(&options(), BinaryType::Blob);
        let decision = supervisor.begin_attempt(Trigger::Initial);
        assert_eq!(
            decision,
            AttemptDecision::Scheduled {
                attempt: 1,
                delay: Duration::ZERO,
                retry: 0
            }
        );
        assert_eq!(supervisor.ready_state(), ReadyState::Connecting);
    }

    #[test]
    fn test_second_trigger_while_connecting_is_noop() {
        let mut supervisor = Supervisor::new(&options(), BinaryType::Blob);
        supervisor.begin_attempt(Trigger::Initial);
        assert_eq!(
            supervisor.begin_attempt(Trigger::Automatic),
            AttemptDecision::InProgress
        );
        assert_eq!(
            supervisor.begin_attempt(Trigger::Manual),
            AttemptDecision::InProgress
        );
        assert_eq!(supervisor.retry_count(), 0);
    }

    #[test]
    fn test_automatic_attempts_grow_delay() {
        let mut supervisor = Supervisor::new(&options(), BinaryType::Blob);
        supervisor.phase = Phase::Idle;
        let first = supervisor.begin_attempt(Trigger::Automatic);
        assert!(matches!(
            first,
            AttemptDecision::Scheduled { retry: 1, delay, .. } if delay == Duration::from_millis(100)
        ));

        supervisor.phase = Phase::Idle;
        let second = supervisor.begin_attempt(Trigger::Automatic);
        assert!(matches!(
            second,
            AttemptDecision::Scheduled { retry: 2, delay, .. } if delay == Duration::from_millis(200)
        ));
    }

    #[test]
    fn test_exhausted_after_max_attempts() {
        let mut supervisor =
            Supervisor::new(&options().with_reconnection_attempts(1), BinaryType::Blob);
        assert!(matches!(
            supervisor.begin_attempt(Trigger::Automatic),
            AttemptDecision::Scheduled { .. }
        ));

        supervisor.phase = Phase::Idle;
        assert_eq!(
            supervisor.begin_attempt(Trigger::Automatic),
            AttemptDecision::Exhausted { attempts: 1 }
        );
        assert_eq!(supervisor.phase(), Phase::Idle);
        assert_eq!(supervisor.ready_state(), ReadyState::Closed);
    }

    #[test]
    fn test_zero_attempts_exhausts_immediately() {
        let mut supervisor =
            Supervisor::new(&options().with_reconnection_attempts(0), BinaryType::Blob);
        assert_eq!(
            supervisor.begin_attempt(Trigger::Automatic),
            AttemptDecision::Exhausted { attempts: 0 }
        );
    }

    #[test]
    fn test_disabled_reconnection_blocks_automatic_only() {
        let mut supervisor =
            Supervisor::new(&options().with_reconnection(false), BinaryType::Blob);
        assert_eq!(
            supervisor.begin_attempt(Trigger::Automatic),
            AttemptDecision::Disabled
        );
        assert!(matches!(
            supervisor.begin_attempt(Trigger::Manual),
            AttemptDecision::Scheduled { .. }
        ));
    }

    #[test]
    fn test_close_requested_blocks_automatic() {
        let mut supervisor = Supervisor::new(&options(), BinaryType::Blob);
        supervisor.close_by_user(1000, None);
        assert_eq!(
            supervisor.begin_attempt(Trigger::Automatic),
            AttemptDecision::CloseRequested
        );
        assert_eq!(supervisor.retry_count(), 0);
    }

    #[test]
    fn test_superseded_attempt_cannot_attach() {
        let connector = MockConnector::new();
        let mut supervisor = Supervisor::new(&options(), BinaryType::Blob);
        let AttemptDecision::Scheduled { attempt, .. } = supervisor.begin_attempt(Trigger::Initial)
        else {
            panic!("attempt should be scheduled");
        };
        supervisor.close_by_user(1000, None);
        assert!(!supervisor.is_pending(attempt));

        let (transport, _events) = connector.open(&url(), &[]).unwrap();
        assert!(supervisor.attach(attempt, transport).is_err());
        assert_eq!(supervisor.ready_state(), ReadyState::Closed);
    }

    #[test]
    fn test_attach_applies_binary_type() {
        let connector = MockConnector::new();
        let mut supervisor = Supervisor::new(&options(), BinaryType::ArrayBuffer);
        attach_new(&mut supervisor, &connector);
        assert_eq!(connector.last().binary_type(), BinaryType::ArrayBuffer);
        assert_eq!(supervisor.phase(), Phase::Handshaking);
    }

    #[test]
    fn test_open_flushes_queue_and_resets_retry() {
        let connector = MockConnector::new();
        let mut supervisor = Supervisor::new(&options(), BinaryType::Blob);
        supervisor.send(Message::text("a")).unwrap();
        supervisor.send(Message::text("b")).unwrap();

        let generation = attach_new(&mut supervisor, &connector);
        supervisor.retry_count = 3;
        connector.last().set_ready_state(ReadyState::Open);

        assert_eq!(supervisor.on_open(generation), Some(2));
        assert_eq!(supervisor.retry_count(), 0);
        assert_eq!(supervisor.queued(), 0);
        assert_eq!(
            connector.last().sent(),
            vec![Message::text("a"), Message::text("b")]
        );
        assert_eq!(
            supervisor.send(Message::text("c")).unwrap(),
            SendOutcome::Sent
        );
    }

    #[test]
    fn test_flush_rejected_by_transport_is_not_requeued() {
        let connector = MockConnector::new();
        let mut supervisor = Supervisor::new(&options(), BinaryType::Blob);
        supervisor.send(Message::text("a")).unwrap();
        supervisor.send(Message::text("b")).unwrap();

        // Transport still reports Connecting, so every flushed send fails.
        let generation = attach_new(&mut supervisor, &connector);

        assert_eq!(supervisor.on_open(generation), Some(2));
        assert_eq!(supervisor.queued(), 0);
        assert_eq!(supervisor.buffered_amount(), 0);
        assert!(connector.last().sent().is_empty());
    }

    #[test]
    fn test_stale_generation_ignored() {
        let connector = MockConnector::new();
        let mut supervisor = Supervisor::new(&options(), BinaryType::Blob);
        let old = attach_new(&mut supervisor, &connector);
        let new = attach_new(&mut supervisor, &connector);

        assert_ne!(old, new);
        assert!(!supervisor.is_current(old));
        assert_eq!(supervisor.on_open(old), None);
        assert!(!supervisor.on_close(old));
        assert!(!supervisor.begin_forced_reconnect(old));
        assert!(supervisor.is_current(new));
    }

    #[test]
    fn test_forced_reconnect_closes_live_handle_and_clears_close_request() {
        let connector = MockConnector::new();
        let mut supervisor = Supervisor::new(&options(), BinaryType::Blob);
        let generation = attach_new(&mut supervisor, &connector);
        supervisor.close_by_user(4000, Some("bye"));

        assert!(supervisor.begin_forced_reconnect(generation));
        assert_eq!(supervisor.phase(), Phase::ClosingForReconnect);
        assert_eq!(
            connector.last().closes(),
            vec![(Some(4000), Some("bye".to_string())), (None, None)]
        );
        assert!(matches!(
            supervisor.begin_attempt(Trigger::Automatic),
            AttemptDecision::Scheduled { .. }
        ));
    }

    #[test]
    fn test_queue_overflow_reports_dropped() {
        let mut supervisor =
            Supervisor::new(&options().with_message_queue_size(1), BinaryType::Blob);
        assert_eq!(
            supervisor.send(Message::text("kept")).unwrap(),
            SendOutcome::Queued
        );
        assert_eq!(
            supervisor.send(Message::text("lost")).unwrap(),
            SendOutcome::Dropped
        );
        assert_eq!(supervisor.buffered_amount(), 4);
    }

    #[test]
    fn test_buffered_amount_includes_transport() {
        let connector = MockConnector::new();
        let mut supervisor = Supervisor::new(&options(), BinaryType::Blob);
        supervisor.send(Message::text("abc")).unwrap();
        attach_new(&mut supervisor, &connector);
        connector.last().set_buffered(10);
        assert_eq!(supervisor.buffered_amount(), 13);
    }

    #[test]
    fn test_shutdown_closes_with_normal_code() {
        let connector = MockConnector::new();
        let mut supervisor = Supervisor::new(&options(), BinaryType::Blob);
        attach_new(&mut supervisor, &connector);
        supervisor.send(Message::text("pending")).unwrap();

        supervisor.shutdown();

        assert_eq!(connector.last().closes(), vec![(Some(CLOSE_NORMAL), None)]);
        assert_eq!(supervisor.queued(), 0);
        assert_eq!(supervisor.phase(), Phase::ClosingByUser);
    }
}
