//! Outbound message buffer used while the transport is not open.
//!
//! The queue is bounded by message count. Pushing beyond the bound drops
//! the new message; this is a lossy overflow policy, not an error.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;

use tracing::debug;

use crate::protocol::Message;

// ============================================================================
// OutboundQueue
// ============================================================================

/// FIFO of messages waiting for the next successful open.
#[derive(Debug, Clone)]
pub struct OutboundQueue {
    /// Pending messages in send order.
    items: VecDeque<Message>,
    /// Maximum number of pending messages.
    capacity: usize,
    /// Sum of payload sizes of `items`.
    bytes: usize,
}

impl OutboundQueue {
    /// Creates an empty queue holding at most `capacity` messages.
    #[inline]
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::new(),
            capacity,
            bytes: 0,
        }
    }

    /// Appends a message if the queue is below capacity.
    ///
    /// Returns `false` when the message was dropped.
    pub fn push(&mut self, message: Message) -> bool {
        if self.items.len() >= self.capacity {
            debug!(
                capacity = self.capacity,
                size = message.len(),
                "Outbound queue full, dropping message"
            );
            return false;
        }

        self.bytes += message.len();
        self.items.push_back(message);
        true
    }

    /// Removes and returns every queued message in send order.
    pub fn drain(&mut self) -> Vec<Message> {
        self.bytes = 0;
        self.items.drain(..).collect()
    }

    /// Drops every queued message.
    pub fn clear(&mut self) {
        self.items.clear();
        self.bytes = 0;
    }

    /// Returns the total payload size of queued messages in bytes.
    #[inline]
    #[must_use]
    pub const fn buffered_amount(&self) -> usize {
        self.bytes
    }

    /// Returns the number of queued messages.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if nothing is queued.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns the configured capacity.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterates over queued messages in send order.
    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.items.iter()
    }
}

// ============================================================================
// Tests
// ============================================================================
