//! Listener registry and event fan-out.
//!
//! Each [`EventKind`] has one optional primary handler plus an ordered list
//! of listeners. Dispatch calls the primary handler first, then the
//! listeners in registration order.
//!
//! # Panics in handlers
//!
//! A panicking handler is caught and logged; the remaining handlers for the
//! same event still run. Handlers run on the transport's event task, so an
//! uncaught panic would otherwise stop event delivery for that connection.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::error;

use crate::protocol::{Event, EventKind};

// ============================================================================
// Listener
// ============================================================================

/// A shareable event callback.
///
/// Identity is by allocation: clones of the same `Listener` are equal,
/// two listeners built from identical closures are not. Keep a clone to
/// remove the listener later.
#[derive(Clone)]
pub struct Listener(Arc<dyn Fn(&Event) + Send + Sync>);

impl Listener {
    /// Wraps a callback.
    #[must_use]
    pub fn new(callback: impl Fn(&Event) + Send + Sync + 'static) -> Self {
        Self(Arc::new(callback))
    }

    /// Invokes the callback.
    #[inline]
    pub fn call(&self, event: &Event) {
        (self.0)(event);
    }
}

impl PartialEq for Listener {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Listener {}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Listener")
            .field(&Arc::as_ptr(&self.0).cast::<()>())
            .finish()
    }
}

// ============================================================================
// ListenerRegistry
// ============================================================================

/// Listener table keyed by event kind.
#[derive(Debug, Default)]
pub struct ListenerRegistry {
    /// Single-slot handlers, invoked first.
    primary: FxHashMap<EventKind, Listener>,
    /// Registered listeners in registration order.
    listeners: FxHashMap<EventKind, Vec<Listener>>,
}

impl ListenerRegistry {
    /// Creates an empty registry.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a listener. The same listener may be added more than once.
    pub fn add(&mut self, kind: EventKind, listener: Listener) {
        self.listeners.entry(kind).or_default().push(listener);
    }

    /// Removes every registration of `listener` for `kind`.
    ///
    /// Returns the number of registrations removed.
    pub fn remove(&mut self, kind: EventKind, listener: &Listener) -> usize {
        let Some(list) = self.listeners.get_mut(&kind) else {
            return 0;
        };

        let before = list.len();
        list.retain(|registered| registered != listener);
        before - list.len()
    }

    /// Sets or clears the primary handler, returning the previous one.
    pub fn set_primary(&mut self, kind: EventKind, handler: Option<Listener>) -> Option<Listener> {
        match handler {
            Some(handler) => self.primary.insert(kind, handler),
            None => self.primary.remove(&kind),
        }
    }

    /// Returns the primary handler for `kind`.
    #[must_use]
    pub fn primary(&self, kind: EventKind) -> Option<&Listener> {
        self.primary.get(&kind)
    }

    /// Returns the number of registered listeners for `kind`, excluding the primary handler.
    #[must_use]
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners.get(&kind).map_or(0, Vec::len)
    }

    /// Returns a snapshot of the handlers for `kind` in dispatch order.
    #[must_use]
    pub fn handlers(&self, kind: EventKind) -> Vec<Listener> {
        let listeners = self.listeners.get(&kind).map_or(&[][..], Vec::as_slice);
        let mut handlers = Vec::with_capacity(listeners.len() + 1);
        handlers.extend(self.primary.get(&kind).cloned());
        handlers.extend_from_slice(listeners);
        handlers
    }
}

// ============================================================================
// Dispatch
// ============================================================================

/// Invokes each handler with `event`, in order.
///
/// Returns the number of handlers that panicked.
pub fn invoke(handlers: &[Listener], event: &Event) -> usize {
    let mut panicked = 0;

    for handler in handlers {
        if catch_unwind(AssertUnwindSafe(|| handler.call(event))).is_err() {
            panicked += 1;
            error!(event = event.type_name(), "Event handler panicked");
        }
    }

    panicked
}

// ============================================================================
// Tests
// ============================================================================
