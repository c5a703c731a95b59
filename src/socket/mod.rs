//! Reconnecting socket.
//!
//! This module contains the public [`ReconnectingSocket`] and the pieces it
//! is composed of.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `core` | [`ReconnectingSocket`] handle, connect path and event pump |
//! | `builder` | [`SocketBuilder`] for fluent configuration |
//! | `options` | [`ReconnectOptions`] and their defaults |
//! | `supervisor` | Lifecycle state machine |
//! | `backoff` | Reconnection delay with jitter |
//! | `queue` | Bounded outbound queue |
//! | `listeners` | Listener registry and dispatch |

// ============================================================================
// Submodules
// ============================================================================

/// Reconnection delay with jitter.
pub mod backoff;

/// Builder for socket configuration.
pub mod builder;

/// Socket handle and background tasks.
pub mod core;

/// Listener registry and dispatch.
pub mod listeners;

/// Reconnection options.
pub mod options;

/// Bounded outbound queue.
pub mod queue;

/// Lifecycle state machine.
pub mod supervisor;

// ============================================================================
// Re-exports
// ============================================================================

pub use backoff::Backoff;
pub use builder::SocketBuilder;
pub use core::ReconnectingSocket;
pub use listeners::{Listener, ListenerRegistry};
pub use options::ReconnectOptions;
pub use queue::OutboundQueue;
pub use supervisor::{Phase, Supervisor};
