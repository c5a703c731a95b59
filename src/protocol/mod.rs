//! Message and event types.
//!
//! This module defines what flows through the socket: payloads the caller
//! sends and receives, and the lifecycle events dispatched to listeners.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `event` | [`Event`], [`EventKind`] and their payloads |
//! | `message` | Text and binary [`Message`] payloads |

// ============================================================================
// Submodules
// ============================================================================

/// Lifecycle and message events.
pub mod event;

/// Text and binary payloads.
pub mod message;

// ============================================================================
// Re-exports
// ============================================================================

pub use event::{CLOSE_ABNORMAL, CLOSE_NORMAL, CloseEvent, ErrorEvent, Event, EventKind};
pub use message::Message;
