//! Outbound and inbound message payloads.
//!
//! A [`Message`] is what callers hand to
//! [`ReconnectingSocket::send`](crate::ReconnectingSocket::send) and what
//! `message` listeners receive. The wrapper never looks inside a payload;
//! it only measures it for
//! [`buffered_amount`](crate::ReconnectingSocket::buffered_amount).

// ============================================================================
// Imports
// ============================================================================

use tokio_tungstenite::tungstenite::Message as WsMessage;

// ============================================================================
// Message
// ============================================================================

/// A text or binary payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Message {
    /// UTF-8 text frame.
    Text(String),
    /// Binary frame.
    Binary(Vec<u8>),
}

impl Message {
    /// Creates a text message.
    #[inline]
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Creates a binary message.
    #[inline]
    #[must_use]
    pub fn binary(data: impl Into<Vec<u8>>) -> Self {
        Self::Binary(data.into())
    }

    /// Returns the payload size in bytes.
    ///
    /// Text is measured in UTF-8 bytes, not characters.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(data) => data.len(),
        }
    }

    /// Returns `true` if the payload is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` for text payloads.
    #[inline]
    #[must_use]
    pub const fn is_text(&self) -> bool {
        matches!(self, Self::Text(_))
    }

    /// Returns the text content, if this is a text message.
    #[inline]
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Binary(_) => None,
        }
    }

    /// Returns the raw payload bytes.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Binary(data) => data,
        }
    }
}

// ============================================================================
// Conversions
// ============================================================================

impl From<String> for Message {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<Vec<u8>> for Message {
    fn from(data: Vec<u8>) -> Self {
        Self::Binary(data)
    }
}

impl From<&[u8]> for Message {
    fn from(data: &[u8]) -> Self {
        Self::Binary(data.to_vec())
    }
}

impl From<Message> for WsMessage {
    fn from(message: Message) -> Self {
        match message {
            Message::Text(text) => WsMessage::Text(text.into()),
            Message::Binary(data) => WsMessage::Binary(data.into()),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_len_counts_utf8_bytes() {
        assert_eq!(Message::text("abc").len(), 3);
        assert_eq!(Message::text("é").len(), 2);
        assert_eq!(Message::binary(vec![1, 2, 3, 4]).len(), 4);
        assert!(Message::text("").is_empty());
    }

    #[test]
    fn test_from_conversions() {
        assert_eq!(Message::from("hi"), Message::Text("hi".into()));
        assert_eq!(Message::from(vec![7u8]), Message::Binary(vec![7]));
        assert_eq!(Message::from(&[1u8, 2][..]), Message::Binary(vec![1, 2]));
    }

    #[test]
    fn test_accessors() {
        let text = Message::text("hello");
        assert!(text.is_text());
        assert_eq!(text.as_text(), Some("hello"));
        assert_eq!(text.as_bytes(), b"hello");

        let binary = Message::binary(vec![0xff]);
        assert!(!binary.is_text());
        assert_eq!(binary.as_text(), None);
        assert_eq!(binary.as_bytes(), &[0xff]);
    }

    #[test]
    fn test_into_tungstenite_message() {
        let ws: WsMessage = Message::text("ping").into();
        assert!(ws.is_text());
        assert_eq!(ws.into_text().unwrap().as_str(), "ping");

        let ws: WsMessage = Message::binary(vec![1, 2]).into();
        assert!(ws.is_binary());
        assert_eq!(ws.into_data().to_vec(), vec![1, 2]);
    }
}
