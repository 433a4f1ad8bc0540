//! Messages delivered to handlers and reply callbacks.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Message
// ============================================================================

/// A message received from the bus.
///
/// Handlers receive one per delivery; `send` and `login` resolve with the
/// reply message.
///
/// # Format
///
/// ```json
/// {
///   "address": "orders.created",
///   "body": { ... },
///   "replyAddress": "6f0c..."
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Address the message was sent to.
    pub address: String,

    /// Message payload.
    #[serde(default)]
    pub body: Value,

    /// Address to reply to, when the sender expects an answer.
    #[serde(
        rename = "replyAddress",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub reply_address: Option<String>,
}

impl Message {
    /// Creates a message without a reply address.
    #[inline]
    #[must_use]
    pub fn new(address: impl Into<String>, body: Value) -> Self {
        Self {
            address: address.into(),
            body,
            reply_address: None,
        }
    }

    /// Sets the reply address.
    #[inline]
    #[must_use]
    pub fn with_reply_address(mut self, reply_address: impl Into<String>) -> Self {
        self.reply_address = Some(reply_address.into());
        self
    }

    /// Gets a string field from the body.
    #[inline]
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.body.get(key).and_then(Value::as_str)
    }

    /// Returns the `status` field of the body, as carried by login replies.
    #[inline]
    #[must_use]
    pub fn status(&self) -> Option<&str> {
        self.get_str("status")
    }
}

// ============================================================================
// Tests
// ============================================================================
