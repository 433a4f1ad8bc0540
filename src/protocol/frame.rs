//! Event bus bridge wire frames.
//!
//! Frames are JSON objects discriminated by a `type` field. Outbound frames
//! are produced by the WebSocket transport; inbound frames are parsed from
//! the bridge's text messages.
//!
//! Deliveries arrive in three shapes depending on the bridge version:
//! `type: "message"` (TCP bridge framing), `type: "rec"` (SockJS bridge) and
//! untyped `{address, body, replyAddress}` objects (older bridges). All
//! three parse as [`InboundFrame::Message`].

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::{Value, from_str, from_value, to_string};

use crate::error::{Error, Result};

use super::Message;

// ============================================================================
// OutboundFrame
// ============================================================================

/// A frame sent from the client to the bridge.
///
/// # Format
///
/// ```json
/// {
///   "type": "send",
///   "address": "orders.lookup",
///   "body": { ... },
///   "replyAddress": "uuid"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutboundFrame {
    /// Point-to-point message.
    Send {
        /// Target address.
        address: String,
        /// Payload.
        body: Value,
        /// Where the reply should go, if one is expected.
        #[serde(rename = "replyAddress", skip_serializing_if = "Option::is_none")]
        reply_address: Option<String>,
    },

    /// Broadcast message.
    Publish {
        /// Target address.
        address: String,
        /// Payload.
        body: Value,
    },

    /// Start receiving messages for an address.
    Register {
        /// Address to listen on.
        address: String,
    },

    /// Stop receiving messages for an address.
    Unregister {
        /// Address to stop listening on.
        address: String,
    },

    /// Keep-alive.
    Ping,
}

impl OutboundFrame {
    /// Serializes the frame to its JSON text form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the body cannot be serialized.
    #[inline]
    pub fn to_json(&self) -> Result<String> {
        Ok(to_string(self)?)
    }
}

// ============================================================================
// InboundFrame
// ============================================================================

/// A frame received from the bridge.
///
/// Unknown `type` values parse as [`InboundFrame::Unknown`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InboundFrame {
    /// A delivery to a registered address, or a reply.
    #[serde(alias = "rec")]
    Message {
        /// Address the message was sent to (a reply address for replies).
        address: String,
        /// Payload.
        #[serde(default)]
        body: Value,
        /// Reply address, if the sender expects an answer.
        #[serde(rename = "replyAddress", default)]
        reply_address: Option<String>,
    },

    /// A failure, usually in answer to a `send`.
    Err {
        /// Numeric failure code.
        #[serde(rename = "failureCode", default)]
        failure_code: Option<i64>,
        /// Failure category.
        #[serde(rename = "failureType", default)]
        failure_type: Option<String>,
        /// Failure message.
        #[serde(default)]
        message: String,
        /// Reply address the failure answers, if any.
        #[serde(default)]
        address: Option<String>,
    },

    /// Answer to a ping.
    Pong,

    /// Any other frame type.
    #[serde(other)]
    Unknown,
}

impl InboundFrame {
    /// Parses a text frame.
    ///
    /// An object without `type` but with an `address` is a delivery.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the text is not a valid frame.
    pub fn parse(text: &str) -> Result<Self> {
        let mut value: Value = from_str(text)?;
        if let Value::Object(fields) = &mut value
            && !fields.contains_key("type")
            && fields.contains_key("address")
        {
            fields.insert("type".to_string(), Value::from("message"));
        }
        Ok(from_value(value)?)
    }

    /// Converts a `message` frame into a [`Message`].
    #[must_use]
    pub fn into_message(self) -> Option<Message> {
        match self {
            Self::Message {
                address,
                body,
                reply_address,
            } => Some(Message {
                address,
                body,
                reply_address,
            }),
            _ => None,
        }
    }

    /// Converts an `err` frame into an [`Error::ReplyFailure`].
    #[must_use]
    pub fn into_error(self) -> Option<Error> {
        match self {
            Self::Err {
                failure_code,
                failure_type,
                message,
                ..
            } => Some(Error::reply_failure(
                failure_code.unwrap_or(-1),
                failure_type.unwrap_or_else(|| "UNKNOWN".to_string()),
                message,
            )),
            _ => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
