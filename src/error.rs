//! Error types for the event bus client.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use vertx_eventbus::{EventBus, Result};
//!
//! async fn example(bus: &EventBus) -> Result<()> {
//!     let reply = bus.send("orders.lookup", json!({ "id": 7 })).await?;
//!     println!("{}", reply.body);
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::Url`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionClosed`], [`Error::NotConnected`] |
//! | Delivery | [`Error::MessageDropped`], [`Error::RequestTimeout`], [`Error::ReplyFailure`] |
//! | Session | [`Error::LoginRejected`], [`Error::LoginTimeout`] |
//! | External | [`Error::Json`], [`Error::WebSocket`] |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use serde_json::Value;
use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned by the builder when options are invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Server URL could not be parsed.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Transport connection failed.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Transport session closed while a reply was pending.
    #[error("Connection closed")]
    ConnectionClosed,

    /// The connection is not open and buffering is disabled.
    ///
    /// Returned immediately by `send` and `publish`; nothing reached the transport.
    #[error("Not connected and message buffering is disabled")]
    NotConnected,

    // ========================================================================
    // Delivery Errors
    // ========================================================================
    /// A deferred action was discarded before it ran.
    ///
    /// Happens when the bounded buffer evicts it or when the login gate
    /// drops it for lack of a valid session.
    #[error("Message dropped before delivery")]
    MessageDropped,

    /// No reply arrived within the timeout.
    #[error("Request to {address} timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// Target address of the request.
        address: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// The bridge answered with an `err` frame.
    #[error("Reply failure ({failure_type}, code {failure_code}): {message}")]
    ReplyFailure {
        /// Numeric failure code reported by the server.
        failure_code: i64,
        /// Failure category (`TIMEOUT`, `NO_HANDLERS`, `RECIPIENT_FAILURE`, ...).
        failure_type: String,
        /// Failure message.
        message: String,
    },

    // ========================================================================
    // Session Errors
    // ========================================================================
    /// Login reply did not carry `status: "ok"`.
    #[error("Login rejected: {reply}")]
    LoginRejected {
        /// The full reply body.
        reply: Value,
    },

    /// No login reply arrived within the timeout.
    #[error("Login timed out after {timeout_ms}ms")]
    LoginTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a request timeout error.
    #[inline]
    pub fn request_timeout(address: impl Into<String>, timeout_ms: u64) -> Self {
        Self::RequestTimeout {
            address: address.into(),
            timeout_ms,
        }
    }

    /// Creates a login rejected error.
    #[inline]
    pub fn login_rejected(reply: Value) -> Self {
        Self::LoginRejected { reply }
    }

    /// Creates a reply failure error.
    #[inline]
    pub fn reply_failure(
        failure_code: i64,
        failure_type: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::ReplyFailure {
            failure_code,
            failure_type: failure_type.into(),
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::RequestTimeout { .. } | Self::LoginTimeout { .. }
        )
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors may succeed on retry once the bus reconnects. The
    /// adapter only schedules a reconnect after a recoverable connect failure.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::WebSocket(_)
                | Self::RequestTimeout { .. }
                | Self::LoginTimeout { .. }
                | Self::ConnectionClosed
                | Self::NotConnected
                | Self::MessageDropped
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_error_display() {
        let err = Error::connection("refused");
        assert_eq!(err.to_string(), "Connection failed: refused");
    }

    #[test]
    fn test_config_error() {
        let err = Error::config("state check interval must be non-zero");
        assert_eq!(
            err.to_string(),
            "Configuration error: state check interval must be non-zero"
        );
    }

    #[test]
    fn test_request_timeout_display() {
        let err = Error::request_timeout("orders.lookup", 10_000);
        assert_eq!(
            err.to_string(),
            "Request to orders.lookup timed out after 10000ms"
        );
    }

    #[test]
    fn test_is_timeout() {
        let timeout_err = Error::request_timeout("a", 5000);
        let other_err = Error::NotConnected;

        assert!(timeout_err.is_timeout());
        assert!(Error::LoginTimeout { timeout_ms: 5000 }.is_timeout());
        assert!(!other_err.is_timeout());
    }

    #[test]
    fn test_is_recoverable() {
        assert!(Error::request_timeout("a", 1000).is_recoverable());
        assert!(Error::MessageDropped.is_recoverable());
        assert!(Error::connection("refused").is_recoverable());
        assert!(Error::from(WsError::ConnectionClosed).is_recoverable());
        assert!(!Error::Url(url::ParseError::EmptyHost).is_recoverable());
        assert!(!Error::login_rejected(json!({"status": "denied"})).is_recoverable());
        assert!(!Error::config("test").is_recoverable());
    }

    #[test]
    fn test_login_rejected_keeps_reply() {
        let err = Error::login_rejected(json!({"status": "denied"}));
        match err {
            Error::LoginRejected { reply } => assert_eq!(reply["status"], "denied"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn test_from_url_error() {
        let url_err = url::Url::parse("not a url").unwrap_err();
        let err: Error = url_err.into();
        assert!(matches!(err, Error::Url(_)));
    }
}
