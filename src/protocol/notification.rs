//! Lifecycle notifications emitted by the connection service.
//!
//! Every notification carries its full name, built from the configured
//! prefix (default `vertx-eventbus.`) and a fixed suffix:
//!
//! | Kind | Suffix | Payload |
//! |------|--------|---------|
//! | `Connected` | `system.connected` | none |
//! | `Disconnected` | `system.disconnected` | none |
//! | `LoginSucceeded` | `system.login.succeeded` | `{status}` |
//! | `LoginFailed` | `system.login.failed` | `{status}` |
//! | `StateChanged` | `system.state.changed` | none |

// ============================================================================
// Imports
// ============================================================================

use serde_json::Value;

// ============================================================================
// NotificationKind
// ============================================================================

/// Notification discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    /// The transport (re)opened after being disconnected.
    Connected,
    /// The transport closed after being connected.
    Disconnected,
    /// A login reply carried `status: "ok"`.
    LoginSucceeded,
    /// A login reply carried any other status.
    LoginFailed,
    /// Inbound traffic was dispatched or the connection state was refreshed.
    ///
    /// UI layers hook re-rendering onto this.
    StateChanged,
}

impl NotificationKind {
    /// Returns the name suffix appended to the prefix.
    #[inline]
    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Connected => "system.connected",
            Self::Disconnected => "system.disconnected",
            Self::LoginSucceeded => "system.login.succeeded",
            Self::LoginFailed => "system.login.failed",
            Self::StateChanged => "system.state.changed",
        }
    }
}

// ============================================================================
// Notification
// ============================================================================

/// A named lifecycle notification.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// What happened.
    pub kind: NotificationKind,
    /// Prefixed name, e.g. `vertx-eventbus.system.connected`.
    pub name: String,
    /// Optional payload (`{status}` for login notifications).
    pub payload: Option<Value>,
}

impl Notification {
    /// Creates a notification named `prefix + kind.suffix()`.
    #[must_use]
    pub fn new(prefix: &str, kind: NotificationKind, payload: Option<Value>) -> Self {
        Self {
            kind,
            name: format!("{prefix}{}", kind.suffix()),
            payload,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
