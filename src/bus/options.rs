//! Event bus client configuration.
//!
//! [`EventBusOptions`] is an immutable value once handed to the builder;
//! the bus shares it by `Arc` with every internal component.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use vertx_eventbus::EventBusOptions;
//!
//! let options = EventBusOptions::new()
//!     .with_server_url("https://bus.example.com")
//!     .with_reconnect_interval(Duration::from_secs(2))
//!     .with_buffer_capacity(32)
//!     .with_login_required(true);
//!
//! assert_eq!(
//!     options.connection_url().unwrap().as_str(),
//!     "https://bus.example.com/eventbus"
//! );
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde_json::{Map, Value};
use url::Url;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default notification name prefix.
pub const DEFAULT_EVENT_NAME_PREFIX: &str = "vertx-eventbus.";

/// Default server URL (scheme, host and port only).
pub const DEFAULT_SERVER_URL: &str = "http://localhost:8080";

/// Default bridge path appended to the server URL.
pub const DEFAULT_PATH: &str = "/eventbus";

/// Default period of the readiness poll.
pub const DEFAULT_STATE_CHECK_INTERVAL: Duration = Duration::from_secs(10);

/// Default delay before reconnecting after a close.
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(10);

// ============================================================================
// EventBusOptions
// ============================================================================

/// Event bus client configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct EventBusOptions {
    /// Connect at all. When `false` the bus is inert.
    pub enabled: bool,

    /// Emit per-message debug logs.
    pub debug_enabled: bool,

    /// Prefix of every notification name.
    pub event_name_prefix: String,

    /// Server URL without the bridge path.
    pub server_url: String,

    /// Bridge path, appended verbatim to `server_url`.
    pub path: String,

    /// Reconnect automatically after the transport closes.
    pub reconnect_enabled: bool,

    /// Period of the readiness poll.
    pub state_check_interval: Duration,

    /// Delay before each reconnect attempt.
    pub reconnect_interval: Duration,

    /// Opaque options handed to the transport factory.
    pub transport_options: Value,

    /// Maximum number of buffered actions; `0` disables buffering.
    pub buffer_capacity: usize,

    /// Withhold `send`/`publish` until a login succeeded.
    pub login_required: bool,
}

impl Default for EventBusOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl EventBusOptions {
    /// Creates options with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            enabled: true,
            debug_enabled: false,
            event_name_prefix: DEFAULT_EVENT_NAME_PREFIX.to_string(),
            server_url: DEFAULT_SERVER_URL.to_string(),
            path: DEFAULT_PATH.to_string(),
            reconnect_enabled: true,
            state_check_interval: DEFAULT_STATE_CHECK_INTERVAL,
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            transport_options: Value::Object(Map::new()),
            buffer_capacity: 0,
            login_required: false,
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl EventBusOptions {
    /// Enables or disables the bus.
    #[inline]
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Enables or disables debug logging.
    #[inline]
    #[must_use]
    pub fn with_debug(mut self, debug_enabled: bool) -> Self {
        self.debug_enabled = debug_enabled;
        self
    }

    /// Sets the notification name prefix.
    #[inline]
    #[must_use]
    pub fn with_event_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.event_name_prefix = prefix.into();
        self
    }

    /// Sets the server URL.
    #[inline]
    #[must_use]
    pub fn with_server_url(mut self, server_url: impl Into<String>) -> Self {
        self.server_url = server_url.into();
        self
    }

    /// Sets the bridge path.
    #[inline]
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Enables or disables automatic reconnection.
    #[inline]
    #[must_use]
    pub fn with_reconnect(mut self, reconnect_enabled: bool) -> Self {
        self.reconnect_enabled = reconnect_enabled;
        self
    }

    /// Sets the readiness poll period.
    #[inline]
    #[must_use]
    pub fn with_state_check_interval(mut self, interval: Duration) -> Self {
        self.state_check_interval = interval;
        self
    }

    /// Sets the reconnect delay.
    #[inline]
    #[must_use]
    pub fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    /// Sets the options passed through to the transport.
    #[inline]
    #[must_use]
    pub fn with_transport_options(mut self, transport_options: Value) -> Self {
        self.transport_options = transport_options;
        self
    }

    /// Sets the buffer capacity (`0` disables buffering).
    #[inline]
    #[must_use]
    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }

    /// Requires a successful login before traffic flows.
    #[inline]
    #[must_use]
    pub fn with_login_required(mut self, login_required: bool) -> Self {
        self.login_required = login_required;
        self
    }
}

// ============================================================================
// Derived Values
// ============================================================================

impl EventBusOptions {
    /// Returns `true` if outbound actions are buffered while disconnected.
    #[inline]
    #[must_use]
    pub const fn is_buffering_enabled(&self) -> bool {
        self.buffer_capacity > 0
    }

    /// Returns the URL the transport connects to (`server_url + path`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Url`] if the concatenation is not a valid URL.
    pub fn connection_url(&self) -> Result<Url> {
        Ok(Url::parse(&format!("{}{}", self.server_url, self.path))?)
    }

    /// Checks the options for values the bus cannot run with.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if an interval is zero
    /// - [`Error::Config`] if the connection URL does not parse
    pub fn validate(&self) -> Result<()> {
        if self.state_check_interval.is_zero() {
            return Err(Error::config("state check interval must be non-zero"));
        }
        if self.reconnect_interval.is_zero() {
            return Err(Error::config("reconnect interval must be non-zero"));
        }
        self.connection_url().map_err(|e| {
            Error::config(format!(
                "invalid connection URL '{}{}': {e}",
                self.server_url, self.path
            ))
        })?;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
