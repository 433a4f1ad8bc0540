//! Event bus façade.
//!
//! The [`EventBus`] is the application-facing handle. It keeps the logical
//! subscriptions (address → callbacks) independent of the transport, and
//! re-attaches all of them every time the connection (re)opens.
//!
//! # Example
//!
//! ```no_run
//! use serde_json::json;
//! use vertx_eventbus::{EventBus, EventBusOptions};
//!
//! # async fn example() -> vertx_eventbus::Result<()> {
//! let bus = EventBus::builder()
//!     .options(EventBusOptions::new().with_buffer_capacity(16))
//!     .build()?;
//!
//! let registration = bus.on("news.headlines", |message| {
//!     println!("headline: {}", message.body);
//! });
//!
//! bus.publish("news.submit", json!({ "title": "hello" }))?;
//! let reply = bus.send("orders.lookup", json!({ "id": 7 })).await?;
//! println!("{}", reply.body);
//!
//! registration.remove();
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::Result;
use crate::protocol::{Message, Notification, ReadyState};
use crate::service::{ConnectionObserver, ConnectionService};
use crate::transport::Handler;

use super::builder::EventBusBuilder;

// ============================================================================
// Constants
// ============================================================================

/// Default reply timeout of [`EventBus::send`].
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Default reply timeout of [`EventBus::login`].
pub const DEFAULT_LOGIN_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Types
// ============================================================================

/// Internal shared state for the bus.
pub(crate) struct EventBusInner {
    /// Connection state machine and gate.
    service: Arc<ConnectionService>,

    /// Logical subscriptions, per address in insertion order.
    handlers: Mutex<FxHashMap<String, Vec<Handler>>>,
}

impl EventBusInner {
    fn subscribe(&self, address: &str, handler: Handler) {
        self.handlers
            .lock()
            .entry(address.to_string())
            .or_default()
            .push(handler.clone());

        if self.service.is_connection_open() {
            self.service.register_handler(address, handler);
        }
    }

    fn unsubscribe(&self, address: &str, handler: &Handler) {
        let still_listed = {
            let mut handlers = self.handlers.lock();
            let Some(list) = handlers.get_mut(address) else {
                return;
            };
            let Some(position) = list.iter().position(|h| h == handler) else {
                return;
            };
            list.remove(position);
            let still_listed = list.contains(handler);
            if list.is_empty() {
                handlers.remove(address);
            }
            still_listed
        };

        if !still_listed {
            self.service.unregister_handler(address, handler);
        }
    }
}

impl ConnectionObserver for EventBusInner {
    fn after_connected(&self) {
        let snapshot: Vec<(String, Vec<Handler>)> = self
            .handlers
            .lock()
            .iter()
            .map(|(address, list)| (address.clone(), list.clone()))
            .collect();

        let count: usize = snapshot.iter().map(|(_, list)| list.len()).sum();
        if count > 0 {
            debug!(count, "Re-registering handlers");
        }

        for (address, list) in snapshot {
            for handler in list {
                self.service.register_handler(&address, handler);
            }
        }
    }
}

// ============================================================================
// EventBus
// ============================================================================

/// Reconnect-transparent event bus client.
///
/// Cloning is cheap; clones share one connection. Dropping the last clone
/// stops polling and reconnecting and closes the transport.
#[derive(Clone)]
pub struct EventBus {
    /// Shared inner state.
    pub(crate) inner: Arc<EventBusInner>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("enabled", &self.is_enabled())
            .field("connected", &self.is_connected())
            .field("address_count", &self.inner.handlers.lock().len())
            .finish_non_exhaustive()
    }
}

impl EventBus {
    /// Creates a configuration builder for the bus.
    #[inline]
    #[must_use]
    pub fn builder() -> EventBusBuilder {
        EventBusBuilder::new()
    }

    /// Wraps a service and registers the façade as its observer.
    pub(crate) fn from_service(service: Arc<ConnectionService>) -> Self {
        let inner = Arc::new(EventBusInner {
            service: Arc::clone(&service),
            handlers: Mutex::new(FxHashMap::default()),
        });
        let observer = Arc::downgrade(&inner);
        service.observe(observer);
        Self { inner }
    }
}

// ============================================================================
// EventBus - Subscriptions
// ============================================================================

impl EventBus {
    /// Subscribes `handler` to `address`.
    ///
    /// The subscription survives reconnects. The same handler may be
    /// subscribed more than once; each subscription is listed separately.
    pub fn subscribe(&self, address: impl Into<String>, handler: Handler) -> HandlerRegistration {
        let address = address.into();
        self.inner.subscribe(&address, handler.clone());
        HandlerRegistration {
            address,
            handler,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Subscribes a closure to `address`.
    pub fn on(
        &self,
        address: impl Into<String>,
        f: impl Fn(&Message) + Send + Sync + 'static,
    ) -> HandlerRegistration {
        self.subscribe(address, Handler::new(f))
    }

    /// Removes one subscription of `handler` from `address`.
    ///
    /// Removing the last handler of an address forgets the address.
    pub fn unsubscribe(&self, address: &str, handler: &Handler) {
        self.inner.unsubscribe(address, handler);
    }

    /// Number of subscriptions on `address`.
    #[must_use]
    pub fn handler_count(&self, address: &str) -> usize {
        self.inner.handlers.lock().get(address).map_or(0, Vec::len)
    }

    /// Addresses with at least one subscription.
    #[must_use]
    pub fn addresses(&self) -> Vec<String> {
        self.inner.handlers.lock().keys().cloned().collect()
    }
}

// ============================================================================
// EventBus - Messaging
// ============================================================================

impl EventBus {
    /// Sends a message and waits up to 10 seconds for the reply.
    ///
    /// See [`send_with_timeout`](Self::send_with_timeout).
    pub fn send(
        &self,
        address: &str,
        body: Value,
    ) -> impl Future<Output = Result<Message>> + Send + 'static {
        self.send_with_timeout(address, body, DEFAULT_SEND_TIMEOUT)
    }

    /// Sends a message and waits up to `timeout` for the reply.
    ///
    /// The message is gated immediately: sent if the connection is open,
    /// buffered if buffering is enabled, refused otherwise.
    ///
    /// # Errors
    ///
    /// The future resolves to:
    /// - [`Error::NotConnected`](crate::Error::NotConnected) if refused
    /// - [`Error::RequestTimeout`](crate::Error::RequestTimeout) if no reply arrived in time
    /// - [`Error::MessageDropped`](crate::Error::MessageDropped) if the buffered message was discarded
    pub fn send_with_timeout(
        &self,
        address: &str,
        body: Value,
        timeout: Duration,
    ) -> impl Future<Output = Result<Message>> + Send + 'static {
        self.inner.service.send(address, body, timeout)
    }

    /// Publishes a message to every handler of `address`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`](crate::Error::NotConnected) if the
    /// connection is not open and buffering is disabled.
    pub fn publish(&self, address: &str, body: Value) -> Result<()> {
        self.inner.service.publish(address, body)
    }

    /// Logs in, waiting up to 5 seconds for the reply.
    ///
    /// See [`login_with_timeout`](Self::login_with_timeout).
    pub fn login(
        &self,
        username: &str,
        password: &str,
    ) -> impl Future<Output = Result<Message>> + Send + 'static {
        self.login_with_timeout(username, password, DEFAULT_LOGIN_TIMEOUT)
    }

    /// Logs in, waiting up to `timeout` for the reply.
    ///
    /// # Errors
    ///
    /// The future resolves to:
    /// - [`Error::LoginRejected`](crate::Error::LoginRejected) if the reply status is not `"ok"`
    /// - [`Error::LoginTimeout`](crate::Error::LoginTimeout) if no reply arrived in time
    pub fn login_with_timeout(
        &self,
        username: &str,
        password: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<Message>> + Send + 'static {
        self.inner.service.login(username, password, timeout)
    }
}

// ============================================================================
// EventBus - State
// ============================================================================

impl EventBus {
    /// Current ready state, read from the transport.
    #[must_use]
    pub fn connection_state(&self) -> ReadyState {
        self.inner.service.connection_state(true)
    }

    /// Returns `true` unless the bus was built disabled.
    #[inline]
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.inner.service.options().enabled
    }

    /// Returns `true` between an open and the following close.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.service.is_connected()
    }

    /// Returns `true` after a successful login, until a failed one.
    #[inline]
    #[must_use]
    pub fn is_valid_session(&self) -> bool {
        self.inner.service.is_valid_session()
    }

    /// Number of buffered outbound actions.
    #[inline]
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.inner.service.buffered_len()
    }

    /// Subscribes to lifecycle notifications.
    ///
    /// Every delivered message also emits `StateChanged`. A receiver that
    /// falls more than the channel capacity behind gets `RecvError::Lagged`
    /// and loses the oldest notifications; keep up or `resubscribe`.
    #[must_use]
    pub fn notifications(&self) -> broadcast::Receiver<Notification> {
        self.inner.service.notifications()
    }
}

// ============================================================================
// EventBus - Lifecycle
// ============================================================================

impl EventBus {
    /// Closes the transport session. Reconnection follows if enabled.
    pub fn close(&self) {
        self.inner.service.close();
    }

    /// Forces a reconnect.
    pub fn reconnect(&self) {
        self.inner.service.reconnect();
    }

    /// Stops the bus for good: no polling, no reconnects, buffered actions
    /// dropped, session closed.
    pub fn shutdown(&self) {
        self.inner.service.shutdown();
    }
}

// ============================================================================
// HandlerRegistration
// ============================================================================

/// Handle to one subscription.
///
/// Dropping it does not unsubscribe; call [`remove`](Self::remove).
#[derive(Debug, Clone)]
pub struct HandlerRegistration {
    address: String,
    handler: Handler,
    bus: Weak<EventBusInner>,
}

impl HandlerRegistration {
    /// The subscribed address.
    #[inline]
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// The subscribed handler.
    #[inline]
    #[must_use]
    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    /// Removes the subscription. Same as [`EventBus::unsubscribe`].
    pub fn remove(self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.unsubscribe(&self.address, &self.handler);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
