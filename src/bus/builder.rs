//! Builder pattern for event bus configuration.
//!
//! Provides a fluent API for configuring and creating [`EventBus`] instances.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use vertx_eventbus::{EventBus, EventBusOptions};
//!
//! # async fn example() -> vertx_eventbus::Result<()> {
//! let bus = EventBus::builder()
//!     .options(
//!         EventBusOptions::new()
//!             .with_server_url("http://localhost:8080")
//!             .with_reconnect_interval(Duration::from_secs(2)),
//!     )
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::service::ConnectionService;
use crate::transport::{TransportAdapter, TransportFactory, WebSocketTransport};

use super::core::EventBus;
use super::options::EventBusOptions;

// ============================================================================
// EventBusBuilder
// ============================================================================

/// Builder for configuring an [`EventBus`] instance.
///
/// Use [`EventBus::builder()`] to create a new builder.
#[derive(Default, Clone)]
pub struct EventBusBuilder {
    /// Bus configuration.
    options: EventBusOptions,
    /// Transport factory; the WebSocket transport when unset.
    transport: Option<Arc<dyn TransportFactory>>,
}

impl fmt::Debug for EventBusBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBusBuilder")
            .field("options", &self.options)
            .field("custom_transport", &self.transport.is_some())
            .finish()
    }
}

// ============================================================================
// EventBusBuilder Implementation
// ============================================================================

impl EventBusBuilder {
    /// Creates a builder with default options.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the bus options.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: EventBusOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the transport factory.
    ///
    /// # Arguments
    ///
    /// * `factory` - Creates one session per (re)connect
    #[inline]
    #[must_use]
    pub fn transport(mut self, factory: impl TransportFactory) -> Self {
        self.transport = Some(Arc::new(factory));
        self
    }

    /// Sets a shared transport factory.
    #[inline]
    #[must_use]
    pub fn transport_arc(mut self, factory: Arc<dyn TransportFactory>) -> Self {
        self.transport = Some(factory);
        self
    }

    /// Builds the bus and starts connecting.
    ///
    /// A disabled bus gets no transport at all: it never connects and
    /// refuses (or buffers) every outbound action.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the options are invalid
    /// - [`Error::Config`] if called outside a Tokio runtime
    pub fn build(self) -> Result<EventBus> {
        self.options.validate()?;
        let runtime = Handle::try_current().map_err(|_| {
            Error::config(
                "EventBus must be built inside a Tokio runtime.\n\
                 Example: call EventBus::builder().build() from an async fn run by #[tokio::main]",
            )
        })?;

        let options = Arc::new(self.options);
        let adapter = if options.enabled {
            let factory = self
                .transport
                .unwrap_or_else(|| Arc::new(WebSocketTransport::new()) as Arc<dyn TransportFactory>);
            TransportAdapter::live(factory, Arc::clone(&options), runtime.clone())
        } else {
            debug!("Event bus disabled; no transport created");
            TransportAdapter::Absent
        };

        let service = ConnectionService::new(Arc::clone(&options), adapter.clone(), runtime);
        let bus = EventBus::from_service(service);

        if adapter.is_live() {
            info!(
                server_url = %options.server_url,
                path = %options.path,
                "Event bus connecting"
            );
        }
        adapter.connect();

        Ok(bus)
    }
}

// ============================================================================
// Tests
// ============================================================================
