//! Vert.x event bus client - reconnect-transparent messaging.
//!
//! This library provides a stable client API over a Vert.x event bus bridge
//! that survives transport loss.
//!
//! # Architecture
//!
//! The client is layered:
//!
//! - **Façade ([`EventBus`])**: durable address → handler registry, replayed
//!   on every (re)connect
//! - **Connection service**: connection and login state, the outbound gate,
//!   buffering while disconnected
//! - **Transport adapter**: owns one transport session, replaces it on close
//! - **Transport session**: the wire connection ([`WebSocketTransport`] by
//!   default, any [`TransportFactory`] otherwise)
//!
//! Key design principles:
//!
//! - Subscriptions are logical; they outlive any single transport session
//! - Outbound actions are gated at call time: run now, buffer, or refuse
//! - Buffered actions flush in FIFO order after the next open
//! - Lifecycle changes are broadcast as [`Notification`]s
//!
//! # Quick Start
//!
//! ```no_run
//! use serde_json::json;
//! use vertx_eventbus::{EventBus, EventBusOptions, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let bus = EventBus::builder()
//!         .options(
//!             EventBusOptions::new()
//!                 .with_server_url("http://localhost:8080")
//!                 .with_buffer_capacity(32),
//!         )
//!         .build()?;
//!
//!     bus.on("news.headlines", |message| {
//!         println!("headline: {}", message.body);
//!     });
//!
//!     bus.login("alice", "secret").await?;
//!     let reply = bus.send("orders.lookup", json!({ "id": 7 })).await?;
//!     println!("order: {}", reply.body);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`bus`] | Façade, builder and options |
//! | [`collections`] | Bounded queue and association store |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`protocol`] | Messages, notifications, wire frames |
//! | [`service`] | Connection state machine and gate |
//! | [`transport`] | Transport traits, adapter, WebSocket transport |

// ============================================================================
// Modules
// ============================================================================

/// Event bus façade and configuration.
///
/// Use [`EventBus::builder()`] to create a configured bus.
pub mod bus;

/// Containers used by the connection service.
pub mod collections;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Protocol values: messages, notifications, ready states, wire frames.
pub mod protocol;

/// Connection state machine and outbound gate.
pub mod service;

/// Transport traits, session adapter and WebSocket transport.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Bus types
pub use bus::{EventBus, EventBusBuilder, EventBusOptions, HandlerRegistration};

// Error types
pub use error::{Error, Result};

// Protocol types
pub use protocol::{Message, Notification, NotificationKind, ReadyState};

// Transport types
pub use transport::{
    CancelReply, Handler, ReplyHandler, SessionHooks, TransportFactory, TransportSession,
    WebSocketTransport,
};
