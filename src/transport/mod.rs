//! Transport layer.
//!
//! The bus talks to the network through two traits: a [`TransportFactory`]
//! creates sessions, a [`TransportSession`] is one live connection. The
//! [`TransportAdapter`] owns the current session and replaces it on every
//! reconnect.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐   connect()   ┌──────────────────┐   frames   ┌─────────┐
//! │ TransportAdapter │──────────────►│ TransportSession │◄──────────►│ Bridge  │
//! │ (Live / Absent)  │◄── on_open ───│ (WebSocket, ...) │            │         │
//! │                  │◄── on_close ──│                  │            │         │
//! └──────────────────┘               └──────────────────┘            └─────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `session` | Transport traits, `Handler` and hook types |
//! | `adapter` | Session ownership and reconnect cycling |
//! | `websocket` | Default WebSocket transport |

// ============================================================================
// Submodules
// ============================================================================

/// Session ownership and reconnect cycling.
pub mod adapter;

/// Transport traits and callback types.
pub mod session;

/// WebSocket transport for the event bus bridge.
pub mod websocket;

// ============================================================================
// Re-exports
// ============================================================================

pub use adapter::{LiveAdapter, TransportAdapter};
pub use session::{
    CancelReply, Handler, Hook, ReplyHandler, SessionHooks, TransportFactory, TransportSession,
};
pub use websocket::{LOGIN_ADDRESS, WebSocketSession, WebSocketTransport};
