//! Connection service.
//!
//! Tracks connection and login state on top of the transport adapter and
//! gates outbound traffic. See [`ConnectionService`].

// ============================================================================
// Submodules
// ============================================================================

/// Connection state machine and outbound gate.
pub mod connection;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{Action, ConnectionObserver, ConnectionService};
