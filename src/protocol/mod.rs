//! Event bus protocol types.
//!
//! This module defines the values exchanged between the client and the
//! Vert.x event bus bridge, plus the notifications the client emits.
//!
//! # Protocol Overview
//!
//! | Frame | Direction | Purpose |
//! |-------|-----------|---------|
//! | `send` | Client → Bridge | Point-to-point message, optional reply address |
//! | `publish` | Client → Bridge | Broadcast message |
//! | `register` / `unregister` | Client → Bridge | Handler subscription |
//! | `ping` | Client → Bridge | Keep-alive |
//! | `message` | Bridge → Client | Delivery or reply |
//! | `err` | Bridge → Client | Failure reply |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `frame` | Wire frames (JSON, `type`-tagged) |
//! | `message` | Delivered messages |
//! | `notification` | Lifecycle notifications |
//! | `state` | Transport readiness codes |

// ============================================================================
// Submodules
// ============================================================================

/// Wire frames.
pub mod frame;

/// Delivered messages.
pub mod message;

/// Lifecycle notifications.
pub mod notification;

/// Transport readiness codes.
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use frame::{InboundFrame, OutboundFrame};
pub use message::Message;
pub use notification::{Notification, NotificationKind};
pub use state::ReadyState;
