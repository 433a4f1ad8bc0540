//! Event bus client module.
//!
//! This module provides the application-facing entry point.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`EventBus`] | Reconnect-transparent client façade |
//! | [`EventBusBuilder`] | Fluent configuration builder |
//! | [`EventBusOptions`] | Immutable configuration value |
//! | [`HandlerRegistration`] | Handle to one subscription |

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder pattern for bus configuration.
pub mod builder;

/// Event bus façade and handler registry.
pub mod core;

/// Bus configuration and defaults.
pub mod options;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::EventBusBuilder;
pub use self::core::{DEFAULT_LOGIN_TIMEOUT, DEFAULT_SEND_TIMEOUT, EventBus, HandlerRegistration};
pub use options::EventBusOptions;
