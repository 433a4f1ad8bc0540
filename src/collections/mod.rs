//! Small containers used by the connection service.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `bounded_queue` | Drop-oldest FIFO for buffered actions |
//! | `association` | Equality-keyed store for wrapped callbacks |

// ============================================================================
// Submodules
// ============================================================================

/// Equality-keyed association store.
pub mod association;

/// Fixed-capacity FIFO queue.
pub mod bounded_queue;

// ============================================================================
// Re-exports
// ============================================================================

pub use association::AssociationStore;
pub use bounded_queue::BoundedQueue;
