//! Fixed-capacity FIFO queue with drop-oldest eviction.
//!
//! Used to hold outbound actions while the transport is not open.
//! Overflow is silent: the oldest entries are discarded.
//!
//! # Example
//!
//! ```
//! use vertx_eventbus::collections::BoundedQueue;
//!
//! let mut queue = BoundedQueue::new(2);
//! queue.push('A');
//! queue.push('B');
//! queue.push('C');
//!
//! assert_eq!(queue.take_oldest(), Some('B'));
//! assert_eq!(queue.len(), 1);
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;

use tracing::trace;

// ============================================================================
// BoundedQueue
// ============================================================================

/// FIFO queue that never holds more than `capacity` items.
///
/// A capacity of `0` evicts every pushed item immediately.
#[derive(Debug, Clone)]
pub struct BoundedQueue<T> {
    /// Maximum number of retained items.
    capacity: usize,
    /// Queued items, oldest at the front.
    items: VecDeque<T>,
}

impl<T> BoundedQueue<T> {
    /// Creates an empty queue with the given capacity.
    #[inline]
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            items: VecDeque::with_capacity(capacity.min(64)),
        }
    }

    /// Appends an item, evicting from the front until the size fits.
    ///
    /// Returns the number of evicted items.
    pub fn push(&mut self, item: T) -> usize {
        self.items.push_back(item);

        let mut evicted = 0;
        while self.items.len() > self.capacity {
            self.items.pop_front();
            evicted += 1;
        }

        if evicted > 0 {
            trace!(evicted, capacity = self.capacity, "Queue overflow");
        }

        evicted
    }

    /// Removes and returns the oldest item.
    #[inline]
    pub fn take_oldest(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    /// Removes and returns the newest item.
    #[inline]
    pub fn take_newest(&mut self) -> Option<T> {
        self.items.pop_back()
    }

    /// Removes every item, oldest first.
    pub fn drain(&mut self) -> Vec<T> {
        self.items.drain(..).collect()
    }

    /// Returns the number of queued items.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if nothing is queued.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns the configured capacity.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterates over queued items, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    #[test]
    fn test_push_within_capacity() {
        let mut queue = BoundedQueue::new(3);
        assert_eq!(queue.push(1), 0);
        assert_eq!(queue.push(2), 0);
        assert_eq!(queue.len(), 2);
        assert!(!queue.is_empty());
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let mut queue = BoundedQueue::new(2);
        queue.push("A");
        queue.push("B");
        assert_eq!(queue.push("C"), 1);

        assert_eq!(queue.iter().copied().collect::<Vec<_>>(), vec!["B", "C"]);
        assert_eq!(queue.take_oldest(), Some("B"));
        assert_eq!(queue.iter().copied().collect::<Vec<_>>(), vec!["C"]);
    }

    #[test]
    fn test_zero_capacity_evicts_everything() {
        let mut queue = BoundedQueue::new(0);
        assert_eq!(queue.push(42), 1);
        assert!(queue.is_empty());
        assert_eq!(queue.take_oldest(), None);
    }

    #[test]
    fn test_take_newest() {
        let mut queue = BoundedQueue::new(5);
        queue.push(1);
        queue.push(2);
        queue.push(3);
        assert_eq!(queue.take_newest(), Some(3));
        assert_eq!(queue.take_oldest(), Some(1));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_drain_is_fifo_and_empties() {
        let mut queue = BoundedQueue::new(4);
        for i in 0..4 {
            queue.push(i);
        }
        assert_eq!(queue.drain(), vec![0, 1, 2, 3]);
        assert!(queue.is_empty());
        assert_eq!(queue.capacity(), 4);
    }

    proptest! {
        #[test]
        fn prop_keeps_most_recent_in_order(
            capacity in 0usize..8,
            pushes in proptest::collection::vec(any::<u16>(), 0..40),
        ) {
            let mut queue = BoundedQueue::new(capacity);
            for (i, value) in pushes.iter().enumerate() {
                queue.push(*value);

                let seen = &pushes[..=i];
                let expected: Vec<u16> = seen[seen.len().saturating_sub(capacity)..].to_vec();
                prop_assert!(queue.len() <= capacity);
                prop_assert_eq!(queue.iter().copied().collect::<Vec<_>>(), expected);
            }
        }
    }
}
