//! Equality-keyed association store.
//!
//! Maps keys that cannot be hashed (callbacks compared by identity) to
//! values using a linear scan. Removal tombstones the slot; [`compact`]
//! reclaims tombstones when needed.
//!
//! The store stays small: one entry per distinct registered callback.
//!
//! [`compact`]: AssociationStore::compact

// ============================================================================
// AssociationStore
// ============================================================================

/// Key/value store compared with `PartialEq` instead of hashing.
#[derive(Debug, Clone)]
pub struct AssociationStore<K, V> {
    /// Slots; `None` marks a removed entry.
    slots: Vec<Option<(K, V)>>,
}

impl<K, V> Default for AssociationStore<K, V> {
    fn default() -> Self {
        Self { slots: Vec::new() }
    }
}

impl<K: PartialEq, V> AssociationStore<K, V> {
    /// Creates an empty store.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `key`, replacing any existing value.
    ///
    /// Returns the previous value, if any.
    pub fn put(&mut self, key: K, value: V) -> Option<V> {
        match self.index_of(&key) {
            Some(idx) => self.slots[idx]
                .as_mut()
                .map(|(_, slot)| std::mem::replace(slot, value)),
            None => {
                self.slots.push(Some((key, value)));
                None
            }
        }
    }

    /// Returns the value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<&V> {
        self.index_of(key)
            .and_then(|idx| self.slots[idx].as_ref())
            .map(|(_, value)| value)
    }

    /// Returns `true` if `key` is present.
    #[inline]
    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        self.index_of(key).is_some()
    }

    /// Removes `key`, returning its value.
    ///
    /// The slot is tombstoned, not reclaimed.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let idx = self.index_of(key)?;
        self.slots[idx].take().map(|(_, value)| value)
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Drops tombstoned slots.
    pub fn compact(&mut self) {
        self.slots.retain(Option::is_some);
    }

    /// Returns the number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Returns `true` if there are no live entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    fn index_of(&self, key: &K) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| matches!(slot, Some((k, _)) if k == key))
    }
}

impl<K: PartialEq, V: PartialEq> AssociationStore<K, V> {
    /// Returns `true` if any live entry holds `value`.
    #[must_use]
    pub fn contains_value(&self, value: &V) -> bool {
        self.slots
            .iter()
            .any(|slot| matches!(slot, Some((_, v)) if v == value))
    }
}

// ============================================================================
// Tests
// ============================================================================
