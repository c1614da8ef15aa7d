//! Bounded cache with insertion-order eviction.
//!
//! Rooms keep their recent messages here so that edit, delete and star
//! events can be correlated with the message they refer to.
//!
//! Eviction is FIFO by first insertion: updating an existing key keeps its
//! position. Removing a key leaves a stale entry in the order sequence, which
//! is skipped and compacted away on the next eviction.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::hash::Hash;

use rustc_hash::FxHashMap;

// ============================================================================
// Constants
// ============================================================================

/// Default capacity of a room's message cache.
pub const DEFAULT_CACHE_LIMIT: usize = 10_000;

// ============================================================================
// BoundedCache
// ============================================================================

/// Fixed-capacity mapping that evicts the oldest inserted key.
#[derive(Debug, Clone)]
pub struct BoundedCache<K, V> {
    /// Maximum number of live entries.
    max: usize,
    /// Keys in first-insertion order (may contain removed keys).
    order: VecDeque<K>,
    /// Live entries.
    store: FxHashMap<K, V>,
}

impl<K, V> Default for BoundedCache<K, V>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_LIMIT)
    }
}

impl<K, V> BoundedCache<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Creates an empty cache holding at most `max` entries.
    #[must_use]
    pub fn new(max: usize) -> Self {
        Self {
            max,
            order: VecDeque::new(),
            store: FxHashMap::default(),
        }
    }

    /// Returns the capacity.
    #[inline]
    #[must_use]
    pub fn max(&self) -> usize {
        self.max
    }

    /// Changes the capacity, evicting the oldest entries if needed.
    pub fn set_max(&mut self, max: usize) {
        self.max = max;
        self.evict();
    }

    /// Returns the number of live entries.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Returns `true` if the cache holds no entries.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Inserts or updates an entry.
    ///
    /// A new key is appended to the eviction order; an existing key keeps
    /// its position.
    pub fn set(&mut self, key: K, value: V) {
        if self.store.insert(key.clone(), value).is_none() {
            self.order.push_back(key);
            self.evict();
        }
    }

    /// Returns the entry for `key`.
    #[inline]
    #[must_use]
    pub fn get(&self, key: &K) -> Option<&V> {
        self.store.get(key)
    }

    /// Returns `true` if `key` is present.
    #[inline]
    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.store.contains_key(key)
    }

    /// Removes and returns the entry for `key`.
    pub fn delete(&mut self, key: &K) -> Option<V> {
        self.store.remove(key)
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.order.clear();
        self.store.clear();
    }

    /// Drops the oldest live keys until the cache fits its capacity.
    fn evict(&mut self) {
        if self.store.len() <= self.max {
            return;
        }

        while self.store.len() > self.max {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.store.remove(&oldest);
                }
                None => break,
            }
        }

        let store = &self.store;
        self.order.retain(|key| store.contains_key(key));
    }
}

// ============================================================================
// Tests
// ============================================================================
