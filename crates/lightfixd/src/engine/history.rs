use std::collections::BTreeMap;

use tokio::time::Instant;

/// Default number of snapshots retained per device.
pub const DEFAULT_HISTORY_SIZE: usize = 50;

/// Time-indexed history of a device's state.
///
/// Entries are keyed by the instant they were observed. Lookups answer "what
/// was the state at time `t`" by returning the latest entry at or before `t`.
/// The history is bounded: once it holds more than `capacity` entries the
/// oldest one is evicted.
#[derive(Debug, Clone)]
pub struct History<T> {
    entries: BTreeMap<Instant, T>,
    capacity: usize,
}

impl<T> History<T> {
    /// Create an empty history retaining at most `capacity` entries.
    ///
    /// A capacity of zero is treated as one so the latest state is always
    /// available.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Record `value` as the state from `at` onwards.
    ///
    /// `at` must not precede any stored key. Inserting at an existing key
    /// replaces that entry.
    pub fn insert(&mut self, at: Instant, value: T) {
        debug_assert!(
            self.entries.keys().next_back().is_none_or(|last| *last <= at),
            "history insert out of order"
        );

        self.entries.insert(at, value);
        if self.entries.len() > self.capacity {
            self.entries.pop_first();
        }
    }

    /// The entry in effect at `at`: the one with the greatest key `<= at`.
    ///
    /// Returns `None` if the history is empty or `at` precedes every entry.
    pub fn floor(&self, at: Instant) -> Option<&T> {
        self.floor_entry(at).map(|(_, v)| v)
    }

    /// Like [`History::floor`], also returning the entry's key.
    pub fn floor_entry(&self, at: Instant) -> Option<(Instant, &T)> {
        self.entries.range(..=at).next_back().map(|(k, v)| (*k, v))
    }

    /// The most recently inserted entry.
    pub fn latest(&self) -> Option<&T> {
        self.entries.values().next_back()
    }

    /// Iterate over `(instant, value)` pairs at or before `until`, newest
    /// first.
    pub fn iter_desc(&self, until: Instant) -> impl Iterator<Item = (Instant, &T)> + '_ {
        self.entries.range(..=until).rev().map(|(at, v)| (*at, v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T> Default for History<T> {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_SIZE)
    }
}
