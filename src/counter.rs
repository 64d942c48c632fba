//! Reference counting for shared interest keys.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;

/// A concurrent counted set.
///
/// Tracks how many independent parties hold a reference to the same key.
/// Entries are created on first [`add`](ReferenceCounter::add) and dropped
/// when the count returns to zero; counts never go negative.
#[derive(Debug, Default)]
pub struct ReferenceCounter<K> {
    counts: Mutex<HashMap<K, usize>>,
}

impl<K: Eq + Hash> ReferenceCounter<K> {
    /// Create an empty counter.
    pub fn new() -> Self {
        Self {
            counts: Mutex::new(HashMap::new()),
        }
    }

    /// Increment the count for `key`, returning the count after the add.
    ///
    /// A return value of 1 marks the first reference.
    pub fn add(&self, key: K) -> usize {
        let mut counts = self.counts.lock().expect("counter lock poisoned");
        let count = counts.entry(key).or_insert(0);
        *count += 1;
        *count
    }

    /// Decrement the count for `key`.
    ///
    /// Returns `Some(count_after)` when the key was present; reaching zero
    /// removes the entry, so `Some(0)` marks the last reference going away.
    /// Returns `None` when the key was absent: the remove is a no-op and the
    /// caller violated the add/remove pairing contract.
    pub fn remove(&self, key: &K) -> Option<usize> {
        let mut counts = self.counts.lock().expect("counter lock poisoned");
        let count = counts.get_mut(key)?;
        *count -= 1;
        let after = *count;
        if after == 0 {
            counts.remove(key);
        }
        Some(after)
    }

    /// Current count for `key`, 0 when absent.
    pub fn count(&self, key: &K) -> usize {
        let counts = self.counts.lock().expect("counter lock poisoned");
        counts.get(key).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_remove_track_counts() {
        let counter = ReferenceCounter::new();

        assert_eq!(counter.add("a"), 1);
        assert_eq!(counter.add("a"), 2);
        assert_eq!(counter.add("b"), 1);

        assert_eq!(counter.remove(&"a"), Some(1));
        assert_eq!(counter.remove(&"a"), Some(0));
        assert_eq!(counter.count(&"a"), 0);
        assert_eq!(counter.count(&"b"), 1);
    }

    #[test]
    fn remove_without_add_is_a_noop() {
        let counter: ReferenceCounter<&str> = ReferenceCounter::new();

        assert_eq!(counter.remove(&"ghost"), None);
        assert_eq!(counter.count(&"ghost"), 0);

        // A real reference afterwards still counts from 1.
        assert_eq!(counter.add("ghost"), 1);
    }

    #[test]
    fn entry_is_recreated_after_reaching_zero() {
        let counter = ReferenceCounter::new();
        counter.add("k");
        assert_eq!(counter.remove(&"k"), Some(0));
        assert_eq!(counter.add("k"), 1);
    }
}
