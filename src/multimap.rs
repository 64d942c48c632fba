//! Ordered string-keyed multimap with snapshot reads.

use std::collections::HashMap;
use std::sync::RwLock;

/// A concurrent multimap from filter strings to ordered value sequences.
///
/// Values append in insertion order and may repeat; callers that need
/// identity dedup do it themselves. Reads return cloned snapshots, so
/// iteration never observes a partially-applied mutation and holds no lock.
#[derive(Debug, Default)]
pub struct MultiMap<V> {
    inner: RwLock<HashMap<String, Vec<V>>>,
}

impl<V> MultiMap<V> {
    /// Create an empty multimap.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Append `value` to the sequence for `key`.
    pub fn put(&self, key: &str, value: V) {
        let mut inner = self.inner.write().expect("multimap lock poisoned");
        inner.entry(key.to_string()).or_default().push(value);
    }

    /// Remove the first occurrence equal to `value` under `key`.
    ///
    /// Returns whether a value was removed. Keys left without values are
    /// dropped. Removing from an absent key is a no-op.
    pub fn remove(&self, key: &str, value: &V) -> bool
    where
        V: PartialEq,
    {
        let mut inner = self.inner.write().expect("multimap lock poisoned");
        let Some(values) = inner.get_mut(key) else {
            return false;
        };
        let Some(pos) = values.iter().position(|v| v == value) else {
            return false;
        };
        values.remove(pos);
        if values.is_empty() {
            inner.remove(key);
        }
        true
    }

    /// Snapshot of the sequence for `key`, empty when absent.
    pub fn get(&self, key: &str) -> Vec<V>
    where
        V: Clone,
    {
        let inner = self.inner.read().expect("multimap lock poisoned");
        inner.get(key).cloned().unwrap_or_default()
    }

    /// Snapshot of the keys currently holding at least one value.
    pub fn keys(&self) -> Vec<String> {
        let inner = self.inner.read().expect("multimap lock poisoned");
        inner.keys().cloned().collect()
    }

    /// Whether no key holds a value.
    pub fn is_empty(&self) -> bool {
        let inner = self.inner.read().expect("multimap lock poisoned");
        inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_preserves_insertion_order() {
        let map = MultiMap::new();
        map.put("f", 1);
        map.put("f", 2);
        map.put("f", 1);

        assert_eq!(map.get("f"), vec![1, 2, 1]);
        assert_eq!(map.get("absent"), Vec::<i32>::new());
    }

    #[test]
    fn remove_takes_first_occurrence_only() {
        let map = MultiMap::new();
        map.put("f", 1);
        map.put("f", 2);
        map.put("f", 1);

        assert!(map.remove("f", &1));
        assert_eq!(map.get("f"), vec![2, 1]);

        assert!(!map.remove("f", &7));
        assert!(!map.remove("g", &1));
    }

    #[test]
    fn empty_keys_are_dropped() {
        let map = MultiMap::new();
        map.put("f", "x");
        assert_eq!(map.keys(), vec!["f".to_string()]);

        assert!(map.remove("f", &"x"));
        assert!(map.keys().is_empty());
        assert!(map.is_empty());
    }

    #[test]
    fn get_returns_a_snapshot() {
        let map = MultiMap::new();
        map.put("f", 1);
        let snapshot = map.get("f");
        map.put("f", 2);

        assert_eq!(snapshot, vec![1]);
        assert_eq!(map.get("f"), vec![1, 2]);
    }
}
