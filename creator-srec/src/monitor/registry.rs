use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;

use parking_lot::Mutex;

/// Keyed set of live tasks or sessions guarded by an internal lock.
///
/// Used for the "currently polling" guard, the active chat sessions and the
/// active recordings. All operations are short critical sections; values are
/// cloned out by [`Registry::get`] and [`Registry::snapshot`] so no lock is
/// held across an await.
#[derive(Debug)]
pub struct Registry<K, V> {
    inner: Mutex<HashMap<K, V>>,
}

impl<K, V> Default for Registry<K, V> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, V> Registry<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `value` unless `key` is present. Returns whether it was inserted.
    pub fn add(&self, key: K, value: V) -> bool {
        let mut inner = self.inner.lock();
        if inner.contains_key(&key) {
            return false;
        }
        inner.insert(key, value);
        true
    }

    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.lock().remove(key)
    }

    /// Remove `key` only if `pred` holds for its current value.
    pub fn remove_if<Q>(&self, key: &Q, pred: impl FnOnce(&V) -> bool) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut inner = self.inner.lock();
        match inner.get(key) {
            Some(value) if pred(value) => inner.remove(key),
            _ => None,
        }
    }

    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.lock().contains_key(key)
    }

    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.lock().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn snapshot(&self) -> Vec<(K, V)> {
        self.inner
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Remove and return every entry.
    pub fn drain(&self) -> Vec<(K, V)> {
        self.inner.lock().drain().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_add_is_exclusive() {
        let registry = Registry::new();
        assert!(registry.add("a".to_string(), 1));
        assert!(!registry.add("a".to_string(), 2));
        assert_eq!(registry.get("a"), Some(1));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_if_checks_value() {
        let registry = Registry::new();
        registry.add("a".to_string(), 7u64);
        assert_eq!(registry.remove_if("a", |v| *v == 8), None);
        assert!(registry.contains("a"));
        assert_eq!(registry.remove_if("a", |v| *v == 7), Some(7));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_drain_and_snapshot() {
        let registry = Registry::new();
        registry.add(1, "x");
        registry.add(2, "y");
        let mut snapshot = registry.snapshot();
        snapshot.sort();
        assert_eq!(snapshot, vec![(1, "x"), (2, "y")]);
        assert_eq!(registry.drain().len(), 2);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_concurrent_add_single_winner() {
        let registry = Arc::new(Registry::new());
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let registry = registry.clone();
                std::thread::spawn(move || registry.add("creator".to_string(), i))
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}
