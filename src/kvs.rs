use std::collections::BTreeMap;

use crate::error::{BayesError, Result};

/// Key/value storage keyed by UID, with a resettable cursor.
///
/// A pass (`reset` then `next` until `has_next` is false) yields every key
/// stored at `reset` time exactly once, in ascending key order.
pub trait KeyValueStore {
    type Value;

    fn set(&mut self, key: u64, value: Self::Value) -> Result<()>;
    fn get_value(&self, key: u64) -> Result<&Self::Value>;
    fn contains(&self, key: u64) -> bool;
    fn keys(&self) -> Vec<u64>;
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn reset(&mut self);
    fn has_next(&self) -> bool;
    fn next(&mut self) -> Result<(u64, Self::Value)>;
}

#[derive(Debug, Clone)]
pub struct MemStore<V> {
    data: BTreeMap<u64, V>,
    pass: Vec<u64>,
    cursor: usize,
}

impl<V> Default for MemStore<V> {
    fn default() -> Self {
        Self { data: BTreeMap::new(), pass: Vec::new(), cursor: 0 }
    }
}

// Equality is over the stored data only; cursor state is ignored.
impl<V: PartialEq> PartialEq for MemStore<V> {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}

impl<V> MemStore<V> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<V: Clone> KeyValueStore for MemStore<V> {
    type Value = V;

    fn set(&mut self, key: u64, value: V) -> Result<()> {
        self.data.insert(key, value);
        Ok(())
    }

    fn get_value(&self, key: u64) -> Result<&V> {
        self.data.get(&key).ok_or(BayesError::KeyNotFound(key))
    }

    fn contains(&self, key: u64) -> bool {
        self.data.contains_key(&key)
    }

    fn keys(&self) -> Vec<u64> {
        self.data.keys().copied().collect()
    }

    fn len(&self) -> usize {
        self.data.len()
    }

    fn reset(&mut self) {
        self.pass = self.keys();
        self.cursor = 0;
    }

    fn has_next(&self) -> bool {
        self.cursor < self.pass.len()
    }

    fn next(&mut self) -> Result<(u64, V)> {
        let key = *self.pass.get(self.cursor).ok_or(BayesError::IteratorExhausted)?;
        self.cursor += 1;
        let value = self.get_value(key)?.clone();
        Ok((key, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_overwrites_and_get_reads_back() {
        let mut kv = MemStore::new();
        kv.set(3, "c").unwrap();
        kv.set(3, "cc").unwrap();
        assert_eq!(*kv.get_value(3).unwrap(), "cc");
        assert_eq!(kv.len(), 1);
        assert!(matches!(kv.get_value(4), Err(BayesError::KeyNotFound(4))));
    }

    #[test]
    fn a_pass_yields_each_key_once_in_order() {
        let mut kv = MemStore::new();
        for k in [30u64, 10, 20] {
            kv.set(k, k * 2).unwrap();
        }

        kv.reset();
        let mut seen = Vec::new();
        while kv.has_next() {
            seen.push(kv.next().unwrap());
        }
        assert_eq!(seen, vec![(10, 20), (20, 40), (30, 60)]);
        assert!(matches!(kv.next(), Err(BayesError::IteratorExhausted)));

        // A second pass starts over.
        kv.reset();
        assert_eq!(kv.next().unwrap(), (10, 20));
    }

    #[test]
    fn iteration_does_not_affect_equality() {
        let mut a = MemStore::new();
        let mut b = MemStore::new();
        for k in [1u64, 2, 3] {
            a.set(k, k).unwrap();
            b.set(k, k).unwrap();
        }

        a.reset();
        a.next().unwrap();
        assert_eq!(a, b);

        b.set(4, 4).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn unreset_store_has_nothing_to_yield() {
        let mut kv: MemStore<u8> = MemStore::new();
        kv.set(1, 1).unwrap();
        assert!(!kv.has_next());
    }
}
