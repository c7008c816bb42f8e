use std::collections::HashMap;

use crate::error::{BayesError, Result};
use crate::hasher;
use crate::kvs::{KeyValueStore, MemStore};
use crate::model::{Item, Value};

/// Mapping from class UID back to the raw value it was derived from.
pub trait ClassMap {
    /// Registers values; already-known values are skipped. A different
    /// value under an existing UID is a `DuplicateClass` error, and then
    /// nothing from `items` is registered.
    fn add_any(&mut self, items: &[Value]) -> Result<()>;
    /// Class ID of a registered value.
    fn get_class_id(&self, item: &Value) -> Result<u64>;
    /// Registered class IDs, ascending.
    fn get_keys(&self) -> Vec<u64>;
    fn get_class(&self, class_id: u64) -> Option<&Value>;
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn items(&self) -> Vec<Item> {
        self.get_keys()
        .into_iter()
        .filter_map(|uid| self.get_class(uid).map(|v| Item { value: Some(v.clone()), uid }))
        .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemClassMap {
    store: MemStore<Value>,
}

impl MemClassMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a value under an explicit UID. Used by `add_any` and when
    /// hydrating from a dump.
    pub fn insert(&mut self, uid: u64, value: Value) -> Result<()> {
        if let Ok(existing) = self.store.get_value(uid) {
            if existing.same_as(&value) {
                return Ok(());
            }
            return Err(duplicate(uid, existing, &value));
        }

        self.store.set(uid, value)
    }
}

fn duplicate(class_id: u64, existing: &Value, incoming: &Value) -> BayesError {
    BayesError::DuplicateClass {
        class_id,
        existing: format!("{:?}", existing),
        incoming: format!("{:?}", incoming),
    }
}

impl ClassMap for MemClassMap {
    fn add_any(&mut self, items: &[Value]) -> Result<()> {
        let mut staged: HashMap<u64, &Value> = HashMap::new();
        for value in items {
            let uid = hasher::to_uid(value);
            let known = self.store.get_value(uid).ok().or_else(|| staged.get(&uid).copied());
            match known {
                Some(existing) if existing.same_as(value) => {}
                Some(existing) => return Err(duplicate(uid, existing, value)),
                None => {
                    staged.insert(uid, value);
                }
            }
        }

        for (uid, value) in staged {
            self.store.set(uid, value.clone())?;
        }
        Ok(())
    }

    fn get_class_id(&self, item: &Value) -> Result<u64> {
        let uid = hasher::to_uid(item);
        if !self.store.contains(uid) {
            return Err(BayesError::ClassNotFound(format!("{:?}", item)));
        }
        Ok(uid)
    }

    fn get_keys(&self) -> Vec<u64> {
        self.store.keys()
    }

    fn get_class(&self, class_id: u64) -> Option<&Value> {
        self.store.get_value(class_id).ok()
    }

    fn len(&self) -> usize {
        self.store.len()
    }
}
