//! Thread-safe map containers shared across task workers

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// A string-keyed map with read-write locking
pub struct ConcurrentMap<T> {
    data: RwLock<HashMap<String, T>>,
}

impl<T> Default for ConcurrentMap<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ConcurrentMap<T> {
    pub fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
        }
    }

    pub fn put(&self, key: String, val: T) {
        self.data
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, val);
    }

    /// True when every key is present
    pub fn contains_all<I, S>(&self, keys: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        keys.into_iter().all(|key| data.contains_key(key.as_ref()))
    }

    pub fn keys(&self) -> Vec<String> {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone> ConcurrentMap<T> {
    pub fn get(&self, key: &str) -> Option<T> {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }
}

impl ConcurrentMap<()> {
    /// Load keys from the persisted hash-set shape, a JSON object whose
    /// values are empty objects: `{"<hex>": {}, ...}`
    pub fn load_hash_set(&self, bytes: &[u8]) -> Result<(), serde_json::Error> {
        let parsed: HashMap<String, serde_json::Value> = serde_json::from_slice(bytes)?;
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        for key in parsed.into_keys() {
            data.insert(key, ());
        }
        Ok(())
    }
}

impl ConcurrentMap<Vec<String>> {
    /// Append items to the list stored under `key`, creating it first if
    /// necessary
    pub fn append(&self, key: &str, items: &[String]) {
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        data.entry(key.to_string())
            .or_default()
            .extend(items.iter().cloned());
    }
}

/// A map from string keys to inner [`ConcurrentMap`]s
pub struct NestedConcurrentMap<T> {
    data: Mutex<HashMap<String, Arc<ConcurrentMap<T>>>>,
}

impl<T> Default for NestedConcurrentMap<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> NestedConcurrentMap<T> {
    pub fn new() -> Self {
        Self {
            data: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<Arc<ConcurrentMap<T>>> {
        self.data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Atomically return the inner map for `key`, installing a fresh
    /// empty one when absent
    pub fn get_or_insert(&self, key: &str) -> Arc<ConcurrentMap<T>> {
        self.data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(ConcurrentMap::new()))
            .clone()
    }

    pub fn is_empty(&self) -> bool {
        self.data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    /// Key-level snapshot: outer key to the inner map's keys.
    ///
    /// Only meaningful once all writers have quiesced; callers use it
    /// after the task graph has drained.
    pub fn snapshot_keys(&self) -> HashMap<String, Vec<String>> {
        let data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        data.iter()
            .map(|(key, inner)| (key.clone(), inner.keys()))
            .collect()
    }
}
