//! Process-wide shared state.
//!
//! A typed registry keyed by well-known names. The host creates one per
//! process and hands a clone to every scope that supports it.

use std::any::Any;
use std::sync::Arc;

use dashmap::DashMap;

type Entry = Arc<dyn Any + Send + Sync>;

#[derive(Clone, Default)]
pub struct SharedState {
    entries: Arc<DashMap<String, Entry>>,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `value` under `key`, returning whatever was stored there before.
    pub fn insert<T>(&self, key: &str, value: Arc<T>) -> Option<Entry>
    where
        T: Any + Send + Sync,
    {
        self.entries.insert(key.to_string(), value)
    }

    /// Look up `key`, returning `None` if absent or of a different type.
    pub fn get<T>(&self, key: &str) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        self.entries
            .get(key)
            .and_then(|entry| entry.value().clone().downcast::<T>().ok())
    }

    /// Remove `key` if it holds a `T`.
    pub fn remove<T>(&self, key: &str) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        self.entries
            .remove_if(key, |_, entry| entry.is::<T>())
            .and_then(|(_, entry)| entry.downcast::<T>().ok())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for SharedState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        f.debug_struct("SharedState").field("keys", &keys).finish()
    }
}
