//! In-memory store for development and testing.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::DurableStore;
use crate::core::StoreError;

/// Process-local store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with `key = value`, handy for exercising hydration.
    pub fn with_value(key: impl Into<String>, value: impl Into<String>) -> Self {
        let store = Self::new();
        store.values.lock().insert(key.into(), value.into());
        store
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.values.lock().len()
    }

    /// True when nothing has been stored.
    pub fn is_empty(&self) -> bool {
        self.values.lock().is_empty()
    }
}

#[async_trait]
impl DurableStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.values.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.values.lock().insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}
