use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::{Result, StorageError};
use crate::store::LocalStore;

/// In-memory local store for tests and ephemeral sessions.
#[derive(Clone, Default)]
pub struct InMemoryLocalStore {
    entries: Arc<RwLock<HashMap<String, Value>>>,
    fail_on_set: Arc<AtomicBool>,
}

impl InMemoryLocalStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored keys.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Returns true if nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Returns true if a value is stored under `key`.
    pub async fn contains(&self, key: &str) -> bool {
        self.entries.read().await.contains_key(key)
    }

    /// Makes subsequent writes fail, as a full or read-only disk would.
    pub fn set_fail_on_set(&self, fail: bool) {
        self.fail_on_set.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_on_set.load(Ordering::SeqCst) {
            return Err(StorageError::Io(std::io::Error::other("write refused")));
        }
        Ok(())
    }
}

#[async_trait]
impl LocalStore for InMemoryLocalStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.check_writable()?;
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn set_many(&self, entries: Vec<(String, Value)>) -> Result<()> {
        self.check_writable()?;
        let mut store = self.entries.write().await;
        store.extend(entries);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.entries.write().await.clear();
        Ok(())
    }
}
