use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::Result;
use crate::store::LocalStore;

/// Local store persisted as a single JSON document on disk.
///
/// Every mutation rewrites the document through a temporary file and a
/// rename, so a crash mid-write leaves the previous document intact.
#[derive(Clone)]
pub struct FileLocalStore {
    path: PathBuf,
    entries: Arc<Mutex<HashMap<String, Value>>>,
}

impl FileLocalStore {
    /// Opens the store at `path`, loading any existing document.
    ///
    /// A missing file starts an empty store. A document that cannot be
    /// parsed is discarded with a warning.
    #[tracing::instrument]
    pub async fn open(path: impl AsRef<Path> + std::fmt::Debug) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<HashMap<String, Value>>(&bytes) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "discarding corrupt local state");
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };

        tracing::debug!(path = %path.display(), keys = entries.len(), "local state loaded");

        Ok(Self {
            path,
            entries: Arc::new(Mutex::new(entries)),
        })
    }

    /// Returns the path of the backing document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, entries: &HashMap<String, Value>) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(entries)?;
        let tmp = self.path.with_extension("tmp");
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// Applies `mutate` to a copy of the entries, persists the copy, and only
    /// then makes it visible.
    async fn update<F>(&self, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut HashMap<String, Value>) + Send,
    {
        let mut entries = self.entries.lock().await;
        let mut next = entries.clone();
        mutate(&mut next);
        self.persist(&next).await?;
        *entries = next;
        Ok(())
    }
}

#[async_trait]
impl LocalStore for FileLocalStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let key = key.to_string();
        self.update(move |entries| {
            entries.insert(key, value);
        })
        .await
    }

    async fn set_many(&self, new_entries: Vec<(String, Value)>) -> Result<()> {
        self.update(move |entries| entries.extend(new_entries)).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        if !self.entries.lock().await.contains_key(key) {
            return Ok(());
        }
        let key = key.to_string();
        self.update(move |entries| {
            entries.remove(&key);
        })
        .await
    }

    async fn clear(&self) -> Result<()> {
        self.update(|entries| entries.clear()).await
    }
}
