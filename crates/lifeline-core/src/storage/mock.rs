//! In-memory settings store for testing.
//!
//! Behaves like the SQLite repository and supports injecting a failure into
//! the next read or write to exercise storage error paths.

use std::{collections::BTreeMap, sync::Arc};

use tokio::sync::RwLock;

use super::{BoxFuture, SettingsStore};
use crate::error::{CoreError, Result};

/// Settings store backed by a `BTreeMap`.
#[derive(Clone, Default)]
pub struct MemorySettingsStore {
    values: Arc<RwLock<BTreeMap<String, String>>>,
    read_error: Arc<RwLock<Option<String>>>,
    write_error: Arc<RwLock<Option<String>>>,
}

impl MemorySettingsStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `get` fail with `error`.
    pub async fn inject_read_error(&self, error: impl Into<String>) {
        *self.read_error.write().await = Some(error.into());
    }

    /// Makes the next `set` or `remove` fail with `error`.
    pub async fn inject_write_error(&self, error: impl Into<String>) {
        *self.write_error.write().await = Some(error.into());
    }

    /// Returns a copy of the stored values.
    pub async fn snapshot(&self) -> BTreeMap<String, String> {
        self.values.read().await.clone()
    }

    async fn take_error(slot: &RwLock<Option<String>>) -> Result<()> {
        match slot.write().await.take() {
            Some(error) => Err(CoreError::Database(error)),
            None => Ok(()),
        }
    }
}

impl SettingsStore for MemorySettingsStore {
    fn get(&self, key: &str) -> BoxFuture<'_, Result<Option<String>>> {
        let key = key.to_owned();
        Box::pin(async move {
            Self::take_error(&self.read_error).await?;
            Ok(self.values.read().await.get(&key).cloned())
        })
    }

    fn set(&self, key: &str, value: String) -> BoxFuture<'_, Result<()>> {
        let key = key.to_owned();
        Box::pin(async move {
            Self::take_error(&self.write_error).await?;
            self.values.write().await.insert(key, value);
            Ok(())
        })
    }

    fn remove(&self, key: &str) -> BoxFuture<'_, Result<()>> {
        let key = key.to_owned();
        Box::pin(async move {
            Self::take_error(&self.write_error).await?;
            self.values.write().await.remove(&key);
            Ok(())
        })
    }

    fn entries(&self) -> BoxFuture<'_, Result<Vec<(String, String)>>> {
        Box::pin(async move {
            Ok(self.values.read().await.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stores_and_removes_values() {
        let store = MemorySettingsStore::new();

        store.set("health_webhook_urls", "https://a".into()).await.unwrap();
        assert_eq!(store.get("health_webhook_urls").await.unwrap().as_deref(), Some("https://a"));

        store.remove("health_webhook_urls").await.unwrap();
        assert_eq!(store.get("health_webhook_urls").await.unwrap(), None);
    }

    #[tokio::test]
    async fn injected_errors_fire_once() {
        let store = MemorySettingsStore::new();
        store.inject_write_error("disk full").await;

        assert!(store.set("k", "v".into()).await.is_err());
        assert!(store.set("k", "v".into()).await.is_ok());
    }
}
