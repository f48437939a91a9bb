//! Durable settings storage.
//!
//! Every piece of user configuration and sync state is a string value under
//! a named key. [`SettingsStore`] is the narrow interface the rest of the
//! system depends on; [`kv::Repository`] backs it with SQLite and
//! [`mock::MemorySettingsStore`] keeps everything in memory for tests.
//!
//! Typed access (URL lists, watermarks, the attempt log) lives in
//! [`crate::settings::Settings`], never in callers.

use std::{future::Future, pin::Pin, str::FromStr, sync::Arc};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

pub mod kv;
pub mod mock;

use crate::error::Result;

/// Boxed future returned by storage operations.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Key-value operations required by the settings facade.
pub trait SettingsStore: Send + Sync + 'static {
    /// Reads the value stored under `key`.
    fn get(&self, key: &str) -> BoxFuture<'_, Result<Option<String>>>;

    /// Stores `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: String) -> BoxFuture<'_, Result<()>>;

    /// Removes `key`. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> BoxFuture<'_, Result<()>>;

    /// Returns every stored key and value, ordered by key.
    fn entries(&self) -> BoxFuture<'_, Result<Vec<(String, String)>>>;
}

/// Container for repository instances sharing one connection pool.
#[derive(Clone)]
pub struct Storage {
    /// Repository for key-value settings.
    pub settings: Arc<kv::Repository>,
}

impl Storage {
    /// Creates a storage instance over an existing pool.
    pub fn new(pool: SqlitePool) -> Self {
        let pool = Arc::new(pool);
        Self { settings: Arc::new(kv::Repository::new(pool)) }
    }

    /// Opens (creating if needed) the database at `url` and ensures the
    /// schema exists.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Database` if the URL is invalid, the database
    /// cannot be opened or the schema cannot be created.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let storage = Self::new(pool);
        storage.migrate().await?;
        Ok(storage)
    }

    /// Creates all tables used by lifeline.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Database` if a statement fails.
    pub async fn migrate(&self) -> Result<()> {
        self.settings.ensure_schema().await
    }

    /// Verifies the database answers queries.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Database` if the connection is unhealthy.
    pub async fn health_check(&self) -> Result<()> {
        let _: (i64,) = sqlx::query_as("SELECT 1").fetch_one(&*self.settings.pool()).await?;
        Ok(())
    }

    /// Closes the underlying pool.
    pub async fn close(&self) {
        self.settings.pool().close().await;
    }
}
