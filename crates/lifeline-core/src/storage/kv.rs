//! SQLite repository for key-value settings.

use std::sync::Arc;

use chrono::Utc;
use sqlx::SqlitePool;

use super::{BoxFuture, SettingsStore};
use crate::error::Result;

/// Repository over the `settings` table.
pub struct Repository {
    pool: Arc<SqlitePool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<SqlitePool>) -> Self {
        Self { pool }
    }

    /// Returns a reference to the database pool.
    pub fn pool(&self) -> Arc<SqlitePool> {
        self.pool.clone()
    }

    /// Creates the `settings` table if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns error if the statement fails.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY NOT NULL,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            ",
        )
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    /// Finds the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find(&self, key: &str) -> Result<Option<String>> {
        let value = sqlx::query_scalar::<_, String>("SELECT value FROM settings WHERE key = ?1")
            .bind(key)
            .fetch_optional(&*self.pool)
            .await?;

        Ok(value)
    }

    /// Inserts or replaces the value under `key`.
    ///
    /// # Errors
    ///
    /// Returns error if the upsert fails.
    pub async fn upsert(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO settings (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            ",
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now())
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    /// Deletes `key` if present.
    ///
    /// # Errors
    ///
    /// Returns error if the delete fails.
    pub async fn delete(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM settings WHERE key = ?1").bind(key).execute(&*self.pool).await?;
        Ok(())
    }

    /// Lists every key and value ordered by key.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn list(&self) -> Result<Vec<(String, String)>> {
        let rows = sqlx::query_as::<_, (String, String)>(
            "SELECT key, value FROM settings ORDER BY key",
        )
        .fetch_all(&*self.pool)
        .await?;

        Ok(rows)
    }
}

impl SettingsStore for Repository {
    fn get(&self, key: &str) -> BoxFuture<'_, Result<Option<String>>> {
        let key = key.to_owned();
        Box::pin(async move { self.find(&key).await })
    }

    fn set(&self, key: &str, value: String) -> BoxFuture<'_, Result<()>> {
        let key = key.to_owned();
        Box::pin(async move { self.upsert(&key, &value).await })
    }

    fn remove(&self, key: &str) -> BoxFuture<'_, Result<()>> {
        let key = key.to_owned();
        Box::pin(async move { self.delete(&key).await })
    }

    fn entries(&self) -> BoxFuture<'_, Result<Vec<(String, String)>>> {
        Box::pin(self.list())
    }
}
