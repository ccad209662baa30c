//! SQLite-backed key-value store.

use std::path::Path;
use std::sync::Arc;

use rusqlite::OptionalExtension;
use tokio_rusqlite::Connection;

use super::{KeyValueStore, StorageResult, StoreFuture};

/// `SQLite` implementation of the local key-value storage.
pub struct SqliteKeyValueStore {
    conn: Arc<Connection>,
    table: String,
}

impl SqliteKeyValueStore {
    /// Table name for key-value pairs.
    pub const DEFAULT_TABLE: &'static str = "kv_store";

    /// Open (or create) the database file at `path`.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or initialized.
    pub async fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let conn = Connection::open(path.as_ref()).await?;
        Self::new(Arc::new(conn)).await
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    /// Returns an error if the database cannot be initialized.
    pub async fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::new(Arc::new(conn)).await
    }

    /// Initialize the store and create the table if it doesn't exist.
    ///
    /// # Errors
    /// Returns an error if database operations fail.
    pub async fn new(conn: Arc<Connection>) -> StorageResult<Self> {
        let table = Self::DEFAULT_TABLE.to_string();
        let table_name = table.clone();

        conn.call(move |conn| {
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {table_name} (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL,
                    updated_at INTEGER NOT NULL
                );"
            ))?;
            Ok(())
        })
        .await?;

        Ok(Self { conn, table })
    }
}

impl KeyValueStore for SqliteKeyValueStore {
    fn get(&self, key: &str) -> StoreFuture<'_, StorageResult<Option<String>>> {
        let key = key.to_string();
        Box::pin(async move {
            let table = self.table.clone();
            let value = self
                .conn
                .call(move |conn| {
                    let value = conn
                        .query_row(
                            &format!("SELECT value FROM {table} WHERE key = ?1"),
                            rusqlite::params![key],
                            |row| row.get::<_, String>(0),
                        )
                        .optional()?;
                    Ok(value)
                })
                .await?;
            Ok(value)
        })
    }

    fn set(&self, key: &str, value: String) -> StoreFuture<'_, StorageResult<()>> {
        let key = key.to_string();
        Box::pin(async move {
            let table = self.table.clone();
            let now_ms = chrono::Utc::now().timestamp_millis();
            self.conn
                .call(move |conn| {
                    conn.execute(
                        &format!(
                            "INSERT INTO {table} (key, value, updated_at)
                             VALUES (?1, ?2, ?3)
                             ON CONFLICT(key) DO UPDATE
                             SET value = excluded.value, updated_at = excluded.updated_at"
                        ),
                        rusqlite::params![key, value, now_ms],
                    )?;
                    Ok(())
                })
                .await?;
            Ok(())
        })
    }

    fn remove(&self, key: &str) -> StoreFuture<'_, StorageResult<()>> {
        let key = key.to_string();
        Box::pin(async move {
            let table = self.table.clone();
            self.conn
                .call(move |conn| {
                    conn.execute(
                        &format!("DELETE FROM {table} WHERE key = ?1"),
                        rusqlite::params![key],
                    )?;
                    Ok(())
                })
                .await?;
            Ok(())
        })
    }
}
