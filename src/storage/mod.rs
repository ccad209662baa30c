//! Local persistent key-value storage.
//!
//! The chat client persists everything as JSON-encoded strings under a small
//! set of well-known keys. Absence of a key always means "use defaults".

pub mod memory;
pub mod sqlite;

pub use memory::MemoryKeyValueStore;
pub use sqlite::SqliteKeyValueStore;

use std::future::Future;
use std::pin::Pin;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Key holding the serialized settings record.
pub const SETTINGS_KEY: &str = "chatSettings";
/// Key holding the serialized chat mapping.
pub const CHATS_KEY: &str = "chats";
/// Key holding the active chat id.
pub const CURRENT_CHAT_KEY: &str = "currentChatId";
/// Key receiving an unreadable chat mapping before it is replaced.
pub const CHATS_BACKUP_KEY: &str = "chats.corrupt";

/// Boxed future type for store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Storage error type.
#[derive(Debug, Error)]
pub enum StorageError {
    /// `SQLite` storage error (async).
    #[error("tokio-rusqlite error: {0}")]
    TokioSqlite(#[from] tokio_rusqlite::Error),
    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// String key-value storage.
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn get(&self, key: &str) -> StoreFuture<'_, StorageResult<Option<String>>>;

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn set(&self, key: &str, value: String) -> StoreFuture<'_, StorageResult<()>>;

    /// Remove `key` if present.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn remove(&self, key: &str) -> StoreFuture<'_, StorageResult<()>>;
}

/// Read and decode a JSON value.
///
/// # Errors
/// Returns an error if storage access fails or the stored JSON is malformed.
pub async fn get_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> StorageResult<Option<T>> {
    match store.get(key).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Encode and store a JSON value.
///
/// # Errors
/// Returns an error if encoding or storage access fails.
pub async fn set_json<T: Serialize + Sync>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> StorageResult<()> {
    let raw = serde_json::to_string(value)?;
    store.set(key, raw).await
}
