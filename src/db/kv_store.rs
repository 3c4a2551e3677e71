//! Durable key-value persistence
//!
//! The session store only needs a tiny slice of persistence: read, write and
//! remove one record by name. Two implementations are provided, one backed by
//! SQLite and one held in memory.

use crate::core::error::Result;
use crate::db::manager::DatabaseManager;
use async_trait::async_trait;
use rusqlite::{params, OptionalExtension};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Minimal durable key-value medium
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a record; `None` means the key is absent
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Insert or overwrite a record
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a record, returning whether it existed
    async fn remove(&self, key: &str) -> Result<bool>;
}

/// Key-value store persisted in the `kv_store` table
#[derive(Clone)]
pub struct SqliteKeyValueStore {
    db: DatabaseManager,
}

impl SqliteKeyValueStore {
    pub fn new(db: DatabaseManager) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &DatabaseManager {
        &self.db
    }
}

#[async_trait]
impl KeyValueStore for SqliteKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        self.db
            .execute(move |conn| {
                let value = conn
                    .query_row(
                        "SELECT value FROM kv_store WHERE key = ?1",
                        params![key],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(value)
            })
            .await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let key = key.to_string();
        let value = value.to_string();
        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, CURRENT_TIMESTAMP)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP",
                    params![key, value],
                )?;
                Ok(())
            })
            .await
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        let key = key.to_string();
        self.db
            .execute(move |conn| {
                let removed = conn.execute("DELETE FROM kv_store WHERE key = ?1", params![key])?;
                Ok(removed > 0)
            })
            .await
    }
}

/// Key-value store that lives only as long as the process
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.entries.write().await.remove(key).is_some())
    }
}
