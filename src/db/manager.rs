//! Database manager implementation
//!
//! This module provides database connection management with:
//! - SQLite connection pool using r2d2
//! - Async wrapper for blocking database operations
//! - Schema migrations on open

use crate::core::config::StorageConfig;
use crate::core::error::{CatalogError, ErrorContext, Result};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::task;

/// Database manager with connection pool
#[derive(Clone)]
pub struct DatabaseManager {
    pool: Pool<SqliteConnectionManager>,
    db_path: PathBuf,
}

impl DatabaseManager {
    /// Create a new DatabaseManager with the specified database path and pool size
    pub fn new(db_path: &Path, pool_size: u32, busy_timeout: Duration) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create database directory {}", parent.display())
                })?;
            }
        }

        let manager = SqliteConnectionManager::file(db_path).with_init(move |conn| {
            conn.busy_timeout(busy_timeout)?;
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
            Ok(())
        });

        let pool = Pool::builder()
            .max_size(pool_size)
            .connection_timeout(Duration::from_secs(30))
            .build(manager)
            .map_err(|e| {
                CatalogError::Initialization(format!("Failed to open {}: {}", db_path.display(), e))
            })?;

        let manager = Self {
            pool,
            db_path: db_path.to_path_buf(),
        };

        manager.migrate()?;

        Ok(manager)
    }

    /// Open the session database described by the storage configuration
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        Self::new(
            &config.session_db,
            config.connection_pool_size as u32,
            Duration::from_millis(config.busy_timeout),
        )
    }

    /// Create a new DatabaseManager with an in-memory database
    pub fn new_in_memory() -> Result<Self> {
        let manager = SqliteConnectionManager::memory();

        let pool = Pool::builder()
            .max_size(1) // Every in-memory connection is its own database
            .connection_timeout(Duration::from_secs(30))
            .build(manager)
            .map_err(|e| {
                CatalogError::Initialization(format!("Failed to open in-memory database: {}", e))
            })?;

        let manager = Self {
            pool,
            db_path: PathBuf::from(":memory:"),
        };

        manager.migrate()?;

        Ok(manager)
    }

    /// Get a connection from the pool
    pub fn get_connection(&self) -> Result<PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| CatalogError::Task(format!("No database connection available: {}", e)))
    }

    /// Execute a database operation asynchronously
    ///
    /// This wraps synchronous database operations in tokio::task::spawn_blocking
    /// to avoid blocking the async runtime.
    pub async fn execute<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();

        task::spawn_blocking(move || {
            let conn = pool.get().map_err(|e| {
                CatalogError::Task(format!("No database connection available: {}", e))
            })?;
            f(&conn)
        })
        .await
        .map_err(|e| CatalogError::Task(format!("Database task panicked: {}", e)))?
    }

    /// Execute database migrations
    pub fn migrate(&self) -> Result<()> {
        let mut conn = self.get_connection()?;
        crate::db::migrations::run_migrations(&mut conn)
    }

    /// Get the database file path
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Get the configured pool size
    pub fn pool_size(&self) -> u32 {
        self.pool.max_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_db() -> (DatabaseManager, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("session.db");
        let manager = DatabaseManager::new(&db_path, 2, Duration::from_secs(5)).unwrap();
        (manager, temp_dir)
    }

    #[test]
    fn test_database_manager_creation() {
        let (manager, temp_dir) = create_test_db();
        assert_eq!(manager.pool_size(), 2);
        assert!(temp_dir.path().join("nested").join("session.db").exists());
    }

    #[tokio::test]
    async fn test_execute_async() {
        let (manager, _temp_dir) = create_test_db();

        let tables: i64 = manager
            .execute(|conn| {
                conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'kv_store'",
                    [],
                    |row| row.get(0),
                )
                .map_err(CatalogError::Database)
            })
            .await
            .unwrap();

        assert_eq!(tables, 1);
    }

    #[tokio::test]
    async fn test_in_memory() {
        let manager = DatabaseManager::new_in_memory().unwrap();
        assert_eq!(manager.db_path(), Path::new(":memory:"));

        let version: i64 = manager
            .execute(|conn| {
                conn.query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
                    row.get(0)
                })
                .map_err(CatalogError::Database)
            })
            .await
            .unwrap();
        assert!(version >= 1);
    }

    #[test]
    fn test_from_config() {
        let temp_dir = TempDir::new().unwrap();
        let config = StorageConfig {
            session_db: temp_dir.path().join("catalog.db"),
            connection_pool_size: 3,
            busy_timeout: 1000,
        };
        let manager = DatabaseManager::from_config(&config).unwrap();
        assert_eq!(manager.pool_size(), 3);
        assert_eq!(manager.db_path(), config.session_db.as_path());
    }
}
