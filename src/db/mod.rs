//! Database module
//!
//! This module provides the durable persistence medium for the session:
//! - SQLite connection pool management
//! - Database migrations
//! - Key-value store implementations

pub mod kv_store;
pub mod manager;
pub mod migrations;

pub use kv_store::{KeyValueStore, MemoryKeyValueStore, SqliteKeyValueStore};
pub use manager::DatabaseManager;
