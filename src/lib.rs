//! Catalog Sync Library
//!
//! Client-side data layer for a product catalog: a locally held product
//! collection kept in step with the server, per-operation request tracking,
//! filtering, pagination and session persistence.

pub mod catalog;
pub mod cli;
pub mod client;
pub mod core;
pub mod db;
pub mod session;
pub mod transport;

// Re-export commonly used types
pub use crate::core::{CatalogError, Config, EventBus};
pub use catalog::{
    CatalogStore, FilterCriteria, FilterQuery, Mutation, MutationCoordinator, OperationKind,
    PageCursor, PaginationWindow, Product, ProductDraft, RequestState, RequestTracker,
};
pub use client::CatalogClient;
pub use db::{KeyValueStore, MemoryKeyValueStore, SqliteKeyValueStore};
pub use session::{Session, SessionStore};
pub use transport::{AuthTransport, HttpTransport, ProductTransport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
