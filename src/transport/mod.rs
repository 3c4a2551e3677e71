//! Transport capability consumed by the catalog and session stores
//!
//! The stores never talk HTTP directly. They depend on these traits so the
//! network module can be swapped for a fake in tests. Every call fails with
//! `CatalogError::Remote` on a non-success response.

pub mod http;

#[cfg(test)]
pub(crate) mod fake;

use crate::catalog::filter::FilterQuery;
use crate::catalog::models::{Product, ProductDraft};
use crate::core::error::Result;
use crate::session::models::{Credentials, Registration, RegistrationReceipt, Session};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use self::http::HttpTransport;

/// Server acknowledgement of a delete
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    #[serde(default)]
    pub message: Option<String>,
}

/// Product endpoints
#[async_trait]
pub trait ProductTransport: Send + Sync {
    /// Every product, in server order
    async fn list_all(&self) -> Result<Vec<Product>>;

    /// Products matching a query
    async fn list_filtered(&self, query: &FilterQuery) -> Result<Vec<Product>>;

    /// Create a product, returning it with its server-assigned id
    async fn create(&self, draft: &ProductDraft) -> Result<Product>;

    /// Replace the editable fields of a product
    async fn update(&self, id: &str, draft: &ProductDraft) -> Result<Product>;

    /// Delete a product by id
    async fn delete(&self, id: &str) -> Result<Ack>;
}

/// Authentication endpoints
#[async_trait]
pub trait AuthTransport: Send + Sync {
    async fn login(&self, credentials: &Credentials) -> Result<Session>;

    async fn register(&self, registration: &Registration) -> Result<RegistrationReceipt>;
}
