//! Error type system for the catalog client
//!
//! This module provides the error taxonomy shared by every layer:
//! - Client-side validation failures that never reach the transport
//! - Remote failures reported by the server or the network
//! - Concurrency rejections for operations already in flight
//! - Ambient failures (configuration, storage, serialization)

use crate::catalog::lifecycle::OperationKind;

/// Main error type for the catalog client
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    // Taxonomy surfaced to UI collaborators
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Remote error: {0}")]
    Remote(String),

    #[error("Operation already in progress: {0}")]
    ConcurrencyRejection(OperationKind),

    // Session errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    // Lifecycle misuse
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    // System-level errors
    #[error("System initialization failed: {0}")]
    Initialization(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Task error: {0}")]
    Task(String),
}

impl CatalogError {
    /// Get the error type name
    pub fn error_type(&self) -> &'static str {
        match self {
            CatalogError::Validation(_) => "ValidationError",
            CatalogError::Remote(_) => "RemoteError",
            CatalogError::ConcurrencyRejection(_) => "ConcurrencyRejection",
            CatalogError::Authentication(_) => "AuthenticationError",
            CatalogError::InvalidTransition(_) => "InvalidTransition",
            CatalogError::Initialization(_) => "InitializationError",
            CatalogError::Configuration(_) => "ConfigError",
            CatalogError::Database(_) => "DatabaseError",
            CatalogError::Io(_) => "IoError",
            CatalogError::Serialization(_) => "SerializationError",
            CatalogError::Task(_) => "TaskError",
        }
    }

    /// Normalized text shown to the user.
    ///
    /// Remote and validation messages are passed through verbatim; everything
    /// else uses the full display form.
    pub fn user_message(&self) -> String {
        match self {
            CatalogError::Remote(message)
            | CatalogError::Validation(message)
            | CatalogError::Authentication(message) => message.clone(),
            other => other.to_string(),
        }
    }

    /// Whether the error was produced before anything was sent to the server
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            CatalogError::Validation(_) | CatalogError::ConcurrencyRejection(_)
        )
    }
}

impl From<serde_json::Error> for CatalogError {
    fn from(err: serde_json::Error) -> Self {
        CatalogError::Serialization(err.to_string())
    }
}

impl From<crate::core::config::ConfigError> for CatalogError {
    fn from(err: crate::core::config::ConfigError) -> Self {
        CatalogError::Configuration(err.to_string())
    }
}

/// Result type alias for operations that can fail with CatalogError
pub type Result<T> = std::result::Result<T, CatalogError>;

/// Context extension trait for adding context to errors
pub trait ErrorContext<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context to an error using a closure
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: std::fmt::Display,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let context_str = context.into();
            CatalogError::Initialization(format!("{}: {}", context_str, e))
        })
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let context_str = f();
            CatalogError::Initialization(format!("{}: {}", context_str, e))
        })
    }
}
