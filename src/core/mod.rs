//! Core infrastructure module
//!
//! This module provides the ambient layer shared by the catalog and session
//! code:
//! - Configuration management
//! - Structured logging system
//! - Error handling and type system
//! - Event bus for observable state changes

pub mod config;
pub mod error;
pub mod event_bus;
pub mod logging;

pub use config::Config;
pub use error::{CatalogError, ErrorContext, Result};
pub use event_bus::{Event, EventBus, EventType};
pub use logging::Logger;
