//! Session module
//!
//! Authenticated-user identity, mirrored between memory and durable storage.

pub mod models;
pub mod store;

pub use models::{Credentials, Registration, RegistrationReceipt, Session};
pub use store::{SessionStore, SESSION_KEY};
