//! Product catalog data layer
//!
//! This module keeps the locally held product collection synchronized with
//! the server:
//! - Per-operation request lifecycles
//! - The collection store and its refresh protocol
//! - Filter query construction
//! - The pagination window over the collection
//! - The mutation coordinator (refresh-after-settle)

pub mod collection;
pub mod coordinator;
pub mod filter;
pub mod lifecycle;
pub mod models;
pub mod pagination;

pub use collection::{CatalogStore, CollectionSource, FetchOutcome};
pub use coordinator::{Mutation, MutationCoordinator, MutationOutcome, MutationResult, RefreshStatus};
pub use filter::{FilterCriteria, FilterQuery};
pub use lifecycle::{
    OperationKind, RequestLifecycle, RequestPhase, RequestState, RequestToken, RequestTracker,
};
pub use models::{ImageResolver, Product, ProductDraft};
pub use pagination::{PageCursor, PaginationWindow};
