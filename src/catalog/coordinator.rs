//! Mutation coordinator
//!
//! Sequences a create, edit or delete through its request lifecycle and, on
//! success, refreshes the collection from the server. The collection is never
//! edited locally: a failed mutation leaves it untouched and a successful one
//! is only visible after the refresh lands.

use crate::catalog::collection::{CatalogStore, FetchOutcome};
use crate::catalog::lifecycle::{OperationKind, RequestTracker};
use crate::catalog::models::{Product, ProductDraft};
use crate::core::error::{CatalogError, Result};
use crate::transport::{Ack, ProductTransport};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// A mutation request and its payload
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Create(ProductDraft),
    Edit { id: String, draft: ProductDraft },
    Delete { id: String },
}

impl Mutation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Mutation::Create(_) => OperationKind::Create,
            Mutation::Edit { .. } => OperationKind::Edit,
            Mutation::Delete { .. } => OperationKind::Delete,
        }
    }

    /// Field-level checks that never reach the transport
    pub fn validate(&self) -> Result<()> {
        match self {
            Mutation::Create(draft) => draft.validate(),
            Mutation::Edit { id, draft } => {
                require_id(id)?;
                draft.validate()
            }
            Mutation::Delete { id } => require_id(id),
        }
    }
}

fn require_id(id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(CatalogError::Validation("Product id is required".to_string()));
    }
    Ok(())
}

/// What the server returned for the mutation
#[derive(Debug, Clone, PartialEq)]
pub enum MutationResult {
    Created(Product),
    Updated(Product),
    Deleted(Ack),
}

/// Outcome of the refresh that follows a successful mutation.
///
/// Reported separately: a failed refresh does not turn the mutation into a
/// failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshStatus {
    Applied,
    Superseded,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MutationOutcome {
    pub kind: OperationKind,
    pub result: MutationResult,
    pub refresh: RefreshStatus,
}

pub struct MutationCoordinator {
    transport: Arc<dyn ProductTransport>,
    tracker: Arc<RequestTracker>,
    collection: Arc<CatalogStore>,
}

impl MutationCoordinator {
    pub fn new(
        transport: Arc<dyn ProductTransport>,
        tracker: Arc<RequestTracker>,
        collection: Arc<CatalogStore>,
    ) -> Self {
        Self {
            transport,
            tracker,
            collection,
        }
    }

    /// Run a mutation and refresh the collection if it succeeds.
    ///
    /// Errors:
    /// - `Validation` if the payload is rejected locally; the lifecycle is not touched
    /// - `ConcurrencyRejection` if a mutation of the same kind is in flight
    /// - `Remote` if the server refused; no refresh is issued
    #[instrument(skip(self, mutation), fields(kind = %mutation.kind()))]
    pub async fn execute(&self, mutation: Mutation) -> Result<MutationOutcome> {
        mutation.validate()?;

        let kind = mutation.kind();
        let request = self.tracker.start(kind).await?;

        let result = self.dispatch(&mutation).await;
        self.tracker.complete(request, &result).await;
        let result = result?;

        info!(kind = %kind, "Mutation confirmed by server, refreshing collection");
        let refresh = match self.collection.refresh_when_idle().await {
            Ok(FetchOutcome::Applied { .. }) => RefreshStatus::Applied,
            Ok(FetchOutcome::Superseded) => RefreshStatus::Superseded,
            Err(e) => {
                warn!(kind = %kind, error = %e, "Refresh after mutation failed");
                RefreshStatus::Failed(e.user_message())
            }
        };

        Ok(MutationOutcome {
            kind,
            result,
            refresh,
        })
    }

    async fn dispatch(&self, mutation: &Mutation) -> Result<MutationResult> {
        match mutation {
            Mutation::Create(draft) => self.transport.create(draft).await.map(MutationResult::Created),
            Mutation::Edit { id, draft } => self
                .transport
                .update(id, draft)
                .await
                .map(MutationResult::Updated),
            Mutation::Delete { id } => self.transport.delete(id).await.map(MutationResult::Deleted),
        }
    }
}
