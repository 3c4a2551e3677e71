//! Entity collection store
//!
//! Holds the products currently known to the client. The server response is
//! always authoritative and total: every update replaces the whole sequence.
//!
//! Fetches draw a monotonic ticket before they are dispatched. When responses
//! arrive out of order, a result whose ticket is older than the snapshot
//! already applied is discarded instead of overwriting newer data.

use crate::catalog::filter::FilterQuery;
use crate::catalog::lifecycle::{OperationKind, RequestTracker};
use crate::catalog::models::Product;
use crate::catalog::pagination::{visible_slice, PageCursor};
use crate::core::error::{CatalogError, Result};
use crate::core::event_bus::{EventBus, EventType};
use crate::transport::ProductTransport;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

/// Where the current snapshot came from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "query", rename_all = "snake_case")]
pub enum CollectionSource {
    #[default]
    Empty,
    Unfiltered,
    Filtered(FilterQuery),
}

/// Result of a sequenced fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The response became the current collection
    Applied { len: usize },
    /// A newer snapshot was already applied; the response was dropped
    Superseded,
}

impl FetchOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, FetchOutcome::Applied { .. })
    }
}

#[derive(Debug, Default)]
struct CollectionState {
    products: Vec<Product>,
    applied_ticket: u64,
    source: CollectionSource,
}

/// The list of products currently known to the client
pub struct CatalogStore {
    state: RwLock<CollectionState>,
    tickets: AtomicU64,
    transport: Arc<dyn ProductTransport>,
    tracker: Arc<RequestTracker>,
    events: Arc<EventBus>,
}

impl CatalogStore {
    pub fn new(
        transport: Arc<dyn ProductTransport>,
        tracker: Arc<RequestTracker>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            state: RwLock::new(CollectionState::default()),
            tickets: AtomicU64::new(0),
            transport,
            tracker,
            events,
        }
    }

    /// Draw the next fetch ticket
    pub fn issue_ticket(&self) -> u64 {
        self.tickets.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Replace the held sequence unconditionally.
    ///
    /// The snapshot is treated as unfiltered and newer than any fetch still in
    /// flight.
    pub async fn replace_all(&self, products: Vec<Product>) {
        let len = products.len();
        let ticket = {
            let mut state = self.state.write().await;
            let ticket = self.issue_ticket();
            state.products = products;
            state.applied_ticket = ticket;
            state.source = CollectionSource::Unfiltered;
            ticket
        };

        debug!(ticket, len, "Collection replaced");
        self.events
            .emit(
                EventType::CollectionReplaced,
                json!({ "ticket": ticket, "len": len, "source": CollectionSource::Unfiltered }),
            )
            .await;
    }

    /// Apply a fetch result if its ticket is newer than the current snapshot
    pub async fn apply(
        &self,
        ticket: u64,
        source: CollectionSource,
        products: Vec<Product>,
    ) -> FetchOutcome {
        let len = products.len();
        let applied = {
            let mut state = self.state.write().await;
            if ticket <= state.applied_ticket {
                Err(state.applied_ticket)
            } else {
                state.products = products;
                state.applied_ticket = ticket;
                state.source = source.clone();
                Ok(())
            }
        };

        match applied {
            Ok(()) => {
                debug!(ticket, len, "Collection replaced");
                self.events
                    .emit(
                        EventType::CollectionReplaced,
                        json!({ "ticket": ticket, "len": len, "source": source }),
                    )
                    .await;
                FetchOutcome::Applied { len }
            }
            Err(current) => {
                info!(ticket, current, "Discarding out-of-order snapshot");
                self.events
                    .emit(
                        EventType::SnapshotDiscarded,
                        json!({ "ticket": ticket, "current": current }),
                    )
                    .await;
                FetchOutcome::Superseded
            }
        }
    }

    /// Re-issue the unfiltered fetch under the fetch-list lifecycle.
    ///
    /// Rejected with `ConcurrencyRejection` while a fetch-list is in flight.
    /// On failure the collection keeps its previous contents.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<FetchOutcome> {
        let request = self.tracker.start(OperationKind::FetchList).await?;

        let ticket = self.issue_ticket();
        let result = match self.transport.list_all().await {
            Ok(products) => Ok(self.apply(ticket, CollectionSource::Unfiltered, products).await),
            Err(e) => Err(e),
        };
        self.tracker.complete(request, &result).await;
        result
    }

    /// Like [`Self::refresh`], but waits out a fetch-list already in flight
    /// and then issues a fresh one, so the result reflects the server as of now
    pub async fn refresh_when_idle(&self) -> Result<FetchOutcome> {
        loop {
            match self.refresh().await {
                Err(CatalogError::ConcurrencyRejection(_)) => {
                    debug!("Fetch-list in flight, waiting before refreshing");
                    self.tracker
                        .wait_until_settled(OperationKind::FetchList)
                        .await;
                }
                other => return other,
            }
        }
    }

    /// Replace the collection with the products matching `query`.
    ///
    /// An unconstrained query lists everything.
    #[instrument(skip(self))]
    pub async fn fetch_filtered(&self, query: &FilterQuery) -> Result<FetchOutcome> {
        let request = self.tracker.start(OperationKind::FilteredFetch).await?;

        let ticket = self.issue_ticket();
        let (source, response) = if query.is_unconstrained() {
            (CollectionSource::Unfiltered, self.transport.list_all().await)
        } else {
            (
                CollectionSource::Filtered(query.clone()),
                self.transport.list_filtered(query).await,
            )
        };
        let result = match response {
            Ok(products) => Ok(self.apply(ticket, source, products).await),
            Err(e) => Err(e),
        };
        self.tracker.complete(request, &result).await;
        result
    }

    /// Drop every product and invalidate fetches still in flight
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.products.clear();
        state.applied_ticket = self.issue_ticket();
        state.source = CollectionSource::Empty;
    }

    pub async fn snapshot(&self) -> Vec<Product> {
        self.state.read().await.products.clone()
    }

    /// Products on the page selected by `cursor`
    pub async fn visible(&self, cursor: PageCursor) -> Vec<Product> {
        let state = self.state.read().await;
        visible_slice(&state.products, cursor).to_vec()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.products.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.products.is_empty()
    }

    pub async fn find(&self, id: &str) -> Option<Product> {
        self.state
            .read()
            .await
            .products
            .iter()
            .find(|p| p.id == id)
            .cloned()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.state.read().await.products.iter().any(|p| p.id == id)
    }

    pub async fn source(&self) -> CollectionSource {
        self.state.read().await.source.clone()
    }

    pub async fn applied_ticket(&self) -> u64 {
        self.state.read().await.applied_ticket
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::filter::FilterCriteria;
    use crate::catalog::lifecycle::RequestPhase;
    use crate::transport::fake::{numbered_products, product, FakeServer};
    use proptest::prelude::*;
    use std::time::Duration;

    fn store_with(server: Arc<FakeServer>) -> (Arc<CatalogStore>, Arc<RequestTracker>, Arc<EventBus>) {
        let events = Arc::new(EventBus::new());
        let tracker = Arc::new(RequestTracker::new(events.clone()));
        let store = Arc::new(CatalogStore::new(server, tracker.clone(), events.clone()));
        (store, tracker, events)
    }

    #[tokio::test]
    async fn test_refresh_replaces_collection() {
        let server = Arc::new(FakeServer::with_products(numbered_products(4)));
        let (store, tracker, _) = store_with(server.clone());

        let outcome = store.refresh().await.unwrap();
        assert_eq!(outcome, FetchOutcome::Applied { len: 4 });
        assert_eq!(store.snapshot().await, server.products());
        assert_eq!(store.source().await, CollectionSource::Unfiltered);
        assert_eq!(tracker.state(OperationKind::FetchList).phase, RequestPhase::Succeeded);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_contents() {
        let server = Arc::new(FakeServer::with_products(numbered_products(3)));
        let (store, tracker, _) = store_with(server.clone());
        store.refresh().await.unwrap();

        server.fail_next("list_all", "Service unavailable");
        let err = store.refresh().await.unwrap_err();

        assert!(matches!(err, CatalogError::Remote(_)));
        assert_eq!(store.len().await, 3);
        let state = tracker.state(OperationKind::FetchList);
        assert_eq!(state.phase, RequestPhase::Failed);
        assert_eq!(state.error_message.as_deref(), Some("Service unavailable"));
    }

    #[tokio::test]
    async fn test_concurrent_refresh_is_rejected() {
        let server = Arc::new(FakeServer::with_products(numbered_products(2)));
        server.delay_next_list(Duration::from_millis(100));
        let (store, _, _) = store_with(server.clone());

        let first = {
            let store = store.clone();
            tokio::spawn(async move { store.refresh().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let err = store.refresh().await.unwrap_err();
        assert!(matches!(
            err,
            CatalogError::ConcurrencyRejection(OperationKind::FetchList)
        ));
        assert!(first.await.unwrap().is_ok());
        assert_eq!(server.calls("list_all"), 1);
    }

    #[tokio::test]
    async fn test_stale_snapshot_is_discarded() {
        let server = Arc::new(FakeServer::with_products(vec![
            product("a", "Desk Lamp", "19.99", 5),
            product("b", "Chair", "45.00", 2),
        ]));
        server.delay_next_list(Duration::from_millis(100));
        let (store, _, events) = store_with(server.clone());

        // Slow unfiltered fetch dispatched first
        let slow = {
            let store = store.clone();
            tokio::spawn(async move { store.refresh().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Filtered fetch dispatched later but answering first
        let query = FilterQuery::build(&FilterCriteria::default().with_name("lamp"));
        let filtered = store.fetch_filtered(&query).await.unwrap();
        assert_eq!(filtered, FetchOutcome::Applied { len: 1 });

        assert_eq!(slow.await.unwrap().unwrap(), FetchOutcome::Superseded);
        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].name, "Desk Lamp");
        assert_eq!(store.source().await, CollectionSource::Filtered(query));
        assert_eq!(events.count(EventType::SnapshotDiscarded).await, 1);
    }

    #[tokio::test]
    async fn test_refresh_when_idle_waits_then_fetches() {
        let server = Arc::new(FakeServer::with_products(numbered_products(2)));
        server.delay_next_list(Duration::from_millis(80));
        let (store, _, _) = store_with(server.clone());

        let slow = {
            let store = store.clone();
            tokio::spawn(async move { store.refresh().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        server.insert(product("new", "Late arrival", "3.00", 1));

        let outcome = store.refresh_when_idle().await.unwrap();
        assert_eq!(outcome, FetchOutcome::Applied { len: 3 });
        assert!(slow.await.unwrap().is_ok());
        assert!(store.contains("new").await);
        assert_eq!(server.calls("list_all"), 2);
    }

    #[tokio::test]
    async fn test_reset_refresh_does_not_settle_the_next_request() {
        let server = Arc::new(FakeServer::with_products(numbered_products(2)));
        server.delay_next_list(Duration::from_millis(80));
        let (store, tracker, _) = store_with(server.clone());

        let slow = {
            let store = store.clone();
            tokio::spawn(async move { store.refresh().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        tracker.reset(OperationKind::FetchList).await;
        let next = tracker.start(OperationKind::FetchList).await.unwrap();

        slow.await.unwrap().unwrap();
        // The next request is still the one in flight
        assert_eq!(tracker.state(OperationKind::FetchList).phase, RequestPhase::Loading);
        assert!(store.refresh().await.is_err());

        let outcome: Result<()> = Err(CatalogError::Remote("Service unavailable".into()));
        tracker.complete(next, &outcome).await;
        assert_eq!(
            tracker.take_notice(OperationKind::FetchList).as_deref(),
            Some("Service unavailable")
        );
    }

    #[tokio::test]
    async fn test_unconstrained_filter_lists_everything() {
        let server = Arc::new(FakeServer::with_products(numbered_products(5)));
        let (store, tracker, _) = store_with(server.clone());

        let query = FilterQuery::build(&FilterCriteria::reset());
        assert_eq!(
            store.fetch_filtered(&query).await.unwrap(),
            FetchOutcome::Applied { len: 5 }
        );
        assert_eq!(server.calls("list_filtered"), 0);
        assert_eq!(server.calls("list_all"), 1);
        assert_eq!(
            tracker.state(OperationKind::FilteredFetch).phase,
            RequestPhase::Succeeded
        );
        assert_eq!(tracker.state(OperationKind::FetchList).phase, RequestPhase::Idle);
    }

    #[tokio::test]
    async fn test_clear_invalidates_in_flight_fetch() {
        let server = Arc::new(FakeServer::with_products(numbered_products(2)));
        server.delay_next_list(Duration::from_millis(60));
        let (store, _, _) = store_with(server);

        let pending = {
            let store = store.clone();
            tokio::spawn(async move { store.refresh().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        store.clear().await;

        assert_eq!(pending.await.unwrap().unwrap(), FetchOutcome::Superseded);
        assert!(store.is_empty().await);
        assert_eq!(store.source().await, CollectionSource::Empty);
    }

    #[tokio::test]
    async fn test_find_and_visible() {
        let (store, _, _) = store_with(Arc::new(FakeServer::new()));
        store.replace_all(numbered_products(10)).await;

        assert_eq!(store.find("p3").await.unwrap().name, "Item 3");
        assert!(store.find("missing").await.is_none());

        let page = store.visible(PageCursor::new(1, 6).unwrap()).await;
        let ids: Vec<&str> = page.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["p6", "p7", "p8", "p9"]);
    }

    proptest! {
        #[test]
        fn prop_replace_all_yields_last_argument(sizes in proptest::collection::vec(0usize..12, 1..8)) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();

            runtime.block_on(async {
                let (store, _, _) = store_with(Arc::new(FakeServer::new()));
                let mut last = Vec::new();
                for (round, size) in sizes.iter().enumerate() {
                    last = (0..*size)
                        .map(|i| product(&format!("r{}-{}", round, i), "Item", "2.50", i as u32))
                        .collect();
                    store.replace_all(last.clone()).await;
                }
                assert_eq!(store.snapshot().await, last);
            });
        }
    }
}
