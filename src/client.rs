//! Process-wide catalog client
//!
//! `CatalogClient` is the single entry point UI collaborators talk to. It owns
//! the session store, the collection, the request lifecycles, the pagination
//! window and the active filter, and wires them to injected transports and a
//! durable key-value store.

use crate::catalog::collection::{CatalogStore, CollectionSource, FetchOutcome};
use crate::catalog::coordinator::{Mutation, MutationCoordinator, MutationOutcome, RefreshStatus};
use crate::catalog::filter::{FilterCriteria, FilterQuery};
use crate::catalog::lifecycle::{OperationKind, RequestState, RequestTracker};
use crate::catalog::models::{ImageResolver, Product, ProductDraft};
use crate::catalog::pagination::{PageCursor, PaginationWindow};
use crate::core::config::{Config, PaginationConfig};
use crate::core::error::Result;
use crate::core::event_bus::{EventBus, EventType};
use crate::db::{DatabaseManager, KeyValueStore, SqliteKeyValueStore};
use crate::session::{Credentials, Registration, RegistrationReceipt, Session, SessionStore};
use crate::transport::{AuthTransport, HttpTransport, ProductTransport};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex, RwLock};
use tracing::{debug, info};

pub struct CatalogClient {
    events: Arc<EventBus>,
    tracker: Arc<RequestTracker>,
    session: SessionStore,
    collection: Arc<CatalogStore>,
    coordinator: MutationCoordinator,
    pagination_config: PaginationConfig,
    pagination: Mutex<PaginationWindow>,
    filter: RwLock<FilterCriteria>,
    images: ImageResolver,
    initialized: AtomicBool,
}

impl CatalogClient {
    /// Build a client around injected transports and storage
    pub fn new(
        config: &Config,
        products: Arc<dyn ProductTransport>,
        auth: Arc<dyn AuthTransport>,
        storage: Arc<dyn KeyValueStore>,
    ) -> Result<Self> {
        let events = Arc::new(EventBus::new());
        let session = SessionStore::new(storage, auth, events.clone());
        Self::assemble(config, events, session, products)
    }

    /// Production wiring: SQLite session database and the HTTP transport
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;

        let db = DatabaseManager::from_config(&config.storage)?;
        let storage: Arc<dyn KeyValueStore> = Arc::new(SqliteKeyValueStore::new(db));

        let http = HttpTransport::new(&config.api)?;
        let events = Arc::new(EventBus::new());
        let session = SessionStore::new(storage, Arc::new(http.clone()), events.clone());
        let products = Arc::new(http.with_session(session.subscribe()));

        Self::assemble(config, events, session, products)
    }

    fn assemble(
        config: &Config,
        events: Arc<EventBus>,
        session: SessionStore,
        products: Arc<dyn ProductTransport>,
    ) -> Result<Self> {
        let tracker = Arc::new(RequestTracker::new(events.clone()));
        let collection = Arc::new(CatalogStore::new(
            products.clone(),
            tracker.clone(),
            events.clone(),
        ));
        let coordinator = MutationCoordinator::new(products, tracker.clone(), collection.clone());
        let pagination = PaginationWindow::new(&config.pagination)?;

        Ok(Self {
            events,
            tracker,
            session,
            collection,
            coordinator,
            pagination_config: config.pagination.clone(),
            pagination: Mutex::new(pagination),
            filter: RwLock::new(FilterCriteria::default()),
            images: ImageResolver::new(&config.api.base_url, config.images.fallback_image.clone()),
            initialized: AtomicBool::new(false),
        })
    }

    /// Restore the persisted session. Only the first call hydrates.
    pub async fn init(&self) -> Result<Option<Session>> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return Ok(self.session.current());
        }

        match self.session.hydrate().await {
            Ok(session) => {
                info!(authenticated = session.is_some(), "Catalog client initialized");
                Ok(session)
            }
            Err(e) => {
                self.initialized.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    /// Drop the collection and every piece of view state.
    ///
    /// The durable session record is kept.
    pub async fn teardown(&self) {
        self.collection.clear().await;
        self.tracker.reset_all().await;
        *self.filter.write().await = FilterCriteria::default();

        let window = PaginationWindow::new(&self.pagination_config);
        if let Ok(window) = window {
            *self.pagination.lock().await = window;
        }

        self.initialized.store(false, Ordering::SeqCst);
        info!("Catalog client torn down");
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> Arc<EventBus> {
        self.events.clone()
    }

    // Session

    pub fn session(&self) -> Option<Session> {
        self.session.current()
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_authenticated()
    }

    pub fn subscribe_session(&self) -> watch::Receiver<Option<Session>> {
        self.session.subscribe()
    }

    pub async fn login(&self, credentials: Credentials) -> Result<Session> {
        self.session.login(credentials).await
    }

    pub async fn register(&self, registration: Registration) -> Result<RegistrationReceipt> {
        self.session.register(registration).await
    }

    pub async fn logout(&self) -> Result<()> {
        self.session.logout().await
    }

    // Collection

    /// Fetch every product, dropping any active filter
    pub async fn load_products(&self) -> Result<FetchOutcome> {
        let outcome = self.collection.refresh().await?;
        if outcome.is_applied() {
            *self.filter.write().await = FilterCriteria::default();
        }
        self.clamp_page().await;
        Ok(outcome)
    }

    /// Replace the collection with the products matching `criteria` and go
    /// back to the first page
    pub async fn apply_filter(&self, criteria: FilterCriteria) -> Result<FetchOutcome> {
        let query = FilterQuery::build(&criteria);
        let outcome = self.collection.fetch_filtered(&query).await?;

        if outcome.is_applied() {
            *self.filter.write().await = criteria;
            let cursor = self.pagination.lock().await.reset();
            self.page_changed(cursor).await;
        }
        Ok(outcome)
    }

    /// Restore the unfiltered view
    pub async fn clear_filter(&self) -> Result<FetchOutcome> {
        self.apply_filter(FilterCriteria::reset()).await
    }

    pub async fn active_filter(&self) -> FilterCriteria {
        self.filter.read().await.clone()
    }

    pub async fn collection_source(&self) -> CollectionSource {
        self.collection.source().await
    }

    /// Every product in the collection
    pub async fn products(&self) -> Vec<Product> {
        self.collection.snapshot().await
    }

    pub async fn product(&self, id: &str) -> Option<Product> {
        self.collection.find(id).await
    }

    // Mutations

    pub async fn create_product(&self, draft: ProductDraft) -> Result<MutationOutcome> {
        self.mutate(Mutation::Create(draft)).await
    }

    pub async fn edit_product(&self, id: &str, draft: ProductDraft) -> Result<MutationOutcome> {
        self.mutate(Mutation::Edit {
            id: id.to_string(),
            draft,
        })
        .await
    }

    pub async fn delete_product(&self, id: &str) -> Result<MutationOutcome> {
        self.mutate(Mutation::Delete { id: id.to_string() }).await
    }

    async fn mutate(&self, mutation: Mutation) -> Result<MutationOutcome> {
        let outcome = self.coordinator.execute(mutation).await?;
        if outcome.refresh == RefreshStatus::Applied {
            // The refresh is unfiltered
            *self.filter.write().await = FilterCriteria::default();
        }
        self.clamp_page().await;
        Ok(outcome)
    }

    // Pagination

    /// Products on the current page
    pub async fn visible_products(&self) -> Vec<Product> {
        let cursor = self.pagination.lock().await.cursor();
        self.collection.visible(cursor).await
    }

    pub async fn page_cursor(&self) -> PageCursor {
        self.pagination.lock().await.cursor()
    }

    pub async fn page_count(&self) -> usize {
        let len = self.collection.len().await;
        self.pagination.lock().await.page_count(len)
    }

    pub async fn allowed_page_sizes(&self) -> Vec<usize> {
        self.pagination.lock().await.allowed_sizes().to_vec()
    }

    pub async fn set_page_size(&self, size: usize) -> Result<PageCursor> {
        let cursor = self.pagination.lock().await.on_page_size_change(size)?;
        self.page_changed(cursor).await;
        Ok(cursor)
    }

    /// Jump to a page, clamped to the last page of the collection
    pub async fn set_page(&self, page_index: usize) -> PageCursor {
        let len = self.collection.len().await;
        let cursor = {
            let mut window = self.pagination.lock().await;
            window.set_page(page_index);
            window.clamp(len)
        };
        self.page_changed(cursor).await;
        cursor
    }

    pub async fn next_page(&self) -> PageCursor {
        let len = self.collection.len().await;
        let cursor = self.pagination.lock().await.next_page(len);
        self.page_changed(cursor).await;
        cursor
    }

    pub async fn previous_page(&self) -> PageCursor {
        let cursor = self.pagination.lock().await.previous_page();
        self.page_changed(cursor).await;
        cursor
    }

    async fn clamp_page(&self) {
        let len = self.collection.len().await;
        let (before, after) = {
            let mut window = self.pagination.lock().await;
            let before = window.cursor();
            (before, window.clamp(len))
        };
        if before != after {
            debug!(from = before.page_index, to = after.page_index, "Page clamped");
            self.page_changed(after).await;
        }
    }

    async fn page_changed(&self, cursor: PageCursor) {
        self.events
            .emit(
                EventType::PageChanged,
                json!({ "page_index": cursor.page_index, "page_size": cursor.page_size }),
            )
            .await;
    }

    // Request state

    pub fn request_state(&self, kind: OperationKind) -> RequestState {
        self.tracker.state(kind)
    }

    pub fn request_states(&self) -> Vec<(OperationKind, RequestState)> {
        self.tracker.snapshot()
    }

    pub fn subscribe_request(&self, kind: OperationKind) -> watch::Receiver<RequestState> {
        self.tracker.subscribe(kind)
    }

    /// The latest failure message of `kind`, handed out once
    pub fn take_notice(&self, kind: OperationKind) -> Option<String> {
        self.tracker.take_notice(kind)
    }

    pub async fn reset_request(&self, kind: OperationKind) {
        self.tracker.reset(kind).await;
    }

    // Images

    pub fn image_url(&self, product: &Product) -> String {
        self.images.primary_image_url(product)
    }

    pub fn image_urls(&self, product: &Product) -> Vec<String> {
        self.images.image_urls(product)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::lifecycle::RequestPhase;
    use crate::core::error::CatalogError;
    use crate::db::MemoryKeyValueStore;
    use crate::session::SESSION_KEY;
    use crate::transport::fake::{numbered_products, product, FakeServer};
    use rust_decimal::Decimal;

    struct Harness {
        client: CatalogClient,
        server: Arc<FakeServer>,
        storage: Arc<MemoryKeyValueStore>,
    }

    fn harness(products: Vec<Product>) -> Harness {
        let config = Config::defaults().unwrap();
        let server = Arc::new(
            FakeServer::with_products(products).with_user("ada", "ada@example.com", "pw"),
        );
        let storage = Arc::new(MemoryKeyValueStore::new());
        let client =
            CatalogClient::new(&config, server.clone(), server.clone(), storage.clone()).unwrap();
        Harness {
            client,
            server,
            storage,
        }
    }

    #[tokio::test]
    async fn test_init_hydrates_once() {
        let h = harness(Vec::new());
        let session = Session::new("ada", "ada@example.com", "token-ada");
        h.storage
            .set(SESSION_KEY, &serde_json::to_string(&session).unwrap())
            .await
            .unwrap();

        assert_eq!(h.client.init().await.unwrap(), Some(session.clone()));
        // Later changes to the record are not picked up by a second init
        h.storage.remove(SESSION_KEY).await.unwrap();
        assert_eq!(h.client.init().await.unwrap(), Some(session));
        assert!(h.client.is_authenticated());
    }

    #[tokio::test]
    async fn test_pagination_over_loaded_collection() {
        let h = harness(numbered_products(10));
        h.client.load_products().await.unwrap();

        assert_eq!(h.client.page_cursor().await, PageCursor { page_index: 0, page_size: 6 });
        assert_eq!(h.client.visible_products().await.len(), 6);
        assert_eq!(h.client.page_count().await, 2);

        h.client.set_page_size(3).await.unwrap();
        h.client.set_page(2).await;
        let ids: Vec<String> = h
            .client
            .visible_products()
            .await
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, vec!["p6", "p7", "p8"]);

        let cursor = h.client.set_page_size(6).await.unwrap();
        assert_eq!(cursor, PageCursor { page_index: 0, page_size: 6 });
        let ids: Vec<String> = h
            .client
            .visible_products()
            .await
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, vec!["p0", "p1", "p2", "p3", "p4", "p5"]);

        assert!(matches!(
            h.client.set_page_size(5).await,
            Err(CatalogError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_filter_resets_page_and_clear_restores() {
        let h = harness(vec![
            product("a", "Desk Lamp", "19.99", 5),
            product("b", "Floor Lamp", "49.00", 0),
            product("c", "Chair", "45.00", 2),
            product("d", "Table", "120.00", 1),
        ]);
        h.client.load_products().await.unwrap();
        h.client.set_page_size(3).await.unwrap();
        assert_eq!(h.client.set_page(1).await.page_index, 1);
        assert_eq!(h.client.visible_products().await.len(), 1);

        let criteria = FilterCriteria::from_form("lamp", "", "1").unwrap();
        h.client.apply_filter(criteria.clone()).await.unwrap();

        let names: Vec<String> = h.client.products().await.into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["Desk Lamp"]);
        assert_eq!(h.client.active_filter().await, criteria);
        assert_eq!(h.client.page_cursor().await.page_index, 0);
        assert!(matches!(
            h.client.collection_source().await,
            CollectionSource::Filtered(_)
        ));

        h.client.clear_filter().await.unwrap();
        assert_eq!(h.client.products().await.len(), 4);
        assert_eq!(h.client.active_filter().await, FilterCriteria::default());
        assert_eq!(h.client.collection_source().await, CollectionSource::Unfiltered);
    }

    #[tokio::test]
    async fn test_delete_clamps_page() {
        let h = harness(numbered_products(7));
        h.client.load_products().await.unwrap();
        h.client.set_page(1).await;
        assert_eq!(h.client.visible_products().await.len(), 1);

        h.client.delete_product("p6").await.unwrap();

        assert_eq!(h.client.page_cursor().await.page_index, 0);
        assert_eq!(h.client.visible_products().await.len(), 6);
    }

    #[tokio::test]
    async fn test_create_through_client() {
        let h = harness(Vec::new());
        let draft = ProductDraft::new("Lamp", Decimal::new(1999, 2), 5);

        let outcome = h.client.create_product(draft).await.unwrap();
        assert_eq!(outcome.refresh, RefreshStatus::Applied);
        assert_eq!(h.client.products().await[0].display_price(), "$19.99");
        assert_eq!(
            h.client.request_state(OperationKind::Create).phase,
            RequestPhase::Succeeded
        );
    }

    #[tokio::test]
    async fn test_failed_fetch_notice_surfaces_once() {
        let h = harness(numbered_products(2));
        h.server.fail_next("list_all", "Service unavailable");

        assert!(h.client.load_products().await.is_err());
        assert_eq!(
            h.client.take_notice(OperationKind::FetchList).as_deref(),
            Some("Service unavailable")
        );
        assert_eq!(h.client.take_notice(OperationKind::FetchList), None);
        assert_eq!(
            h.client.request_state(OperationKind::FetchList).error_message.as_deref(),
            Some("Service unavailable")
        );
    }

    #[tokio::test]
    async fn test_teardown_keeps_durable_session() {
        let h = harness(numbered_products(4));
        h.client.init().await.unwrap();
        h.client
            .login(Credentials::new("ada@example.com", "pw"))
            .await
            .unwrap();
        h.client.load_products().await.unwrap();
        h.client.set_page_size(3).await.unwrap();
        h.client.next_page().await;

        h.client.teardown().await;

        assert!(h.client.products().await.is_empty());
        assert!(!h.client.is_initialized());
        assert_eq!(h.client.page_cursor().await, PageCursor { page_index: 0, page_size: 6 });
        assert!(h
            .client
            .request_states()
            .iter()
            .all(|(_, state)| state.phase == RequestPhase::Idle));
        assert!(h.storage.get(SESSION_KEY).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_image_urls_use_fallback() {
        let h = harness(Vec::new());
        let mut item = product("a", "Lamp", "1.00", 1);
        assert_eq!(h.client.image_url(&item), "http://localhost:5000/default-image.png");

        item.images = vec!["/uploads/lamp.png".to_string()];
        assert_eq!(h.client.image_url(&item), "http://localhost:5000/uploads/lamp.png");
    }
}
