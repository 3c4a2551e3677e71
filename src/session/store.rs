//! Session store
//!
//! The in-memory session is the authority. The durable record under
//! [`SESSION_KEY`] mirrors it so a restarted process can pick the session up
//! again through [`SessionStore::hydrate`].

use crate::core::error::{CatalogError, Result};
use crate::core::event_bus::{EventBus, EventType};
use crate::db::KeyValueStore;
use crate::session::models::{Credentials, Registration, RegistrationReceipt, Session};
use crate::transport::AuthTransport;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, instrument, warn};

/// Fixed key of the durable session record
pub const SESSION_KEY: &str = "user";

pub struct SessionStore {
    current: watch::Sender<Option<Session>>,
    storage: Arc<dyn KeyValueStore>,
    auth: Arc<dyn AuthTransport>,
    events: Arc<EventBus>,
    // Serializes every operation that touches the durable record
    write_lock: Mutex<()>,
}

impl SessionStore {
    pub fn new(
        storage: Arc<dyn KeyValueStore>,
        auth: Arc<dyn AuthTransport>,
        events: Arc<EventBus>,
    ) -> Self {
        let (current, _) = watch::channel(None);
        Self {
            current,
            storage,
            auth,
            events,
            write_lock: Mutex::new(()),
        }
    }

    pub fn current(&self) -> Option<Session> {
        self.current.borrow().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.current.borrow().is_some()
    }

    /// Observe session changes
    pub fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.current.subscribe()
    }

    /// Adopt the persisted session if none is held in memory.
    ///
    /// Safe to call repeatedly. An existing in-memory session is never
    /// replaced; if the persisted record disagrees with it, the record is
    /// rewritten. A malformed record is removed.
    #[instrument(skip(self))]
    pub async fn hydrate(&self) -> Result<Option<Session>> {
        let _guard = self.write_lock.lock().await;

        let raw = self.storage.get(SESSION_KEY).await?;
        let persisted = raw.as_deref().and_then(parse_record);

        if let Some(current) = self.current() {
            if persisted.as_ref() != Some(&current) {
                debug!("Persisted session is stale, rewriting it from memory");
                if let Err(e) = self.persist(&current).await {
                    warn!(error = %e, "Failed to rewrite stale session record");
                }
            }
            return Ok(Some(current));
        }

        match persisted {
            Some(session) => {
                info!(username = %session.username, "Session restored");
                self.current.send_replace(Some(session.clone()));
                self.events
                    .emit(
                        EventType::SessionHydrated,
                        json!({ "username": session.username }),
                    )
                    .await;
                Ok(Some(session))
            }
            None => {
                if raw.is_some() {
                    warn!("Ignoring malformed session record");
                    self.storage.remove(SESSION_KEY).await?;
                }
                Ok(None)
            }
        }
    }

    /// Authenticate and remember the session.
    ///
    /// On failure the current session is left as it was. A session that
    /// cannot be written to durable storage is still adopted for this process.
    #[instrument(skip(self, credentials), fields(email = %credentials.email))]
    pub async fn login(&self, credentials: Credentials) -> Result<Session> {
        credentials.validate()?;

        let _guard = self.write_lock.lock().await;

        let session = self.auth.login(&credentials).await?;
        if !session.is_well_formed() {
            return Err(CatalogError::Authentication(
                "Server returned an incomplete session".to_string(),
            ));
        }

        self.current.send_replace(Some(session.clone()));
        if let Err(e) = self.persist(&session).await {
            warn!(error = %e, "Failed to persist session; it will not survive a restart");
        }

        info!(username = %session.username, "Logged in");
        self.events
            .emit(
                EventType::SessionStarted,
                json!({ "username": session.username }),
            )
            .await;
        Ok(session)
    }

    /// Create an account. Never logs the user in.
    #[instrument(skip(self, registration), fields(username = %registration.username))]
    pub async fn register(&self, registration: Registration) -> Result<RegistrationReceipt> {
        registration.validate()?;
        let receipt = self.auth.register(&registration).await?;
        info!("Registration accepted");
        Ok(receipt)
    }

    /// Forget the session in memory and on disk. There is no undo.
    ///
    /// The in-memory session is cleared even if removing the record fails.
    #[instrument(skip(self))]
    pub async fn logout(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let previous = self.current.send_replace(None);
        let removed = self.storage.remove(SESSION_KEY).await;

        if let Some(previous) = previous {
            info!(username = %previous.username, "Logged out");
            self.events
                .emit(
                    EventType::SessionEnded,
                    json!({ "username": previous.username }),
                )
                .await;
        }

        removed.map(|_| ())
    }

    async fn persist(&self, session: &Session) -> Result<()> {
        let record = serde_json::to_string(session)?;
        self.storage.set(SESSION_KEY, &record).await
    }
}

fn parse_record(raw: &str) -> Option<Session> {
    serde_json::from_str::<Session>(raw)
        .ok()
        .filter(Session::is_well_formed)
}
