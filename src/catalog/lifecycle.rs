//! Request lifecycle tracking
//!
//! Every operation kind owns one small state machine:
//!
//! ```text
//! idle | succeeded | failed --start--> loading
//! loading --succeed--> succeeded
//! loading --fail-----> failed
//! any --reset--> idle
//! ```
//!
//! At most one request per kind is in flight; a second `start` while loading
//! is rejected and leaves the state untouched. `start` hands out a
//! `RequestToken`, and only the holder of the current token may settle the
//! lifecycle. A reset retires the outstanding token, so a late outcome of a
//! request that was reset away cannot settle the request started after it.

use crate::core::error::{CatalogError, Result};
use crate::core::event_bus::{EventBus, EventType};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Kinds of operations tracked independently
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    FetchList,
    FilteredFetch,
    Create,
    Edit,
    Delete,
}

impl OperationKind {
    pub const ALL: [OperationKind; 5] = [
        OperationKind::FetchList,
        OperationKind::FilteredFetch,
        OperationKind::Create,
        OperationKind::Edit,
        OperationKind::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::FetchList => "fetch_list",
            OperationKind::FilteredFetch => "filtered_fetch",
            OperationKind::Create => "create",
            OperationKind::Edit => "edit",
            OperationKind::Delete => "delete",
        }
    }

    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            OperationKind::Create | OperationKind::Edit | OperationKind::Delete
        )
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestPhase {
    #[default]
    Idle,
    Loading,
    Succeeded,
    Failed,
}

impl RequestPhase {
    pub fn as_str(&self) -> &str {
        match self {
            RequestPhase::Idle => "idle",
            RequestPhase::Loading => "loading",
            RequestPhase::Succeeded => "succeeded",
            RequestPhase::Failed => "failed",
        }
    }
}

impl fmt::Display for RequestPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observable state of one operation kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestState {
    pub phase: RequestPhase,
    pub error_message: Option<String>,
}

impl RequestState {
    pub fn is_loading(&self) -> bool {
        self.phase == RequestPhase::Loading
    }
}

/// Identifies one started request of a kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestToken {
    kind: OperationKind,
    generation: u64,
}

impl RequestToken {
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// State machine for a single operation kind
pub struct RequestLifecycle {
    kind: OperationKind,
    state: watch::Sender<RequestState>,
    // Only changed while the watch lock is held
    generation: AtomicU64,
    notice_pending: AtomicBool,
}

impl RequestLifecycle {
    pub fn new(kind: OperationKind) -> Self {
        let (state, _) = watch::channel(RequestState::default());
        Self {
            kind,
            state,
            generation: AtomicU64::new(0),
            notice_pending: AtomicBool::new(false),
        }
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Current state snapshot
    pub fn state(&self) -> RequestState {
        self.state.borrow().clone()
    }

    pub fn phase(&self) -> RequestPhase {
        self.state.borrow().phase
    }

    /// Observe state changes
    pub fn subscribe(&self) -> watch::Receiver<RequestState> {
        self.state.subscribe()
    }

    /// Enter `loading`. Rejected if a request of this kind is already in flight.
    pub fn start(&self) -> Result<RequestToken> {
        let mut generation = None;
        self.state.send_if_modified(|state| {
            if state.is_loading() {
                return false;
            }
            state.phase = RequestPhase::Loading;
            generation = Some(self.generation.fetch_add(1, Ordering::SeqCst) + 1);
            true
        });

        let generation = generation.ok_or(CatalogError::ConcurrencyRejection(self.kind))?;

        // A retry supersedes any unread failure notice.
        self.notice_pending.store(false, Ordering::SeqCst);
        Ok(RequestToken {
            kind: self.kind,
            generation,
        })
    }

    /// Whether `token` belongs to the request currently allowed to settle
    pub fn is_current(&self, token: RequestToken) -> bool {
        token.kind == self.kind && token.generation == self.generation.load(Ordering::SeqCst)
    }

    /// `loading -> succeeded`, clearing the last error message
    pub fn succeed(&self, token: RequestToken) -> Result<()> {
        self.settle(token, "succeed", |state| {
            state.phase = RequestPhase::Succeeded;
            state.error_message = None;
        })
    }

    /// `loading -> failed`, recording a human-readable message
    pub fn fail(&self, token: RequestToken, message: impl Into<String>) -> Result<()> {
        let message = message.into();
        self.settle(token, "fail", move |state| {
            state.phase = RequestPhase::Failed;
            state.error_message = Some(message);
        })?;
        self.notice_pending.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Force the lifecycle back to `idle` from any phase, retiring the
    /// token of any request still in flight
    pub fn reset(&self) -> RequestPhase {
        let mut previous = RequestPhase::Idle;
        self.state.send_modify(|state| {
            self.generation.fetch_add(1, Ordering::SeqCst);
            previous = state.phase;
            *state = RequestState::default();
        });
        self.notice_pending.store(false, Ordering::SeqCst);
        previous
    }

    /// The message of the latest failure, handed out once
    pub fn take_notice(&self) -> Option<String> {
        if self.notice_pending.swap(false, Ordering::SeqCst) {
            self.state.borrow().error_message.clone()
        } else {
            None
        }
    }

    /// Suspend until no request of this kind is in flight
    pub async fn wait_until_settled(&self) -> RequestState {
        let mut receiver = self.state.subscribe();
        let state = match receiver.wait_for(|state| !state.is_loading()).await {
            Ok(state) => state.clone(),
            // The sender lives in self, so the channel cannot close here.
            Err(_) => self.state(),
        };
        state
    }

    fn settle<F>(&self, token: RequestToken, action: &str, apply: F) -> Result<()>
    where
        F: FnOnce(&mut RequestState),
    {
        let mut from = RequestPhase::Loading;
        let mut stale = false;
        let settled = self.state.send_if_modified(|state| {
            if !self.is_current(token) {
                stale = true;
                return false;
            }
            if !state.is_loading() {
                from = state.phase;
                return false;
            }
            apply(state);
            true
        });

        if settled {
            Ok(())
        } else if stale {
            Err(CatalogError::InvalidTransition(format!(
                "cannot {} {}: request {} was superseded",
                action, self.kind, token.generation
            )))
        } else {
            Err(CatalogError::InvalidTransition(format!(
                "cannot {} {} while {}",
                action, self.kind, from
            )))
        }
    }
}

/// One lifecycle per operation kind, publishing every transition
pub struct RequestTracker {
    fetch_list: RequestLifecycle,
    filtered_fetch: RequestLifecycle,
    create: RequestLifecycle,
    edit: RequestLifecycle,
    delete: RequestLifecycle,
    events: Arc<EventBus>,
}

impl RequestTracker {
    pub fn new(events: Arc<EventBus>) -> Self {
        Self {
            fetch_list: RequestLifecycle::new(OperationKind::FetchList),
            filtered_fetch: RequestLifecycle::new(OperationKind::FilteredFetch),
            create: RequestLifecycle::new(OperationKind::Create),
            edit: RequestLifecycle::new(OperationKind::Edit),
            delete: RequestLifecycle::new(OperationKind::Delete),
            events,
        }
    }

    pub fn lifecycle(&self, kind: OperationKind) -> &RequestLifecycle {
        match kind {
            OperationKind::FetchList => &self.fetch_list,
            OperationKind::FilteredFetch => &self.filtered_fetch,
            OperationKind::Create => &self.create,
            OperationKind::Edit => &self.edit,
            OperationKind::Delete => &self.delete,
        }
    }

    pub fn state(&self, kind: OperationKind) -> RequestState {
        self.lifecycle(kind).state()
    }

    /// States of every kind, in declaration order
    pub fn snapshot(&self) -> Vec<(OperationKind, RequestState)> {
        OperationKind::ALL
            .iter()
            .map(|kind| (*kind, self.state(*kind)))
            .collect()
    }

    pub fn subscribe(&self, kind: OperationKind) -> watch::Receiver<RequestState> {
        self.lifecycle(kind).subscribe()
    }

    pub fn take_notice(&self, kind: OperationKind) -> Option<String> {
        self.lifecycle(kind).take_notice()
    }

    pub async fn start(&self, kind: OperationKind) -> Result<RequestToken> {
        let token = match self.lifecycle(kind).start() {
            Ok(token) => token,
            Err(e) => {
                debug!(kind = %kind, "Rejected start while a request is in flight");
                return Err(e);
            }
        };

        debug!(kind = %kind, request = token.generation, "Request started");
        self.events
            .emit(EventType::RequestStarted(kind), json!({ "kind": kind }))
            .await;
        Ok(token)
    }

    pub async fn succeed(&self, token: RequestToken) -> Result<()> {
        let kind = token.kind;
        self.lifecycle(kind).succeed(token)?;

        debug!(kind = %kind, request = token.generation, "Request succeeded");
        self.events
            .emit(EventType::RequestSucceeded(kind), json!({ "kind": kind }))
            .await;
        Ok(())
    }

    pub async fn fail(&self, token: RequestToken, error: &CatalogError) -> Result<()> {
        let kind = token.kind;
        let message = error.user_message();
        self.lifecycle(kind).fail(token, message.clone())?;

        warn!(kind = %kind, error = %error, "Request failed");
        self.events
            .emit(
                EventType::RequestFailed(kind),
                json!({ "kind": kind, "message": message }),
            )
            .await;
        Ok(())
    }

    /// Settle the request identified by `token` from its outcome.
    ///
    /// A request that was reset away while in flight can no longer settle
    /// its kind; that is logged and otherwise ignored.
    pub async fn complete<T: Sync>(&self, token: RequestToken, result: &Result<T>) {
        let settled = match result {
            Ok(_) => self.succeed(token).await,
            Err(e) => self.fail(token, e).await,
        };
        if let Err(e) = settled {
            debug!(kind = %token.kind, error = %e, "Request outcome arrived after a reset");
        }
    }

    pub async fn reset(&self, kind: OperationKind) {
        let previous = self.lifecycle(kind).reset();
        self.events
            .emit(
                EventType::RequestReset(kind),
                json!({ "kind": kind, "previous": previous }),
            )
            .await;
    }

    pub async fn reset_all(&self) {
        for kind in OperationKind::ALL {
            self.reset(kind).await;
        }
    }

    pub async fn wait_until_settled(&self, kind: OperationKind) -> RequestState {
        self.lifecycle(kind).wait_until_settled().await
    }
}
