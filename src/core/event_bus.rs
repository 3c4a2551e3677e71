//! Event bus for observable state changes
//!
//! UI collaborators subscribe here instead of polling the stores. It supports:
//! - Asynchronous event publishing and handling
//! - Multiple subscribers per event type
//! - Bounded event history with filtering
//! - Isolated error handling (one handler failure doesn't affect others)

use crate::catalog::lifecycle::OperationKind;
use crate::core::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Unique identifier for a subscription
pub type SubscriptionId = String;

/// Event structure containing all event information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub data: Value,
}

/// Types of events that can be published
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    // Session events
    SessionStarted,
    SessionEnded,
    SessionHydrated,

    // Request lifecycle events
    RequestStarted(OperationKind),
    RequestSucceeded(OperationKind),
    RequestFailed(OperationKind),
    RequestReset(OperationKind),

    // Collection events
    CollectionReplaced,
    SnapshotDiscarded,
    PageChanged,
}

/// Event handler function type
pub type EventHandler = Arc<
    dyn Fn(Event) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> + Send + Sync,
>;

#[derive(Clone)]
struct Subscriber {
    id: SubscriptionId,
    handler: EventHandler,
}

/// Filter for querying event history
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub event_types: Option<Vec<EventType>>,
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

/// Event bus for publish-subscribe pattern
pub struct EventBus {
    subscribers: Arc<RwLock<HashMap<EventType, Vec<Subscriber>>>>,
    event_log: Arc<RwLock<Vec<Event>>>,
    max_history: usize,
}

impl EventBus {
    /// Create a new event bus with default history size
    pub fn new() -> Self {
        Self::with_history_size(500)
    }

    /// Create a new event bus with specified history size
    pub fn with_history_size(max_history: usize) -> Self {
        Self {
            subscribers: Arc::new(RwLock::new(HashMap::new())),
            event_log: Arc::new(RwLock::new(Vec::new())),
            max_history,
        }
    }

    /// Subscribe to an event type with a handler
    ///
    /// Returns a subscription ID that can be used to unsubscribe
    pub async fn subscribe(&self, event_type: EventType, handler: EventHandler) -> SubscriptionId {
        let subscription_id = Uuid::new_v4().to_string();
        let subscriber = Subscriber {
            id: subscription_id.clone(),
            handler,
        };

        let mut subscribers = self.subscribers.write().await;
        subscribers
            .entry(event_type)
            .or_insert_with(Vec::new)
            .push(subscriber);

        subscription_id
    }

    /// Unsubscribe using a subscription ID. Returns false if it was unknown.
    pub async fn unsubscribe(&self, subscription_id: &str) -> bool {
        let mut subscribers = self.subscribers.write().await;

        for subs in subscribers.values_mut() {
            if let Some(pos) = subs.iter().position(|s| s.id == subscription_id) {
                subs.remove(pos);
                return true;
            }
        }

        false
    }

    /// Publish an event to all subscribers
    ///
    /// Handlers run concurrently; a failing handler is logged and does not
    /// affect the others.
    pub async fn publish(&self, event: Event) {
        {
            let mut log = self.event_log.write().await;
            log.push(event.clone());

            if log.len() > self.max_history {
                let excess = log.len() - self.max_history;
                log.drain(0..excess);
            }
        }

        let subscribers = {
            let subs = self.subscribers.read().await;
            subs.get(&event.event_type).cloned()
        };

        let Some(subscribers) = subscribers else {
            return;
        };

        let mut handles = Vec::with_capacity(subscribers.len());
        for subscriber in subscribers {
            let event_clone = event.clone();
            let handler = subscriber.handler.clone();
            let subscription_id = subscriber.id.clone();

            let handle = tokio::spawn(async move {
                if let Err(e) = handler(event_clone).await {
                    tracing::error!(
                        subscription_id = %subscriber.id,
                        error = %e,
                        "Event handler failed"
                    );
                }
            });
            handles.push((subscription_id, handle));
        }

        for (subscription_id, handle) in handles {
            if let Err(e) = handle.await {
                tracing::error!(
                    subscription_id = %subscription_id,
                    error = %e,
                    "Event handler panicked"
                );
            }
        }
    }

    /// Shorthand for publishing an event built from a type and payload
    pub async fn emit(&self, event_type: EventType, data: Value) {
        self.publish(Event::new(event_type, data)).await;
    }

    /// Get event history with optional filtering
    pub async fn history(&self, filter: EventFilter) -> Vec<Event> {
        let log = self.event_log.read().await;
        let mut events: Vec<Event> = log
            .iter()
            .filter(|e| {
                filter
                    .event_types
                    .as_ref()
                    .map_or(true, |types| types.contains(&e.event_type))
            })
            .filter(|e| filter.since.map_or(true, |since| e.timestamp >= since))
            .cloned()
            .collect();

        if let Some(limit) = filter.limit {
            events.truncate(limit);
        }

        events
    }

    /// Count recorded events of one type
    pub async fn count(&self, event_type: EventType) -> usize {
        let log = self.event_log.read().await;
        log.iter().filter(|e| e.event_type == event_type).count()
    }

    /// Clear event history
    pub async fn clear_history(&self) {
        let mut log = self.event_log.write().await;
        log.clear();
    }

    /// Get the number of subscribers for an event type
    pub async fn subscriber_count(&self, event_type: &EventType) -> usize {
        let subscribers = self.subscribers.read().await;
        subscribers.get(event_type).map(|s| s.len()).unwrap_or(0)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Event {
    /// Create a new event
    pub fn new(event_type: EventType, data: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            event_type,
            timestamp: Utc::now(),
            data,
        }
    }
}

impl EventFilter {
    /// Create a new empty filter
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter by event types
    pub fn with_event_types(mut self, event_types: Vec<EventType>) -> Self {
        self.event_types = Some(event_types);
        self
    }

    /// Only events at or after the given instant
    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    /// Limit number of results
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}
