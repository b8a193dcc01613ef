//! Filtered event broadcast between agents.
//!
//! Subscriptions carry type globs (`agent.*`, `*`) matched per
//! dot-separated segment. Delivery is non-blocking: each subscription owns
//! a bounded buffer; overflow drops the oldest undelivered event and bumps
//! the subscription's overflow counter. Events are ephemeral, never
//! persisted or replayed.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tracing::debug;

/// Per-subscription buffer bound. Overflow drops the oldest event.
pub const EVENT_BUFFER_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_type: String,

    #[serde(default)]
    pub payload: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_agent_id: Option<String>,

    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            payload: BTreeMap::new(),
            source_agent_id: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_payload(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    pub fn with_source(mut self, agent_id: impl Into<String>) -> Self {
        self.source_agent_id = Some(agent_id.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub subscriber_agent_id: String,
    pub subscriber_name: String,
    pub event_type_globs: Vec<String>,
    pub exclude_self: bool,
}

struct SubscriptionState {
    subscription: Subscription,
    buffer: Mutex<VecDeque<Event>>,
    overflow: AtomicU64,
    notify: Notify,
}

impl SubscriptionState {
    fn accepts(&self, event: &Event) -> bool {
        if self.subscription.exclude_self
            && event.source_agent_id.as_deref()
                == Some(self.subscription.subscriber_agent_id.as_str())
        {
            return false;
        }
        self.subscription
            .event_type_globs
            .iter()
            .any(|glob| glob_matches(glob, &event.event_type))
    }

    fn push(&self, event: Event) {
        let mut buffer = self.buffer.lock();
        if buffer.len() >= EVENT_BUFFER_CAPACITY {
            buffer.pop_front();
            self.overflow.fetch_add(1, Ordering::Relaxed);
        }
        buffer.push_back(event);
        drop(buffer);
        self.notify.notify_one();
    }
}

/// Handle for draining one subscription's buffer.
pub struct EventSubscriber {
    state: Arc<SubscriptionState>,
}

impl EventSubscriber {
    pub fn subscription_id(&self) -> &str {
        &self.state.subscription.id
    }

    /// Pop the next buffered event without waiting.
    pub fn try_recv(&self) -> Option<Event> {
        self.state.buffer.lock().pop_front()
    }

    /// Drain everything currently buffered, publish order preserved.
    pub fn recv_all(&self) -> Vec<Event> {
        let mut buffer = self.state.buffer.lock();
        buffer.drain(..).collect()
    }

    /// Wait for the next event. Delivery worker entry point.
    pub async fn recv(&self) -> Event {
        loop {
            if let Some(event) = self.try_recv() {
                return event;
            }
            self.state.notify.notified().await;
        }
    }

    pub fn pending_count(&self) -> usize {
        self.state.buffer.lock().len()
    }

    /// Events dropped from this subscription's buffer so far.
    pub fn overflow_count(&self) -> u64 {
        self.state.overflow.load(Ordering::Relaxed)
    }
}

#[derive(Default)]
pub struct EventBus {
    subscriptions: RwLock<HashMap<String, Arc<SubscriptionState>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(
        &self,
        subscriber_agent_id: impl Into<String>,
        subscriber_name: impl Into<String>,
        event_type_globs: Vec<String>,
        exclude_self: bool,
    ) -> EventSubscriber {
        let subscription = Subscription {
            id: uuid::Uuid::new_v4().to_string(),
            subscriber_agent_id: subscriber_agent_id.into(),
            subscriber_name: subscriber_name.into(),
            event_type_globs,
            exclude_self,
        };
        debug!(
            subscription_id = %subscription.id,
            subscriber = %subscription.subscriber_name,
            globs = ?subscription.event_type_globs,
            "Subscription created"
        );

        let state = Arc::new(SubscriptionState {
            subscription,
            buffer: Mutex::new(VecDeque::new()),
            overflow: AtomicU64::new(0),
            notify: Notify::new(),
        });
        self.subscriptions
            .write()
            .insert(state.subscription.id.clone(), Arc::clone(&state));

        EventSubscriber { state }
    }

    /// Idempotent: unknown ids are ignored.
    pub fn unsubscribe(&self, subscription_id: &str) {
        if self.subscriptions.write().remove(subscription_id).is_some() {
            debug!(subscription_id, "Subscription released");
        }
    }

    /// Non-blocking fan-out to every matching live subscription.
    pub fn publish(&self, event: Event) {
        let subscriptions = self.subscriptions.read();
        for state in subscriptions.values() {
            if state.accepts(&event) {
                state.push(event.clone());
            }
        }
    }

    /// Re-attach to an existing subscription's buffer by id.
    pub fn subscriber(&self, subscription_id: &str) -> Option<EventSubscriber> {
        self.subscriptions
            .read()
            .get(subscription_id)
            .map(|state| EventSubscriber {
                state: Arc::clone(state),
            })
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    pub fn stats(&self) -> BusStats {
        let subscriptions = self.subscriptions.read();
        BusStats {
            subscription_count: subscriptions.len(),
            total_pending_events: subscriptions
                .values()
                .map(|s| s.buffer.lock().len())
                .sum(),
            total_overflows: subscriptions
                .values()
                .map(|s| s.overflow.load(Ordering::Relaxed))
                .sum(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BusStats {
    pub subscription_count: usize,
    pub total_pending_events: usize,
    pub total_overflows: u64,
}

/// Shell-style `*` matching over dot-separated segments.
///
/// `agent.*` matches `agent.created` but not `agent`; a bare `*` matches
/// every type.
pub fn glob_matches(glob: &str, event_type: &str) -> bool {
    if glob == "*" {
        return true;
    }
    let glob_segments: Vec<&str> = glob.split('.').collect();
    let type_segments: Vec<&str> = event_type.split('.').collect();
    if glob_segments.len() != type_segments.len() {
        return false;
    }
    glob_segments
        .iter()
        .zip(type_segments.iter())
        .all(|(g, t)| segment_matches(g, t))
}

fn segment_matches(glob: &str, segment: &str) -> bool {
    if !glob.contains('*') {
        return glob == segment;
    }
    let parts: Vec<&str> = glob.split('*').collect();
    let mut remaining = segment;

    if let Some(first) = parts.first() {
        if !remaining.starts_with(first) {
            return false;
        }
        remaining = &remaining[first.len()..];
    }
    if let Some(last) = parts.last() {
        if parts.len() > 1 {
            if !remaining.ends_with(last) {
                return false;
            }
            remaining = &remaining[..remaining.len() - last.len()];
        }
    }
    for part in &parts[1..parts.len().saturating_sub(1)] {
        if part.is_empty() {
            continue;
        }
        match remaining.find(part) {
            Some(idx) => remaining = &remaining[idx + part.len()..],
            None => return false,
        }
    }
    true
}
