//! In-memory correlation of requests with their eventual responses.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Opaque token correlating one request with one response.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(String);

impl CallId {
    /// A fresh identifier that is never handed out twice.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CallId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for CallId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for CallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A request whose response has not arrived yet. Payloads are stored
/// already redacted.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCall {
    pub created_at: DateTime<Utc>,
    /// None when the call was opened from a deferred response and the
    /// request itself was never seen.
    pub request: Option<Value>,
    pub translated_request: Option<Value>,
    pub origin: String,
}

impl PendingCall {
    pub fn new(request: Option<Value>, translated_request: Option<Value>, origin: &str) -> Self {
        Self {
            created_at: Utc::now(),
            request,
            translated_request,
            origin: origin.to_string(),
        }
    }

    fn expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        older_than(self.created_at, now, ttl)
    }
}

/// Map from [`CallId`] to [`PendingCall`].
///
/// Every operation holds the same lock, so a concurrent insert/insert pair
/// for one id has exactly one winner and a removed entry cannot come back
/// through a racing lookup. Ids that left the map by being taken are
/// remembered as settled and refused by later inserts.
///
/// Without a TTL nothing is ever evicted: a call whose response never
/// arrives stays here for the life of the store, and so does every settled
/// id.
#[derive(Debug, Default)]
pub struct CorrelationStore {
    state: Mutex<StoreState>,
    ttl: Option<Duration>,
}

#[derive(Debug, Default)]
struct StoreState {
    pending: HashMap<CallId, PendingCall>,
    settled: HashMap<CallId, DateTime<Utc>>,
}

impl StoreState {
    fn settle(&mut self, id: &CallId) {
        self.settled.insert(id.clone(), Utc::now());
    }
}

impl CorrelationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that forgets pending calls and settled ids older than `ttl`
    /// whenever a new call is inserted.
    pub fn with_ttl(ttl: Option<Duration>) -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
            ttl,
        }
    }

    /// Insert `call` under `id` unless `id` is pending or already settled.
    ///
    /// Returns false (and leaves the store untouched) when refused.
    pub fn insert(&self, id: CallId, call: PendingCall) -> bool {
        let mut state = self.state.lock();
        if let Some(ttl) = self.ttl {
            sweep(&mut state, ttl);
        }
        if state.settled.contains_key(&id) {
            return false;
        }
        match state.pending.entry(id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(call);
                true
            }
        }
    }

    pub fn get(&self, id: &CallId) -> Option<PendingCall> {
        self.state.lock().pending.get(id).cloned()
    }

    pub fn contains(&self, id: &CallId) -> bool {
        self.state.lock().pending.contains_key(id)
    }

    /// Whether `id` was pending once and has since been taken.
    pub fn is_settled(&self, id: &CallId) -> bool {
        self.state.lock().settled.contains_key(id)
    }

    /// Remove `id`; removing an absent id is a no-op. A removed id is settled.
    pub fn remove(&self, id: &CallId) -> Option<PendingCall> {
        let mut state = self.state.lock();
        let call = state.pending.remove(id);
        if call.is_some() {
            state.settle(id);
        }
        call
    }

    /// Atomic get-and-remove. Of two racing callers, only one receives the call.
    pub fn take(&self, id: &CallId) -> Option<PendingCall> {
        self.remove(id)
    }

    /// Remove `id` if pending and settle it either way.
    ///
    /// For a call that was completed without ever going through the map.
    pub fn retire(&self, id: &CallId) -> Option<PendingCall> {
        let mut state = self.state.lock();
        let call = state.pending.remove(id);
        state.settle(id);
        call
    }

    /// Drop calls and settled ids older than the configured TTL. Returns how
    /// many pending calls were dropped.
    pub fn sweep_expired(&self) -> usize {
        match self.ttl {
            Some(ttl) => sweep(&mut self.state.lock(), ttl),
            None => 0,
        }
    }

    /// Number of pending calls.
    pub fn len(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().pending.is_empty()
    }
}

fn sweep(state: &mut StoreState, ttl: Duration) -> usize {
    let now = Utc::now();
    let before = state.pending.len();
    state.pending.retain(|_, call| !call.expired(now, ttl));
    state.settled.retain(|_, at| !older_than(*at, now, ttl));
    let dropped = before - state.pending.len();
    if dropped > 0 {
        tracing::debug!(dropped, "Evicted expired pending calls");
    }
    dropped
}

fn older_than(at: DateTime<Utc>, now: DateTime<Utc>, ttl: Duration) -> bool {
    (now - at).to_std().map(|age| age > ttl).unwrap_or(false)
}
