//! Realtime change notifications
//!
//! Every successful mutation on the platform is published to a
//! [`RealtimeHub`] as a [`ChangeEvent`]. Clients open a [`Channel`] with one
//! or more [`ChangeFilter`]s and receive only the events those filters
//! match. Delivery is a single tokio broadcast channel shared by all
//! subscribers; a subscriber that falls behind by more than the configured
//! capacity is told how many events it missed instead of silently losing
//! them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::RealtimeConfig;

/// Table-like collections that emit change events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Posts,
    Likes,
    Comments,
    Messages,
    Follows,
    Profiles,
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Posts => "posts",
            Self::Likes => "likes",
            Self::Comments => "comments",
            Self::Messages => "messages",
            Self::Follows => "follows",
            Self::Profiles => "profiles",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// One row-level change
///
/// `record` is the new row for inserts and updates and the old row for
/// deletes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub seq: u64,
    pub collection: Collection,
    pub kind: ChangeKind,
    pub record: Value,
    pub commit_timestamp: DateTime<Utc>,
}

impl ChangeEvent {
    /// The `id` column of the affected row
    pub fn record_id(&self) -> Option<Uuid> {
        self.field_uuid("id")
    }

    /// A UUID-valued column of the affected row
    pub fn field_uuid(&self, field: &str) -> Option<Uuid> {
        self.record
            .get(field)
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
    }
}

/// Row predicate evaluated against `ChangeEvent::record`
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Matches every row
    Any,
    Eq(String, Value),
    In(String, Vec<Value>),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
}

impl Predicate {
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Self::Eq(field.to_string(), value.into())
    }

    pub fn eq_id(field: &str, id: Uuid) -> Self {
        Self::eq(field, id.to_string())
    }

    pub fn is_in(field: &str, values: impl IntoIterator<Item = Value>) -> Self {
        Self::In(field.to_string(), values.into_iter().collect())
    }

    pub fn and(self, other: Predicate) -> Self {
        match self {
            Self::And(mut all) => {
                all.push(other);
                Self::And(all)
            }
            first => Self::And(vec![first, other]),
        }
    }

    pub fn or(self, other: Predicate) -> Self {
        match self {
            Self::Or(mut any) => {
                any.push(other);
                Self::Or(any)
            }
            first => Self::Or(vec![first, other]),
        }
    }

    pub fn matches(&self, record: &Value) -> bool {
        match self {
            Self::Any => true,
            Self::Eq(field, value) => record.get(field) == Some(value),
            Self::In(field, values) => record
                .get(field)
                .map(|v| values.contains(v))
                .unwrap_or(false),
            Self::And(all) => all.iter().all(|p| p.matches(record)),
            Self::Or(any) => any.iter().any(|p| p.matches(record)),
        }
    }
}

/// Subscription scope: one collection plus a row predicate
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeFilter {
    pub collection: Collection,
    pub predicate: Predicate,
}

impl ChangeFilter {
    /// Every change of a collection
    pub fn all(collection: Collection) -> Self {
        Self {
            collection,
            predicate: Predicate::Any,
        }
    }

    pub fn new(collection: Collection, predicate: Predicate) -> Self {
        Self {
            collection,
            predicate,
        }
    }

    pub fn matches(&self, event: &ChangeEvent) -> bool {
        self.collection == event.collection && self.predicate.matches(&event.record)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// The receiver fell behind and `n` events were dropped
    #[error("channel lagged behind by {0} events")]
    Lagged(u64),
    #[error("realtime hub closed")]
    Closed,
}

/// Fan-out point for change events
pub struct RealtimeHub {
    sender: broadcast::Sender<Arc<ChangeEvent>>,
    seq: AtomicU64,
    active: Arc<AtomicUsize>,
}

impl RealtimeHub {
    /// Create a hub whose subscribers can buffer `capacity` events
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            seq: AtomicU64::new(0),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn from_config(config: &RealtimeConfig) -> Self {
        Self::new(config.channel_capacity)
    }

    /// Publish a change and return its sequence number
    pub fn publish<T: Serialize>(&self, collection: Collection, kind: ChangeKind, record: &T) -> u64 {
        let record = serde_json::to_value(record).unwrap_or_else(|e| {
            warn!("Failed to serialize {} change record: {}", collection, e);
            Value::Null
        });

        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let event = ChangeEvent {
            seq,
            collection,
            kind,
            record,
            commit_timestamp: Utc::now(),
        };

        // No receivers is not an error: nobody is listening yet
        let delivered = self.sender.send(Arc::new(event)).unwrap_or(0);
        debug!(
            "Published {:?} on {} (seq {}, {} receivers)",
            kind, collection, seq, delivered
        );

        seq
    }

    /// Open a channel delivering events that match any of `filters`
    pub fn channel(&self, name: impl Into<String>, filters: Vec<ChangeFilter>) -> Channel {
        let name = name.into();
        let receiver = self.sender.subscribe();
        let open = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Opened realtime channel '{}' ({} active)", name, open);

        Channel {
            name,
            filters,
            receiver,
            active: Arc::clone(&self.active),
        }
    }

    /// Number of channels currently open
    pub fn active_channels(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Sequence number of the latest published event
    pub fn last_seq(&self) -> u64 {
        self.seq.load(Ordering::SeqCst)
    }
}

/// A filtered subscription; closing happens on drop
pub struct Channel {
    name: String,
    filters: Vec<ChangeFilter>,
    receiver: broadcast::Receiver<Arc<ChangeEvent>>,
    active: Arc<AtomicUsize>,
}

impl Channel {
    pub fn name(&self) -> &str {
        &self.name
    }

    fn accepts(&self, event: &ChangeEvent) -> bool {
        self.filters.iter().any(|f| f.matches(event))
    }

    /// Wait for the next matching event
    pub async fn recv(&mut self) -> Result<Arc<ChangeEvent>, ChannelError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.accepts(&event) => return Ok(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Realtime channel '{}' lagged by {} events", self.name, n);
                    return Err(ChannelError::Lagged(n));
                }
                Err(broadcast::error::RecvError::Closed) => return Err(ChannelError::Closed),
            }
        }
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        let left = self.active.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        debug!("Closed realtime channel '{}' ({} active)", self.name, left);
    }
}
