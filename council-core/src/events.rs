//! LayerEvent system (§5, §6): a strictly ordered stream of events
//! describing a deliberation session's progress, delivered over a bounded
//! MPMC bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Event kinds emitted over the lifetime of one deliberation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    CouncilStarted,
    Stage1SlotStarted,
    Stage1SlotCompleted,
    Stage1Complete,
    Stage2SlotStarted,
    Stage2SlotCompleted,
    Stage2Complete,
    Stage3Started,
    Stage3Token,
    Stage3Complete,
    CouncilCompleted,
    CouncilFailed,
    DegradationNotice,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::CouncilStarted => "council.started",
            Self::Stage1SlotStarted => "stage1.slot.started",
            Self::Stage1SlotCompleted => "stage1.slot.completed",
            Self::Stage1Complete => "stage1.complete",
            Self::Stage2SlotStarted => "stage2.slot.started",
            Self::Stage2SlotCompleted => "stage2.slot.completed",
            Self::Stage2Complete => "stage2.complete",
            Self::Stage3Started => "stage3.started",
            Self::Stage3Token => "stage3.token",
            Self::Stage3Complete => "stage3.complete",
            Self::CouncilCompleted => "council.completed",
            Self::CouncilFailed => "council.failed",
            Self::DegradationNotice => "degradation.notice",
        };
        write!(f, "{s}")
    }
}

/// One event in a query's strictly ordered event stream (§5 "Ordering guarantees").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerEvent {
    pub query_id: String,
    /// Assigned from a single per-query counter under mutual exclusion;
    /// consumers observe a strict total order over this field.
    pub sequence: u64,
    pub kind: EventKind,
    pub stage: Option<String>,
    pub slot: Option<usize>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, Value>>,
}

impl LayerEvent {
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.get_or_insert_with(HashMap::new).insert(key.into(), value.into());
        self
    }
}

/// Monotonic per-query sequence counter.
#[derive(Debug, Default)]
pub struct SequenceCounter(AtomicU64);

impl SequenceCounter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst)
    }
}

/// Stamps successive events for one query with the next sequence number.
pub struct EventEmitter {
    query_id: String,
    counter: Arc<SequenceCounter>,
}

impl EventEmitter {
    pub fn new(query_id: impl Into<String>) -> Self {
        Self {
            query_id: query_id.into(),
            counter: Arc::new(SequenceCounter::new()),
        }
    }

    pub fn emit(&self, kind: EventKind, stage: Option<&str>, slot: Option<usize>) -> LayerEvent {
        LayerEvent {
            query_id: self.query_id.clone(),
            sequence: self.counter.next(),
            kind,
            stage: stage.map(str::to_string),
            slot,
            timestamp: Utc::now(),
            metadata: None,
        }
    }
}

/// Bounded multi-producer multi-consumer event bus (§5 "bounded buffer").
/// Delivery is at-least-once per live subscriber; a subscriber that falls
/// more than `capacity` events behind observes a lag and must resync from
/// the transcript rather than silently skipping events.
pub struct EventBus {
    sender: broadcast::Sender<LayerEvent>,
}

pub struct EventSubscription {
    receiver: broadcast::Receiver<LayerEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishing with no subscribers is not an error — the transcript
    /// writer persists events independently of whoever is watching live.
    pub fn publish(&self, event: LayerEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> EventSubscription {
        EventSubscription {
            receiver: self.sender.subscribe(),
        }
    }
}

impl EventSubscription {
    pub async fn recv(&mut self) -> Option<Result<LayerEvent, broadcast::error::RecvError>> {
        match self.receiver.recv().await {
            Ok(event) => Some(Ok(event)),
            Err(broadcast::error::RecvError::Closed) => None,
            Err(err) => Some(Err(err)),
        }
    }
}
