//! Event types for the AyuSethu event system
//!
//! Provides the shared event enum and the EventBus used to fan events out to
//! SSE clients and other in-process listeners.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// AyuSethu event types
///
/// Events are broadcast via EventBus and serialized for SSE transmission.
/// Stages are carried as plain numbers (1-5) so that every consumer can decode
/// them without depending on the batch service crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AyuEvent {
    /// A batch was created at stage 1
    BatchCreated {
        batch_id: Uuid,
        farmer_id: String,
        species: String,
        created_by: String,
        timestamp: DateTime<Utc>,
    },

    /// Batch creation succeeded but its Stage-1 photo could not be stored
    ///
    /// The batch stays at stage 1 until the photo is uploaded again.
    Stage1PhotoMissing {
        batch_id: Uuid,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// Upstream party (farmer) submitted evidence for a stage
    StageSubmitted {
        batch_id: Uuid,
        stage: u8,
        submitted_by: String,
        timestamp: DateTime<Utc>,
    },

    /// Batch advanced from one stage to the next
    StageAdvanced {
        batch_id: Uuid,
        from_stage: u8,
        to_stage: u8,
        actor: String,
        timestamp: DateTime<Utc>,
    },

    /// Leaf verification finished (either outcome)
    LeafVerified {
        batch_id: Uuid,
        matched: bool,
        predicted_species: String,
        photo_hash: String,
        timestamp: DateTime<Utc>,
    },

    /// A previously verified Stage-5 photo no longer counts as verified
    VerificationReset {
        batch_id: Uuid,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// Stage 5 completed; the batch is immutable from now on
    BatchLocked {
        batch_id: Uuid,
        actor: String,
        timestamp: DateTime<Utc>,
    },

    /// A notification was stored for a user
    NotificationCreated {
        notification_id: Uuid,
        recipient_id: String,
        title: String,
        timestamp: DateTime<Utc>,
    },
}

impl AyuEvent {
    /// Event name, used as the SSE `event:` field
    pub fn event_type(&self) -> &str {
        match self {
            AyuEvent::BatchCreated { .. } => "BatchCreated",
            AyuEvent::Stage1PhotoMissing { .. } => "Stage1PhotoMissing",
            AyuEvent::StageSubmitted { .. } => "StageSubmitted",
            AyuEvent::StageAdvanced { .. } => "StageAdvanced",
            AyuEvent::LeafVerified { .. } => "LeafVerified",
            AyuEvent::VerificationReset { .. } => "VerificationReset",
            AyuEvent::BatchLocked { .. } => "BatchLocked",
            AyuEvent::NotificationCreated { .. } => "NotificationCreated",
        }
    }

    /// Batch the event refers to, if any
    pub fn batch_id(&self) -> Option<Uuid> {
        match self {
            AyuEvent::BatchCreated { batch_id, .. }
            | AyuEvent::Stage1PhotoMissing { batch_id, .. }
            | AyuEvent::StageSubmitted { batch_id, .. }
            | AyuEvent::StageAdvanced { batch_id, .. }
            | AyuEvent::LeafVerified { batch_id, .. }
            | AyuEvent::VerificationReset { batch_id, .. }
            | AyuEvent::BatchLocked { batch_id, .. } => Some(*batch_id),
            AyuEvent::NotificationCreated { .. } => None,
        }
    }
}

/// Broadcast bus for AyuEvents
///
/// Cloning is cheap; all clones share the same channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AyuEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with the given channel capacity
    ///
    /// Slow subscribers lose the oldest events once `capacity` is exceeded.
    ///
    /// ```
    /// use ayu_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(100);
    /// assert_eq!(event_bus.capacity(), 100);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<AyuEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: AyuEvent) -> Result<usize, broadcast::error::SendError<AyuEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: AyuEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
