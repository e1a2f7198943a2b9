//! Domain models for batch traceability

pub mod batch;
pub mod notification;
pub mod submission;
pub mod verification;

pub use batch::{Batch, BatchPhase, FinalDetails, GeoTag, GeoTagInput, Species, Stage};
pub use notification::{Notification, NotificationCategory};
pub use submission::{StageEvidence, StageSubmission};
pub use verification::{VerificationRecord, VerificationResult};

use ayu_common::auth::Role;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stored photo evidence (bytes are kept separately)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoRecord {
    pub photo_id: Uuid,
    pub batch_id: Uuid,
    pub stage: Stage,
    pub content_hash: String,
    pub size_bytes: i64,
    pub notes: Option<String>,
    pub uploaded_by: String,
    pub uploaded_at: DateTime<Utc>,
}

/// Append-only audit entry for one applied transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageTransitionRecord {
    pub batch_id: Uuid,
    pub from_stage: Stage,
    pub to: BatchPhase,
    pub actor: String,
    pub role: Role,
    pub at: DateTime<Utc>,
}
