//! Stage submissions (farmer evidence for stages 2-4)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::Stage;

/// Evidence payload supplied with a submission
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageEvidence {
    #[serde(default)]
    pub notes: Option<String>,

    /// Stage-specific fields (plant height, pest observations, ...)
    #[serde(default)]
    pub fields: Map<String, Value>,

    /// Stored photos belonging to this submission
    #[serde(default)]
    pub photo_ids: Vec<Uuid>,
}

/// Submission state for one (batch, stage) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageSubmission {
    pub batch_id: Uuid,
    pub stage: Stage,
    /// Only ever moves false → true
    pub submitted: bool,
    pub evidence: StageEvidence,
    pub submitted_by: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
}

impl StageSubmission {
    /// The implicit record of a pair nobody has submitted for yet
    pub fn unseen(batch_id: Uuid, stage: Stage) -> Self {
        Self {
            batch_id,
            stage,
            submitted: false,
            evidence: StageEvidence::default(),
            submitted_by: None,
            submitted_at: None,
        }
    }
}
