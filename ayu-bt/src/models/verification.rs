//! Leaf verification outcome and the Stage-5 verification record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Result of one call to the leaf verification gate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    #[serde(rename = "match")]
    pub matched: bool,
    pub predicted_species: String,
    pub expected_species: Option<String>,
    /// Content hash of the photo that was sent for classification
    pub photo_hash: String,
}

/// Persisted verification state of a batch (one per batch, Stage 5 only)
///
/// `is_verified` is only true while the photo bound by `photo_hash` is the
/// photo that will be submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationRecord {
    pub batch_id: Uuid,
    pub photo_hash: String,
    pub is_verified: bool,
    pub predicted_species: String,
    pub expected_species: Option<String>,
    pub verified_at: DateTime<Utc>,
}
