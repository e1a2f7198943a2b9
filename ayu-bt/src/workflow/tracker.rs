//! Stage submission tracker
//!
//! Records farmer submissions for stages 2-4. The `submitted` flag is
//! idempotent: it only ever goes from false to true, while the evidence
//! payload is replaced on every re-submission.

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::db::submissions;
use crate::error::{BatchResult, ValidationError};
use crate::models::{Stage, StageEvidence, StageSubmission};

#[derive(Clone)]
pub struct StageSubmissionTracker {
    db: SqlitePool,
}

impl StageSubmissionTracker {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Record evidence for `(batch_id, stage)` and mark it submitted
    ///
    /// Returns `true` when this is the first submission for the pair.
    pub async fn record_submission(
        &self,
        batch_id: Uuid,
        stage: Stage,
        evidence: StageEvidence,
        submitted_by: &str,
    ) -> BatchResult<bool> {
        let mut conn = self.db.acquire().await?;
        self.record_submission_in(&mut conn, batch_id, stage, evidence, submitted_by)
            .await
    }

    /// Same as [`record_submission`](Self::record_submission), on the caller's
    /// connection or transaction
    pub async fn record_submission_in(
        &self,
        conn: &mut SqliteConnection,
        batch_id: Uuid,
        stage: Stage,
        evidence: StageEvidence,
        submitted_by: &str,
    ) -> BatchResult<bool> {
        ensure_tracked(stage)?;

        let first = !submissions::load_submission(&mut *conn, batch_id, stage)
            .await?
            .is_some_and(|s| s.submitted);
        let submission = StageSubmission {
            batch_id,
            stage,
            submitted: true,
            evidence,
            submitted_by: Some(submitted_by.to_string()),
            submitted_at: Some(ayu_common::time::now()),
        };
        submissions::upsert_submission(&mut *conn, &submission).await?;

        debug!(batch_id = %batch_id, stage = stage.number(), first, "Recorded stage submission");
        Ok(first)
    }

    /// False for pairs nobody has submitted for
    pub async fn is_submitted(&self, batch_id: Uuid, stage: Stage) -> BatchResult<bool> {
        Ok(self.evidence(batch_id, stage).await?.submitted)
    }

    /// Stored submission, or the unseen placeholder
    pub async fn evidence(&self, batch_id: Uuid, stage: Stage) -> BatchResult<StageSubmission> {
        ensure_tracked(stage)?;
        Ok(submissions::load_submission(&self.db, batch_id, stage)
            .await?
            .unwrap_or_else(|| StageSubmission::unseen(batch_id, stage)))
    }
}

fn ensure_tracked(stage: Stage) -> Result<(), ValidationError> {
    if !stage.requires_submission() {
        return Err(ValidationError::invalid(
            "stage",
            format!("submissions are only tracked for stages 2-4, got {}", stage.number()),
        ));
    }
    Ok(())
}
