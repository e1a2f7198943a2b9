//! Stage submission persistence

use ayu_common::Result;
use sqlx::{Executor, Row, Sqlite};
use uuid::Uuid;

use super::{format_timestamp, parse_json, parse_timestamp, to_json};
use crate::models::{Stage, StageEvidence, StageSubmission};

/// Insert or replace the submission for `(batch_id, stage)`
///
/// Evidence is overwritten; the `submitted` flag never goes back to false.
pub async fn upsert_submission<'e, E>(db: E, submission: &StageSubmission) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    let fields = to_json(&submission.evidence.fields, "fields")?;
    let photo_ids = to_json(&submission.evidence.photo_ids, "photo_ids")?;

    sqlx::query(
        r#"
        INSERT INTO stage_submissions (
            batch_id, stage, submitted, notes, fields, photo_ids, submitted_by, submitted_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(batch_id, stage) DO UPDATE SET
            submitted = MAX(stage_submissions.submitted, excluded.submitted),
            notes = excluded.notes,
            fields = excluded.fields,
            photo_ids = excluded.photo_ids,
            submitted_by = excluded.submitted_by,
            submitted_at = excluded.submitted_at
        "#,
    )
    .bind(submission.batch_id.to_string())
    .bind(submission.stage.number() as i64)
    .bind(submission.submitted)
    .bind(&submission.evidence.notes)
    .bind(fields)
    .bind(photo_ids)
    .bind(&submission.submitted_by)
    .bind(submission.submitted_at.as_ref().map(format_timestamp))
    .execute(db)
    .await?;

    Ok(())
}

/// Load the submission for `(batch_id, stage)`, if one was ever recorded
pub async fn load_submission<'e, E>(
    db: E,
    batch_id: Uuid,
    stage: Stage,
) -> Result<Option<StageSubmission>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(
        r#"
        SELECT submitted, notes, fields, photo_ids, submitted_by, submitted_at
        FROM stage_submissions
        WHERE batch_id = ? AND stage = ?
        "#,
    )
    .bind(batch_id.to_string())
    .bind(stage.number() as i64)
    .fetch_optional(db)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let fields: String = row.get("fields");
    let photo_ids: String = row.get("photo_ids");
    let submitted_at: Option<String> = row.get("submitted_at");

    Ok(Some(StageSubmission {
        batch_id,
        stage,
        submitted: row.get("submitted"),
        evidence: StageEvidence {
            notes: row.get("notes"),
            fields: parse_json(&fields, "fields")?,
            photo_ids: parse_json(&photo_ids, "photo_ids")?,
        },
        submitted_by: row.get("submitted_by"),
        submitted_at: submitted_at.as_deref().map(parse_timestamp).transpose()?,
    }))
}
