//! Verification record persistence (one row per batch)

use ayu_common::Result;
use sqlx::{Executor, Row, Sqlite, SqlitePool};
use uuid::Uuid;

use super::{format_timestamp, parse_timestamp};
use crate::models::VerificationRecord;

/// Replace the batch's verification record
pub async fn upsert_record<'e, E>(db: E, record: &VerificationRecord) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO verification_records (
            batch_id, photo_hash, is_verified, predicted_species, expected_species, verified_at
        ) VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(batch_id) DO UPDATE SET
            photo_hash = excluded.photo_hash,
            is_verified = excluded.is_verified,
            predicted_species = excluded.predicted_species,
            expected_species = excluded.expected_species,
            verified_at = excluded.verified_at
        "#,
    )
    .bind(record.batch_id.to_string())
    .bind(&record.photo_hash)
    .bind(record.is_verified)
    .bind(&record.predicted_species)
    .bind(&record.expected_species)
    .bind(format_timestamp(&record.verified_at))
    .execute(db)
    .await?;

    Ok(())
}

pub async fn load_record(pool: &SqlitePool, batch_id: Uuid) -> Result<Option<VerificationRecord>> {
    let row = sqlx::query(
        r#"
        SELECT photo_hash, is_verified, predicted_species, expected_species, verified_at
        FROM verification_records
        WHERE batch_id = ?
        "#,
    )
    .bind(batch_id.to_string())
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let verified_at: String = row.get("verified_at");
    Ok(Some(VerificationRecord {
        batch_id,
        photo_hash: row.get("photo_hash"),
        is_verified: row.get("is_verified"),
        predicted_species: row.get("predicted_species"),
        expected_species: row.get("expected_species"),
        verified_at: parse_timestamp(&verified_at)?,
    }))
}

/// Drop verified state; returns whether a verified record was reset
pub async fn reset_verification<'e, E>(db: E, batch_id: Uuid) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        "UPDATE verification_records SET is_verified = 0 WHERE batch_id = ? AND is_verified = 1",
    )
    .bind(batch_id.to_string())
    .execute(db)
    .await?;

    Ok(result.rows_affected() > 0)
}
