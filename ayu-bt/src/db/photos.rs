//! Photo evidence persistence
//!
//! Photos are stored as blobs next to their content hash.

use ayu_common::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, Row, Sqlite, SqlitePool};
use uuid::Uuid;

use super::{format_timestamp, parse_timestamp, parse_uuid, stage_from_column};
use crate::models::{PhotoRecord, Stage};

pub async fn insert_photo<'e, E>(db: E, photo: &PhotoRecord, data: &[u8]) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO photos (
            photo_id, batch_id, stage, content_hash, size_bytes, data, notes,
            uploaded_by, uploaded_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(photo.photo_id.to_string())
    .bind(photo.batch_id.to_string())
    .bind(photo.stage.number() as i64)
    .bind(&photo.content_hash)
    .bind(photo.size_bytes)
    .bind(data)
    .bind(&photo.notes)
    .bind(&photo.uploaded_by)
    .bind(format_timestamp(&photo.uploaded_at))
    .execute(db)
    .await?;

    Ok(())
}

/// Photos of one stage, oldest first
pub async fn list_photos(pool: &SqlitePool, batch_id: Uuid, stage: Stage) -> Result<Vec<PhotoRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT photo_id, batch_id, stage, content_hash, size_bytes, notes, uploaded_by, uploaded_at
        FROM photos
        WHERE batch_id = ? AND stage = ?
        ORDER BY uploaded_at ASC, rowid ASC
        "#,
    )
    .bind(batch_id.to_string())
    .bind(stage.number() as i64)
    .fetch_all(pool)
    .await?;

    rows.iter().map(photo_from_row).collect()
}

/// Most recent photo of one stage together with its bytes
pub async fn latest_photo(
    pool: &SqlitePool,
    batch_id: Uuid,
    stage: Stage,
) -> Result<Option<(PhotoRecord, Vec<u8>)>> {
    let row = sqlx::query(
        r#"
        SELECT photo_id, batch_id, stage, content_hash, size_bytes, data, notes,
               uploaded_by, uploaded_at
        FROM photos
        WHERE batch_id = ? AND stage = ?
        ORDER BY uploaded_at DESC, rowid DESC
        LIMIT 1
        "#,
    )
    .bind(batch_id.to_string())
    .bind(stage.number() as i64)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => {
            let data: Vec<u8> = row.get("data");
            Ok(Some((photo_from_row(&row)?, data)))
        }
        None => Ok(None),
    }
}

fn photo_from_row(row: &SqliteRow) -> Result<PhotoRecord> {
    let photo_id: String = row.get("photo_id");
    let batch_id: String = row.get("batch_id");
    let stage: i64 = row.get("stage");
    let uploaded_at: String = row.get("uploaded_at");

    Ok(PhotoRecord {
        photo_id: parse_uuid(&photo_id)?,
        batch_id: parse_uuid(&batch_id)?,
        stage: stage_from_column(stage)?,
        content_hash: row.get("content_hash"),
        size_bytes: row.get("size_bytes"),
        notes: row.get("notes"),
        uploaded_by: row.get("uploaded_by"),
        uploaded_at: parse_timestamp(&uploaded_at)?,
    })
}
