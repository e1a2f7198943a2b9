//! Database access for ayu-bt
//!
//! The service is the store of record for batches, submissions, photos,
//! verification records, the transition audit trail and notifications.

pub mod batches;
pub mod notifications;
pub mod photos;
pub mod submissions;
pub mod transitions;
pub mod verifications;

use ayu_common::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::SqlitePool;
use std::path::Path;
use uuid::Uuid;

/// Open the database in the root folder and create tables if needed
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    let pool = ayu_common::db::open_pool(db_path).await?;
    init_tables(&pool).await?;
    Ok(pool)
}

/// Create all ayu-bt tables (idempotent)
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS batches (
            batch_id TEXT PRIMARY KEY,
            farmer_id TEXT NOT NULL,
            farmer_name TEXT,
            species TEXT NOT NULL,
            visit_date TEXT NOT NULL,
            latitude REAL NOT NULL,
            longitude REAL NOT NULL,
            estimated_quantity REAL,
            current_stage INTEGER NOT NULL CHECK (current_stage BETWEEN 1 AND 5),
            completed_stages TEXT NOT NULL DEFAULT '[]',
            locked INTEGER NOT NULL DEFAULT 0,
            final_quantity REAL,
            harvest_date TEXT,
            final_latitude REAL,
            final_longitude REAL,
            final_photo_hash TEXT,
            created_by TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            version INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS stage_submissions (
            batch_id TEXT NOT NULL REFERENCES batches(batch_id),
            stage INTEGER NOT NULL CHECK (stage BETWEEN 2 AND 4),
            submitted INTEGER NOT NULL DEFAULT 0,
            notes TEXT,
            fields TEXT NOT NULL DEFAULT '{}',
            photo_ids TEXT NOT NULL DEFAULT '[]',
            submitted_by TEXT,
            submitted_at TEXT,
            PRIMARY KEY (batch_id, stage)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS photos (
            photo_id TEXT PRIMARY KEY,
            batch_id TEXT NOT NULL REFERENCES batches(batch_id),
            stage INTEGER NOT NULL,
            content_hash TEXT NOT NULL,
            size_bytes INTEGER NOT NULL,
            data BLOB NOT NULL,
            notes TEXT,
            uploaded_by TEXT NOT NULL,
            uploaded_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_photos_batch_stage ON photos(batch_id, stage, uploaded_at)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS verification_records (
            batch_id TEXT PRIMARY KEY REFERENCES batches(batch_id),
            photo_hash TEXT NOT NULL,
            is_verified INTEGER NOT NULL,
            predicted_species TEXT NOT NULL,
            expected_species TEXT,
            verified_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS stage_transitions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            batch_id TEXT NOT NULL REFERENCES batches(batch_id),
            from_stage INTEGER NOT NULL,
            to_phase TEXT NOT NULL,
            actor TEXT NOT NULL,
            role TEXT NOT NULL,
            at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS notifications (
            id TEXT PRIMARY KEY,
            recipient_id TEXT NOT NULL,
            title TEXT NOT NULL,
            message TEXT NOT NULL,
            category TEXT NOT NULL,
            read INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_notifications_recipient ON notifications(recipient_id, created_at)",
    )
    .execute(pool)
    .await?;

    ayu_common::auth::ensure_token_table(pool)
        .await
        .map_err(|e| ayu_common::Error::Internal(e.to_string()))?;

    Ok(())
}

// Column decoding helpers shared by the table modules

pub(crate) fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| ayu_common::Error::Internal(format!("Invalid UUID in database: {}", e)))
}

/// Fixed-width RFC 3339 so stored timestamps sort lexically
pub(crate) fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ayu_common::Error::Internal(format!("Invalid timestamp in database: {}", e)))
}

pub(crate) fn parse_json<T: serde::de::DeserializeOwned>(value: &str, column: &str) -> Result<T> {
    serde_json::from_str(value)
        .map_err(|e| ayu_common::Error::Internal(format!("Invalid {} in database: {}", column, e)))
}

pub(crate) fn to_json<T: serde::Serialize>(value: &T, column: &str) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|e| ayu_common::Error::Internal(format!("Failed to serialize {}: {}", column, e)))
}

pub(crate) fn stage_from_column(value: i64) -> Result<crate::models::Stage> {
    u8::try_from(value)
        .ok()
        .and_then(crate::models::Stage::from_number)
        .ok_or_else(|| ayu_common::Error::Internal(format!("Invalid stage in database: {}", value)))
}

#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    let pool = ayu_common::db::open_memory_pool().await.unwrap();
    init_tables(&pool).await.unwrap();
    pool
}
