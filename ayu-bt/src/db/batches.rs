//! Batch persistence
//!
//! Every update is guarded by the `version` column: the row is only written
//! when its version still equals the version the caller loaded.

use ayu_common::auth::{AuthContext, Role};
use ayu_common::Result;
use chrono::{NaiveDate, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, Row, Sqlite, SqlitePool};
use std::collections::BTreeSet;
use uuid::Uuid;

use super::{format_timestamp, parse_json, parse_timestamp, parse_uuid, stage_from_column, to_json};
use crate::models::{Batch, FinalDetails, GeoTag, Stage};

const BATCH_COLUMNS: &str = r#"
    batch_id, farmer_id, farmer_name, species, visit_date, latitude, longitude,
    estimated_quantity, current_stage, completed_stages, locked,
    final_quantity, harvest_date, final_latitude, final_longitude, final_photo_hash,
    created_by, created_at, updated_at, version
"#;

/// Insert a newly created batch
pub async fn insert_batch<'e, E>(db: E, batch: &Batch) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    let completed = to_json(&batch.completed_stages, "completed_stages")?;

    sqlx::query(
        r#"
        INSERT INTO batches (
            batch_id, farmer_id, farmer_name, species, visit_date, latitude, longitude,
            estimated_quantity, current_stage, completed_stages, locked,
            created_by, created_at, updated_at, version
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(batch.batch_id.to_string())
    .bind(&batch.farmer_id)
    .bind(&batch.farmer_name)
    .bind(batch.species.as_str())
    .bind(batch.visit_date.to_string())
    .bind(batch.geotag.latitude)
    .bind(batch.geotag.longitude)
    .bind(batch.estimated_quantity)
    .bind(batch.current_stage.number() as i64)
    .bind(completed)
    .bind(batch.locked)
    .bind(&batch.created_by)
    .bind(format_timestamp(&batch.created_at))
    .bind(format_timestamp(&batch.updated_at))
    .bind(batch.version)
    .execute(db)
    .await?;

    Ok(())
}

/// Load one batch
pub async fn load_batch(pool: &SqlitePool, batch_id: Uuid) -> Result<Option<Batch>> {
    let query = format!("SELECT {} FROM batches WHERE batch_id = ?", BATCH_COLUMNS);
    let row = sqlx::query(&query)
        .bind(batch_id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(batch_from_row).transpose()
}

/// Persist `batch` if the stored version still equals `batch.version`
///
/// Returns the stored batch with its bumped version and update time. A lost
/// race yields `Error::Conflict`; nothing is written in that case.
pub async fn update_batch<'e, E>(db: E, batch: &Batch) -> Result<Batch>
where
    E: Executor<'e, Database = Sqlite>,
{
    let completed = to_json(&batch.completed_stages, "completed_stages")?;
    let updated_at = Utc::now();
    let details = batch.final_details.as_ref();

    let result = sqlx::query(
        r#"
        UPDATE batches SET
            current_stage = ?,
            completed_stages = ?,
            locked = ?,
            final_quantity = ?,
            harvest_date = ?,
            final_latitude = ?,
            final_longitude = ?,
            final_photo_hash = ?,
            updated_at = ?,
            version = version + 1
        WHERE batch_id = ? AND version = ?
        "#,
    )
    .bind(batch.current_stage.number() as i64)
    .bind(completed)
    .bind(batch.locked)
    .bind(details.map(|d| d.final_quantity))
    .bind(details.map(|d| d.harvest_date.to_string()))
    .bind(details.map(|d| d.final_geotag.latitude))
    .bind(details.map(|d| d.final_geotag.longitude))
    .bind(details.map(|d| d.final_photo_hash.clone()))
    .bind(format_timestamp(&updated_at))
    .bind(batch.batch_id.to_string())
    .bind(batch.version)
    .execute(db)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ayu_common::Error::Conflict(format!(
            "batch {} changed since version {}",
            batch.batch_id, batch.version
        )));
    }

    let mut stored = batch.clone();
    stored.version += 1;
    stored.updated_at = updated_at;
    Ok(stored)
}

/// Most recently updated unlocked batch the caller takes part in
///
/// Farmers match on `farmer_id`, collectors on `created_by`; admins see any
/// batch. Other roles have no active batch.
pub async fn find_active_batch(pool: &SqlitePool, ctx: &AuthContext) -> Result<Option<Batch>> {
    let filter = match ctx.role {
        Role::Farmer => "AND farmer_id = ?",
        Role::Collector => "AND created_by = ?",
        Role::Admin => "",
        _ => return Ok(None),
    };
    let query = format!(
        "SELECT {} FROM batches WHERE locked = 0 {} ORDER BY updated_at DESC LIMIT 1",
        BATCH_COLUMNS, filter
    );

    let mut q = sqlx::query(&query);
    if !filter.is_empty() {
        q = q.bind(&ctx.user_id);
    }
    let row = q.fetch_optional(pool).await?;

    row.as_ref().map(batch_from_row).transpose()
}

fn batch_from_row(row: &SqliteRow) -> Result<Batch> {
    let batch_id: String = row.get("batch_id");
    let species: String = row.get("species");
    let visit_date: String = row.get("visit_date");
    let current_stage: i64 = row.get("current_stage");
    let completed: String = row.get("completed_stages");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    let species = species
        .parse()
        .map_err(|e: String| ayu_common::Error::Internal(format!("Invalid species in database: {}", e)))?;
    let completed_stages: BTreeSet<Stage> = parse_json(&completed, "completed_stages")?;

    let final_details = match (
        row.get::<Option<f64>, _>("final_quantity"),
        row.get::<Option<String>, _>("harvest_date"),
        row.get::<Option<f64>, _>("final_latitude"),
        row.get::<Option<f64>, _>("final_longitude"),
        row.get::<Option<String>, _>("final_photo_hash"),
    ) {
        (Some(final_quantity), Some(harvest_date), Some(lat), Some(lon), Some(final_photo_hash)) => {
            Some(FinalDetails {
                final_quantity,
                harvest_date: parse_date(&harvest_date)?,
                final_geotag: GeoTag {
                    latitude: lat,
                    longitude: lon,
                },
                final_photo_hash,
            })
        }
        _ => None,
    };

    Ok(Batch {
        batch_id: parse_uuid(&batch_id)?,
        farmer_id: row.get("farmer_id"),
        farmer_name: row.get("farmer_name"),
        species,
        visit_date: parse_date(&visit_date)?,
        geotag: GeoTag {
            latitude: row.get("latitude"),
            longitude: row.get("longitude"),
        },
        estimated_quantity: row.get("estimated_quantity"),
        current_stage: stage_from_column(current_stage)?,
        completed_stages,
        locked: row.get("locked"),
        final_details,
        created_by: row.get("created_by"),
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
        version: row.get("version"),
    })
}

fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|e| ayu_common::Error::Internal(format!("Invalid date in database: {}", e)))
}
