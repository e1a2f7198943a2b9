//! Append-only stage transition audit trail

use ayu_common::Result;
use sqlx::{Executor, Row, Sqlite, SqlitePool};
use uuid::Uuid;

use super::{format_timestamp, parse_timestamp, stage_from_column};
use crate::models::{BatchPhase, Stage, StageTransitionRecord};

const LOCKED: &str = "locked";

pub async fn insert_transition<'e, E>(db: E, record: &StageTransitionRecord) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    let to_phase = match record.to {
        BatchPhase::Active(stage) => stage.number().to_string(),
        BatchPhase::Locked => LOCKED.to_string(),
    };

    sqlx::query(
        r#"
        INSERT INTO stage_transitions (batch_id, from_stage, to_phase, actor, role, at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(record.batch_id.to_string())
    .bind(record.from_stage.number() as i64)
    .bind(to_phase)
    .bind(&record.actor)
    .bind(record.role.as_str())
    .bind(format_timestamp(&record.at))
    .execute(db)
    .await?;

    Ok(())
}

/// Transitions of one batch in the order they were applied
pub async fn list_transitions(pool: &SqlitePool, batch_id: Uuid) -> Result<Vec<StageTransitionRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT from_stage, to_phase, actor, role, at
        FROM stage_transitions
        WHERE batch_id = ?
        ORDER BY id ASC
        "#,
    )
    .bind(batch_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            let from_stage: i64 = row.get("from_stage");
            let to_phase: String = row.get("to_phase");
            let role: String = row.get("role");
            let at: String = row.get("at");

            Ok(StageTransitionRecord {
                batch_id,
                from_stage: stage_from_column(from_stage)?,
                to: parse_phase(&to_phase)?,
                actor: row.get("actor"),
                role: role
                    .parse()
                    .map_err(|e| ayu_common::Error::Internal(format!("Invalid role in database: {}", e)))?,
                at: parse_timestamp(&at)?,
            })
        })
        .collect()
}

fn parse_phase(value: &str) -> Result<BatchPhase> {
    if value == LOCKED {
        return Ok(BatchPhase::Locked);
    }
    value
        .parse::<u8>()
        .ok()
        .and_then(Stage::from_number)
        .map(BatchPhase::Active)
        .ok_or_else(|| ayu_common::Error::Internal(format!("Invalid phase in database: {}", value)))
}
