//! Notification persistence

use ayu_common::Result;
use sqlx::{Executor, Row, Sqlite, SqlitePool};
use uuid::Uuid;

use super::{format_timestamp, parse_timestamp, parse_uuid};
use crate::models::{Notification, NotificationCategory};

pub async fn insert_notification<'e, E>(db: E, notification: &Notification) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO notifications (id, recipient_id, title, message, category, read, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(notification.id.to_string())
    .bind(&notification.recipient_id)
    .bind(&notification.title)
    .bind(&notification.message)
    .bind(notification.category.as_str())
    .bind(notification.read)
    .bind(format_timestamp(&notification.created_at))
    .execute(db)
    .await?;

    Ok(())
}

/// Newest first
pub async fn list_for_recipient(
    pool: &SqlitePool,
    recipient_id: &str,
    limit: i64,
) -> Result<Vec<Notification>> {
    let rows = sqlx::query(
        r#"
        SELECT id, recipient_id, title, message, category, read, created_at
        FROM notifications
        WHERE recipient_id = ?
        ORDER BY created_at DESC, rowid DESC
        LIMIT ?
        "#,
    )
    .bind(recipient_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            let id: String = row.get("id");
            let category: String = row.get("category");
            let created_at: String = row.get("created_at");

            Ok(Notification {
                id: parse_uuid(&id)?,
                recipient_id: row.get("recipient_id"),
                title: row.get("title"),
                message: row.get("message"),
                category: NotificationCategory::parse(&category),
                read: row.get("read"),
                created_at: parse_timestamp(&created_at)?,
            })
        })
        .collect()
}

/// Mark one of the recipient's notifications read; false if it is not theirs
pub async fn mark_read(pool: &SqlitePool, id: Uuid, recipient_id: &str) -> Result<bool> {
    let result = sqlx::query("UPDATE notifications SET read = 1 WHERE id = ? AND recipient_id = ?")
        .bind(id.to_string())
        .bind(recipient_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}
