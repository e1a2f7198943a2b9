//! User notifications

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationCategory {
    Batch,
    Verification,
    Alert,
}

impl NotificationCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationCategory::Batch => "batch",
            NotificationCategory::Verification => "verification",
            NotificationCategory::Alert => "alert",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "batch" => NotificationCategory::Batch,
            "verification" => NotificationCategory::Verification,
            _ => NotificationCategory::Alert,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    #[serde(skip_serializing, default)]
    pub recipient_id: String,
    pub title: String,
    pub message: String,
    pub category: NotificationCategory,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        recipient_id: impl Into<String>,
        category: NotificationCategory,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            recipient_id: recipient_id.into(),
            title: title.into(),
            message: message.into(),
            category,
            read: false,
            created_at: Utc::now(),
        }
    }
}
