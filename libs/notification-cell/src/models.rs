use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_models::auth::Role;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub recipient_role: Role,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub booking_id: Option<Uuid>,
    #[serde(default)]
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// Payload for a notification about to be delivered.
#[derive(Debug, Clone, Serialize)]
pub struct NewNotification {
    pub recipient_id: Uuid,
    pub recipient_role: Role,
    pub title: String,
    pub body: String,
    pub booking_id: Option<Uuid>,
}

impl NewNotification {
    pub fn about_booking(
        recipient_id: Uuid,
        recipient_role: Role,
        booking_id: Uuid,
        title: &str,
        body: String,
    ) -> Self {
        Self {
            recipient_id,
            recipient_role,
            title: title.to_string(),
            body,
            booking_id: Some(booking_id),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum NotificationError {
    #[error("Database error: {0}")]
    DatabaseError(String),
}
