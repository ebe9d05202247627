use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use chrono::Utc;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{NewNotification, Notification, NotificationError};

pub struct NotificationService {
    supabase: Arc<SupabaseClient>,
}

impl NotificationService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
        }
    }

    /// Fire-and-forget delivery. A failed insert is logged and swallowed so
    /// the workflow that triggered the notification still succeeds.
    pub async fn send(&self, notification: NewNotification, auth_token: &str) {
        debug!(
            "Sending '{}' notification to {} {}",
            notification.title, notification.recipient_role, notification.recipient_id
        );

        let body = json!({
            "recipient_id": notification.recipient_id,
            "recipient_role": notification.recipient_role,
            "title": notification.title,
            "body": notification.body,
            "booking_id": notification.booking_id,
            "read": false,
            "created_at": Utc::now().to_rfc3339(),
        });

        let result: Result<Vec<Notification>, _> = self
            .supabase
            .insert_returning("notifications", body, auth_token)
            .await;

        if let Err(e) = result {
            warn!(
                "Failed to deliver notification to {}: {}",
                notification.recipient_id, e
            );
        }
    }

    pub async fn list_for_user(
        &self,
        user_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<Notification>, NotificationError> {
        let filters = format!("recipient_id=eq.{}&order=created_at.desc", user_id);

        self.supabase
            .select("notifications", &filters, auth_token)
            .await
            .map_err(|e| NotificationError::DatabaseError(e.to_string()))
    }
}
