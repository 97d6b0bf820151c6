use crate::domain::ports::NotificationChannel;
use std::sync::Arc;
use tracing::{error, warn};

/// Operator-facing alerts. Without an admin chat the alert is only logged.
#[derive(Clone)]
pub struct AdminAlerter {
    channel: Arc<dyn NotificationChannel>,
    admin_chat_id: Option<i64>,
}

impl AdminAlerter {
    pub fn new(channel: Arc<dyn NotificationChannel>, admin_chat_id: Option<i64>) -> Self {
        Self {
            channel,
            admin_chat_id,
        }
    }

    pub fn admin_chat_id(&self) -> Option<i64> {
        self.admin_chat_id
    }

    pub async fn alert(&self, text: &str) {
        let Some(chat_id) = self.admin_chat_id else {
            warn!("AdminAlerter: No admin chat configured, alert dropped: {}", text);
            return;
        };
        if let Err(e) = self.channel.send(chat_id, text).await {
            error!("AdminAlerter: Failed to deliver alert: {}", e);
        }
    }
}
