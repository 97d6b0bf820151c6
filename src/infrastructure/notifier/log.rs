use crate::domain::ports::NotificationChannel;
use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

/// Fallback channel when no bot token is configured: messages go to the log
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NotificationChannel for LogNotifier {
    async fn send(&self, destination: i64, text: &str) -> Result<()> {
        info!("LogNotifier [{}]: {}", destination, text);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_notifier_never_fails() {
        let notifier = LogNotifier::new();
        assert!(notifier.send(1, "hello").await.is_ok());
    }
}
