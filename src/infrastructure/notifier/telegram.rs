use crate::domain::ports::NotificationChannel;
use crate::infrastructure::core::HttpClientFactory;
use crate::infrastructure::observability::Metrics;
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use reqwest_middleware::ClientWithMiddleware;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

/// Telegram caps message text at 4096 characters
const MAX_MESSAGE_CHARS: usize = 4096;

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
    disable_web_page_preview: bool,
}

/// Bot API `sendMessage` channel
pub struct TelegramNotifier {
    client: ClientWithMiddleware,
    api_url: String,
    token: String,
    metrics: Option<Metrics>,
}

impl TelegramNotifier {
    pub fn new(api_url: &str, token: &str) -> Self {
        Self {
            client: HttpClientFactory::create_client(Duration::from_secs(10), 3),
            api_url: api_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_url, self.token)
    }

    async fn post(&self, destination: i64, text: &str) -> Result<()> {
        let body = SendMessage {
            chat_id: destination,
            text: truncate(text),
            disable_web_page_preview: true,
        };
        let response = self
            .client
            .post(self.endpoint())
            .json(&body)
            .send()
            .await
            .context("Failed to reach Telegram")?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            bail!("Telegram rejected message to {}: HTTP {} {}", destination, status, detail);
        }
        debug!("TelegramNotifier: Delivered message to {}", destination);
        Ok(())
    }
}

fn truncate(text: &str) -> &str {
    match text.char_indices().nth(MAX_MESSAGE_CHARS) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[async_trait]
impl NotificationChannel for TelegramNotifier {
    async fn send(&self, destination: i64, text: &str) -> Result<()> {
        let result = self.post(destination, text).await;
        if result.is_err()
            && let Some(m) = &self.metrics
        {
            m.notifications_failed_total.inc();
        }
        result
    }
}
