use crate::domain::errors::MarketDataError;
use crate::domain::market::{Candle, SeriesKey};
use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc::Sender;

/// Bulk historical market data (REST klines)
#[async_trait]
pub trait MarketDataFeed: Send + Sync {
    /// Fetches the most recent `limit` closed-or-open candles, oldest first.
    /// Implementations carry their own timeout and bounded retry.
    async fn fetch_klines(
        &self,
        key: &SeriesKey,
        limit: usize,
    ) -> std::result::Result<Vec<Candle>, MarketDataError>;

    /// Whether the exchange lists `symbol`/`pair` as a tradable market
    async fn is_valid_market(
        &self,
        symbol: &str,
        pair: &str,
    ) -> std::result::Result<bool, MarketDataError>;
}

/// Events produced by one live-stream connection attempt
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// The connection is established
    Opened,
    /// One raw inbound text frame
    Message(String),
}

/// Opens live kline streams, one connection attempt per call
#[async_trait]
pub trait KlineStreamConnector: Send + Sync {
    /// Runs a single connection for `key` until it closes or fails,
    /// forwarding events to `events`. `Ok(())` means a clean close.
    async fn run(
        &self,
        key: &SeriesKey,
        events: Sender<StreamEvent>,
    ) -> std::result::Result<(), MarketDataError>;
}

/// Outbound text notifications (chat messages, admin alerts)
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn send(&self, destination: i64, text: &str) -> Result<()>;
}
