use crate::domain::errors::MarketDataError;
use crate::domain::market::SeriesKey;
use crate::domain::ports::{KlineStreamConnector, StreamEvent};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc::Sender;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

/// One raw-stream connection per series: `{ws_url}/ws/{symbol}@kline_{interval}`.
/// Reconnection and heartbeat policy live in the subscription manager.
pub struct BinanceKlineConnector {
    ws_url: String,
}

impl BinanceKlineConnector {
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
        }
    }

    pub fn stream_url(&self, key: &SeriesKey) -> String {
        format!("{}/ws/{}", self.ws_url.trim_end_matches('/'), key.stream_name())
    }
}

#[async_trait]
impl KlineStreamConnector for BinanceKlineConnector {
    async fn run(&self, key: &SeriesKey, events: Sender<StreamEvent>) -> Result<(), MarketDataError> {
        let url = self.stream_url(key);
        info!("BinanceKlineConnector [{}]: Connecting to {}", key, url);

        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| MarketDataError::Transient {
                reason: format!("connect failed: {}", e),
            })?;
        let (mut write, mut read) = ws_stream.split();

        if events.send(StreamEvent::Opened).await.is_err() {
            // nobody is listening any more
            return Ok(());
        }

        while let Some(frame) = read.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    if events.send(StreamEvent::Message(text.to_string())).await.is_err() {
                        debug!("BinanceKlineConnector [{}]: Receiver dropped, closing", key);
                        let _ = write.send(Message::Close(None)).await;
                        return Ok(());
                    }
                }
                Ok(Message::Ping(payload)) => {
                    if let Err(e) = write.send(Message::Pong(payload)).await {
                        return Err(MarketDataError::Transient {
                            reason: format!("pong failed: {}", e),
                        });
                    }
                }
                Ok(Message::Close(frame)) => {
                    info!("BinanceKlineConnector [{}]: Server closed stream: {:?}", key, frame);
                    return Ok(());
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("BinanceKlineConnector [{}]: Stream error: {}", key, e);
                    return Err(MarketDataError::Transient {
                        reason: e.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}
