pub mod market_data;
pub mod websocket;

pub use market_data::{BinanceFeedSettings, BinanceMarketDataFeed};
pub use websocket::BinanceKlineConnector;
