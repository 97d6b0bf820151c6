pub mod candle;
pub mod series_key;
pub mod timeframe;

pub use candle::Candle;
pub use series_key::SeriesKey;
pub use timeframe::Timeframe;
