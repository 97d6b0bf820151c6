use thiserror::Error;

/// Errors related to market data fetches and live streams
#[derive(Debug, Clone, Error, PartialEq)]
pub enum MarketDataError {
    #[error("Transient network error: {reason}")]
    Transient { reason: String },

    #[error("Request timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    #[error("Rate limit exceeded (HTTP 429)")]
    RateLimited,

    #[error("Invalid market data: {reason}")]
    InvalidPayload { reason: String },

    #[error("Fetch failed after {attempts} attempts: {reason}")]
    RetriesExhausted { attempts: u32, reason: String },

    #[error("Fallback suppressed for {key} after {failures} consecutive failures")]
    FallbackSuppressed { key: String, failures: u32 },
}

impl MarketDataError {
    /// Whether a retry of the same request can reasonably succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MarketDataError::Transient { .. }
                | MarketDataError::Timeout { .. }
                | MarketDataError::RateLimited
                | MarketDataError::InvalidPayload { .. }
        )
    }
}

/// Errors raised while assembling feature windows
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FeatureError {
    #[error("Insufficient data: need {required} candles, have {available}")]
    InsufficientData { required: usize, available: usize },
}

/// Errors raised by a predictor during predict/fit
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PredictorError {
    #[error("Input shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("Predictor state error: {reason}")]
    State { reason: String },
}

/// User-facing errors returned by the command surface
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Invalid market: {symbol}/{pair}")]
    InvalidMarket { symbol: String, pair: String },

    #[error("Invalid timeframe: {input}")]
    InvalidTimeframe { input: String },

    #[error("Not enough data to analyse {key}: {source}")]
    InsufficientData {
        key: String,
        #[source]
        source: FeatureError,
    },

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}
