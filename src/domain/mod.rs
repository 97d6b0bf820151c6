// Market data domain (candles, series identity, timeframes)
pub mod market;

// Model contracts (feature windows, predictions, labels)
pub mod ml;

// Port interfaces
pub mod ports;

// Repository traits
pub mod repositories;

// Signals and simulated trade outcomes
pub mod signals;

// Watched configurations
pub mod watch;

// Domain-specific error types
pub mod errors;
