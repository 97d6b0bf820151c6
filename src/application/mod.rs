// Operator alerts
pub mod alerts;

// Startup wiring
pub mod bootstrap;

// Command surface
pub mod commands;

// Feature engineering
pub mod features;

// Candle cache, backfill and live streams
pub mod market_data;

// Predictor, labels and online training
pub mod ml;

// Live signals, deduplication and reports
pub mod signals;

// Historical replay
pub mod simulation;

// Training stability control
pub mod training;

// System orchestrator
pub mod system;
