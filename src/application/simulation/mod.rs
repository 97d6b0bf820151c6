pub mod engine;
pub mod trade_outcome;
