// Live ingestion, cache and fallback
pub mod backfill;
pub mod candle_cache;
pub mod staleness_monitor;
pub mod subscription_manager;
