pub mod analysis_service;
pub mod deduplicator;
pub mod formatter;
pub mod signal_generator;
