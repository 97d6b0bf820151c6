pub mod embeddings;
pub mod feature_pipeline;
pub mod indicators;
