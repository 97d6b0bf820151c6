//! Repository Pattern Abstractions
//!
//! Persistence for watched configurations, emitted signals and per-chat
//! display preferences. `infrastructure::persistence` provides the SQLite
//! implementations and `infrastructure::repositories` the in-memory ones
//! used by tests.

use crate::domain::signals::SignalRecord;
use crate::domain::watch::WatchConfig;
use anyhow::Result;
use async_trait::async_trait;

/// Repository for watched (chat, symbol, pair, timeframe) tuples
#[async_trait]
pub trait WatchConfigRepository: Send + Sync {
    /// Insert or replace; the tuple itself is the identity
    async fn upsert(&self, config: &WatchConfig) -> Result<()>;

    /// Returns true when a row was removed
    async fn delete(&self, config: &WatchConfig) -> Result<bool>;

    async fn load_all(&self) -> Result<Vec<WatchConfig>>;
}

/// Repository for emitted signals and their simulated outcomes
#[async_trait]
pub trait SignalRepository: Send + Sync {
    /// Persist a record, returning its id
    async fn insert(&self, record: &SignalRecord) -> Result<i64>;

    /// Most recent signals for a chat, newest first
    async fn recent(&self, chat_id: i64, limit: usize) -> Result<Vec<SignalRecord>>;

    /// Most recent directional signals for a chat (resolved or pending), newest first
    async fn recent_trades(&self, chat_id: i64, limit: usize) -> Result<Vec<SignalRecord>>;

    /// Directional signals with no outcome yet, oldest first
    async fn unresolved(&self, limit: usize) -> Result<Vec<SignalRecord>>;

    async fn update_outcome(&self, id: i64, exit_price: f64, profit: f64) -> Result<()>;

    /// All signals of a chat that have an outcome
    async fn closed_for_chat(&self, chat_id: i64) -> Result<Vec<SignalRecord>>;
}

/// Per-chat display preferences
#[async_trait]
pub trait UserSettingsRepository: Send + Sync {
    /// Defaults to false for unknown chats
    async fn show_indicators(&self, chat_id: i64) -> Result<bool>;

    async fn set_show_indicators(&self, chat_id: i64, show: bool) -> Result<()>;
}
