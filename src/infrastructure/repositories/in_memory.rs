//! In-Memory Repository Implementations
//!
//! Thread-safe implementations of the repository traits defined in
//! `domain::repositories`, used by tests and by runs without a database.
//! Data is lost on restart.

use crate::domain::repositories::{SignalRepository, UserSettingsRepository, WatchConfigRepository};
use crate::domain::signals::SignalRecord;
use crate::domain::watch::WatchConfig;
use anyhow::{Result, bail};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory implementation of WatchConfigRepository, insertion ordered
pub struct InMemoryWatchConfigRepository {
    configs: Arc<RwLock<Vec<WatchConfig>>>,
}

impl InMemoryWatchConfigRepository {
    pub fn new() -> Self {
        Self {
            configs: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

impl Default for InMemoryWatchConfigRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WatchConfigRepository for InMemoryWatchConfigRepository {
    async fn upsert(&self, config: &WatchConfig) -> Result<()> {
        let mut configs = self.configs.write().await;
        if !configs.contains(config) {
            configs.push(config.clone());
        }
        Ok(())
    }

    async fn delete(&self, config: &WatchConfig) -> Result<bool> {
        let mut configs = self.configs.write().await;
        let before = configs.len();
        configs.retain(|c| c != config);
        Ok(configs.len() < before)
    }

    async fn load_all(&self) -> Result<Vec<WatchConfig>> {
        Ok(self.configs.read().await.clone())
    }
}

/// In-memory implementation of SignalRepository; ids are assigned from 1
pub struct InMemorySignalRepository {
    records: Arc<RwLock<Vec<SignalRecord>>>,
}

impl InMemorySignalRepository {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub async fn all(&self) -> Vec<SignalRecord> {
        self.records.read().await.clone()
    }
}

impl Default for InMemorySignalRepository {
    fn default() -> Self {
        Self::new()
    }
}

fn newest_first(mut records: Vec<SignalRecord>, limit: usize) -> Vec<SignalRecord> {
    records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
    records.truncate(limit);
    records
}

#[async_trait]
impl SignalRepository for InMemorySignalRepository {
    async fn insert(&self, record: &SignalRecord) -> Result<i64> {
        let mut records = self.records.write().await;
        let id = records.len() as i64 + 1;
        let mut stored = record.clone();
        stored.id = Some(id);
        records.push(stored);
        Ok(id)
    }

    async fn recent(&self, chat_id: i64, limit: usize) -> Result<Vec<SignalRecord>> {
        let records = self.records.read().await;
        let matching = records.iter().filter(|r| r.chat_id == chat_id).cloned().collect();
        Ok(newest_first(matching, limit))
    }

    async fn recent_trades(&self, chat_id: i64, limit: usize) -> Result<Vec<SignalRecord>> {
        let records = self.records.read().await;
        let matching = records
            .iter()
            .filter(|r| r.chat_id == chat_id && r.signal_type.is_directional())
            .cloned()
            .collect();
        Ok(newest_first(matching, limit))
    }

    async fn unresolved(&self, limit: usize) -> Result<Vec<SignalRecord>> {
        let records = self.records.read().await;
        let mut pending: Vec<SignalRecord> = records
            .iter()
            .filter(|r| !r.is_resolved() && r.signal_type.is_directional())
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
        pending.truncate(limit);
        Ok(pending)
    }

    async fn update_outcome(&self, id: i64, exit_price: f64, profit: f64) -> Result<()> {
        let mut records = self.records.write().await;
        let Some(record) = records.iter_mut().find(|r| r.id == Some(id)) else {
            bail!("Signal {} not found", id);
        };
        record.exit_price = Some(exit_price);
        record.profit = Some(profit);
        Ok(())
    }

    async fn closed_for_chat(&self, chat_id: i64) -> Result<Vec<SignalRecord>> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|r| r.chat_id == chat_id && r.is_resolved())
            .cloned()
            .collect())
    }
}

/// In-memory implementation of UserSettingsRepository
pub struct InMemoryUserSettingsRepository {
    show_indicators: Arc<RwLock<HashMap<i64, bool>>>,
}

impl InMemoryUserSettingsRepository {
    pub fn new() -> Self {
        Self {
            show_indicators: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryUserSettingsRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserSettingsRepository for InMemoryUserSettingsRepository {
    async fn show_indicators(&self, chat_id: i64) -> Result<bool> {
        Ok(self
            .show_indicators
            .read()
            .await
            .get(&chat_id)
            .copied()
            .unwrap_or(false))
    }

    async fn set_show_indicators(&self, chat_id: i64, show: bool) -> Result<()> {
        self.show_indicators.write().await.insert(chat_id, show);
        Ok(())
    }
}
