use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use crate::domain::repositories::{SignalRepository, UserSettingsRepository, WatchConfigRepository};
use crate::infrastructure::persistence::database::Database;
use crate::infrastructure::persistence::repositories::{
    SqliteSignalRepository, SqliteUserSettingsRepository, SqliteWatchConfigRepository,
};
use crate::infrastructure::repositories::{
    InMemorySignalRepository, InMemoryUserSettingsRepository, InMemoryWatchConfigRepository,
};

#[derive(Clone)]
pub struct PersistenceHandle {
    /// None when running on in-memory repositories
    pub db: Option<Database>,
    pub watch_repository: Arc<dyn WatchConfigRepository>,
    pub signal_repository: Arc<dyn SignalRepository>,
    pub settings_repository: Arc<dyn UserSettingsRepository>,
}

pub struct PersistenceBootstrap;

impl PersistenceBootstrap {
    pub async fn init(db_url: &str) -> Result<PersistenceHandle> {
        info!("Initializing Database at {}", db_url);

        let db = Database::new(db_url)
            .await
            .context("Failed to initialize database")?;

        Ok(PersistenceHandle {
            watch_repository: Arc::new(SqliteWatchConfigRepository::new(db.pool.clone())),
            signal_repository: Arc::new(SqliteSignalRepository::new(db.pool.clone())),
            settings_repository: Arc::new(SqliteUserSettingsRepository::new(db.pool.clone())),
            db: Some(db),
        })
    }

    pub fn in_memory() -> PersistenceHandle {
        PersistenceHandle {
            db: None,
            watch_repository: Arc::new(InMemoryWatchConfigRepository::new()),
            signal_repository: Arc::new(InMemorySignalRepository::new()),
            settings_repository: Arc::new(InMemoryUserSettingsRepository::new()),
        }
    }
}
