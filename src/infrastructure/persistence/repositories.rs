use crate::domain::market::{SeriesKey, Timeframe};
use crate::domain::repositories::{SignalRepository, UserSettingsRepository, WatchConfigRepository};
use crate::domain::signals::{SignalRecord, SignalType};
use crate::domain::watch::WatchConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

pub struct SqliteWatchConfigRepository {
    pool: SqlitePool,
}

impl SqliteWatchConfigRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WatchConfigRepository for SqliteWatchConfigRepository {
    async fn upsert(&self, config: &WatchConfig) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO watch_configs (chat_id, symbol, pair, timeframe, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(chat_id, symbol, pair, timeframe) DO NOTHING
            "#,
        )
        .bind(config.chat_id)
        .bind(&config.series.symbol)
        .bind(&config.series.pair)
        .bind(config.series.timeframe.to_string())
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await
        .context("Failed to save watch config")?;

        info!("Persisted watch {}", config.key());
        Ok(())
    }

    async fn delete(&self, config: &WatchConfig) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM watch_configs WHERE chat_id = ? AND symbol = ? AND pair = ? AND timeframe = ?",
        )
        .bind(config.chat_id)
        .bind(&config.series.symbol)
        .bind(&config.series.pair)
        .bind(config.series.timeframe.to_string())
        .execute(&self.pool)
        .await
        .context("Failed to delete watch config")?;
        Ok(result.rows_affected() > 0)
    }

    async fn load_all(&self) -> Result<Vec<WatchConfig>> {
        let rows = sqlx::query(
            "SELECT chat_id, symbol, pair, timeframe FROM watch_configs ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to load watch configs")?;

        let mut configs = Vec::with_capacity(rows.len());
        for row in rows {
            let timeframe: String = row.try_get("timeframe")?;
            let Ok(timeframe) = timeframe.parse::<Timeframe>() else {
                debug!("Skipping watch row with unknown timeframe {}", timeframe);
                continue;
            };
            let symbol: String = row.try_get("symbol")?;
            let pair: String = row.try_get("pair")?;
            configs.push(WatchConfig::new(row.try_get("chat_id")?, &symbol, &pair, timeframe));
        }
        Ok(configs)
    }
}

pub struct SqliteSignalRepository {
    pool: SqlitePool,
}

impl SqliteSignalRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn map_rows(rows: Vec<SqliteRow>) -> Result<Vec<SignalRecord>> {
        rows.iter().map(map_signal_row).collect()
    }
}

fn map_signal_row(row: &SqliteRow) -> Result<SignalRecord> {
    let symbol: String = row.try_get("symbol")?;
    let pair: String = row.try_get("pair")?;
    let timeframe: String = row.try_get("timeframe")?;
    let signal_type: String = row.try_get("signal_type")?;
    let confidence: i64 = row.try_get("confidence")?;

    Ok(SignalRecord {
        id: Some(row.try_get("id")?),
        chat_id: row.try_get("chat_id")?,
        series: SeriesKey::new(&symbol, &pair, timeframe.parse::<Timeframe>()?),
        signal_type: signal_type.parse::<SignalType>()?,
        confidence: confidence.clamp(0, 100) as u8,
        timestamp: row.try_get("timestamp")?,
        entry_price: row.try_get("entry_price")?,
        stop_loss: row.try_get("stop_loss")?,
        take_profit: row.try_get("take_profit")?,
        exit_price: row.try_get("exit_price")?,
        profit: row.try_get("profit")?,
    })
}

#[async_trait]
impl SignalRepository for SqliteSignalRepository {
    async fn insert(&self, record: &SignalRecord) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO signals (chat_id, symbol, pair, timeframe, signal_type, confidence,
                                 timestamp, entry_price, stop_loss, take_profit, exit_price, profit)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.chat_id)
        .bind(&record.series.symbol)
        .bind(&record.series.pair)
        .bind(record.series.timeframe.to_string())
        .bind(record.signal_type.as_str())
        .bind(record.confidence as i64)
        .bind(record.timestamp)
        .bind(record.entry_price)
        .bind(record.stop_loss)
        .bind(record.take_profit)
        .bind(record.exit_price)
        .bind(record.profit)
        .execute(&self.pool)
        .await
        .context("Failed to save signal")?;

        Ok(result.last_insert_rowid())
    }

    async fn recent(&self, chat_id: i64, limit: usize) -> Result<Vec<SignalRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM signals WHERE chat_id = ? ORDER BY timestamp DESC, id DESC LIMIT ?",
        )
        .bind(chat_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load recent signals")?;
        Self::map_rows(rows)
    }

    async fn recent_trades(&self, chat_id: i64, limit: usize) -> Result<Vec<SignalRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM signals
            WHERE chat_id = ? AND signal_type IN ('LONG', 'SHORT')
            ORDER BY timestamp DESC, id DESC LIMIT ?
            "#,
        )
        .bind(chat_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load recent trades")?;
        Self::map_rows(rows)
    }

    async fn unresolved(&self, limit: usize) -> Result<Vec<SignalRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM signals
            WHERE (exit_price IS NULL OR profit IS NULL) AND signal_type IN ('LONG', 'SHORT')
            ORDER BY timestamp ASC, id ASC LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load unresolved signals")?;
        Self::map_rows(rows)
    }

    async fn update_outcome(&self, id: i64, exit_price: f64, profit: f64) -> Result<()> {
        sqlx::query("UPDATE signals SET exit_price = ?, profit = ? WHERE id = ?")
            .bind(exit_price)
            .bind(profit)
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to update signal outcome")?;
        Ok(())
    }

    async fn closed_for_chat(&self, chat_id: i64) -> Result<Vec<SignalRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM signals
            WHERE chat_id = ? AND exit_price IS NOT NULL AND profit IS NOT NULL
            ORDER BY timestamp ASC, id ASC
            "#,
        )
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load closed signals")?;
        Self::map_rows(rows)
    }
}

pub struct SqliteUserSettingsRepository {
    pool: SqlitePool,
}

impl SqliteUserSettingsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserSettingsRepository for SqliteUserSettingsRepository {
    async fn show_indicators(&self, chat_id: i64) -> Result<bool> {
        let row = sqlx::query("SELECT show_indicators FROM user_settings WHERE chat_id = ?")
            .bind(chat_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load user settings")?;
        match row {
            Some(row) => {
                let flag: i64 = row.try_get("show_indicators")?;
                Ok(flag != 0)
            }
            None => Ok(false),
        }
    }

    async fn set_show_indicators(&self, chat_id: i64, show: bool) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_settings (chat_id, show_indicators) VALUES (?, ?)
            ON CONFLICT(chat_id) DO UPDATE SET show_indicators = excluded.show_indicators
            "#,
        )
        .bind(chat_id)
        .bind(show as i64)
        .execute(&self.pool)
        .await
        .context("Failed to save user settings")?;
        Ok(())
    }
}
