use crate::domain::signals::{SignalType, TradeSignal};
use crate::domain::watch::ConfigKey;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq)]
struct BufferEntry {
    signal_type: SignalType,
    entry_price: f64,
    emitted_at_ms: i64,
}

/// Suppresses repeated alerts for the same watch.
///
/// A candidate that passes the confidence threshold is still rejected while a
/// previous emission is inside the cooldown, or has the same direction, unless
/// price has moved by more than `significance_atr` ATRs since that emission.
pub struct SignalDeduplicator {
    cooldown_ms: i64,
    significance_atr: f64,
    entries: Mutex<HashMap<ConfigKey, BufferEntry>>,
}

impl SignalDeduplicator {
    pub fn new(cooldown_ms: i64, significance_atr: f64) -> Self {
        Self {
            cooldown_ms,
            significance_atr,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ConfigKey, BufferEntry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn is_significant(&self, previous: &BufferEntry, candidate: &TradeSignal) -> bool {
        let entry = candidate.levels.entry;
        if previous.entry_price <= 0.0 || entry <= 0.0 {
            return true;
        }
        let change = (entry - previous.entry_price).abs() / previous.entry_price;
        let threshold = self.significance_atr * candidate.atr / entry;
        change > threshold
    }

    pub fn should_emit(
        &self,
        key: &ConfigKey,
        candidate: &TradeSignal,
        confidence_threshold: u8,
        now_ms: i64,
    ) -> bool {
        if candidate.signal_type == SignalType::Wait || candidate.confidence < confidence_threshold
        {
            return false;
        }

        let mut entries = self.lock();
        if let Some(previous) = entries.get(key) {
            let significant = self.is_significant(previous, candidate);
            let in_cooldown = now_ms - previous.emitted_at_ms < self.cooldown_ms;
            if in_cooldown && !significant {
                debug!("SignalDeduplicator [{}]: In cooldown, dropping {}", key, candidate.signal_type);
                return false;
            }
            if previous.signal_type == candidate.signal_type && !significant {
                debug!("SignalDeduplicator [{}]: Unchanged {}, dropping", key, candidate.signal_type);
                return false;
            }
        }

        entries.insert(
            key.clone(),
            BufferEntry {
                signal_type: candidate.signal_type,
                entry_price: candidate.levels.entry,
                emitted_at_ms: now_ms,
            },
        );
        true
    }

    /// Drops entries emitted more than `ttl_ms` before `now_ms`
    pub fn purge_expired(&self, now_ms: i64, ttl_ms: i64) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| now_ms - entry.emitted_at_ms <= ttl_ms);
        before - entries.len()
    }

    pub fn forget(&self, key: &ConfigKey) {
        self.lock().remove(key);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::signals::TradeLevels;

    const MINUTE: i64 = 60_000;

    fn candidate(signal_type: SignalType, entry: f64, confidence: u8) -> TradeSignal {
        TradeSignal {
            signal_type,
            confidence,
            probability: confidence as f64 / 100.0,
            price: entry,
            atr: 2.0,
            levels: TradeLevels {
                entry,
                stop_loss: entry - 2.0,
                take_profit: entry + 4.0,
            },
            timestamp: 0,
        }
    }

    fn key() -> ConfigKey {
        ConfigKey("1_BTC_USDT_1h".to_string())
    }

    #[test]
    fn test_rejects_low_confidence_and_wait() {
        let dedup = SignalDeduplicator::new(10 * MINUTE, 0.5);
        assert!(!dedup.should_emit(&key(), &candidate(SignalType::Long, 100.0, 60), 70, 0));
        assert!(!dedup.should_emit(&key(), &candidate(SignalType::Wait, 100.0, 90), 70, 0));
        assert!(dedup.is_empty());
    }

    #[test]
    fn test_identical_signals_collapse() {
        let dedup = SignalDeduplicator::new(10 * MINUTE, 0.5);
        let signal = candidate(SignalType::Long, 100.0, 80);
        assert!(dedup.should_emit(&key(), &signal, 70, 0));
        assert!(!dedup.should_emit(&key(), &signal, 70, 2 * MINUTE));
    }

    #[test]
    fn test_significant_move_overrides_cooldown() {
        let dedup = SignalDeduplicator::new(10 * MINUTE, 0.5);
        assert!(dedup.should_emit(&key(), &candidate(SignalType::Long, 100.0, 80), 70, 0));
        // 0.5 ATR of 2.0 at ~100 is ~1%, a 3% move is significant
        assert!(dedup.should_emit(&key(), &candidate(SignalType::Long, 103.0, 80), 70, MINUTE));
        assert!(!dedup.should_emit(&key(), &candidate(SignalType::Long, 103.2, 80), 70, 2 * MINUTE));
    }

    #[test]
    fn test_direction_flip_after_cooldown() {
        let dedup = SignalDeduplicator::new(10 * MINUTE, 0.5);
        assert!(dedup.should_emit(&key(), &candidate(SignalType::Long, 100.0, 80), 70, 0));
        assert!(!dedup.should_emit(&key(), &candidate(SignalType::Short, 100.0, 80), 70, 5 * MINUTE));
        assert!(dedup.should_emit(&key(), &candidate(SignalType::Short, 100.0, 80), 70, 11 * MINUTE));
        // same direction stays suppressed after the cooldown too
        assert!(!dedup.should_emit(&key(), &candidate(SignalType::Short, 100.1, 80), 70, 30 * MINUTE));
    }

    #[test]
    fn test_purge_expired() {
        let dedup = SignalDeduplicator::new(10 * MINUTE, 0.5);
        dedup.should_emit(&key(), &candidate(SignalType::Long, 100.0, 80), 70, 0);
        let other = ConfigKey("2_ETH_USDT_1h".to_string());
        dedup.should_emit(&other, &candidate(SignalType::Long, 100.0, 80), 70, 50 * MINUTE);
        assert_eq!(dedup.purge_expired(70 * MINUTE, 60 * MINUTE), 1);
        assert_eq!(dedup.len(), 1);
    }
}
