use crate::domain::market::{Candle, SeriesKey};
use std::collections::{HashMap, VecDeque};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

pub const DEFAULT_CACHE_CAPACITY: usize = 2000;

/// Bounded, timestamp-ordered candle history per series.
///
/// Every series keeps strictly increasing timestamps and at most `capacity`
/// candles; the oldest candles are evicted first.
pub struct CandleCache {
    capacity: usize,
    series: RwLock<HashMap<SeriesKey, VecDeque<Candle>>>,
}

impl std::fmt::Debug for CandleCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CandleCache")
            .field("capacity", &self.capacity)
            .field("series", &"<RwLock>")
            .finish()
    }
}

impl CandleCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            series: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<SeriesKey, VecDeque<Candle>>> {
        match self.series.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!("CandleCache: Lock poisoned during read, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<SeriesKey, VecDeque<Candle>>> {
        match self.series.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!("CandleCache: Lock poisoned during write, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Appends a live candle at the tail.
    ///
    /// Returns false (and leaves the series untouched) when the candle does not
    /// advance the series timestamp.
    pub fn append_live(&self, key: &SeriesKey, candle: Candle) -> bool {
        let mut guard = self.write();
        let series = guard.entry(key.clone()).or_default();

        if let Some(last) = series.back()
            && candle.timestamp <= last.timestamp
        {
            tracing::debug!(
                "CandleCache [{}]: Rejected out-of-order candle {} (last {})",
                key,
                candle.timestamp,
                last.timestamp
            );
            return false;
        }

        series.push_back(candle);
        while series.len() > self.capacity {
            series.pop_front();
        }
        true
    }

    /// Reconciles a bulk fetch with whatever is cached.
    ///
    /// The result is `fetched` plus every cached candle strictly newer than the
    /// last fetched timestamp, sorted and trimmed to capacity. Re-merging the
    /// same batch leaves the series unchanged. Returns the new length.
    pub fn merge_backfill(&self, key: &SeriesKey, fetched: &[Candle]) -> usize {
        let mut merged: Vec<Candle> = fetched.to_vec();
        merged.sort_by_key(|c| c.timestamp);
        merged.dedup_by_key(|c| c.timestamp);

        let mut guard = self.write();
        let series = guard.entry(key.clone()).or_default();

        match merged.last().map(|c| c.timestamp) {
            Some(last_fetched) => {
                merged.extend(series.iter().filter(|c| c.timestamp > last_fetched).copied());
            }
            // Nothing fetched: keep the cached series as is
            None => return series.len(),
        }

        let overflow = merged.len().saturating_sub(self.capacity);
        *series = merged.into_iter().skip(overflow).collect();
        series.len()
    }

    /// Owned copy of a series, oldest first. Empty when unknown.
    pub fn snapshot(&self, key: &SeriesKey) -> Vec<Candle> {
        self.read()
            .get(key)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn len(&self, key: &SeriesKey) -> usize {
        self.read().get(key).map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self, key: &SeriesKey) -> bool {
        self.len(key) == 0
    }

    pub fn last_timestamp(&self, key: &SeriesKey) -> Option<i64> {
        self.read()
            .get(key)
            .and_then(|s| s.back())
            .map(|c| c.timestamp)
    }

    pub fn keys(&self) -> Vec<SeriesKey> {
        let mut keys: Vec<SeriesKey> = self.read().keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl Default for CandleCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::Timeframe;

    fn key() -> SeriesKey {
        SeriesKey::new("BTC", "USDT", Timeframe::OneMin)
    }

    fn candle(ts: i64, close: f64) -> Candle {
        Candle::new(ts, close, close + 1.0, close - 1.0, close, 10.0)
    }

    #[test]
    fn test_append_evicts_oldest_first() {
        let cache = CandleCache::new(3);
        for ts in 1..=5 {
            assert!(cache.append_live(&key(), candle(ts, 100.0)));
        }
        let series = cache.snapshot(&key());
        assert_eq!(series.len(), 3);
        assert_eq!(series[0].timestamp, 3);
        assert_eq!(cache.last_timestamp(&key()), Some(5));
    }

    #[test]
    fn test_append_rejects_non_increasing() {
        let cache = CandleCache::new(10);
        assert!(cache.append_live(&key(), candle(10, 100.0)));
        assert!(!cache.append_live(&key(), candle(10, 101.0)));
        assert!(!cache.append_live(&key(), candle(5, 101.0)));
        assert_eq!(cache.len(&key()), 1);
        assert_eq!(cache.snapshot(&key())[0].close, 100.0);
    }

    #[test]
    fn test_merge_keeps_newer_live_candles() {
        let cache = CandleCache::new(10);
        cache.append_live(&key(), candle(4, 104.0));
        cache.append_live(&key(), candle(5, 105.0));

        let fetched: Vec<Candle> = (1..=4).map(|ts| candle(ts, 90.0)).collect();
        let len = cache.merge_backfill(&key(), &fetched);

        let series = cache.snapshot(&key());
        assert_eq!(len, 5);
        let ts: Vec<i64> = series.iter().map(|c| c.timestamp).collect();
        assert_eq!(ts, vec![1, 2, 3, 4, 5]);
        // the fetched candle wins at the overlapping timestamp
        assert_eq!(series[3].close, 90.0);
        assert_eq!(series[4].close, 105.0);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let cache = CandleCache::new(10);
        cache.append_live(&key(), candle(7, 107.0));
        let fetched: Vec<Candle> = (1..=6).map(|ts| candle(ts, 100.0 + ts as f64)).collect();

        cache.merge_backfill(&key(), &fetched);
        let once = cache.snapshot(&key());
        cache.merge_backfill(&key(), &fetched);
        assert_eq!(cache.snapshot(&key()), once);
    }

    #[test]
    fn test_merge_trims_to_capacity() {
        let cache = CandleCache::new(4);
        let fetched: Vec<Candle> = (1..=10).map(|ts| candle(ts, 100.0)).collect();
        assert_eq!(cache.merge_backfill(&key(), &fetched), 4);
        assert_eq!(cache.snapshot(&key())[0].timestamp, 7);
    }

    #[test]
    fn test_merge_sorts_unordered_batch() {
        let cache = CandleCache::new(10);
        let fetched = vec![candle(3, 1.0), candle(1, 1.0), candle(2, 1.0), candle(2, 1.0)];
        cache.merge_backfill(&key(), &fetched);
        let ts: Vec<i64> = cache.snapshot(&key()).iter().map(|c| c.timestamp).collect();
        assert_eq!(ts, vec![1, 2, 3]);
    }

    #[test]
    fn test_empty_merge_keeps_series() {
        let cache = CandleCache::new(10);
        cache.append_live(&key(), candle(1, 1.0));
        assert_eq!(cache.merge_backfill(&key(), &[]), 1);
        assert_eq!(cache.keys(), vec![key()]);
    }
}
