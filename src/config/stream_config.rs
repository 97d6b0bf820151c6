//! Live stream, staleness fallback and cache settings.

use super::{VarSource, process_env, read_or};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct StreamEnvConfig {
    pub reconnect_delay_ms: u64,
    pub max_reconnects: u32,
    pub staleness_check_secs: u64,
    pub staleness_threshold_secs: u64,
    pub fallback_fetch_limit: usize,
    pub fallback_max_failures: u32,
    pub cache_capacity: usize,
}

impl Default for StreamEnvConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: 5000,
            max_reconnects: 5,
            staleness_check_secs: 5,
            staleness_threshold_secs: 5,
            fallback_fetch_limit: 100,
            fallback_max_failures: 3,
            cache_capacity: 2000,
        }
    }
}

impl StreamEnvConfig {
    pub fn from_env() -> Self {
        Self::from_vars(&process_env)
    }

    pub(crate) fn from_vars(vars: VarSource<'_>) -> Self {
        let d = Self::default();
        Self {
            reconnect_delay_ms: read_or(vars, "STREAM_RECONNECT_DELAY_MS", d.reconnect_delay_ms),
            max_reconnects: read_or(vars, "STREAM_MAX_RECONNECTS", d.max_reconnects),
            staleness_check_secs: read_or(vars, "STALENESS_CHECK_SECS", d.staleness_check_secs),
            staleness_threshold_secs: read_or(
                vars,
                "STALENESS_THRESHOLD_SECS",
                d.staleness_threshold_secs,
            ),
            fallback_fetch_limit: read_or(vars, "FALLBACK_FETCH_LIMIT", d.fallback_fetch_limit),
            fallback_max_failures: read_or(vars, "FALLBACK_MAX_FAILURES", d.fallback_max_failures),
            cache_capacity: read_or(vars, "CACHE_CAPACITY", d.cache_capacity).max(1),
        }
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn staleness_check(&self) -> Duration {
        Duration::from_secs(self.staleness_check_secs.max(1))
    }

    pub fn staleness_threshold(&self) -> Duration {
        Duration::from_secs(self.staleness_threshold_secs)
    }
}
