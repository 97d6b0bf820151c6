//! Signal emission thresholds and the periodic signal jobs.

use super::{VarSource, process_env, read_or};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SignalEnvConfig {
    pub confidence_threshold: u8,
    pub cooldown_secs: u64,
    pub significance_atr: f64,
    pub auto_check_interval_secs: u64,
    pub buffer_ttl_secs: u64,
    pub buffer_cleanup_secs: u64,
    pub outcome_resolve_interval_secs: u64,
}

impl Default for SignalEnvConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 70,
            cooldown_secs: 600,
            significance_atr: 0.5,
            auto_check_interval_secs: 60,
            buffer_ttl_secs: 3600,
            buffer_cleanup_secs: 1800,
            outcome_resolve_interval_secs: 300,
        }
    }
}

impl SignalEnvConfig {
    pub fn from_env() -> Self {
        Self::from_vars(&process_env)
    }

    pub(crate) fn from_vars(vars: VarSource<'_>) -> Self {
        let d = Self::default();
        Self {
            confidence_threshold: read_or(vars, "CONFIDENCE_THRESHOLD", d.confidence_threshold)
                .min(100),
            cooldown_secs: read_or(vars, "SIGNAL_COOLDOWN_SECS", d.cooldown_secs),
            significance_atr: read_or(vars, "SIGNAL_SIGNIFICANCE_ATR", d.significance_atr),
            auto_check_interval_secs: read_or(
                vars,
                "AUTO_CHECK_INTERVAL_SECS",
                d.auto_check_interval_secs,
            ),
            buffer_ttl_secs: read_or(vars, "SIGNAL_BUFFER_TTL_SECS", d.buffer_ttl_secs),
            buffer_cleanup_secs: read_or(vars, "SIGNAL_BUFFER_CLEANUP_SECS", d.buffer_cleanup_secs),
            outcome_resolve_interval_secs: read_or(
                vars,
                "OUTCOME_RESOLVE_INTERVAL_SECS",
                d.outcome_resolve_interval_secs,
            ),
        }
    }

    pub fn cooldown_ms(&self) -> i64 {
        (self.cooldown_secs as i64).saturating_mul(1000)
    }

    pub fn buffer_ttl_ms(&self) -> i64 {
        (self.buffer_ttl_secs as i64).saturating_mul(1000)
    }

    pub fn auto_check_interval(&self) -> Duration {
        Duration::from_secs(self.auto_check_interval_secs.max(1))
    }

    pub fn buffer_cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.buffer_cleanup_secs.max(1))
    }

    pub fn outcome_resolve_interval(&self) -> Duration {
        Duration::from_secs(self.outcome_resolve_interval_secs.max(1))
    }
}
