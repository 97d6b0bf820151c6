//! Observability configuration parsing from environment variables.
//!
//! Metrics reporter cadence and the periodic admin reports.

use super::{VarSource, process_env, read_or};

#[derive(Debug, Clone)]
pub struct ObservabilityEnvConfig {
    pub enabled: bool,
    /// Seconds between METRICS_JSON snapshots
    pub interval: u64,
    pub model_report_interval_secs: u64,
    pub sim_report_interval_secs: u64,
}

impl Default for ObservabilityEnvConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: 60,
            model_report_interval_secs: 3600,
            sim_report_interval_secs: 14_400,
        }
    }
}

impl ObservabilityEnvConfig {
    pub fn from_env() -> Self {
        Self::from_vars(&process_env)
    }

    pub(crate) fn from_vars(vars: VarSource<'_>) -> Self {
        let d = Self::default();
        Self {
            enabled: read_or(vars, "OBSERVABILITY_ENABLED", d.enabled),
            interval: read_or(vars, "OBSERVABILITY_INTERVAL", d.interval).max(1),
            model_report_interval_secs: read_or(
                vars,
                "MODEL_REPORT_INTERVAL_SECS",
                d.model_report_interval_secs,
            )
            .max(1),
            sim_report_interval_secs: read_or(
                vars,
                "SIM_REPORT_INTERVAL_SECS",
                d.sim_report_interval_secs,
            )
            .max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_support::vars;

    #[test]
    fn test_observability_config_defaults() {
        let config = ObservabilityEnvConfig::from_vars(&vars(&[("OBSERVABILITY_ENABLED", "nope")]));
        assert!(config.enabled);
        assert_eq!(config.interval, 60);
        assert_eq!(config.sim_report_interval_secs, 14_400);
    }
}
