//! Simulation pacing, labeling and training cadence.

use super::{VarSource, process_env, read_or};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SimulationEnvConfig {
    pub step_ms: u64,
    pub retry_ms: u64,
    pub start_spacing_ms: u64,
    pub lookahead_candles: usize,
    pub label_threshold_pct: f64,
    pub training_batch_size: usize,
    pub controller_interval_secs: u64,
}

impl Default for SimulationEnvConfig {
    fn default() -> Self {
        Self {
            step_ms: 1000,
            retry_ms: 30_000,
            start_spacing_ms: 1000,
            lookahead_candles: 10,
            label_threshold_pct: 1.5,
            training_batch_size: 16,
            controller_interval_secs: 600,
        }
    }
}

impl SimulationEnvConfig {
    pub fn from_env() -> Self {
        Self::from_vars(&process_env)
    }

    pub(crate) fn from_vars(vars: VarSource<'_>) -> Self {
        let d = Self::default();
        Self {
            step_ms: read_or(vars, "SIMULATION_STEP_MS", d.step_ms),
            retry_ms: read_or(vars, "SIMULATION_RETRY_MS", d.retry_ms),
            start_spacing_ms: read_or(vars, "SIMULATION_START_SPACING_MS", d.start_spacing_ms),
            lookahead_candles: read_or(vars, "LOOKAHEAD_CANDLES", d.lookahead_candles).max(1),
            label_threshold_pct: read_or(vars, "LABEL_THRESHOLD_PCT", d.label_threshold_pct),
            training_batch_size: read_or(vars, "TRAINING_BATCH_SIZE", d.training_batch_size).max(1),
            controller_interval_secs: read_or(
                vars,
                "CONTROLLER_INTERVAL_SECS",
                d.controller_interval_secs,
            ),
        }
    }

    pub fn step_interval(&self) -> Duration {
        Duration::from_millis(self.step_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_ms)
    }

    pub fn start_spacing(&self) -> Duration {
        Duration::from_millis(self.start_spacing_ms)
    }

    pub fn controller_interval(&self) -> Duration {
        Duration::from_secs(self.controller_interval_secs.max(1))
    }
}
