use crate::application::alerts::AdminAlerter;
use crate::infrastructure::observability::Metrics;
use statrs::statistics::{Data, Distribution, Max, Min};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

/// Number of accuracy samples the stability decision looks at
pub const ACCURACY_WINDOW: usize = 50;
/// Mean accuracy above which training is considered stable
pub const STABLE_MEAN_ACCURACY: f64 = 0.85;
/// Max-min spread below which training is considered stable
pub const STABLE_SPREAD: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccuracyStats {
    pub samples: usize,
    pub avg: f64,
    pub max: f64,
    pub min: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlDecision {
    /// Fewer than `ACCURACY_WINDOW` samples, nothing changed
    NotEnoughSamples,
    /// Simulation disabled. `transitioned` is true when it was enabled before.
    Stable { transitioned: bool },
    /// Simulation enabled. `rearmed` is true when it was disabled before.
    Unstable { rearmed: bool },
}

#[derive(Debug)]
struct ControllerState {
    accuracies: VecDeque<f64>,
    training_counter: u64,
    simulation_enabled: bool,
}

/// Hysteresis switch between continuous simulation training and idle.
///
/// Stability means mean accuracy above 0.85 and a spread below 0.05 over the
/// last 50 fits.
pub struct TrainingController {
    state: Mutex<ControllerState>,
    alerts: Option<AdminAlerter>,
    metrics: Option<Metrics>,
}

impl Default for TrainingController {
    fn default() -> Self {
        Self::new()
    }
}

impl TrainingController {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ControllerState {
                accuracies: VecDeque::with_capacity(ACCURACY_WINDOW),
                training_counter: 0,
                simulation_enabled: true,
            }),
            alerts: None,
            metrics: None,
        }
    }

    pub fn with_alerts(mut self, alerts: AdminAlerter) -> Self {
        self.alerts = Some(alerts);
        self
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn record_accuracy(&self, accuracy: f64) {
        if !accuracy.is_finite() {
            return;
        }
        let mean = {
            let mut state = self.lock();
            if state.accuracies.len() == ACCURACY_WINDOW {
                state.accuracies.pop_front();
            }
            state.accuracies.push_back(accuracy);
            state.training_counter += 1;
            Self::compute_stats(&state.accuracies).map(|s| s.avg)
        };
        if let (Some(metrics), Some(mean)) = (&self.metrics, mean) {
            metrics.rolling_accuracy.set(mean);
        }
    }

    fn compute_stats(accuracies: &VecDeque<f64>) -> Option<AccuracyStats> {
        if accuracies.is_empty() {
            return None;
        }
        let data = Data::new(accuracies.iter().copied().collect::<Vec<f64>>());
        Some(AccuracyStats {
            samples: accuracies.len(),
            avg: data.mean()?,
            max: data.max(),
            min: data.min(),
        })
    }

    pub fn stats(&self) -> Option<AccuracyStats> {
        Self::compute_stats(&self.lock().accuracies)
    }

    pub fn mean_accuracy(&self) -> Option<f64> {
        self.stats().map(|s| s.avg)
    }

    pub fn simulation_enabled(&self) -> bool {
        self.lock().simulation_enabled
    }

    pub fn training_counter(&self) -> u64 {
        self.lock().training_counter
    }

    /// Applies the stability policy. The caller re-arms the simulation sweep on
    /// `Unstable`.
    pub async fn evaluate(&self) -> ControlDecision {
        let (decision, stats) = {
            let mut state = self.lock();
            if state.accuracies.len() < ACCURACY_WINDOW {
                debug!(
                    "TrainingController: {} / {} accuracy samples, skipping evaluation",
                    state.accuracies.len(),
                    ACCURACY_WINDOW
                );
                return ControlDecision::NotEnoughSamples;
            }
            let Some(stats) = Self::compute_stats(&state.accuracies) else {
                return ControlDecision::NotEnoughSamples;
            };

            let stable = stats.avg > STABLE_MEAN_ACCURACY && (stats.max - stats.min) < STABLE_SPREAD;
            let was_enabled = state.simulation_enabled;
            if stable {
                state.simulation_enabled = false;
                state.training_counter = 0;
                (ControlDecision::Stable { transitioned: was_enabled }, stats)
            } else {
                state.simulation_enabled = true;
                (ControlDecision::Unstable { rearmed: !was_enabled }, stats)
            }
        };

        match decision {
            ControlDecision::Stable { transitioned: true } => {
                info!(
                    "TrainingController: Model stable (avg {:.2}%, spread {:.2}%), simulation disabled",
                    stats.avg * 100.0,
                    (stats.max - stats.min) * 100.0
                );
                if let Some(alerts) = &self.alerts {
                    alerts
                        .alert(&format!(
                            "✅ Model stable: avg accuracy {:.2}%, spread {:.2}%. Simulation training paused.",
                            stats.avg * 100.0,
                            (stats.max - stats.min) * 100.0
                        ))
                        .await;
                }
            }
            ControlDecision::Unstable { rearmed: true } => {
                info!(
                    "TrainingController: Model unstable (avg {:.2}%), simulation re-enabled",
                    stats.avg * 100.0
                );
            }
            _ => {}
        }
        decision
    }
}
