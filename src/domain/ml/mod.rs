pub mod feature_registry;

use crate::domain::signals::SignalType;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

/// `window_size` rows of equal-width feature vectors, oldest first
pub type FeatureWindow = Vec<Vec<f64>>;

/// Predictor output for one window. Deltas are in ATR units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Prediction {
    pub long_prob: f64,
    pub short_prob: f64,
    pub wait_prob: f64,
    pub entry_delta: f64,
    pub tp_delta: f64,
    pub sl_delta: f64,
}

impl Prediction {
    pub fn probabilities(&self) -> [f64; 3] {
        [self.long_prob, self.short_prob, self.wait_prob]
    }

    /// Class with the highest probability; ties resolve LONG, SHORT, WAIT in that order
    pub fn argmax(&self) -> (SignalType, f64) {
        let probs = self.probabilities();
        let mut best = 0;
        for (i, p) in probs.iter().enumerate() {
            if *p > probs[best] {
                best = i;
            }
        }
        (SignalType::from_class_index(best), probs[best])
    }

    /// Element-wise mean of several predictions
    pub fn average(predictions: &[Prediction]) -> Option<Prediction> {
        if predictions.is_empty() {
            return None;
        }
        let n = predictions.len() as f64;
        let mut acc = Prediction::default();
        for p in predictions {
            acc.long_prob += p.long_prob;
            acc.short_prob += p.short_prob;
            acc.wait_prob += p.wait_prob;
            acc.entry_delta += p.entry_delta;
            acc.tp_delta += p.tp_delta;
            acc.sl_delta += p.sl_delta;
        }
        Some(Prediction {
            long_prob: acc.long_prob / n,
            short_prob: acc.short_prob / n,
            wait_prob: acc.wait_prob / n,
            entry_delta: acc.entry_delta / n,
            tp_delta: acc.tp_delta / n,
            sl_delta: acc.sl_delta / n,
        })
    }
}

/// Training target: realized class plus ATR-unit regression targets
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub class: SignalType,
    pub entry_delta: f64,
    pub tp_delta: f64,
    pub sl_delta: f64,
}

impl Label {
    /// `[long, short, wait, entry, tp, sl]` target row
    pub fn to_target(&self) -> [f64; 6] {
        let mut row = [0.0; 6];
        row[self.class.class_index()] = 1.0;
        row[3] = self.entry_delta;
        row[4] = self.tp_delta;
        row[5] = self.sl_delta;
        row
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSample {
    pub window: FeatureWindow,
    pub label: Label,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FitReport {
    pub loss: f64,
    /// Arg-max agreement over the fitted batch, 0..=1
    pub accuracy: f64,
    pub samples: usize,
}

/// Mutable model hyperparameters. Changes apply at the next predict/fit cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HyperparamConfig {
    pub window_size: usize,
    pub units: usize,
    pub epochs: usize,
}

impl Default for HyperparamConfig {
    fn default() -> Self {
        Self {
            window_size: 5,
            units: 32,
            epochs: 10,
        }
    }
}

pub type SharedHyperparams = Arc<RwLock<HyperparamConfig>>;

/// Reads the current hyperparameters, recovering from a poisoned lock
pub fn read_hyperparams(shared: &SharedHyperparams) -> HyperparamConfig {
    match shared.read() {
        Ok(guard) => *guard,
        Err(poisoned) => *poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argmax_and_tie_order() {
        let p = Prediction {
            long_prob: 0.2,
            short_prob: 0.7,
            wait_prob: 0.1,
            ..Default::default()
        };
        assert_eq!(p.argmax(), (SignalType::Short, 0.7));

        let tie = Prediction {
            long_prob: 0.4,
            short_prob: 0.4,
            wait_prob: 0.2,
            ..Default::default()
        };
        assert_eq!(tie.argmax().0, SignalType::Long);
    }

    #[test]
    fn test_average() {
        let a = Prediction {
            long_prob: 1.0,
            tp_delta: 2.0,
            ..Default::default()
        };
        let b = Prediction {
            short_prob: 1.0,
            tp_delta: 4.0,
            ..Default::default()
        };
        let avg = Prediction::average(&[a, b]).unwrap();
        assert_eq!(avg.long_prob, 0.5);
        assert_eq!(avg.short_prob, 0.5);
        assert_eq!(avg.tp_delta, 3.0);
        assert!(Prediction::average(&[]).is_none());
    }

    #[test]
    fn test_label_target_row() {
        let label = Label {
            class: SignalType::Short,
            entry_delta: 0.0,
            tp_delta: 1.5,
            sl_delta: 0.8,
        };
        assert_eq!(label.to_target(), [0.0, 1.0, 0.0, 0.0, 1.5, 0.8]);
    }
}
