use super::predictor::Predictor;
use crate::domain::errors::PredictorError;
use crate::domain::ml::{
    FeatureWindow, FitReport, HyperparamConfig, Prediction, SharedHyperparams, TrainingSample,
    read_hyperparams,
};
use ndarray::{Array1, Array2, s};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

const OUTPUTS: usize = 6;
const CLASSES: usize = 3;
const CLASS_WEIGHT: f64 = 0.7;
const REGRESSION_WEIGHT: f64 = 0.3;
const GRAD_CLIP: f64 = 5.0;

/// Single hidden layer network with a softmax class head and a linear
/// regression head for the level deltas
#[derive(Debug, Clone)]
struct Network {
    input_dim: usize,
    units: usize,
    w1: Array2<f64>,
    b1: Array1<f64>,
    w2: Array2<f64>,
    b2: Array1<f64>,
}

struct Forward {
    hidden: Array1<f64>,
    logits: Array1<f64>,
    probs: Array1<f64>,
}

impl Network {
    fn new(input_dim: usize, units: usize, rng: &mut StdRng) -> Self {
        let limit1 = (6.0 / (input_dim + units) as f64).sqrt();
        let limit2 = (6.0 / (units + OUTPUTS) as f64).sqrt();
        Self {
            input_dim,
            units,
            w1: Array2::from_shape_fn((units, input_dim), |_| rng.random_range(-limit1..limit1)),
            b1: Array1::zeros(units),
            w2: Array2::from_shape_fn((OUTPUTS, units), |_| rng.random_range(-limit2..limit2)),
            b2: Array1::zeros(OUTPUTS),
        }
    }

    fn forward(&self, x: &Array1<f64>) -> Forward {
        let hidden = (self.w1.dot(x) + &self.b1).mapv(f64::tanh);
        let logits = self.w2.dot(&hidden) + &self.b2;
        let probs = softmax(&logits.slice(s![..CLASSES]).to_owned());
        Forward {
            hidden,
            logits,
            probs,
        }
    }

    fn is_finite(&self) -> bool {
        self.w1.iter().chain(self.w2.iter()).all(|v| v.is_finite())
            && self.b1.iter().chain(self.b2.iter()).all(|v| v.is_finite())
    }
}

fn softmax(logits: &Array1<f64>) -> Array1<f64> {
    let max = logits.fold(f64::NEG_INFINITY, |a, &b| a.max(b));
    let exp = logits.mapv(|v| (v - max).exp());
    let sum = exp.sum();
    exp / sum
}

fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = i;
        }
    }
    best
}

struct State {
    network: Option<Network>,
    rng: StdRng,
}

/// Predictor trained online with plain SGD.
///
/// Units and epochs come from the shared hyperparameters at the start of each
/// call. A change in units or input shape re-initialises the network.
pub struct SoftmaxPredictor {
    hyperparams: SharedHyperparams,
    learning_rate: f64,
    state: Mutex<State>,
}

impl SoftmaxPredictor {
    pub fn new(hyperparams: SharedHyperparams, learning_rate: f64) -> Self {
        Self::with_seed(hyperparams, learning_rate, rand::rng().random())
    }

    pub fn with_seed(hyperparams: SharedHyperparams, learning_rate: f64, seed: u64) -> Self {
        Self {
            hyperparams,
            learning_rate,
            state: Mutex::new(State {
                network: None,
                rng: StdRng::seed_from_u64(seed),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn flatten(window: &FeatureWindow) -> Result<Array1<f64>, PredictorError> {
        let rows = window.len();
        let width = window.first().map(|r| r.len()).unwrap_or(0);
        if rows == 0 || width == 0 {
            return Err(PredictorError::ShapeMismatch {
                expected: (1, 1),
                actual: (rows, width),
            });
        }
        if let Some(bad) = window.iter().find(|r| r.len() != width) {
            return Err(PredictorError::ShapeMismatch {
                expected: (rows, width),
                actual: (rows, bad.len()),
            });
        }
        Ok(Array1::from_iter(
            window
                .iter()
                .flatten()
                .map(|v| if v.is_finite() { *v } else { 0.0 }),
        ))
    }

    /// Returns the network for `input_dim`, creating or replacing it when the
    /// shape or unit count changed
    fn ensure_network<'a>(
        state: &'a mut State,
        input_dim: usize,
        hp: &HyperparamConfig,
    ) -> &'a mut Network {
        let units = hp.units.max(1);
        let State { network, rng } = state;
        let stale = network
            .as_ref()
            .map(|n| n.input_dim != input_dim || n.units != units)
            .unwrap_or(true);
        if stale {
            info!(
                "SoftmaxPredictor: Initialising network (inputs {}, units {})",
                input_dim, units
            );
            *network = None;
        }
        network.get_or_insert_with(|| Network::new(input_dim, units, rng))
    }

    fn train_step(network: &mut Network, x: &Array1<f64>, target: &[f64; 6], lr: f64) -> f64 {
        let fwd = network.forward(x);

        let mut grad = Array1::<f64>::zeros(OUTPUTS);
        let mut loss = 0.0;
        for c in 0..CLASSES {
            grad[c] = CLASS_WEIGHT * (fwd.probs[c] - target[c]);
            if target[c] > 0.0 {
                loss -= CLASS_WEIGHT * target[c] * fwd.probs[c].max(1e-12).ln();
            }
        }
        for r in CLASSES..OUTPUTS {
            let diff = fwd.logits[r] - target[r];
            grad[r] = REGRESSION_WEIGHT * 2.0 * diff / (OUTPUTS - CLASSES) as f64;
            loss += REGRESSION_WEIGHT * diff * diff / (OUTPUTS - CLASSES) as f64;
        }
        grad.mapv_inplace(|g| g.clamp(-GRAD_CLIP, GRAD_CLIP));

        let d_hidden = network.w2.t().dot(&grad) * fwd.hidden.mapv(|h| 1.0 - h * h);

        let grad_col = grad.view().insert_axis(ndarray::Axis(1));
        let hidden_row = fwd.hidden.view().insert_axis(ndarray::Axis(0));
        network.w2.scaled_add(-lr, &grad_col.dot(&hidden_row));
        network.b2.scaled_add(-lr, &grad);

        let dh_col = d_hidden.view().insert_axis(ndarray::Axis(1));
        let x_row = x.view().insert_axis(ndarray::Axis(0));
        network.w1.scaled_add(-lr, &dh_col.dot(&x_row));
        network.b1.scaled_add(-lr, &d_hidden);

        loss
    }
}

impl Predictor for SoftmaxPredictor {
    fn predict(&self, window: &FeatureWindow) -> Result<Prediction, PredictorError> {
        let x = Self::flatten(window)?;
        let hp = read_hyperparams(&self.hyperparams);
        let mut state = self.lock();
        let network = Self::ensure_network(&mut state, x.len(), &hp);
        let fwd = network.forward(&x);

        let prediction = Prediction {
            long_prob: fwd.probs[0],
            short_prob: fwd.probs[1],
            wait_prob: fwd.probs[2],
            entry_delta: fwd.logits[3],
            tp_delta: fwd.logits[4],
            sl_delta: fwd.logits[5],
        };
        let values = [
            prediction.long_prob,
            prediction.short_prob,
            prediction.wait_prob,
            prediction.entry_delta,
            prediction.tp_delta,
            prediction.sl_delta,
        ];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(PredictorError::State {
                reason: "non-finite prediction".to_string(),
            });
        }
        Ok(prediction)
    }

    fn fit(&self, batch: &[TrainingSample]) -> Result<FitReport, PredictorError> {
        self.train(batch, None)
    }

    fn fit_epochs(
        &self,
        batch: &[TrainingSample],
        epochs: usize,
    ) -> Result<FitReport, PredictorError> {
        self.train(batch, Some(epochs))
    }

    fn name(&self) -> &str {
        "softmax-mlp"
    }
}

impl SoftmaxPredictor {
    /// `epochs` overrides the shared hyperparameter when set
    fn train(
        &self,
        batch: &[TrainingSample],
        epochs: Option<usize>,
    ) -> Result<FitReport, PredictorError> {
        if batch.is_empty() {
            return Ok(FitReport::default());
        }
        let inputs = batch
            .iter()
            .map(|s| Self::flatten(&s.window))
            .collect::<Result<Vec<_>, _>>()?;
        let input_dim = inputs[0].len();
        if let Some(bad) = inputs.iter().find(|x| x.len() != input_dim) {
            return Err(PredictorError::ShapeMismatch {
                expected: (batch[0].window.len(), input_dim),
                actual: (batch[0].window.len(), bad.len()),
            });
        }
        let targets: Vec<[f64; 6]> = batch.iter().map(|s| s.label.to_target()).collect();

        let hp = read_hyperparams(&self.hyperparams);
        let epochs = epochs.unwrap_or(hp.epochs).max(1);
        let lr = self.learning_rate;

        let mut state = self.lock();
        let network = Self::ensure_network(&mut state, input_dim, &hp);
        let backup = network.clone();

        let mut loss = 0.0;
        for _ in 0..epochs {
            loss = 0.0;
            for (x, target) in inputs.iter().zip(&targets) {
                loss += Self::train_step(network, x, target, lr);
            }
            loss /= inputs.len() as f64;
        }

        if !network.is_finite() || !loss.is_finite() {
            warn!("SoftmaxPredictor: Training diverged, restoring previous weights");
            *network = backup;
            return Err(PredictorError::State {
                reason: "training diverged".to_string(),
            });
        }

        let correct = inputs
            .iter()
            .zip(&targets)
            .filter(|(x, target)| {
                let probs = network.forward(x).probs;
                argmax(probs.as_slice().unwrap_or(&[])) == argmax(&target[..CLASSES])
            })
            .count();
        let accuracy = correct as f64 / inputs.len() as f64;

        debug!(
            "SoftmaxPredictor: Fitted {} samples x {} epochs | loss {:.4} | accuracy {:.2}%",
            inputs.len(),
            epochs,
            loss,
            accuracy * 100.0
        );
        Ok(FitReport {
            loss,
            accuracy,
            samples: inputs.len(),
        })
    }
}
