use super::predictor::Predictor;
use crate::application::training::training_controller::{STABLE_MEAN_ACCURACY, TrainingController};
use crate::domain::errors::PredictorError;
use crate::domain::ml::{FitReport, TrainingSample};
use crate::infrastructure::observability::Metrics;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

/// Epochs per incremental fit
pub const ONLINE_EPOCHS: usize = 1;

/// Accumulates labelled windows and fits the predictor in small batches.
///
/// A batch is fitted once it reaches `batch_size`, or on every sample while
/// the rolling accuracy sits below the stability mean. An empty accuracy
/// history counts as zero.
pub struct OnlineTrainer {
    predictor: Arc<dyn Predictor>,
    controller: Arc<TrainingController>,
    batch_size: usize,
    batch: Mutex<Vec<TrainingSample>>,
    metrics: Option<Metrics>,
}

impl OnlineTrainer {
    pub fn new(
        predictor: Arc<dyn Predictor>,
        controller: Arc<TrainingController>,
        batch_size: usize,
    ) -> Self {
        Self {
            predictor,
            controller,
            batch_size: batch_size.max(1),
            batch: Mutex::new(Vec::new()),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn predictor(&self) -> &Arc<dyn Predictor> {
        &self.predictor
    }

    pub fn controller(&self) -> &Arc<TrainingController> {
        &self.controller
    }

    fn lock(&self) -> MutexGuard<'_, Vec<TrainingSample>> {
        match self.batch.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn pending(&self) -> usize {
        self.lock().len()
    }

    fn should_fit(&self, pending: usize) -> bool {
        if pending >= self.batch_size {
            return true;
        }
        pending > 0 && self.controller.mean_accuracy().unwrap_or(0.0) < STABLE_MEAN_ACCURACY
    }

    /// Adds one sample and fits when the batching rule says so.
    ///
    /// Returns the fit report when a fit happened. A failed fit drops the
    /// batch; the predictor keeps its previous weights.
    pub fn observe(&self, sample: TrainingSample) -> Result<Option<FitReport>, PredictorError> {
        let batch = {
            let mut pending = self.lock();
            pending.push(sample);
            if !self.should_fit(pending.len()) {
                return Ok(None);
            }
            std::mem::take(&mut *pending)
        };

        match self.predictor.fit_epochs(&batch, ONLINE_EPOCHS) {
            Ok(report) => {
                debug!(
                    "OnlineTrainer: Fitted batch of {} | accuracy {:.2}%",
                    report.samples,
                    report.accuracy * 100.0
                );
                self.controller.record_accuracy(report.accuracy);
                if let Some(metrics) = &self.metrics {
                    metrics.training_fits_total.inc();
                }
                Ok(Some(report))
            }
            Err(e) => {
                warn!("OnlineTrainer: Fit of {} samples failed: {}", batch.len(), e);
                Err(e)
            }
        }
    }
}
