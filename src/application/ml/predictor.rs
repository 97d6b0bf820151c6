use crate::domain::errors::PredictorError;
use crate::domain::ml::{FeatureWindow, FitReport, Prediction, TrainingSample};

/// Interface for the trainable signal model
pub trait Predictor: Send + Sync {
    /// Class probabilities and ATR-unit level deltas for one window
    fn predict(&self, window: &FeatureWindow) -> Result<Prediction, PredictorError>;

    /// Training pass over `batch` for the configured number of epochs
    fn fit(&self, batch: &[TrainingSample]) -> Result<FitReport, PredictorError>;

    /// Training pass over `batch` for exactly `epochs` epochs
    fn fit_epochs(
        &self,
        batch: &[TrainingSample],
        _epochs: usize,
    ) -> Result<FitReport, PredictorError> {
        self.fit(batch)
    }

    /// Get model name/type
    fn name(&self) -> &str;
}
