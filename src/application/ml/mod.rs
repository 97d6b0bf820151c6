pub mod labeler;
pub mod online_trainer;
pub mod predictor;
pub mod softmax_predictor;

pub use predictor::Predictor;
