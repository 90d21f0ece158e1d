//! Drives adaptive retraining of a power model against the RAPL ground
//! truth (spec.md §4.4).

use crate::model::{Features, PowerModel};

/// If the model's whole-system prediction diverges from the RAPL-measured
/// ground truth by more than `error_threshold` watts, record the sample
/// and refit; otherwise leave the model untouched (P6).
pub struct ErrorDrivenTrainer {
    pub error_threshold: f64,
}

impl ErrorDrivenTrainer {
    pub fn new(error_threshold: f64) -> Self {
        ErrorDrivenTrainer { error_threshold }
    }

    /// `predicted_system_power` is `None` when the model could not predict
    /// at all this tick (`ModelNotInitialized`): in that case training
    /// always proceeds, so the model can bootstrap (spec.md §4.5 step 4).
    pub fn maybe_retrain(
        &self,
        model: &mut PowerModel,
        rapl_power: f64,
        predicted_system_power: Option<f64>,
        global_core_features: Features,
    ) {
        let should_train = match predicted_system_power {
            Some(predicted) => (rapl_power - predicted).abs() > self.error_threshold,
            None => true,
        };
        if should_train {
            model.record(global_core_features, rapl_power);
            model.fit();
        }
    }
}
