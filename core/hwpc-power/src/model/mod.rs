//! Key-addressable collection of [`PowerModel`]s, one per frequency layer
//! (spec.md §4.3).

mod regression;

pub use regression::{Features, PowerModel};

use std::collections::HashMap;

/// Parameters needed to derive a Core vector's frequency-layer key.
#[derive(Debug, Clone)]
pub struct FrequencyConfig {
    pub unhalted_cycles_event: String,
    pub reference_cycles_event: String,
    pub base_clock: f64,
    pub frequency_min: i64,
    pub frequency_max: i64,
}

/// The key reserved for ticks whose reference-cycles counter is zero (the
/// CPU was idle for the whole interval, so no frequency can be derived).
pub const IDLE_KEY: i64 = i64::MIN;

/// Derives the frequency-layer key of a Core vector: a coarse bucket of the
/// socket's observed average frequency, clamped to the configured range
/// (spec.md §4.3).
pub fn frequency_layer_key(core: &Features, config: &FrequencyConfig) -> i64 {
    let unhalted = core.get(&config.unhalted_cycles_event).copied().unwrap_or(0);
    let reference = core.get(&config.reference_cycles_event).copied().unwrap_or(0);

    if reference == 0 {
        return IDLE_KEY;
    }

    let observed_frequency = (unhalted as f64 / reference as f64) * config.base_clock;
    (observed_frequency.floor() as i64).clamp(config.frequency_min, config.frequency_max)
}

/// A lazily populated map from frequency-layer key to power model. Each
/// socket/scope handler owns exactly one collection.
pub struct PowerModelCollection {
    models: HashMap<i64, PowerModel>,
    window_size: usize,
    min_samples: usize,
}

impl PowerModelCollection {
    pub fn new(window_size: usize, min_samples: usize) -> Self {
        PowerModelCollection {
            models: HashMap::new(),
            window_size,
            min_samples,
        }
    }

    /// Returns the model for `key`, creating it (unfitted, empty history)
    /// if this is the first tick requesting it.
    pub fn get_or_create(&mut self, key: i64) -> &mut PowerModel {
        self.models
            .entry(key)
            .or_insert_with(|| PowerModel::new(self.window_size, self.min_samples))
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
