//! Recognised configuration options for a report handler (spec.md §6),
//! matching `plugin-rapl`'s `#[serde] struct Config` convention: a plain
//! struct with `#[serde(deny_unknown_fields)]` and an explicit `Default` impl.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::model::FrequencyConfig;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// RAPL event used as reference for the CPU power models.
    pub cpu_rapl_ref_event: String,
    /// RAPL event used as reference for the DRAM power models.
    pub dram_rapl_ref_event: String,

    /// Watts; retrain the CPU model when `|error|` exceeds this.
    pub cpu_error_threshold: f64,
    /// Watts; retrain the DRAM model when `|error|` exceeds this.
    pub dram_error_threshold: f64,

    /// Minimum history length required before a model can be fitted.
    pub learn_min_samples_required: usize,
    /// Maximum length of a model's training history.
    pub learn_history_window_size: usize,

    /// Time between two ticks, used to convert RAPL energy counters to watts.
    #[serde(with = "humantime_serde")]
    pub sensor_report_sampling_interval: Duration,

    /// Nameplate thermal design power, informational (kept for parity with
    /// the original formula's configuration surface).
    pub cpu_tdp: f64,
    /// Base clock frequency, in the same unit as the frequency range below.
    pub cpu_base_clock: f64,
    pub cpu_frequency_min: i64,
    pub cpu_frequency_base: i64,
    pub cpu_frequency_max: i64,

    /// Counter names used to derive the frequency-layer key (spec.md §4.3).
    pub unhalted_cycles_event: String,
    pub reference_cycles_event: String,

    /// Core counters treated as "activity" counters for the apportionment
    /// rule (spec.md Glossary). Not specified concretely by the
    /// specification; `instructions_retired` is the activity counter this
    /// crate defaults to, see DESIGN.md.
    pub activity_counters: Vec<String>,

    /// If true, look-ahead K=2 (lower latency, higher risk of dropping late
    /// reports); else K=5.
    pub real_time_mode: bool,

    pub disable_cpu_formula: bool,
    pub disable_dram_formula: bool,
}

impl Config {
    /// The look-ahead `K` used by the tick buffer (spec.md §4.2).
    pub fn look_ahead(&self) -> usize {
        if self.real_time_mode {
            2
        } else {
            5
        }
    }

    pub fn frequency_config(&self) -> FrequencyConfig {
        FrequencyConfig {
            unhalted_cycles_event: self.unhalted_cycles_event.clone(),
            reference_cycles_event: self.reference_cycles_event.clone(),
            base_clock: self.cpu_base_clock,
            frequency_min: self.cpu_frequency_min,
            frequency_max: self.cpu_frequency_max,
        }
    }

    pub fn sampling_interval_secs(&self) -> f64 {
        self.sensor_report_sampling_interval.as_secs_f64()
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            cpu_rapl_ref_event: "RAPL_ENERGY_PKG".to_string(),
            dram_rapl_ref_event: "RAPL_ENERGY_DRAM".to_string(),
            cpu_error_threshold: 5.0,
            dram_error_threshold: 2.0,
            learn_min_samples_required: 10,
            learn_history_window_size: 60,
            sensor_report_sampling_interval: Duration::from_secs(1),
            cpu_tdp: 125.0,
            cpu_base_clock: 100.0,
            cpu_frequency_min: 4,
            cpu_frequency_base: 19,
            cpu_frequency_max: 42,
            unhalted_cycles_event: "unhalted_cycles".to_string(),
            reference_cycles_event: "reference_cycles".to_string(),
            activity_counters: vec!["instructions_retired".to_string()],
            real_time_mode: false,
            disable_cpu_formula: false,
            disable_dram_formula: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_look_ahead_is_5() {
        assert_eq!(Config::default().look_ahead(), 5);
    }

    #[test]
    fn real_time_mode_reduces_look_ahead_to_2() {
        let mut config = Config::default();
        config.real_time_mode = true;
        assert_eq!(config.look_ahead(), 2);
    }

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = Config::default();
        let serialized = toml::to_string(&config).unwrap();
        let deserialized: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(deserialized.cpu_rapl_ref_event, config.cpu_rapl_ref_event);
        assert_eq!(deserialized.learn_history_window_size, config.learn_history_window_size);
    }
}
