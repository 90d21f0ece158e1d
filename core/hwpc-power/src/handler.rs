//! The per-`(sensor, socket, scope)` state machine that ties the decoder,
//! tick buffer, power-model collection and trainer together (spec.md §4.5).

use std::collections::HashSet;

use crate::config::Config;
use crate::decoder;
use crate::model::{frequency_layer_key, PowerModelCollection};
use crate::report::{HwpcReport, PowerReport, PowerReportMetadata, Scope, SocketId, Timestamp};
use crate::tick_buffer::{TickBucket, TickBuffer};
use crate::trainer::ErrorDrivenTrainer;

/// One instance per `(sensor, socket, scope)` triple. Owns its tick buffer
/// and power-model collection exclusively; nothing outside this handler
/// mutates either (spec.md §5).
pub struct ReportHandler {
    sensor: String,
    socket: SocketId,
    scope: Scope,
    reference_event: String,
    config: Config,
    buffer: TickBuffer,
    models: PowerModelCollection,
    trainer: ErrorDrivenTrainer,
    /// Model hashes we've already warned about producing an invalid
    /// estimate, so each one is logged only once (spec.md §7).
    warned_hashes: HashSet<u64>,
}

impl ReportHandler {
    pub fn new(sensor: impl Into<String>, socket: impl Into<SocketId>, scope: Scope, config: Config) -> Self {
        let reference_event = match scope {
            Scope::Cpu => config.cpu_rapl_ref_event.clone(),
            Scope::Dram => config.dram_rapl_ref_event.clone(),
        };
        let error_threshold = match scope {
            Scope::Cpu => config.cpu_error_threshold,
            Scope::Dram => config.dram_error_threshold,
        };
        let look_ahead = config.look_ahead();
        let window_size = config.learn_history_window_size;
        let min_samples = config.learn_min_samples_required;

        ReportHandler {
            sensor: sensor.into(),
            socket: socket.into(),
            scope,
            reference_event,
            config,
            buffer: TickBuffer::new(look_ahead),
            models: PowerModelCollection::new(window_size, min_samples),
            trainer: ErrorDrivenTrainer::new(error_threshold),
            warned_hashes: HashSet::new(),
        }
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn socket(&self) -> &str {
        &self.socket
    }

    /// Numbers of distinct frequency-layer models created so far. Exposed
    /// for tests and diagnostics, not part of the wire contract.
    pub fn model_count(&self) -> usize {
        self.models.len()
    }

    /// Ingests one HWPC report (Warming/Steady states of spec.md §4.5):
    /// buffers it, and if a bucket is released as a result, processes it
    /// into zero or more power reports.
    pub fn ingest(&mut self, report: HwpcReport) -> Vec<PowerReport> {
        match self.buffer.insert(report) {
            Some(bucket) => self.process_bucket(bucket),
            None => Vec::new(),
        }
    }

    /// Releases every bucket still held by the tick buffer, in timestamp
    /// order and without further look-ahead, and processes each one. Used
    /// when the source closes its channel (spec.md §5 Cancellation).
    pub fn drain(&mut self) -> Vec<PowerReport> {
        self.buffer
            .drain_all()
            .into_iter()
            .flat_map(|bucket| self.process_bucket(bucket))
            .collect()
    }

    fn process_bucket(&mut self, bucket: TickBucket) -> Vec<PowerReport> {
        let timestamp = bucket.timestamp;
        let (global, targets) = match bucket.split_global() {
            Ok(split) => split,
            Err(e) => {
                log::warn!("{} {}/{}: {e}", self.sensor, self.socket, self.scope);
                return Vec::new();
            }
        };

        let rapl = match decoder::rapl_events(
            &global,
            &self.socket,
            &self.reference_event,
            self.config.sampling_interval_secs(),
        ) {
            Ok(rapl) => rapl,
            Err(e) => {
                log::warn!(
                    "{} {}/{}: dropping tick at {timestamp}: {e}",
                    self.sensor,
                    self.socket,
                    self.scope
                );
                return Vec::new();
            }
        };

        // The "all" report must carry rapl, pcu and core groups (spec.md
        // §3); a missing pcu group is malformed the same way a missing
        // rapl group is, even though only core feeds the model directly.
        if let Err(e) = decoder::pcu_events(&global, &self.socket) {
            log::warn!(
                "{} {}/{}: dropping tick at {timestamp}: {e}",
                self.sensor,
                self.socket,
                self.scope
            );
            return Vec::new();
        }

        let global_core = match decoder::aggregate_core_events(targets.values(), &self.socket) {
            Ok(core) => core,
            Err(e) => {
                log::warn!(
                    "{} {}/{}: dropping tick at {timestamp}: {e}",
                    self.sensor,
                    self.socket,
                    self.scope
                );
                return Vec::new();
            }
        };

        let mut reports = Vec::new();
        // Captured before `model` borrows `self.models` mutably below, so
        // building a PowerReport never needs a second borrow of `self`.
        let sensor = self.sensor.clone();
        let socket = self.socket.clone();
        let scope = self.scope;
        let make_report = |target: String, power: f64, formula: String| PowerReport {
            timestamp,
            sensor: sensor.clone(),
            target,
            power,
            metadata: PowerReportMetadata {
                scope,
                socket: socket.clone(),
                formula,
            },
        };

        let rapl_power = rapl[&self.reference_event];
        reports.push(make_report("rapl".to_string(), rapl_power, self.reference_event.clone()));

        let key = frequency_layer_key(&global_core, &self.config.frequency_config());
        let activity_counters = self.config.activity_counters.clone();
        let model = self.models.get_or_create(key);

        let predicted_system_power = match model.predict(&global_core) {
            Ok(system_power) => {
                let formula_id = model.formula_id();
                let clamped = Self::clamp_power(&mut self.warned_hashes, system_power, &formula_id);
                reports.push(make_report("global".to_string(), clamped, formula_id.clone()));

                let mut target_ids: Vec<_> = targets.keys().cloned().collect();
                target_ids.sort();
                for target_id in target_ids {
                    let target_report = &targets[&target_id];
                    let target_core = match decoder::core_events(target_report, &socket) {
                        Ok(core) => core,
                        Err(e) => {
                            log::warn!(
                                "{sensor} {socket}/{scope}: dropping target `{target_id}` at {timestamp}: {e}"
                            );
                            continue;
                        }
                    };
                    // Already known to be fitted (we just predicted above),
                    // so this cannot fail with ModelNotInitialized.
                    let target_power = model
                        .predict_with(&global_core, &target_core, &activity_counters)
                        .unwrap_or(0.0);
                    let clamped = Self::clamp_power(&mut self.warned_hashes, target_power, &formula_id);
                    reports.push(make_report(target_id, clamped, formula_id.clone()));
                }
                Some(system_power)
            }
            Err(_model_not_initialized) => {
                log::debug!(
                    "{sensor} {socket}/{scope}: model for frequency layer {key} not yet initialized, skipping predictions for {timestamp}"
                );
                None
            }
        };

        self.trainer
            .maybe_retrain(model, rapl_power, predicted_system_power, global_core);

        reports
    }

    /// Clamps NaN/infinite/negative estimates to zero, logging once per
    /// model hash (spec.md §7 InvariantViolation).
    fn clamp_power(warned_hashes: &mut HashSet<u64>, value: f64, formula_id: &str) -> f64 {
        if value.is_nan() || value.is_infinite() || value < 0.0 {
            if warned_hashes.insert(string_hash(formula_id)) {
                log::warn!("model {formula_id} produced an invalid power estimate ({value}), clamping to 0");
            }
            0.0
        } else {
            value
        }
    }
}

fn string_hash(s: &str) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = rustc_hash::FxHasher::default();
    s.hash(&mut hasher);
    hasher.finish()
}
