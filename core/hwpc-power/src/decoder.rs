//! Pure functions turning an [`HwpcReport`] into the three grouped event
//! vectors a handler works with (spec.md §4.1).
//!
//! None of these functions hold state or depend on call order (P1): they
//! only ever read the report they are given.

use std::collections::HashMap;

use crate::error::DecodeError;
use crate::report::{EventMap, HwpcReport};

/// Any event whose name starts with this prefix is a bookkeeping counter
/// (time spent in a given state), not an activity counter, and is excluded
/// from PCU and Core vectors.
const TIME_PREFIX: &str = "time_";

/// 2^-32 joules per raw RAPL count.
const RAPL_COUNTER_SCALE: f64 = 1.0 / 4_294_967_296.0; // 2^-32

fn first_cpu_events<'a>(
    report: &'a HwpcReport,
    group: &'static str,
    socket: &str,
) -> Result<&'a EventMap, DecodeError> {
    let by_socket = report
        .group(group)
        .ok_or_else(|| DecodeError::MissingGroup {
            group,
            target: report.target.clone(),
        })?;
    let by_cpu = by_socket
        .get(socket)
        .ok_or_else(|| DecodeError::MissingSocket {
            group,
            socket: socket.to_string(),
            target: report.target.clone(),
        })?;
    // "First CPU" is pinned to the lexicographically smallest cpu_id so that
    // decoding is deterministic regardless of the sensor's map iteration order.
    let first_cpu_id = by_cpu
        .keys()
        .min()
        .ok_or_else(|| DecodeError::EmptySocket {
            group,
            socket: socket.to_string(),
        })?;
    Ok(&by_cpu[first_cpu_id])
}

/// Converts the RAPL reference counter of `report` on `socket` to watts,
/// scaled by the sampling interval (spec.md §4.1, §9 Open Question: we
/// divide by the interval to yield watts rather than per-tick energy).
pub fn rapl_events(
    report: &HwpcReport,
    socket: &str,
    reference_event: &str,
    sampling_interval_secs: f64,
) -> Result<HashMap<String, f64>, DecodeError> {
    let cpu_events = first_cpu_events(report, "rapl", socket)?;
    let raw = cpu_events
        .get(reference_event)
        .ok_or_else(|| DecodeError::MissingEvent {
            event: reference_event.to_string(),
            socket: socket.to_string(),
        })?;
    let watts = (*raw as f64) * RAPL_COUNTER_SCALE / sampling_interval_secs;
    Ok(HashMap::from([(reference_event.to_string(), watts)]))
}

/// The PCU event vector for `socket`: the first CPU's PCU counters, minus
/// any `time_*` bookkeeping counter.
pub fn pcu_events(report: &HwpcReport, socket: &str) -> Result<HashMap<String, u64>, DecodeError> {
    let cpu_events = first_cpu_events(report, "pcu", socket)?;
    Ok(cpu_events
        .iter()
        .filter(|(name, _)| !name.starts_with(TIME_PREFIX))
        .map(|(name, value)| (name.clone(), *value))
        .collect())
}

/// The Core event vector for `socket`: non-`time_*` events summed across
/// every CPU of the socket. This is also the regression feature vector.
pub fn core_events(report: &HwpcReport, socket: &str) -> Result<HashMap<String, u64>, DecodeError> {
    let by_socket = report
        .group("core")
        .ok_or_else(|| DecodeError::MissingGroup {
            group: "core",
            target: report.target.clone(),
        })?;
    let by_cpu = by_socket
        .get(socket)
        .ok_or_else(|| DecodeError::MissingSocket {
            group: "core",
            socket: socket.to_string(),
            target: report.target.clone(),
        })?;

    let mut sums: HashMap<String, u64> = HashMap::new();
    for cpu_events in by_cpu.values() {
        for (name, value) in cpu_events {
            if !name.starts_with(TIME_PREFIX) {
                *sums.entry(name.clone()).or_insert(0) += value;
            }
        }
    }
    Ok(sums)
}

/// Element-wise sum of [`core_events`] over every report in `targets`
/// (which must exclude `"all"`): the feature vector used for whole-system
/// estimation and model selection.
pub fn aggregate_core_events<'a>(
    targets: impl Iterator<Item = &'a HwpcReport>,
    socket: &str,
) -> Result<HashMap<String, u64>, DecodeError> {
    let mut aggregate: HashMap<String, u64> = HashMap::new();
    for report in targets {
        for (name, value) in core_events(report, socket)? {
            *aggregate.entry(name).or_insert(0) += value;
        }
    }
    Ok(aggregate)
}
