//! The two wire-level report types the handler consumes and produces.
//!
//! [`HwpcReport`] mirrors the external sensor's schema (spec.md §6): a
//! timestamped snapshot of `rapl`/`pcu`/`core` event groups, grouped by
//! socket and then by CPU. [`PowerReport`] mirrors the sink's schema.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The target name reserved for the whole-system report within a tick.
pub const TARGET_ALL: &str = "all";

pub type SocketId = String;
pub type CpuId = String;
pub type EventName = String;
pub type TargetId = String;

/// Events of a single group (e.g. `core`) on one CPU: event name to raw counter value.
pub type EventMap = HashMap<EventName, u64>;

/// A group's events, indexed by socket then by CPU.
pub type GroupMap = HashMap<SocketId, HashMap<CpuId, EventMap>>;

/// A monotonic wall-clock instant at millisecond resolution.
///
/// Wraps [`DateTime<Utc>`] rather than re-deriving a clock abstraction: the
/// sensor transport already hands us ISO-8601 timestamps, and `DateTime`
/// gives us `Ord`/`Hash`/serde for free.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub DateTime<Utc>);

impl Timestamp {
    pub fn now() -> Self {
        Timestamp(Utc::now())
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
    }
}

/// A hardware-performance-counter snapshot for one target, produced once per
/// sampling interval by the external sensor (spec.md §3, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HwpcReport {
    pub timestamp: Timestamp,
    pub sensor: String,
    pub target: TargetId,
    /// Keyed by group name: at least `"rapl"`, `"pcu"`, `"core"` for the `"all"` target.
    pub groups: HashMap<String, GroupMap>,
}

impl HwpcReport {
    pub fn group(&self, name: &str) -> Option<&GroupMap> {
        self.groups.get(name)
    }
}

/// CPU or DRAM: selects which RAPL reference event a handler uses (spec.md §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Cpu,
    Dram,
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scope::Cpu => write!(f, "cpu"),
            Scope::Dram => write!(f, "dram"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerReportMetadata {
    pub scope: Scope,
    pub socket: SocketId,
    pub formula: String,
}

/// A single power estimation emitted by a handler: one per RAPL reference,
/// one whole-system estimate, and one per observed target (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerReport {
    pub timestamp: Timestamp,
    pub sensor: String,
    pub target: TargetId,
    pub power: f64,
    pub metadata: PowerReportMetadata,
}
