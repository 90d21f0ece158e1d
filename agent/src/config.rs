//! The agent's own TOML configuration, nesting the `hwpc-power` formula
//! config under its own table the same way `plugin-csv`'s config nests
//! under its own plugin name.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Name reported in every emitted power report.
    pub sensor_name: String,
    /// One handler pair (CPU + DRAM, per `formula.disable_*_formula`) is
    /// spawned per socket listed here.
    pub sockets: Vec<String>,
    pub formula: hwpc_power::Config,
    pub source: SourceConfig,
    pub sink: SinkConfig,
    /// Absent by default: the carbon-intensity side channel is opt-in.
    pub carbon: Option<CarbonConfig>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            sensor_name: "hwpc-sensor".to_string(),
            sockets: vec!["0".to_string()],
            formula: hwpc_power::Config::default(),
            source: SourceConfig::default(),
            sink: SinkConfig::default(),
            carbon: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    /// Path to a newline-delimited JSON file of `HwpcReport`s, replayed in
    /// order. The real sensor transport is out of scope (spec.md §1); this
    /// is the stand-in ingestion path used for local runs and testing.
    pub input_path: PathBuf,
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig {
            input_path: PathBuf::from("hwpc-reports.jsonl"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SinkConfig {
    /// Path to the CSV file power reports are appended to.
    pub output_path: PathBuf,
    /// Do we flush after each write?
    pub force_flush: bool,
    /// Maximum number of retries after a transient write failure.
    pub max_retries: u32,
    #[serde(with = "humantime_serde")]
    pub retry_backoff: Duration,
}

impl Default for SinkConfig {
    fn default() -> Self {
        SinkConfig {
            output_path: PathBuf::from("hwpc-power.csv"),
            force_flush: true,
            max_retries: 5,
            retry_backoff: Duration::from_millis(200),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CarbonConfig {
    /// Base URL of the carbon-intensity API (e.g. a WattTime-compatible endpoint).
    pub api_url: String,
    pub api_token: String,
    pub region: String,
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
}
