//! Per-socket HWPC/RAPL report handling: buffering raw counter snapshots
//! into ticks, deriving per-frequency-layer power models, and emitting
//! whole-system and per-target power estimates.

pub mod config;
pub mod decoder;
pub mod error;
pub mod handler;
pub mod model;
pub mod report;
pub mod tick_buffer;
pub mod trainer;

pub use config::Config;
pub use handler::ReportHandler;
pub use report::{HwpcReport, PowerReport, Scope};
