//! Ingestion of raw `HwpcReport`s. The sensor transport that produces these
//! reports in production is out of scope (spec.md §1 Non-goals); this
//! module only replays them from a newline-delimited JSON file, which is
//! enough to drive the handlers end to end.

use std::path::Path;

use hwpc_power::report::HwpcReport;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("failed to open input file `{path}`: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read a line from `{path}`: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("line {line} of `{path}` is not a valid HwpcReport: {source}")]
    Decode {
        path: String,
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Reads every `HwpcReport` out of a newline-delimited JSON file, in order.
/// Blank lines are skipped.
pub async fn read_jsonl(path: impl AsRef<Path>) -> Result<Vec<HwpcReport>, SourceError> {
    let path_str = path.as_ref().display().to_string();
    let file = tokio::fs::File::open(path.as_ref())
        .await
        .map_err(|source| SourceError::Open {
            path: path_str.clone(),
            source,
        })?;
    let mut lines = BufReader::new(file).lines();

    let mut reports = Vec::new();
    let mut line_no = 0usize;
    while let Some(line) = lines.next_line().await.map_err(|source| SourceError::Read {
        path: path_str.clone(),
        source,
    })? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        let report: HwpcReport = serde_json::from_str(&line).map_err(|source| SourceError::Decode {
            path: path_str.clone(),
            line: line_no,
            source,
        })?;
        reports.push(report);
    }
    Ok(reports)
}
