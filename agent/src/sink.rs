//! Writes emitted `PowerReport`s out to CSV, retrying with a fixed backoff
//! on transient write failures (spec.md §7 `SinkUnavailable`).

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::Duration;

use hwpc_power::report::PowerReport;

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("failed to open output file `{path}`: {source}")]
    Open {
        path: String,
        #[source]
        source: io::Error,
    },
    /// A write failed but may succeed on retry (e.g. a transient disk or
    /// network condition); distinct from `Open`, which is not retried.
    #[error("sink unavailable after {attempts} attempt(s): {source}")]
    Unavailable {
        attempts: u32,
        #[source]
        source: io::Error,
    },
}

/// Appends power reports to a CSV file, one row per report.
pub struct CsvSink {
    writer: BufWriter<File>,
    force_flush: bool,
    max_retries: u32,
    retry_backoff: Duration,
    header_written: bool,
}

const HEADER: &str = "timestamp,sensor,target,power,scope,socket,formula";

impl CsvSink {
    pub fn new(output_path: impl AsRef<Path>, force_flush: bool, max_retries: u32, retry_backoff: Duration) -> Result<Self, SinkError> {
        let path = output_path.as_ref();
        let existed = path.exists();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| SinkError::Open {
                path: path.display().to_string(),
                source,
            })?;
        Ok(CsvSink {
            writer: BufWriter::new(file),
            force_flush,
            max_retries,
            retry_backoff,
            header_written: existed,
        })
    }

    /// Writes one report, blocking-retrying up to `max_retries` times with a
    /// fixed backoff if the underlying write fails transiently.
    pub fn write(&mut self, report: &PowerReport) -> Result<(), SinkError> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.try_write(report) {
                Ok(()) => return Ok(()),
                Err(source) if attempts <= self.max_retries => {
                    log::warn!("sink write failed (attempt {attempts}/{}): {source}", self.max_retries);
                    std::thread::sleep(self.retry_backoff);
                }
                Err(source) => return Err(SinkError::Unavailable { attempts, source }),
            }
        }
    }

    fn try_write(&mut self, report: &PowerReport) -> io::Result<()> {
        if !self.header_written {
            writeln!(self.writer, "{HEADER}")?;
            self.header_written = true;
        }
        writeln!(
            self.writer,
            "{},{},{},{},{},{},{}",
            report.timestamp,
            report.sensor,
            report.target,
            report.power,
            report.metadata.scope,
            report.metadata.socket,
            report.metadata.formula,
        )?;
        if self.force_flush {
            self.writer.flush()?;
        }
        Ok(())
    }
}
