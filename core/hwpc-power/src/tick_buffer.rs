//! Time-indexed buffering of HWPC reports into ticks (spec.md §4.2).
//!
//! [`TickBuffer`] is an insertion-ordered map from timestamp to bucket,
//! backed by [`indexmap::IndexMap`] so that release order is always the
//! order in which timestamps were first seen (P2), with O(1) lookup by
//! timestamp for the last-writer-wins overwrite in `insert`.

use indexmap::IndexMap;

use crate::error::ReleaseError;
use crate::report::{HwpcReport, TargetId, Timestamp, TARGET_ALL};

/// All per-target reports that share one timestamp.
#[derive(Debug)]
pub struct TickBucket {
    pub timestamp: Timestamp,
    pub reports: IndexMap<TargetId, HwpcReport>,
}

impl TickBucket {
    fn new(timestamp: Timestamp) -> Self {
        TickBucket {
            timestamp,
            reports: IndexMap::new(),
        }
    }

    /// Splits this bucket into the `"all"` report and the remaining
    /// per-target reports, failing if `"all"` never arrived (spec.md §4.2).
    pub fn split_global(mut self) -> Result<(HwpcReport, IndexMap<TargetId, HwpcReport>), ReleaseError> {
        match self.reports.shift_remove(TARGET_ALL) {
            Some(global) => Ok((global, self.reports)),
            None => Err(ReleaseError::IncompleteTick {
                timestamp: self.timestamp,
            }),
        }
    }
}

/// Buffers reports until a configured look-ahead `K` of distinct
/// timestamps has accumulated, then releases the oldest bucket.
pub struct TickBuffer {
    look_ahead: usize,
    buckets: IndexMap<Timestamp, TickBucket>,
}

impl TickBuffer {
    pub fn new(look_ahead: usize) -> Self {
        TickBuffer {
            look_ahead,
            buckets: IndexMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Inserts `report` into the bucket for its timestamp (last-writer-wins
    /// per target), creating the bucket if needed. Releases the oldest
    /// bucket once the buffer holds more than `look_ahead` distinct
    /// timestamps.
    pub fn insert(&mut self, report: HwpcReport) -> Option<TickBucket> {
        let timestamp = report.timestamp;
        let target = report.target.clone();
        self.buckets
            .entry(timestamp)
            .or_insert_with(|| TickBucket::new(timestamp))
            .reports
            .insert(target, report);

        if self.buckets.len() > self.look_ahead {
            self.buckets.shift_remove_index(0).map(|(_, bucket)| bucket)
        } else {
            None
        }
    }

    /// Releases every remaining bucket in timestamp order, without waiting
    /// for the look-ahead to fill up again. Used when draining on shutdown
    /// (spec.md §5).
    pub fn drain_all(&mut self) -> Vec<TickBucket> {
        let mut out = Vec::with_capacity(self.buckets.len());
        while let Some((_, bucket)) = self.buckets.shift_remove_index(0) {
            out.push(bucket);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn ts(secs: i64) -> Timestamp {
        Timestamp(Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap())
    }

    fn report(timestamp: Timestamp, target: &str) -> HwpcReport {
        HwpcReport {
            timestamp,
            sensor: "s".into(),
            target: target.to_string(),
            groups: HashMap::new(),
        }
    }

    #[test]
    fn no_release_below_look_ahead() {
        let mut buf = TickBuffer::new(5);
        for i in 0..5 {
            assert!(buf.insert(report(ts(i), "all")).is_none());
        }
        assert_eq!(buf.len(), 5);
    }

    #[test]
    fn releases_oldest_once_over_capacity() {
        let mut buf = TickBuffer::new(5);
        for i in 0..5 {
            buf.insert(report(ts(i), "all"));
        }
        let released = buf.insert(report(ts(5), "all")).expect("should release");
        assert_eq!(released.timestamp, ts(0));
        assert_eq!(buf.len(), 5);
    }

    #[test]
    fn release_order_is_strictly_increasing_timestamp() {
        let mut buf = TickBuffer::new(2);
        let mut released = Vec::new();
        for i in 0..6 {
            if let Some(bucket) = buf.insert(report(ts(i), "all")) {
                released.push(bucket.timestamp);
            }
        }
        let mut sorted = released.clone();
        sorted.sort();
        assert_eq!(released, sorted);
    }

    #[test]
    fn last_writer_wins_within_a_bucket() {
        let mut buf = TickBuffer::new(5);
        buf.insert(report(ts(0), "mongodb"));
        buf.insert(report(ts(0), "mongodb"));
        for i in 1..6 {
            buf.insert(report(ts(i), "all"));
        }
        let released = buf.insert(report(ts(6), "all")).unwrap();
        assert_eq!(released.reports.len(), 1);
    }

    #[test]
    fn split_global_fails_without_all_target() {
        let mut buf = TickBuffer::new(0);
        let released = buf.insert(report(ts(0), "mongodb")).unwrap();
        assert_eq!(
            released.split_global().unwrap_err(),
            ReleaseError::IncompleteTick { timestamp: ts(0) }
        );
    }

    #[test]
    fn drain_all_empties_buffer_in_order() {
        let mut buf = TickBuffer::new(5);
        for i in 0..3 {
            buf.insert(report(ts(i), "all"));
        }
        let drained = buf.drain_all();
        assert_eq!(drained.len(), 3);
        assert!(buf.is_empty());
        assert_eq!(drained[0].timestamp, ts(0));
        assert_eq!(drained[2].timestamp, ts(2));
    }
}
