//! Bounded rolling store of commanded-vs-feedback samples.
//!
//! Statistics are cached behind a dirty flag: a push only marks the cache
//! stale, and the O(n) recomputation runs on the first read after a change.

use std::collections::VecDeque;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use servo_traits::clock::{Clock, SystemClock};

use crate::error::ExportError;
use crate::util::write_atomic;

/// CSV header written by `export`.
pub const CSV_HEADER: [&str; 5] = [
    "Sample",
    "Timestamp",
    "Commanded_Angle",
    "Feedback_Angle",
    "Error",
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Push counter since creation or the last `clear`; never reused.
    pub sequence: u64,
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
    pub commanded_angle: f64,
    pub feedback_angle: f64,
    /// `commanded_angle - feedback_angle`, signed degrees.
    pub error: f64,
}

/// Aggregates over the errors currently retained.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Statistics {
    pub avg_error: f64,
    pub max_abs_error: f64,
    /// Population standard deviation.
    pub std_error: f64,
    pub count: usize,
}

impl Statistics {
    /// `None` when there are no samples, so "no data" never reads as zero error.
    fn compute<'a>(samples: impl ExactSizeIterator<Item = &'a Sample> + Clone) -> Option<Self> {
        let count = samples.len();
        if count == 0 {
            return None;
        }
        let n = count as f64;
        let mean = samples.clone().map(|s| s.error).sum::<f64>() / n;
        let (max_abs, sq) = samples.fold((0.0f64, 0.0f64), |(max_abs, sq), s| {
            let d = s.error - mean;
            (max_abs.max(s.error.abs()), sq + d * d)
        });
        Some(Self {
            avg_error: mean,
            max_abs_error: max_abs,
            std_error: (sq / n).sqrt(),
            count,
        })
    }
}

pub struct SampleBuffer {
    samples: VecDeque<Sample>,
    capacity: usize,
    next_sequence: u64,
    stats: Option<Statistics>,
    dirty: bool,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl core::fmt::Debug for SampleBuffer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SampleBuffer")
            .field("len", &self.samples.len())
            .field("capacity", &self.capacity)
            .field("dirty", &self.dirty)
            .finish()
    }
}

impl SampleBuffer {
    /// Buffer stamping samples with the system wall clock. A capacity of 0
    /// is raised to 1.
    pub fn new(capacity: usize) -> Self {
        Self::with_clock(capacity, Arc::new(SystemClock::new()))
    }

    pub fn with_clock(capacity: usize, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            next_sequence: 1,
            stats: None,
            dirty: true,
            clock,
        }
    }

    /// Append a sample, evicting the oldest when full. `timestamp` defaults
    /// to the clock's wall time.
    pub fn push(&mut self, commanded: f64, feedback: f64, timestamp: Option<f64>) -> Sample {
        let sample = Sample {
            sequence: self.next_sequence,
            timestamp: timestamp.unwrap_or_else(|| self.clock.unix_secs()),
            commanded_angle: commanded,
            feedback_angle: feedback,
            error: commanded - feedback,
        };
        self.next_sequence = self.next_sequence.saturating_add(1);
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
        self.dirty = true;
        sample
    }

    /// Cached statistics, recomputed only on the first call after a change.
    pub fn statistics(&mut self) -> Option<Statistics> {
        if self.dirty {
            self.stats = Statistics::compute(self.samples.iter());
            self.dirty = false;
        }
        self.stats
    }

    /// True when the next `statistics` call will recompute.
    pub fn is_stale(&self) -> bool {
        self.dirty
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.next_sequence = 1;
        self.stats = None;
        self.dirty = true;
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<&Sample> {
        self.samples.back()
    }

    /// Oldest first.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &Sample> + '_ {
        self.samples.iter()
    }

    pub fn snapshot(&self) -> Vec<Sample> {
        self.samples.iter().copied().collect()
    }

    /// Write the retained samples as CSV, numbered from 1 in insertion order.
    pub fn export<W: Write>(&self, sink: W) -> Result<(), ExportError> {
        let mut w = csv::Writer::from_writer(sink);
        w.write_record(CSV_HEADER)?;
        for (i, s) in self.samples.iter().enumerate() {
            w.write_record([
                (i + 1).to_string(),
                s.timestamp.to_string(),
                s.commanded_angle.to_string(),
                s.feedback_angle.to_string(),
                s.error.to_string(),
            ])?;
        }
        w.flush()?;
        Ok(())
    }

    /// `export` into `path`, replacing any existing file atomically.
    pub fn export_csv_file(&self, path: &Path) -> Result<(), ExportError> {
        write_atomic(path, |f| self.export(f))?;
        tracing::info!(path = %path.display(), rows = self.samples.len(), "samples exported");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statistics_cache_survives_reads() {
        let mut buf = SampleBuffer::new(4);
        buf.push(10.0, 8.0, Some(0.0));
        assert!(buf.is_stale());
        let first = buf.statistics();
        assert!(!buf.is_stale());
        assert_eq!(buf.statistics(), first);
        buf.push(10.0, 12.0, Some(1.0));
        assert!(buf.is_stale());
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let mut buf = SampleBuffer::new(0);
        buf.push(1.0, 1.0, Some(0.0));
        buf.push(2.0, 2.0, Some(1.0));
        assert_eq!(buf.capacity(), 1);
        assert_eq!(buf.len(), 1);
        assert_eq!(buf.latest().map(|s| s.sequence), Some(2));
    }
}
