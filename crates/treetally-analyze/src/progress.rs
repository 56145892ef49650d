//! Progress reporting for batched and streamed queries.

use std::time::{Duration, Instant};

/// Snapshot sent after each batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchProgress {
    /// Batches folded in so far.
    pub batches_completed: u64,
    /// Rows folded in so far.
    pub rows_processed: u64,
    /// Row count estimate the plan was made with.
    pub estimated_rows: Option<u64>,
    /// Time since execution started.
    pub elapsed: Duration,
}

impl BatchProgress {
    /// Fraction of the estimated rows processed, if the estimate is known.
    pub fn fraction_complete(&self) -> Option<f64> {
        match self.estimated_rows {
            Some(0) => Some(1.0),
            Some(total) => Some((self.rows_processed as f64 / total as f64).min(1.0)),
            None => None,
        }
    }

    /// Rows per second.
    pub fn rows_per_second(&self) -> f64 {
        if self.elapsed.as_secs_f64() > 0.0 {
            self.rows_processed as f64 / self.elapsed.as_secs_f64()
        } else {
            0.0
        }
    }
}

/// Counts batches and rows with timing.
#[derive(Debug)]
pub(crate) struct ProgressTracker {
    start_time: Instant,
    estimated_rows: Option<u64>,
    batches_completed: u64,
    rows_processed: u64,
}

impl ProgressTracker {
    pub fn new(estimated_rows: Option<u64>) -> Self {
        Self {
            start_time: Instant::now(),
            estimated_rows,
            batches_completed: 0,
            rows_processed: 0,
        }
    }

    pub fn record_batch(&mut self, rows: usize) {
        self.batches_completed += 1;
        self.rows_processed += rows as u64;
    }

    pub fn batches_completed(&self) -> u64 {
        self.batches_completed
    }

    pub fn snapshot(&self) -> BatchProgress {
        BatchProgress {
            batches_completed: self.batches_completed,
            rows_processed: self.rows_processed,
            estimated_rows: self.estimated_rows,
            elapsed: self.start_time.elapsed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fraction_complete() {
        let mut tracker = ProgressTracker::new(Some(200));
        tracker.record_batch(50);
        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.batches_completed, 1);
        assert_eq!(snapshot.fraction_complete(), Some(0.25));

        assert_eq!(ProgressTracker::new(None).snapshot().fraction_complete(), None);
        assert_eq!(ProgressTracker::new(Some(0)).snapshot().fraction_complete(), Some(1.0));
    }
}
