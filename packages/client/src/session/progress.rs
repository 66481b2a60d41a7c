//! Fractional progress bookkeeping
//!
//! One tracker per transfer direction. A report fires whenever the running
//! byte count crosses the next step threshold, or when the transfer
//! completes, whichever comes first; the threshold is then re-derived from
//! the report index so the reported fractions are non-decreasing and the
//! final report always lands at 100%.

use crate::options::{ProgressFn, DEFAULT_PROGRESS_STEP};

pub(crate) struct Progress {
    cb: Option<ProgressFn>,
    step: f64,
    total: u64,
    processed: u64,
    index: u64,
    threshold: u64,
}

impl Progress {
    /// Active only when both a callback and a known payload size exist.
    pub(crate) fn new(cb: Option<ProgressFn>, step: Option<f64>, total: Option<u64>) -> Self {
        let (cb, total) = match (cb, total) {
            (Some(cb), Some(total)) => (Some(cb), total),
            _ => (None, 0),
        };
        Progress {
            cb,
            step: step.unwrap_or(DEFAULT_PROGRESS_STEP),
            total,
            processed: 0,
            index: 0,
            threshold: 0,
        }
    }

    /// Account for `bytes` more transferred bytes; `done` marks the final
    /// chunk of the transfer.
    pub(crate) fn record(&mut self, bytes: u64, done: bool) {
        let Some(cb) = self.cb.as_ref() else {
            return;
        };
        self.processed += bytes;
        if self.processed > self.threshold || done {
            self.index += 1;
            cb(self.total, self.processed);
            self.threshold = (self.total as f64 * self.index as f64 * self.step) as u64;
        }
    }
}
