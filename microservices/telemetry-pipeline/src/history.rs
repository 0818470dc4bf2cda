//! Feature History Cache
//!
//! Process-wide lag window: the two most recent finite values per metric,
//! newest first.

use airsense_core::{Measurements, Metric};
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Number of lag values kept per metric
pub const HISTORY_DEPTH: usize = 2;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistorySnapshot {
    lags: [VecDeque<f64>; Metric::COUNT],
}

impl HistorySnapshot {
    /// `index` 0 is the newest value
    pub fn lag(&self, metric: Metric, index: usize) -> Option<f64> {
        self.lags[metric.index()].get(index).copied()
    }

    pub fn len(&self, metric: Metric) -> usize {
        self.lags[metric.index()].len()
    }

    fn push(&mut self, measurements: &Measurements) {
        for (metric, value) in measurements.iter() {
            // a bad field must not evict a good lag
            if !value.is_finite() {
                continue;
            }
            let lags = &mut self.lags[metric.index()];
            lags.push_front(value);
            lags.truncate(HISTORY_DEPTH);
        }
    }
}

#[derive(Debug, Default)]
pub struct FeatureHistory {
    inner: Mutex<HistorySnapshot>,
}

impl FeatureHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the history before `measurements`, then record them.
    ///
    /// Both steps happen under one lock so concurrent readings never lose
    /// updates and each snapshot strictly predates its own reading.
    pub fn snapshot_and_record(&self, measurements: &Measurements) -> HistorySnapshot {
        let mut guard = self.inner.lock();
        let before = guard.clone();
        guard.push(measurements);
        before
    }

    pub fn snapshot(&self) -> HistorySnapshot {
        self.inner.lock().clone()
    }
}
