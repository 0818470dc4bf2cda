//! Feature Builder
//!
//! Fixed-order model input: current values, two lags per metric and a
//! cyclical time-of-day encoding.

use airsense_core::{Metric, RawReading};
use chrono::{DateTime, FixedOffset, Timelike};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::history::HistorySnapshot;

pub const FEATURE_COUNT: usize = 17;

pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "temp_c",
    "rh_pct",
    "tvoc_ppb",
    "eco2_ppm",
    "dust_ugm3",
    "temp_c_lag1",
    "temp_c_lag2",
    "rh_pct_lag1",
    "rh_pct_lag2",
    "tvoc_ppb_lag1",
    "tvoc_ppb_lag2",
    "eco2_ppm_lag1",
    "eco2_ppm_lag2",
    "dust_ugm3_lag1",
    "dust_ugm3_lag2",
    "sin_day",
    "cos_day",
];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureVector([f64; FEATURE_COUNT]);

impl FeatureVector {
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<f64> {
        self.0.to_vec()
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        FEATURE_NAMES.iter().position(|n| *n == name).map(|i| self.0[i])
    }
}

/// Build the vector for `curr` from history taken before `curr` was recorded.
///
/// `local_ts` is the reading time in the zone the model was trained on.
pub fn build(curr: &RawReading, history: &HistorySnapshot, local_ts: DateTime<FixedOffset>) -> FeatureVector {
    let mut out = [0.0; FEATURE_COUNT];

    for metric in Metric::ALL {
        let current = curr.measurements.get(metric);
        let lag1 = history.lag(metric, 0).unwrap_or(current);
        let lag2 = history.lag(metric, 1).unwrap_or(lag1);

        let i = metric.index();
        out[i] = current;
        out[Metric::COUNT + 2 * i] = lag1;
        out[Metric::COUNT + 2 * i + 1] = lag2;
    }

    let (sin_day, cos_day) = day_cycle(local_ts);
    out[FEATURE_COUNT - 2] = sin_day;
    out[FEATURE_COUNT - 1] = cos_day;

    FeatureVector(out)
}

fn day_cycle(local_ts: DateTime<FixedOffset>) -> (f64, f64) {
    let hour = local_ts.hour() as f64 + local_ts.minute() as f64 / 60.0;
    let angle = 2.0 * PI * hour / 24.0;
    (angle.sin(), angle.cos())
}
