//! Sampling Gate
//!
//! Decides per device whether a validated reading becomes a durable
//! [`ActualRecord`]. Two guards run in order:
//!
//! 1. debounce: nothing is saved until `save_interval` has elapsed since the
//!    device's last saved record, however large the change;
//! 2. significance: once the interval has elapsed, the reading is saved only
//!    if at least one metric moved more than its threshold.
//!
//! Decisions for one device are serialized behind a per-device lock held
//! across the read-decide-write sequence. The baseline is re-read from the
//! store under that lock, so records cleared or written elsewhere are seen.

use airsense_core::{ActualRecord, Measurements, Metric, RawReading};
use airsense_store::{StoreError, TelemetryStore};
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

pub const DEFAULT_SAVE_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Per-metric absolute change that counts as significant
pub const DEFAULT_THRESHOLDS: Measurements = Measurements {
    temperature: 0.2,
    humidity: 0.5,
    tvoc: 10.0,
    eco2: 20.0,
    dust: 1.0,
};

#[derive(Debug, Clone)]
pub struct SamplingPolicy {
    pub save_interval: chrono::Duration,
    pub thresholds: Measurements,
}

impl Default for SamplingPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_SAVE_INTERVAL)
    }
}

/// Outcome of the pure decision step
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verdict {
    First,
    Debounced { elapsed: chrono::Duration },
    Insignificant,
    Significant { trigger: Metric },
}

impl SamplingPolicy {
    pub fn new(save_interval: Duration) -> Self {
        Self {
            save_interval: chrono::Duration::from_std(save_interval).unwrap_or(chrono::Duration::MAX),
            thresholds: DEFAULT_THRESHOLDS,
        }
    }

    pub fn decide(&self, prev: Option<&ActualRecord>, curr: &RawReading) -> Verdict {
        let Some(prev) = prev else {
            return Verdict::First;
        };
        if let Some(elapsed) = self.debounce(prev, curr) {
            return Verdict::Debounced { elapsed };
        }
        match self.significance(&prev.measurements, &curr.measurements) {
            Some(trigger) => Verdict::Significant { trigger },
            None => Verdict::Insignificant,
        }
    }

    /// Elapsed time when still inside the debounce window
    fn debounce(&self, prev: &ActualRecord, curr: &RawReading) -> Option<chrono::Duration> {
        let elapsed = curr.ts.signed_duration_since(prev.ts);
        (elapsed < self.save_interval).then_some(elapsed)
    }

    /// First metric whose change exceeds its threshold
    fn significance(&self, prev: &Measurements, curr: &Measurements) -> Option<Metric> {
        Metric::ALL
            .into_iter()
            .find(|&m| (curr.get(m) - prev.get(m)).abs() > self.thresholds.get(m))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    PersistedFirst(ActualRecord),
    Persisted { record: ActualRecord, trigger: Metric },
    SkippedDebounce { elapsed: chrono::Duration },
    SkippedInsignificant,
}

impl GateDecision {
    pub fn persisted(&self) -> Option<&ActualRecord> {
        match self {
            Self::PersistedFirst(record) | Self::Persisted { record, .. } => Some(record),
            _ => None,
        }
    }
}

pub struct SamplingGate {
    store: Arc<dyn TelemetryStore>,
    policy: SamplingPolicy,
    devices: DashMap<String, Arc<Mutex<()>>>,
}

impl SamplingGate {
    pub fn new(store: Arc<dyn TelemetryStore>, policy: SamplingPolicy) -> Self {
        Self {
            store,
            policy,
            devices: DashMap::new(),
        }
    }

    /// Run the gate for one reading, persisting it when it passes.
    pub async fn evaluate(&self, reading: &RawReading) -> Result<GateDecision, StoreError> {
        let lock = self.devices.entry(reading.device_id.clone()).or_default().clone();
        let _guard = lock.lock().await;

        let last = self.store.find_latest_actual(&reading.device_id).await?;
        let verdict = self.policy.decide(last.as_ref(), reading);
        let trigger = match verdict {
            Verdict::Debounced { elapsed } => {
                debug!(device_id = %reading.device_id, elapsed_secs = elapsed.num_seconds(), "Gate skipped (debounce)");
                return Ok(GateDecision::SkippedDebounce { elapsed });
            }
            Verdict::Insignificant => {
                debug!(device_id = %reading.device_id, "Gate skipped (no significant change)");
                return Ok(GateDecision::SkippedInsignificant);
            }
            Verdict::First => None,
            Verdict::Significant { trigger } => Some(trigger),
        };

        let record = self
            .store
            .create_actual(ActualRecord::from_reading(reading, Utc::now()))
            .await?;

        Ok(match trigger {
            None => GateDecision::PersistedFirst(record),
            Some(trigger) => GateDecision::Persisted { record, trigger },
        })
    }
}
