//! Pipeline counters exposed on the metrics endpoint

use airsense_telemetry::{Counter, Gauge, Histogram, HistogramSummary};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;

pub struct PipelineMetrics {
    pub messages_received: Counter,
    rejected: DashMap<&'static str, Counter>,
    pub raw_broadcasts: Counter,
    pub actuals_persisted: Counter,
    pub gate_skipped: Counter,
    pub gate_errors: Counter,
    pub forecasts_requested: Counter,
    pub forecasts_failed: Counter,
    pub forecasts_skipped_offline: Counter,
    pub forecasts_throttled: Counter,
    pub forecasts_persisted: Counter,
    pub forecast_latency_ms: Histogram,
    pub subscribers: Gauge,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub messages_received: u64,
    pub messages_rejected: BTreeMap<String, u64>,
    pub raw_broadcasts: u64,
    pub actuals_persisted: u64,
    pub gate_skipped: u64,
    pub gate_errors: u64,
    pub forecasts_requested: u64,
    pub forecasts_failed: u64,
    pub forecasts_skipped_offline: u64,
    pub forecasts_throttled: u64,
    pub forecasts_persisted: u64,
    pub forecast_latency_ms: HistogramSummary,
    pub subscribers: u64,
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            messages_received: Counter::new("messages_received"),
            rejected: DashMap::new(),
            raw_broadcasts: Counter::new("raw_broadcasts"),
            actuals_persisted: Counter::new("actuals_persisted"),
            gate_skipped: Counter::new("gate_skipped"),
            gate_errors: Counter::new("gate_errors"),
            forecasts_requested: Counter::new("forecasts_requested"),
            forecasts_failed: Counter::new("forecasts_failed"),
            forecasts_skipped_offline: Counter::new("forecasts_skipped_offline"),
            forecasts_throttled: Counter::new("forecasts_throttled"),
            forecasts_persisted: Counter::new("forecasts_persisted"),
            forecast_latency_ms: Histogram::new("forecast_latency_ms"),
            subscribers: Gauge::new("ws_subscribers"),
        }
    }

    pub fn record_rejection(&self, reason: &'static str) {
        self.rejected
            .entry(reason)
            .or_insert_with(|| Counter::new(reason))
            .inc();
    }

    pub fn rejected(&self, reason: &str) -> u64 {
        self.rejected.get(reason).map(|c| c.get()).unwrap_or(0)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_received: self.messages_received.get(),
            messages_rejected: self
                .rejected
                .iter()
                .map(|entry| (entry.key().to_string(), entry.value().get()))
                .collect(),
            raw_broadcasts: self.raw_broadcasts.get(),
            actuals_persisted: self.actuals_persisted.get(),
            gate_skipped: self.gate_skipped.get(),
            gate_errors: self.gate_errors.get(),
            forecasts_requested: self.forecasts_requested.get(),
            forecasts_failed: self.forecasts_failed.get(),
            forecasts_skipped_offline: self.forecasts_skipped_offline.get(),
            forecasts_throttled: self.forecasts_throttled.get(),
            forecasts_persisted: self.forecasts_persisted.get(),
            forecast_latency_ms: self.forecast_latency_ms.summary(),
            subscribers: self.subscribers.get(),
        }
    }
}
