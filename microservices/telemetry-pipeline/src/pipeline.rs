//! Pipeline orchestration
//!
//! One inbound message flows through intake, then fans out to the raw
//! broadcast path and, concurrently, the sampling gate and forecast paths.
//! Failures on one path never abort another.

use airsense_core::{AirsenseError, ForecastResult, RawReading};
use airsense_store::TelemetryStore;
use bytes::Bytes;
use chrono::{FixedOffset, Offset, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::broadcast::{Broadcaster, Envelope, DEFAULT_CAPACITY};
use crate::config::PipelineConfig;
use crate::features::{self, FeatureVector};
use crate::forecast::{CallPolicy, ForecastBackend, ForecastClient};
use crate::gate::{GateDecision, SamplingGate, SamplingPolicy, DEFAULT_SAVE_INTERVAL};
use crate::history::{FeatureHistory, HistorySnapshot};
use crate::intake::{Intake, IntakeError, DEFAULT_STALENESS};
use crate::metrics::PipelineMetrics;
use crate::repository::{ForecastDraft, ForecastRepository, RepositoryError};

pub const DEFAULT_FORECAST_MIN_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Bytes,
    pub retained: bool,
}

/// Which paths a message feeds, decided by its topic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Routes {
    /// Raw `sensor_update` broadcast
    pub raw: bool,
    /// Sampling gate and forecast
    pub sample: bool,
}

impl Routes {
    pub const ALL: Routes = Routes { raw: true, sample: true };

    pub fn any(&self) -> bool {
        self.raw || self.sample
    }
}

#[derive(Debug)]
pub enum ForecastOutcome {
    NotRouted,
    SkippedOffline,
    Throttled,
    Failed(AirsenseError),
    Published(ForecastResult),
}

#[derive(Debug)]
pub enum MessageOutcome {
    Rejected(IntakeError),
    Accepted {
        device_id: String,
        /// Subscribers reached by the raw broadcast, when routed
        raw_reach: Option<usize>,
        /// `None` when not routed or when the store failed
        gate: Option<GateDecision>,
        forecast: ForecastOutcome,
    },
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub staleness: Duration,
    pub save_interval: Duration,
    /// Zero disables the throttle
    pub forecast_min_interval: Duration,
    pub feature_offset: FixedOffset,
    pub broadcast_capacity: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            staleness: DEFAULT_STALENESS,
            save_interval: DEFAULT_SAVE_INTERVAL,
            forecast_min_interval: DEFAULT_FORECAST_MIN_INTERVAL,
            feature_offset: Utc.fix(),
            broadcast_capacity: DEFAULT_CAPACITY,
        }
    }
}

impl From<&PipelineConfig> for PipelineSettings {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            staleness: config.staleness,
            save_interval: config.save_interval,
            forecast_min_interval: config.forecast_min_interval,
            feature_offset: config.feature_offset,
            broadcast_capacity: config.broadcast_capacity,
        }
    }
}

pub struct Pipeline {
    intake: Intake,
    gate: SamplingGate,
    history: FeatureHistory,
    forecast: ForecastClient,
    repository: ForecastRepository,
    broadcaster: Broadcaster,
    metrics: PipelineMetrics,
    store: Arc<dyn TelemetryStore>,
    // device_id -> last automatic forecast attempt
    last_forecast: DashMap<String, Instant>,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn TelemetryStore>,
        backend: Arc<dyn ForecastBackend>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            intake: Intake::new(settings.staleness),
            gate: SamplingGate::new(store.clone(), SamplingPolicy::new(settings.save_interval)),
            history: FeatureHistory::new(),
            forecast: ForecastClient::new(backend),
            repository: ForecastRepository::new(store.clone()),
            broadcaster: Broadcaster::new(settings.broadcast_capacity),
            metrics: PipelineMetrics::new(),
            store,
            last_forecast: DashMap::new(),
            settings,
        }
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    pub fn forecast_client(&self) -> &ForecastClient {
        &self.forecast
    }

    pub fn store(&self) -> &Arc<dyn TelemetryStore> {
        &self.store
    }

    /// Process one inbound message end to end
    pub async fn handle(&self, message: InboundMessage, routes: Routes) -> MessageOutcome {
        self.metrics.messages_received.inc();

        let reading = match self.intake.accept(&message.payload, message.retained, Utc::now()) {
            Ok(reading) => reading,
            Err(e) => {
                self.metrics.record_rejection(e.reason());
                match e {
                    IntakeError::Retained => debug!(topic = %message.topic, "Retained message discarded"),
                    _ => warn!(topic = %message.topic, reason = e.reason(), error = %e, "Message rejected"),
                }
                return MessageOutcome::Rejected(e);
            }
        };

        let raw_reach = routes.raw.then(|| {
            self.metrics.raw_broadcasts.inc();
            self.broadcaster.broadcast(&Envelope::sensor_update(&reading))
        });

        let (gate, forecast) = if routes.sample {
            tokio::join!(self.sample(&reading), self.auto_forecast(&reading))
        } else {
            (None, ForecastOutcome::NotRouted)
        };

        MessageOutcome::Accepted {
            device_id: reading.device_id,
            raw_reach,
            gate,
            forecast,
        }
    }

    /// Forecast from the device's latest saved record, ignoring the circuit
    /// and the throttle. History is read but not advanced.
    pub async fn force_forecast(&self, device_id: &str) -> Result<ForecastResult, AirsenseError> {
        let latest = self
            .store
            .find_latest_actual(device_id)
            .await?
            .ok_or_else(|| AirsenseError::NotFound(format!("no actual record for device {}", device_id)))?;

        let reading = latest.as_reading();
        let vector = self.feature_vector(&reading, &self.history.snapshot());
        info!(device_id = %device_id, "Manual forecast requested");

        self.run_forecast(CallPolicy::Forced, &reading, vector)
            .await?
            .ok_or_else(|| AirsenseError::Internal("forced forecast was skipped".to_string()))
    }

    async fn sample(&self, reading: &RawReading) -> Option<GateDecision> {
        match self.gate.evaluate(reading).await {
            Ok(decision) => {
                match decision.persisted() {
                    Some(record) => {
                        self.metrics.actuals_persisted.inc();
                        info!(device_id = %record.device_id, record_id = %record.id, "Actual record persisted");
                    }
                    None => self.metrics.gate_skipped.inc(),
                }
                Some(decision)
            }
            Err(e) => {
                self.metrics.gate_errors.inc();
                error!(device_id = %reading.device_id, error = %e, "Failed to persist actual record");
                None
            }
        }
    }

    async fn auto_forecast(&self, reading: &RawReading) -> ForecastOutcome {
        // history advances for every accepted reading, forecast or not
        let history = self.history.snapshot_and_record(&reading.measurements);
        let vector = self.feature_vector(reading, &history);

        if !self.forecast.is_online() {
            self.metrics.forecasts_skipped_offline.inc();
            debug!(device_id = %reading.device_id, "Forecast service offline, skipping");
            return ForecastOutcome::SkippedOffline;
        }
        if !self.claim_forecast_slot(&reading.device_id) {
            self.metrics.forecasts_throttled.inc();
            return ForecastOutcome::Throttled;
        }

        match self.run_forecast(CallPolicy::Automatic, reading, vector).await {
            Ok(Some(result)) => ForecastOutcome::Published(result),
            Ok(None) => ForecastOutcome::SkippedOffline,
            Err(e) => ForecastOutcome::Failed(e),
        }
    }

    fn feature_vector(&self, reading: &RawReading, history: &HistorySnapshot) -> FeatureVector {
        features::build(reading, history, reading.ts.with_timezone(&self.settings.feature_offset))
    }

    /// Reserve the device's automatic forecast slot. False while the
    /// previous attempt is younger than the minimum interval.
    fn claim_forecast_slot(&self, device_id: &str) -> bool {
        let min_interval = self.settings.forecast_min_interval;
        if min_interval.is_zero() {
            return true;
        }

        let now = Instant::now();
        match self.last_forecast.entry(device_id.to_string()) {
            Entry::Occupied(mut last) => {
                if now.duration_since(*last.get()) < min_interval {
                    return false;
                }
                last.insert(now);
            }
            Entry::Vacant(slot) => {
                slot.insert(now);
            }
        }
        true
    }

    async fn run_forecast(
        &self,
        policy: CallPolicy,
        reading: &RawReading,
        vector: FeatureVector,
    ) -> Result<Option<ForecastResult>, AirsenseError> {
        let started = Instant::now();
        let response = match self.forecast.call(policy, &vector).await {
            Ok(Some(response)) => response,
            Ok(None) => {
                self.metrics.forecasts_skipped_offline.inc();
                return Ok(None);
            }
            Err(e) => {
                self.metrics.forecasts_requested.inc();
                self.metrics.forecasts_failed.inc();
                warn!(device_id = %reading.device_id, error = %e, "Forecast request failed");
                return Err(AirsenseError::Unavailable(e.to_string()));
            }
        };
        self.metrics.forecasts_requested.inc();
        self.metrics
            .forecast_latency_ms
            .record(started.elapsed().as_secs_f64() * 1000.0);

        let draft = ForecastDraft {
            device_id: reading.device_id.clone(),
            timestamp: None,
            sensors_snapshot: reading.clone(),
            feature_vector: vector,
            prediction: response.prediction.first_row(),
            target_cols: response.target_cols,
        };

        let saved = match self.repository.save(draft).await {
            Ok(saved) => saved,
            Err(e) => {
                match &e {
                    RepositoryError::Persistence(_) => {
                        error!(device_id = %reading.device_id, error = %e, "Failed to persist forecast")
                    }
                    _ => error!(device_id = %reading.device_id, error = %e, "Forecast response rejected"),
                }
                return Err(e.into());
            }
        };

        self.metrics.forecasts_persisted.inc();
        self.broadcaster.broadcast(&Envelope::prediction_update(&saved));
        Ok(Some(saved))
    }
}
