//! Telemetry Pipeline Microservice
//!
//! Environmental sensor ingestion with:
//! - MQTT intake with validation and staleness checks
//! - Debounced, significance-gated persistence of actual readings
//! - Lag-feature forecasting against an external model service
//! - Realtime WebSocket fan-out of sensor and prediction events

use airsense_core::{AirsenseError, AirsenseService, HealthStatus, MicroserviceRuntime, ReadinessStatus, Result};
use airsense_store::{MemoryStore, PgTelemetryStore, PoolConfig, TelemetryStore};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

mod api;
mod broadcast;
mod config;
mod features;
mod forecast;
mod gate;
mod history;
mod intake;
mod metrics;
mod mqtt;
mod pipeline;
mod repository;


use api::AppState;
use config::{PipelineConfig, StoreBackend};
use forecast::HttpForecastBackend;
use pipeline::{Pipeline, PipelineSettings};

const SERVICE_ID: &str = "telemetry-pipeline";

#[tokio::main]
async fn main() -> Result<()> {
    airsense_telemetry::init(SERVICE_ID).map_err(|e| AirsenseError::Config(e.to_string()))?;

    info!("Starting Telemetry Pipeline microservice");

    let service = Arc::new(TelemetryPipelineService::new().await?);
    MicroserviceRuntime::run(service).await
}

pub struct TelemetryPipelineService {
    config: PipelineConfig,
    state: Arc<AppState>,
    mqtt_task: Mutex<Option<JoinHandle<()>>>,
}

impl TelemetryPipelineService {
    pub async fn new() -> Result<Self> {
        let config = PipelineConfig::from_env()?;
        let store = open_store(&config).await?;

        let backend = HttpForecastBackend::new(config.forecast_url.clone(), config.forecast_timeout)
            .map_err(|e| AirsenseError::Config(e.to_string()))?;
        info!(url = %backend.base_url(), "Forecast backend configured");

        let pipeline = Arc::new(Pipeline::new(store, Arc::new(backend), PipelineSettings::from(&config)));
        let state = Arc::new(AppState::new(pipeline, SERVICE_ID, env!("CARGO_PKG_VERSION")));

        Ok(Self {
            config,
            state,
            mqtt_task: Mutex::new(None),
        })
    }
}

async fn open_store(config: &PipelineConfig) -> Result<Arc<dyn TelemetryStore>> {
    match config.store_backend {
        StoreBackend::Postgres => {
            let store = PgTelemetryStore::from_config(&PoolConfig {
                url: config.database_url.clone(),
                max_size: config.database_pool_size,
            })?;
            store.migrate().await?;
            info!("PostgreSQL store ready");
            Ok(Arc::new(store))
        }
        StoreBackend::Memory => {
            warn!("Using in-memory store, records will not survive a restart");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

#[async_trait::async_trait]
impl AirsenseService for TelemetryPipelineService {
    fn service_id(&self) -> &'static str {
        SERVICE_ID
    }

    async fn health(&self) -> HealthStatus {
        self.state.health()
    }

    async fn ready(&self) -> ReadinessStatus {
        self.state.readiness().await
    }

    async fn shutdown(&self) -> Result<()> {
        info!("Shutting down Telemetry Pipeline service");
        if let Some(task) = self.mqtt_task.lock().take() {
            task.abort();
        }
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        info!(
            http = %self.config.http_bind,
            broker = %format!("{}:{}", self.config.mqtt.host, self.config.mqtt.port),
            "Starting Telemetry Pipeline servers"
        );

        let worker = mqtt::MqttWorker::new(self.config.mqtt.clone(), self.state.pipeline.clone());
        *self.mqtt_task.lock() = Some(tokio::spawn(worker.run()));

        let app = api::create_router(self.state.clone());

        let listener = tokio::net::TcpListener::bind(&self.config.http_bind).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}
