//! API module - REST and WebSocket

pub mod rest;
pub mod websocket;

use airsense_core::{DependencyStatus, HealthStatus, ReadinessStatus};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Instant;

use crate::pipeline::Pipeline;

/// Shared state behind every handler
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub service_id: &'static str,
    pub version: &'static str,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(pipeline: Arc<Pipeline>, service_id: &'static str, version: &'static str) -> Self {
        Self {
            pipeline,
            service_id,
            version,
            start_time: Instant::now(),
        }
    }

    pub fn health(&self) -> HealthStatus {
        HealthStatus {
            healthy: true,
            service_id: self.service_id.to_string(),
            version: self.version.to_string(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Ready once the store answers. The forecast service is reported but
    /// not required: the pipeline keeps sampling while it is down.
    pub async fn readiness(&self) -> ReadinessStatus {
        let started = Instant::now();
        let store_ok = self.pipeline.store().is_healthy().await;
        let store_latency = started.elapsed().as_millis() as u64;

        let started = Instant::now();
        let forecast_ok = self.pipeline.forecast_client().probe().await;
        let forecast_latency = started.elapsed().as_millis() as u64;

        ReadinessStatus {
            ready: store_ok,
            dependencies: vec![
                DependencyStatus {
                    name: "store".to_string(),
                    available: store_ok,
                    latency_ms: Some(store_latency),
                },
                DependencyStatus {
                    name: "forecast".to_string(),
                    available: forecast_ok,
                    latency_ms: Some(forecast_latency),
                },
            ],
        }
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health endpoints
        .route("/health", get(rest::health_check))
        .route("/ready", get(rest::ready_check))
        // Forecast endpoints
        .route("/api/v1/forecast/status", get(rest::forecast_status))
        .route("/api/v1/forecast/manual", post(rest::manual_forecast))
        .route("/api/v1/metrics", get(rest::metrics))
        // WebSocket
        .route("/ws", get(websocket::ws_handler))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::Envelope;
    use crate::forecast::testing::{connection_refused, ok_response, ScriptedBackend};
    use crate::forecast::ForecastBackend;
    use crate::pipeline::PipelineSettings;
    use airsense_core::{ActualRecord, Measurements, RawReading};
    use airsense_store::{MemoryStore, TelemetryStore};
    use chrono::Utc;
    use futures_util::StreamExt;
    use serde_json::{json, Value};

    async fn serve(store: Arc<MemoryStore>, backend: Arc<dyn ForecastBackend>) -> String {
        serve_pipeline(Arc::new(Pipeline::new(store, backend, PipelineSettings::default()))).await
    }

    async fn serve_pipeline(pipeline: Arc<Pipeline>) -> String {
        let state = Arc::new(AppState::new(pipeline, "telemetry-pipeline", "test"));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, create_router(state)).await.unwrap();
        });
        format!("http://{}", addr)
    }

    async fn seed(store: &MemoryStore, device_id: &str) {
        let reading = RawReading {
            device_id: device_id.to_string(),
            ts: Utc::now(),
            measurements: Measurements::from_fn(|_| 5.0),
            aqi: None,
        };
        store
            .create_actual(ActualRecord::from_reading(&reading, Utc::now()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_manual_forecast_unknown_device_is_404() {
        let base = serve(
            Arc::new(MemoryStore::new()),
            Arc::new(ScriptedBackend::always(ok_response(vec![1.0], &["t"]))),
        )
        .await;

        let response = reqwest::Client::new()
            .post(format!("{}/api/v1/forecast/manual", base))
            .json(&json!({ "device_id": "ghost" }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 404);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_manual_forecast_persists_and_returns_result() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, "d1").await;
        let base = serve(
            store.clone(),
            Arc::new(ScriptedBackend::always(ok_response(vec![26.5], &["temp_c_next"]))),
        )
        .await;

        let response = reqwest::Client::new()
            .post(format!("{}/api/v1/forecast/manual", base))
            .json(&json!({ "device_id": "d1" }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["forecast_map"]["temp_c_next"], 26.5);
        assert_eq!(store.forecasts().len(), 1);
    }

    #[tokio::test]
    async fn test_manual_forecast_failure_is_503_and_status_reports_offline() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, "d1").await;
        let base = serve(store.clone(), Arc::new(ScriptedBackend::always(connection_refused()))).await;
        let client = reqwest::Client::new();

        let response = client
            .post(format!("{}/api/v1/forecast/manual", base))
            .json(&json!({ "device_id": "d1" }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 503);
        assert!(store.forecasts().is_empty());

        let status: Value = client
            .get(format!("{}/api/v1/forecast/status", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(status["data"]["online"], false);
    }

    #[tokio::test]
    async fn test_manual_forecast_contract_mismatch_is_502() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, "d1").await;
        let base = serve(
            store.clone(),
            Arc::new(ScriptedBackend::always(ok_response(vec![1.0, 2.0], &["only_one"]))),
        )
        .await;

        let response = reqwest::Client::new()
            .post(format!("{}/api/v1/forecast/manual", base))
            .json(&json!({ "device_id": "d1" }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 502);
        assert!(store.forecasts().is_empty());
    }

    #[tokio::test]
    async fn test_blank_device_id_is_400() {
        let base = serve(
            Arc::new(MemoryStore::new()),
            Arc::new(ScriptedBackend::always(ok_response(vec![1.0], &["t"]))),
        )
        .await;
        let response = reqwest::Client::new()
            .post(format!("{}/api/v1/forecast/manual", base))
            .json(&json!({ "device_id": "  " }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 400);
    }

    #[tokio::test]
    async fn test_health_ready_and_metrics() {
        let store = Arc::new(MemoryStore::new());
        let base = serve(store.clone(), Arc::new(ScriptedBackend::always(connection_refused()))).await;
        let client = reqwest::Client::new();

        let health: Value = client.get(format!("{}/health", base)).send().await.unwrap().json().await.unwrap();
        assert_eq!(health["healthy"], true);
        assert_eq!(health["service_id"], "telemetry-pipeline");

        let ready = client.get(format!("{}/ready", base)).send().await.unwrap();
        assert_eq!(ready.status().as_u16(), 200);
        let ready: Value = ready.json().await.unwrap();
        assert_eq!(ready["dependencies"][1]["name"], "forecast");
        assert_eq!(ready["dependencies"][1]["available"], false);

        store.set_fail_writes(true);
        let not_ready = client.get(format!("{}/ready", base)).send().await.unwrap();
        assert_eq!(not_ready.status().as_u16(), 503);

        let metrics: Value = client
            .get(format!("{}/api/v1/metrics", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(metrics["data"]["messages_received"], 0);
    }

    #[tokio::test]
    async fn test_websocket_welcome_then_events() {
        let pipeline = Arc::new(Pipeline::new(
            Arc::new(MemoryStore::new()),
            Arc::new(ScriptedBackend::always(connection_refused())),
            PipelineSettings::default(),
        ));
        let base = serve_pipeline(pipeline.clone()).await;

        let (mut ws, _) = tokio_tungstenite::connect_async(format!("{}/ws", base.replace("http://", "ws://")))
            .await
            .unwrap();

        let welcome = ws.next().await.unwrap().unwrap();
        let welcome: Value = serde_json::from_str(welcome.to_text().unwrap()).unwrap();
        assert_eq!(welcome, json!({ "type": "connected", "message": "WebSocket is ready" }));
        assert_eq!(pipeline.broadcaster().subscriber_count(), 1);

        let reading = RawReading {
            device_id: "d1".to_string(),
            ts: Utc::now(),
            measurements: Measurements::from_fn(|_| 7.0),
            aqi: Some(12.0),
        };
        assert_eq!(pipeline.broadcaster().broadcast(&Envelope::sensor_update(&reading)), 1);

        let frame = ws.next().await.unwrap().unwrap();
        let frame: Value = serde_json::from_str(frame.to_text().unwrap()).unwrap();
        assert_eq!(frame["type"], "sensor_update");
        assert_eq!(frame["data"]["deviceId"], "d1");
        assert_eq!(frame["data"]["aqi"], 12.0);
        assert_eq!(pipeline.metrics().subscribers.get(), 1);
    }
}
