//! REST API handlers

use airsense_core::{AirsenseError, ForecastResult, HealthStatus, ReadinessStatus};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::AppState;
use crate::forecast::CircuitStatus;
use crate::metrics::MetricsSnapshot;

/// Generic API response
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
            code: None,
        })
    }
}

/// Service error rendered with its HTTP status
pub struct ApiError(AirsenseError);

impl From<AirsenseError> for ApiError {
    fn from(err: AirsenseError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(self.0.to_string()),
            code: Some(self.0.error_code()),
        };
        (status, Json(body)).into_response()
    }
}

// Health check
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthStatus> {
    Json(state.health())
}

pub async fn ready_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<ReadinessStatus>) {
    let readiness = state.readiness().await;
    let status = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(readiness))
}

// Forecast handlers
pub async fn forecast_status(State(state): State<Arc<AppState>>) -> Json<ApiResponse<CircuitStatus>> {
    ApiResponse::success(state.pipeline.forecast_client().circuit().status())
}

#[derive(Debug, Deserialize)]
pub struct ManualForecastRequest {
    pub device_id: String,
}

pub async fn manual_forecast(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ManualForecastRequest>,
) -> Result<Json<ApiResponse<ForecastResult>>, ApiError> {
    let device_id = req.device_id.trim();
    if device_id.is_empty() {
        return Err(AirsenseError::Validation("device_id must not be empty".to_string()).into());
    }

    let result = state.pipeline.force_forecast(device_id).await?;
    Ok(ApiResponse::success(result))
}

pub async fn metrics(State(state): State<Arc<AppState>>) -> Json<ApiResponse<MetricsSnapshot>> {
    ApiResponse::success(state.pipeline.metrics().snapshot())
}
