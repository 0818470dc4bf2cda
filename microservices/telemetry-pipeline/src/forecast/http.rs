//! HTTP transport to the forecasting model

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use super::{ForecastBackend, ForecastError, ForecastResponse};
use crate::features::FeatureVector;

pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize)]
struct PredictRequest<'a> {
    data: &'a FeatureVector,
}

pub struct HttpForecastBackend {
    client: Client,
    base_url: String,
}

impl HttpForecastBackend {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ForecastError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ForecastError::Unavailable(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

fn unavailable(err: reqwest::Error) -> ForecastError {
    if err.is_timeout() {
        ForecastError::Unavailable("request timed out".to_string())
    } else if err.is_decode() {
        ForecastError::Unavailable(format!("malformed response: {}", err))
    } else if let Some(status) = err.status() {
        ForecastError::Unavailable(format!("status {}", status))
    } else {
        ForecastError::Unavailable(err.to_string())
    }
}

#[async_trait]
impl ForecastBackend for HttpForecastBackend {
    async fn predict(&self, features: &FeatureVector) -> Result<ForecastResponse, ForecastError> {
        let url = format!("{}/predict", self.base_url);
        debug!(url = %url, "Requesting forecast");

        let response = self
            .client
            .post(&url)
            .json(&PredictRequest { data: features })
            .send()
            .await
            .map_err(unavailable)?
            .error_for_status()
            .map_err(unavailable)?;

        response.json::<ForecastResponse>().await.map_err(unavailable)
    }

    async fn probe(&self) -> Result<(), ForecastError> {
        self.client
            .get(format!("{}/health", self.base_url))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .map_err(unavailable)?
            .error_for_status()
            .map_err(unavailable)?;
        Ok(())
    }
}
