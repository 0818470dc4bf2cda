//! Circuit-aware forecast client

use std::sync::Arc;
use tracing::debug;

use super::{CircuitState, ForecastBackend, ForecastError, ForecastResponse};
use crate::features::FeatureVector;

/// How a caller treats a known-offline service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPolicy {
    /// Skip the call while the circuit is offline
    Automatic,
    /// Call regardless of the circuit (manual requests)
    Forced,
}

pub struct ForecastClient {
    backend: Arc<dyn ForecastBackend>,
    circuit: CircuitState,
}

impl ForecastClient {
    pub fn new(backend: Arc<dyn ForecastBackend>) -> Self {
        Self {
            backend,
            circuit: CircuitState::default(),
        }
    }

    pub fn circuit(&self) -> &CircuitState {
        &self.circuit
    }

    pub fn is_online(&self) -> bool {
        self.circuit.is_online()
    }

    /// One call to the service; the outcome sets the circuit. No retries.
    pub async fn request_forecast(&self, features: &FeatureVector) -> Result<ForecastResponse, ForecastError> {
        let outcome = self.backend.predict(features).await;
        self.circuit.record(outcome.is_ok());
        outcome
    }

    /// `Ok(None)` when an automatic call was skipped because the circuit is offline
    pub async fn call(
        &self,
        policy: CallPolicy,
        features: &FeatureVector,
    ) -> Result<Option<ForecastResponse>, ForecastError> {
        if policy == CallPolicy::Automatic && !self.is_online() {
            debug!("Forecast service offline, automatic call skipped");
            return Ok(None);
        }
        self.request_forecast(features).await.map(Some)
    }

    /// Reachability of the service, leaving the circuit untouched
    pub async fn probe(&self) -> bool {
        self.backend.probe().await.is_ok()
    }
}
