//! Forecast Client
//!
//! Calls the external forecasting service and tracks whether it is
//! reachable. The circuit flag follows the outcome of the most recent call
//! only; there is no timed recovery.

mod circuit;
mod client;
mod http;

pub use circuit::{CircuitState, CircuitStatus};
pub use client::{CallPolicy, ForecastClient};
pub use http::HttpForecastBackend;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::features::FeatureVector;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ForecastError {
    #[error("forecast service unavailable: {0}")]
    Unavailable(String),
}

/// Model output, flat or one row per horizon batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Prediction {
    Flat(Vec<f64>),
    Nested(Vec<Vec<f64>>),
}

impl Prediction {
    /// Values to map onto target columns: the first row when nested
    pub fn first_row(self) -> Vec<f64> {
        match self {
            Prediction::Flat(values) => values,
            Prediction::Nested(rows) => rows.into_iter().next().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResponse {
    pub prediction: Prediction,
    pub target_cols: Vec<String>,
}

/// Transport to the forecasting model
#[async_trait]
pub trait ForecastBackend: Send + Sync {
    async fn predict(&self, features: &FeatureVector) -> Result<ForecastResponse, ForecastError>;

    /// Reachability check; never used to drive the circuit
    async fn probe(&self) -> Result<(), ForecastError>;
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prediction_shapes() {
        let flat: ForecastResponse =
            serde_json::from_str(r#"{"prediction":[1.0,2.0],"target_cols":["a","b"]}"#).unwrap();
        assert_eq!(flat.prediction.first_row(), vec![1.0, 2.0]);

        let nested: ForecastResponse =
            serde_json::from_str(r#"{"prediction":[[3.0,4.0],[5.0,6.0]],"target_cols":["a","b"]}"#).unwrap();
        assert_eq!(nested.prediction.first_row(), vec![3.0, 4.0]);

        let empty: ForecastResponse = serde_json::from_str(r#"{"prediction":[],"target_cols":[]}"#).unwrap();
        assert!(empty.prediction.first_row().is_empty());
    }

    #[test]
    fn test_missing_targets_is_rejected() {
        assert!(serde_json::from_str::<ForecastResponse>(r#"{"prediction":[1.0]}"#).is_err());
    }
}
