//! Forecast Repository
//!
//! Validates a model response against its target columns and persists it
//! as a new forecast result.

use airsense_core::{AirsenseError, ForecastResult, RawReading};
use airsense_store::{StoreError, TelemetryStore};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::features::FeatureVector;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("prediction has {values} values for {targets} target columns")]
    ContractMismatch { targets: usize, values: usize },

    #[error("target column {0:?} appears more than once")]
    DuplicateTarget(String),

    #[error("persistence failed: {0}")]
    Persistence(#[from] StoreError),
}

impl From<RepositoryError> for AirsenseError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Persistence(e) => e.into(),
            other => AirsenseError::Contract(other.to_string()),
        }
    }
}

/// Forecast output before it has an identity
#[derive(Debug, Clone)]
pub struct ForecastDraft {
    pub device_id: String,
    /// Defaults to the save time
    pub timestamp: Option<DateTime<Utc>>,
    pub sensors_snapshot: RawReading,
    pub feature_vector: FeatureVector,
    pub prediction: Vec<f64>,
    pub target_cols: Vec<String>,
}

pub struct ForecastRepository {
    store: Arc<dyn TelemetryStore>,
}

impl ForecastRepository {
    pub fn new(store: Arc<dyn TelemetryStore>) -> Self {
        Self { store }
    }

    /// Persist a draft. Every call creates a new record.
    #[instrument(skip(self, draft), fields(device_id = %draft.device_id))]
    pub async fn save(&self, draft: ForecastDraft) -> Result<ForecastResult, RepositoryError> {
        let forecast_map = zip_targets(&draft.target_cols, &draft.prediction)?;

        let record = ForecastResult {
            id: Uuid::new_v4(),
            device_id: draft.device_id,
            timestamp: draft.timestamp.unwrap_or_else(Utc::now),
            sensors_snapshot: draft.sensors_snapshot,
            feature_vector: draft.feature_vector.to_vec(),
            prediction: draft.prediction,
            target_cols: draft.target_cols,
            forecast_map,
        };

        let saved = self.store.create_forecast(record).await?;
        info!(forecast_id = %saved.id, targets = saved.target_cols.len(), "Forecast persisted");
        Ok(saved)
    }
}

fn zip_targets(targets: &[String], values: &[f64]) -> Result<BTreeMap<String, f64>, RepositoryError> {
    if targets.len() != values.len() {
        return Err(RepositoryError::ContractMismatch {
            targets: targets.len(),
            values: values.len(),
        });
    }

    let mut map = BTreeMap::new();
    for (target, value) in targets.iter().zip(values) {
        if map.insert(target.clone(), *value).is_some() {
            return Err(RepositoryError::DuplicateTarget(target.clone()));
        }
    }
    Ok(map)
}
