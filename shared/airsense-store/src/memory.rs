//! In-memory telemetry store for development runs and tests

use airsense_core::{ActualRecord, ForecastResult};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::{Result, StoreError, TelemetryStore};

#[derive(Default)]
pub struct MemoryStore {
    // device_id -> records in creation order
    actuals: DashMap<String, Vec<ActualRecord>>,
    forecasts: RwLock<Vec<ForecastResult>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with `StoreError::Unavailable`
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn actuals_for(&self, device_id: &str) -> Vec<ActualRecord> {
        self.actuals
            .get(device_id)
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    /// Drop every actual record for every device
    pub fn clear_actuals(&self) {
        self.actuals.clear();
    }

    pub fn forecasts(&self) -> Vec<ForecastResult> {
        self.forecasts.read().clone()
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("writes disabled".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl TelemetryStore for MemoryStore {
    async fn create_actual(&self, record: ActualRecord) -> Result<ActualRecord> {
        self.check_writable()?;
        self.actuals
            .entry(record.device_id.clone())
            .or_default()
            .push(record.clone());
        Ok(record)
    }

    async fn find_latest_actual(&self, device_id: &str) -> Result<Option<ActualRecord>> {
        Ok(self
            .actuals
            .get(device_id)
            .and_then(|records| records.iter().max_by_key(|r| r.created_at).cloned()))
    }

    async fn create_forecast(&self, record: ForecastResult) -> Result<ForecastResult> {
        self.check_writable()?;
        self.forecasts.write().push(record.clone());
        Ok(record)
    }

    async fn is_healthy(&self) -> bool {
        !self.fail_writes.load(Ordering::SeqCst)
    }
}
