//! Store contract consumed by the pipeline

use airsense_core::{ActualRecord, ForecastResult};
use async_trait::async_trait;

use crate::Result;

/// Create/find contract over actual records and forecast results.
///
/// Records are immutable once written; there are no update operations.
#[async_trait]
pub trait TelemetryStore: Send + Sync {
    /// Persist a sampled actual record
    async fn create_actual(&self, record: ActualRecord) -> Result<ActualRecord>;

    /// Most recently created actual record for a device
    async fn find_latest_actual(&self, device_id: &str) -> Result<Option<ActualRecord>>;

    /// Persist a forecast result as a new row
    async fn create_forecast(&self, record: ForecastResult) -> Result<ForecastResult>;

    /// Liveness of the backing store
    async fn is_healthy(&self) -> bool;
}
