//! PostgreSQL-backed telemetry store

use airsense_core::{ActualRecord, ForecastResult, Measurements};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_postgres::Row;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::{PoolConfig, Result, StoreError, StorePool, TelemetryStore};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS actual_records (
    id          UUID PRIMARY KEY,
    device_id   TEXT NOT NULL,
    ts          TIMESTAMPTZ NOT NULL,
    temperature DOUBLE PRECISION NOT NULL,
    humidity    DOUBLE PRECISION NOT NULL,
    tvoc        DOUBLE PRECISION NOT NULL,
    eco2        DOUBLE PRECISION NOT NULL,
    dust        DOUBLE PRECISION NOT NULL,
    aqi         DOUBLE PRECISION,
    created_at  TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS actual_records_device_created
    ON actual_records (device_id, created_at DESC);

CREATE TABLE IF NOT EXISTS forecast_results (
    id               UUID PRIMARY KEY,
    device_id        TEXT NOT NULL,
    timestamp        TIMESTAMPTZ NOT NULL,
    sensors_snapshot JSONB NOT NULL,
    feature_vector   JSONB NOT NULL,
    prediction       JSONB NOT NULL,
    target_cols      JSONB NOT NULL,
    forecast_map     JSONB NOT NULL
);
"#;

const INSERT_ACTUAL: &str = r#"
INSERT INTO actual_records
    (id, device_id, ts, temperature, humidity, tvoc, eco2, dust, aqi, created_at)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
"#;

const SELECT_LATEST_ACTUAL: &str = r#"
SELECT id, device_id, ts, temperature, humidity, tvoc, eco2, dust, aqi, created_at
FROM actual_records
WHERE device_id = $1
ORDER BY created_at DESC
LIMIT 1
"#;

const INSERT_FORECAST: &str = r#"
INSERT INTO forecast_results
    (id, device_id, timestamp, sensors_snapshot, feature_vector, prediction, target_cols, forecast_map)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
"#;

/// Store over the PostgreSQL wire protocol
#[derive(Clone)]
pub struct PgTelemetryStore {
    pool: StorePool,
}

impl PgTelemetryStore {
    pub fn new(pool: StorePool) -> Self {
        Self { pool }
    }

    pub fn from_config(config: &PoolConfig) -> Result<Self> {
        Ok(Self::new(StorePool::new(config)?))
    }

    /// Create tables and indexes if they do not exist yet
    #[instrument(skip(self))]
    pub async fn migrate(&self) -> Result<()> {
        let conn = self.pool.get().await?;
        conn.batch_execute(SCHEMA).await.map_err(StoreError::Query)?;
        debug!("Store schema ensured");
        Ok(())
    }
}

fn actual_from_row(row: &Row) -> Result<ActualRecord> {
    let get_f64 = |col: &str| row.try_get::<_, f64>(col).map_err(StoreError::Query);

    Ok(ActualRecord {
        id: row.try_get::<_, Uuid>("id").map_err(StoreError::Query)?,
        device_id: row.try_get::<_, String>("device_id").map_err(StoreError::Query)?,
        ts: row.try_get::<_, DateTime<Utc>>("ts").map_err(StoreError::Query)?,
        measurements: Measurements {
            temperature: get_f64("temperature")?,
            humidity: get_f64("humidity")?,
            tvoc: get_f64("tvoc")?,
            eco2: get_f64("eco2")?,
            dust: get_f64("dust")?,
        },
        aqi: row.try_get::<_, Option<f64>>("aqi").map_err(StoreError::Query)?,
        created_at: row.try_get::<_, DateTime<Utc>>("created_at").map_err(StoreError::Query)?,
    })
}

#[async_trait]
impl TelemetryStore for PgTelemetryStore {
    #[instrument(skip(self, record), fields(device_id = %record.device_id))]
    async fn create_actual(&self, record: ActualRecord) -> Result<ActualRecord> {
        let conn = self.pool.get().await?;
        let m = &record.measurements;
        conn.execute(
            INSERT_ACTUAL,
            &[
                &record.id,
                &record.device_id,
                &record.ts,
                &m.temperature,
                &m.humidity,
                &m.tvoc,
                &m.eco2,
                &m.dust,
                &record.aqi,
                &record.created_at,
            ],
        )
        .await
        .map_err(StoreError::Query)?;
        Ok(record)
    }

    #[instrument(skip(self))]
    async fn find_latest_actual(&self, device_id: &str) -> Result<Option<ActualRecord>> {
        let conn = self.pool.get().await?;
        let row = conn
            .query_opt(SELECT_LATEST_ACTUAL, &[&device_id])
            .await
            .map_err(StoreError::Query)?;
        row.as_ref().map(actual_from_row).transpose()
    }

    #[instrument(skip(self, record), fields(device_id = %record.device_id))]
    async fn create_forecast(&self, record: ForecastResult) -> Result<ForecastResult> {
        let conn = self.pool.get().await?;
        let snapshot = serde_json::to_value(&record.sensors_snapshot)?;
        let features = serde_json::to_value(&record.feature_vector)?;
        let prediction = serde_json::to_value(&record.prediction)?;
        let targets = serde_json::to_value(&record.target_cols)?;
        let forecast_map = serde_json::to_value(&record.forecast_map)?;

        conn.execute(
            INSERT_FORECAST,
            &[
                &record.id,
                &record.device_id,
                &record.timestamp,
                &snapshot,
                &features,
                &prediction,
                &targets,
                &forecast_map,
            ],
        )
        .await
        .map_err(StoreError::Query)?;
        Ok(record)
    }

    async fn is_healthy(&self) -> bool {
        self.pool.is_healthy().await
    }
}
