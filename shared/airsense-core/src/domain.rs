//! Core domain types shared by the pipeline service and the store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Physical metrics reported by a field device, in feature order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Temperature = 0,
    Humidity = 1,
    Tvoc = 2,
    Eco2 = 3,
    Dust = 4,
}

impl Metric {
    pub const COUNT: usize = 5;

    pub const ALL: [Metric; Metric::COUNT] = [
        Metric::Temperature,
        Metric::Humidity,
        Metric::Tvoc,
        Metric::Eco2,
        Metric::Dust,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Field name used by devices on the wire
    pub fn wire_key(self) -> &'static str {
        match self {
            Metric::Temperature => "temp_c",
            Metric::Humidity => "rh_pct",
            Metric::Tvoc => "tvoc_ppb",
            Metric::Eco2 => "eco2_ppm",
            Metric::Dust => "dust_ugm3",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Metric::Temperature => "temperature",
            Metric::Humidity => "humidity",
            Metric::Tvoc => "tvoc",
            Metric::Eco2 => "eco2",
            Metric::Dust => "dust",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One value per physical metric
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Measurements {
    pub temperature: f64,
    pub humidity: f64,
    pub tvoc: f64,
    pub eco2: f64,
    pub dust: f64,
}

impl Measurements {
    pub fn from_fn(mut f: impl FnMut(Metric) -> f64) -> Self {
        Self {
            temperature: f(Metric::Temperature),
            humidity: f(Metric::Humidity),
            tvoc: f(Metric::Tvoc),
            eco2: f(Metric::Eco2),
            dust: f(Metric::Dust),
        }
    }

    pub fn get(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Temperature => self.temperature,
            Metric::Humidity => self.humidity,
            Metric::Tvoc => self.tvoc,
            Metric::Eco2 => self.eco2,
            Metric::Dust => self.dust,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Metric, f64)> + '_ {
        Metric::ALL.into_iter().map(move |m| (m, self.get(m)))
    }

    /// First metric whose value is NaN or infinite
    pub fn first_non_finite(&self) -> Option<Metric> {
        self.iter().find(|(_, v)| !v.is_finite()).map(|(m, _)| m)
    }
}

/// A validated reading as produced by intake
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawReading {
    pub device_id: String,
    pub ts: DateTime<Utc>,
    #[serde(flatten)]
    pub measurements: Measurements,
    pub aqi: Option<f64>,
}

/// Durable snapshot written by the sampling gate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActualRecord {
    pub id: Uuid,
    pub device_id: String,
    pub ts: DateTime<Utc>,
    #[serde(flatten)]
    pub measurements: Measurements,
    pub aqi: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl ActualRecord {
    pub fn from_reading(reading: &RawReading, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            device_id: reading.device_id.clone(),
            ts: reading.ts,
            measurements: reading.measurements,
            aqi: reading.aqi,
            created_at,
        }
    }

    pub fn as_reading(&self) -> RawReading {
        RawReading {
            device_id: self.device_id.clone(),
            ts: self.ts,
            measurements: self.measurements,
            aqi: self.aqi,
        }
    }
}

/// Persisted output of one forecast call.
///
/// `prediction` and `target_cols` keep the model's positional order;
/// `forecast_map` is the zipped lookup view of the same data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    pub id: Uuid,
    pub device_id: String,
    pub timestamp: DateTime<Utc>,
    pub sensors_snapshot: RawReading,
    pub feature_vector: Vec<f64>,
    pub prediction: Vec<f64>,
    pub target_cols: Vec<String>,
    pub forecast_map: BTreeMap<String, f64>,
}
