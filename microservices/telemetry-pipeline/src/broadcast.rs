//! Realtime Broadcaster
//!
//! Best-effort fan-out of pipeline events to connected subscribers. Each
//! subscriber reads from its own bounded window of the channel; a slow one
//! skips the oldest events and carries on.

use airsense_core::{ForecastResult, RawReading};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

pub const DEFAULT_CAPACITY: usize = 256;
pub const MAX_CAPACITY: usize = 1 << 16;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorUpdate {
    pub device_id: String,
    pub temperature: f64,
    pub humidity: f64,
    pub tvoc: f64,
    pub eco2: f64,
    pub dust: f64,
    pub aqi: Option<f64>,
    pub ts: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionUpdate {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub prediction: Vec<f64>,
    pub target_cols: Vec<String>,
}

/// Event delivered to subscribers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Envelope {
    SensorUpdate(SensorUpdate),
    PredictionUpdate(PredictionUpdate),
}

impl Envelope {
    pub fn sensor_update(reading: &RawReading) -> Self {
        let m = &reading.measurements;
        Envelope::SensorUpdate(SensorUpdate {
            device_id: reading.device_id.clone(),
            temperature: m.temperature,
            humidity: m.humidity,
            tvoc: m.tvoc,
            eco2: m.eco2,
            dust: m.dust,
            aqi: reading.aqi,
            ts: reading.ts,
        })
    }

    pub fn prediction_update(result: &ForecastResult) -> Self {
        Envelope::PredictionUpdate(PredictionUpdate {
            id: result.id,
            timestamp: result.timestamp,
            prediction: result.prediction.clone(),
            target_cols: result.target_cols.clone(),
        })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::SensorUpdate(_) => "sensor_update",
            Envelope::PredictionUpdate(_) => "prediction_update",
        }
    }
}

pub struct Broadcaster {
    // frames are serialized once and shared by every subscriber
    tx: broadcast::Sender<Arc<str>>,
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl Broadcaster {
    /// Capacity is clamped to `1..=MAX_CAPACITY`
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.clamp(1, MAX_CAPACITY));
        Self { tx }
    }

    /// Send to every live subscriber. Returns how many were reached;
    /// zero subscribers is not an error.
    pub fn broadcast(&self, envelope: &Envelope) -> usize {
        let frame = match serde_json::to_string(envelope) {
            Ok(json) => Arc::<str>::from(json),
            Err(e) => {
                warn!(kind = envelope.kind(), error = %e, "Failed to serialize event");
                return 0;
            }
        };

        match self.tx.send(frame) {
            Ok(reached) => reached,
            Err(_) => {
                debug!(kind = envelope.kind(), "No subscribers connected");
                0
            }
        }
    }

    pub fn subscribe(&self) -> Subscriber {
        Subscriber {
            rx: self.tx.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

pub struct Subscriber {
    rx: broadcast::Receiver<Arc<str>>,
}

impl Subscriber {
    /// Next frame, skipping past anything dropped while lagging.
    /// `None` once the broadcaster is gone.
    pub async fn recv(&mut self) -> Option<Arc<str>> {
        loop {
            match self.rx.recv().await {
                Ok(frame) => return Some(frame),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Subscriber lagging, oldest events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use airsense_core::Measurements;
    use serde_json::Value;
    use std::collections::BTreeMap;

    #[test]
    fn test_capacity_is_clamped() {
        let broadcaster = Broadcaster::new(usize::MAX);
        let _sub = broadcaster.subscribe();
        assert_eq!(broadcaster.broadcast(&Envelope::sensor_update(&reading())), 1);

        let broadcaster = Broadcaster::new(0);
        let _sub = broadcaster.subscribe();
        assert_eq!(broadcaster.broadcast(&Envelope::sensor_update(&reading())), 1);
    }

    fn reading() -> RawReading {
        RawReading {
            device_id: "d1".to_string(),
            ts: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            measurements: Measurements {
                temperature: 25.0,
                humidity: 60.0,
                tvoc: 100.0,
                eco2: 450.0,
                dust: 10.0,
            },
            aqi: None,
        }
    }

    #[test]
    fn test_sensor_update_shape() {
        let json = serde_json::to_value(Envelope::sensor_update(&reading())).unwrap();
        assert_eq!(json["type"], "sensor_update");
        assert_eq!(json["data"]["deviceId"], "d1");
        assert_eq!(json["data"]["temperature"], 25.0);
        assert_eq!(json["data"]["dust"], 10.0);
        assert!(json["data"]["aqi"].is_null());
        assert_eq!(json["data"]["ts"], "2023-11-14T22:13:20Z");
    }

    #[test]
    fn test_prediction_update_shape() {
        let result = ForecastResult {
            id: Uuid::new_v4(),
            device_id: "d1".to_string(),
            timestamp: Utc::now(),
            sensors_snapshot: reading(),
            feature_vector: vec![0.0; 17],
            prediction: vec![26.0],
            target_cols: vec!["temp_c_next".to_string()],
            forecast_map: BTreeMap::from([("temp_c_next".to_string(), 26.0)]),
        };
        let json = serde_json::to_value(Envelope::prediction_update(&result)).unwrap();
        assert_eq!(json["type"], "prediction_update");
        assert_eq!(json["data"]["id"], result.id.to_string());
        assert_eq!(json["data"]["target_cols"][0], "temp_c_next");
        assert!(json["data"].get("forecast_map").is_none());
    }

    #[tokio::test]
    async fn test_zero_subscribers_is_fine() {
        let broadcaster = Broadcaster::default();
        assert_eq!(broadcaster.broadcast(&Envelope::sensor_update(&reading())), 0);
    }

    #[tokio::test]
    async fn test_every_subscriber_gets_the_same_frame() {
        let broadcaster = Broadcaster::new(8);
        let mut a = broadcaster.subscribe();
        let mut b = broadcaster.subscribe();
        assert_eq!(broadcaster.subscriber_count(), 2);

        assert_eq!(broadcaster.broadcast(&Envelope::sensor_update(&reading())), 2);
        let fa = a.recv().await.unwrap();
        let fb = b.recv().await.unwrap();
        assert_eq!(fa, fb);
        let parsed: Value = serde_json::from_str(&fa).unwrap();
        assert_eq!(parsed["type"], "sensor_update");
    }

    #[tokio::test]
    async fn test_lagging_subscriber_drops_oldest() {
        let broadcaster = Broadcaster::new(2);
        let mut slow = broadcaster.subscribe();

        for temperature in [1.0, 2.0, 3.0, 4.0] {
            let mut r = reading();
            r.measurements.temperature = temperature;
            broadcaster.broadcast(&Envelope::sensor_update(&r));
        }

        let mut seen = Vec::new();
        for _ in 0..2 {
            let frame: Value = serde_json::from_str(&slow.recv().await.unwrap()).unwrap();
            seen.push(frame["data"]["temperature"].as_f64().unwrap());
        }
        assert_eq!(seen, vec![3.0, 4.0]);
    }

    #[tokio::test]
    async fn test_dropped_subscriber_is_not_counted() {
        let broadcaster = Broadcaster::new(4);
        let sub = broadcaster.subscribe();
        drop(sub);
        assert_eq!(broadcaster.subscriber_count(), 0);
        assert_eq!(broadcaster.broadcast(&Envelope::sensor_update(&reading())), 0);
    }
}
