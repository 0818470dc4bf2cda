//! Telemetry Intake
//!
//! Decodes a wire payload into a validated [`RawReading`] or a rejection
//! reason. Rejections are terminal for the message: nothing downstream runs.

use airsense_core::{Measurements, Metric, RawReading};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;

/// Readings older than this are treated as replayed or clock-skewed
pub const DEFAULT_STALENESS: Duration = Duration::from_secs(2 * 60);

#[derive(Debug, Clone, PartialEq, Error)]
pub enum IntakeError {
    #[error("retained delivery skipped")]
    Retained,

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("missing device_id or ts")]
    MissingIdentity,

    /// `age_secs` is `None` when `ts` is not a usable instant at all
    #[error("stale or invalid timestamp (age {age_secs:?}s)")]
    Stale { age_secs: Option<i64> },

    #[error("invalid value for {metric}")]
    InvalidMetric { metric: Metric },
}

impl IntakeError {
    /// Short label used for counters and log fields
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Retained => "retained",
            Self::MalformedPayload(_) => "malformed_payload",
            Self::MissingIdentity => "missing_identity",
            Self::Stale { .. } => "stale",
            Self::InvalidMetric { .. } => "invalid_metric",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Intake {
    staleness: chrono::Duration,
}

impl Default for Intake {
    fn default() -> Self {
        Self::new(DEFAULT_STALENESS)
    }
}

impl Intake {
    pub fn new(staleness: Duration) -> Self {
        Self {
            staleness: chrono::Duration::from_std(staleness).unwrap_or(chrono::Duration::MAX),
        }
    }

    /// Validate one inbound delivery against the clock `now`
    pub fn accept(&self, payload: &[u8], retained: bool, now: DateTime<Utc>) -> Result<RawReading, IntakeError> {
        if retained {
            return Err(IntakeError::Retained);
        }

        let doc: Map<String, Value> =
            serde_json::from_slice(payload).map_err(|e| IntakeError::MalformedPayload(e.to_string()))?;

        let device_id = match doc.get("device_id") {
            Some(Value::String(id)) if !id.trim().is_empty() => id.clone(),
            _ => return Err(IntakeError::MissingIdentity),
        };
        let ts_field = doc.get("ts").filter(|v| is_present(v)).ok_or(IntakeError::MissingIdentity)?;

        let ts = epoch_seconds_to_utc(safe_number(Some(ts_field))).ok_or(IntakeError::Stale { age_secs: None })?;
        let age = now.signed_duration_since(ts);
        if age > self.staleness {
            return Err(IntakeError::Stale {
                age_secs: Some(age.num_seconds()),
            });
        }

        let measurements = Measurements::from_fn(|metric| safe_number(doc.get(metric.wire_key())));
        if let Some(metric) = measurements.first_non_finite() {
            return Err(IntakeError::InvalidMetric { metric });
        }

        let aqi = Some(safe_number(doc.get("aqi"))).filter(|v| v.is_finite());

        Ok(RawReading {
            device_id,
            ts,
            measurements,
            aqi,
        })
    }
}

/// Numbers pass through, non-blank strings are parsed, anything else is NaN
pub fn safe_number(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().parse().unwrap_or(f64::NAN),
        _ => f64::NAN,
    }
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        _ => true,
    }
}

fn epoch_seconds_to_utc(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    DateTime::from_timestamp_millis((secs * 1000.0).round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn payload(ts: i64) -> Value {
        json!({
            "device_id": "d1",
            "ts": ts,
            "temp_c": 25.0,
            "rh_pct": 60,
            "tvoc_ppb": 100,
            "eco2_ppm": 450,
            "dust_ugm3": 10
        })
    }

    fn accept(value: &Value) -> Result<RawReading, IntakeError> {
        Intake::default().accept(value.to_string().as_bytes(), false, now())
    }

    #[test]
    fn test_accepts_fresh_reading() {
        let reading = accept(&payload(now().timestamp() - 5)).unwrap();
        assert_eq!(reading.device_id, "d1");
        assert_eq!(reading.measurements.temperature, 25.0);
        assert_eq!(reading.measurements.eco2, 450.0);
        assert_eq!(reading.aqi, None);
        assert_eq!(reading.ts.timestamp(), now().timestamp() - 5);
    }

    #[test]
    fn test_retained_rejected_before_decoding() {
        let result = Intake::default().accept(b"not json", true, now());
        assert_eq!(result, Err(IntakeError::Retained));
    }

    #[test]
    fn test_malformed_payload() {
        let result = Intake::default().accept(b"{\"device_id\": ", false, now());
        assert!(matches!(result, Err(IntakeError::MalformedPayload(_))));
    }

    #[test]
    fn test_missing_identity() {
        let mut value = payload(now().timestamp());
        value.as_object_mut().unwrap().remove("device_id");
        assert_eq!(accept(&value), Err(IntakeError::MissingIdentity));

        let mut value = payload(now().timestamp());
        value["ts"] = Value::Null;
        assert_eq!(accept(&value), Err(IntakeError::MissingIdentity));

        let mut value = payload(now().timestamp());
        value["device_id"] = json!("");
        assert_eq!(accept(&value), Err(IntakeError::MissingIdentity));
    }

    #[test]
    fn test_stale_beyond_two_minutes() {
        let result = accept(&payload(now().timestamp() - 121));
        assert_eq!(result, Err(IntakeError::Stale { age_secs: Some(121) }));

        // exactly at the bound is still live
        assert!(accept(&payload(now().timestamp() - 120)).is_ok());
    }

    #[test]
    fn test_unparseable_ts_is_stale() {
        let mut value = payload(0);
        value["ts"] = json!("yesterday");
        assert_eq!(accept(&value), Err(IntakeError::Stale { age_secs: None }));
    }

    #[test]
    fn test_numeric_strings_are_coerced() {
        let mut value = payload(now().timestamp());
        value["temp_c"] = json!(" 24.5 ");
        value["ts"] = json!(now().timestamp().to_string());
        value["aqi"] = json!("42");
        let reading = accept(&value).unwrap();
        assert_eq!(reading.measurements.temperature, 24.5);
        assert_eq!(reading.aqi, Some(42.0));
    }

    #[test]
    fn test_invalid_metric() {
        let mut value = payload(now().timestamp());
        value["dust_ugm3"] = json!("");
        assert_eq!(
            accept(&value),
            Err(IntakeError::InvalidMetric { metric: Metric::Dust })
        );

        let mut value = payload(now().timestamp());
        value["rh_pct"] = json!(true);
        assert_eq!(
            accept(&value),
            Err(IntakeError::InvalidMetric { metric: Metric::Humidity })
        );
    }

    #[test]
    fn test_safe_number() {
        assert_eq!(safe_number(Some(&json!(3))), 3.0);
        assert_eq!(safe_number(Some(&json!("1e2"))), 100.0);
        assert!(safe_number(Some(&json!("abc"))).is_nan());
        assert!(safe_number(Some(&json!([1]))).is_nan());
        assert!(safe_number(None).is_nan());
    }
}
