//! Wire record to `SensorReading` mapping

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::models::{Channel, Measurement, RawRecord, SensorReading};

/// Device-reported sensor fault marker
const FAULT_SENTINEL: &str = "E";

/// Alarm flag used when the device reports none
const DEFAULT_ALARM_FLAG: &str = "N";

/// Magnus coefficients
const MAGNUS_A: f64 = 17.27;
const MAGNUS_B: f64 = 237.7;

/// One numeric wire key and the channel it populates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireField {
    pub key: &'static str,
    pub channel: Channel,
}

/// Numeric wire keys. `roc` is accepted on the wire but ignored; dew point
/// is always derived locally.
pub const WIRE_FIELDS: [WireField; 6] = [
    WireField { key: "ta", channel: Channel::AmbientTemp },
    WireField { key: "ts", channel: Channel::ProbeTemp },
    WireField { key: "h", channel: Channel::Humidity },
    WireField { key: "lz", channel: Channel::Light },
    WireField { key: "a", channel: Channel::Acceleration },
    WireField { key: "bat", channel: Channel::Battery },
];

const ID_KEY: &str = "id";
const SEQUENCE_KEY: &str = "seq";
const ALARM_KEY: &str = "a";

/// Maps raw short-key records onto the fixed reading schema
#[derive(Debug, Clone, Default)]
pub struct Normalizer;

impl Normalizer {
    pub fn new() -> Self {
        Self
    }

    /// Normalize a record stamped with the current time
    pub fn normalize(&self, record: &RawRecord) -> SensorReading {
        self.normalize_at(record, Utc::now())
    }

    pub fn normalize_at(&self, record: &RawRecord, received_at: DateTime<Utc>) -> SensorReading {
        let mut reading = SensorReading {
            device_id: device_id(record.get(ID_KEY)),
            ambient_temp: None,
            probe_temp: None,
            humidity: None,
            light: None,
            acceleration: None,
            battery: None,
            dew_point: None,
            sequence: measure(record.get(SEQUENCE_KEY)).value(),
            alarm_flag: alarm_flag(record.get(ALARM_KEY)),
            is_sensor_error: false,
            received_at,
        };

        for field in WIRE_FIELDS {
            let measurement = measure(record.get(field.key));
            // Text on the alarm key is a flag, not a sensor fault
            if measurement.is_fault() && field.key != ALARM_KEY {
                reading.is_sensor_error = true;
            }
            let value = measurement.value();
            match field.channel {
                Channel::AmbientTemp => reading.ambient_temp = value,
                Channel::ProbeTemp => reading.probe_temp = value,
                Channel::Humidity => reading.humidity = value,
                Channel::Light => reading.light = value,
                Channel::Acceleration => reading.acceleration = value,
                Channel::Battery => reading.battery = value,
                Channel::DewPoint => {}
            }
        }

        reading.dew_point = match (reading.probe_temp, reading.humidity) {
            (Some(t), Some(h)) => dew_point(t, h),
            _ => None,
        };

        reading
    }
}

/// Coerce one wire value. Numbers and numeric strings are values, the
/// fault sentinel is preserved, anything else is missing.
fn measure(value: Option<&Value>) -> Measurement {
    match value {
        Some(Value::Number(n)) => n
            .as_f64()
            .filter(|v| v.is_finite())
            .map_or(Measurement::Missing, Measurement::Value),
        Some(Value::String(s)) => {
            let s = s.trim();
            if s == FAULT_SENTINEL {
                return Measurement::SensorFault;
            }
            s.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map_or(Measurement::Missing, Measurement::Value)
        }
        _ => Measurement::Missing,
    }
}

fn device_id(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

/// The `a` key doubles as alarm flag when it carries text
fn alarm_flag(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) if !s.trim().is_empty() && s.trim().parse::<f64>().is_err() => {
            s.trim().to_string()
        }
        _ => DEFAULT_ALARM_FLAG.to_string(),
    }
}

/// Dew point in °C from temperature (°C) and relative humidity (%),
/// rounded to one decimal. `None` when humidity is not positive or the
/// result is not finite.
pub fn dew_point(temp: f64, humidity: f64) -> Option<f64> {
    if !temp.is_finite() || !humidity.is_finite() || humidity <= 0.0 {
        return None;
    }

    let gamma = (humidity / 100.0).ln() + MAGNUS_A * temp / (MAGNUS_B + temp);
    let denom = MAGNUS_A - gamma;
    if denom.abs() < f64::EPSILON {
        return None;
    }

    let dew = MAGNUS_B * gamma / denom;
    dew.is_finite().then(|| (dew * 10.0).round() / 10.0)
}
