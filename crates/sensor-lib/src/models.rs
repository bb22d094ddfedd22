//! Core data models for the telemetry pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A decoded wire frame before normalization (short keys, dynamic values)
pub type RawRecord = serde_json::Map<String, serde_json::Value>;

/// Measurement channels carried by a sensor node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    AmbientTemp,
    ProbeTemp,
    Humidity,
    Light,
    Acceleration,
    Battery,
    DewPoint,
}

impl Channel {
    pub const ALL: [Channel; 7] = [
        Channel::AmbientTemp,
        Channel::ProbeTemp,
        Channel::Humidity,
        Channel::Light,
        Channel::Acceleration,
        Channel::Battery,
        Channel::DewPoint,
    ];

    /// Stable snake_case name, used as metric label and map key
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::AmbientTemp => "ambient_temp",
            Channel::ProbeTemp => "probe_temp",
            Channel::Humidity => "humidity",
            Channel::Light => "light",
            Channel::Acceleration => "acceleration",
            Channel::Battery => "battery",
            Channel::DewPoint => "dew_point",
        }
    }

    /// Display unit
    pub fn unit(&self) -> &'static str {
        match self {
            Channel::AmbientTemp | Channel::ProbeTemp | Channel::DewPoint => "°C",
            Channel::Humidity | Channel::Battery => "%",
            Channel::Light => "lx",
            Channel::Acceleration => "g",
        }
    }

    /// Human label used in alert messages
    pub fn label(&self) -> &'static str {
        match self {
            Channel::AmbientTemp => "Ambient temperature",
            Channel::ProbeTemp => "Probe temperature",
            Channel::Humidity => "Humidity",
            Channel::Light => "Light",
            Channel::Acceleration => "Acceleration",
            Channel::Battery => "Battery",
            Channel::DewPoint => "Dew point",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Channel::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown channel '{}'", s))
    }
}

/// A single field as reported by the device
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Measurement {
    /// A numeric value
    Value(f64),
    /// The device flagged the sensor as faulty (the `"E"` sentinel)
    SensorFault,
    /// Absent or not coercible to a number
    Missing,
}

impl Measurement {
    pub fn value(&self) -> Option<f64> {
        match self {
            Measurement::Value(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_fault(&self) -> bool {
        matches!(self, Measurement::SensorFault)
    }
}

/// Normalized reading from one sensor node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub device_id: String,
    pub ambient_temp: Option<f64>,
    pub probe_temp: Option<f64>,
    pub humidity: Option<f64>,
    pub light: Option<f64>,
    pub acceleration: Option<f64>,
    pub battery: Option<f64>,
    /// Derived from probe temperature and humidity, never taken from the wire
    pub dew_point: Option<f64>,
    pub sequence: Option<f64>,
    pub alarm_flag: String,
    pub is_sensor_error: bool,
    pub received_at: DateTime<Utc>,
}

impl SensorReading {
    /// Value of a channel, if present in this reading
    pub fn value(&self, channel: Channel) -> Option<f64> {
        match channel {
            Channel::AmbientTemp => self.ambient_temp,
            Channel::ProbeTemp => self.probe_temp,
            Channel::Humidity => self.humidity,
            Channel::Light => self.light,
            Channel::Acceleration => self.acceleration,
            Channel::Battery => self.battery,
            Channel::DewPoint => self.dew_point,
        }
    }

    /// Iterate over the channels that carry a value
    pub fn channels(&self) -> impl Iterator<Item = (Channel, f64)> + '_ {
        Channel::ALL
            .iter()
            .filter_map(move |c| self.value(*c).map(|v| (*c, v)))
    }
}
