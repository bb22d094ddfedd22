//! Threshold banding with hysteresis margins
//!
//! `classify` is stateless. `AlertTracker` holds the last level per channel
//! and only reports changes, so a value sitting outside its band does not
//! raise a new alert on every reading.

use crate::error::ConfigError;
use crate::models::Channel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Banded level of a single value
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Ok,
    Warn,
    Alert,
}

impl AlertLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::Ok => "ok",
            AlertLevel::Warn => "warn",
            AlertLevel::Alert => "alert",
        }
    }

    /// Warn and Alert are kept in history; Ok is not
    pub fn is_notable(&self) -> bool {
        !matches!(self, AlertLevel::Ok)
    }
}

impl std::fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Acceptable range of a channel plus its warning margin
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub min: f64,
    pub max: f64,
    pub margin: f64,
}

impl Band {
    pub fn new(min: f64, max: f64, margin: f64) -> Self {
        Self { min, max, margin }
    }

    pub fn validate(&self, channel: Channel) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidBand {
            channel,
            reason: reason.to_string(),
        };

        if !self.min.is_finite() || !self.max.is_finite() || !self.margin.is_finite() {
            return Err(invalid("bounds must be finite"));
        }
        if self.min > self.max {
            return Err(invalid("min is greater than max"));
        }
        if self.margin < 0.0 {
            return Err(invalid("margin is negative"));
        }
        Ok(())
    }

    pub fn classify(&self, value: f64) -> AlertLevel {
        classify(value, self.min, self.max, self.margin)
    }
}

/// Ok inside `[min, max]`, Warn within `margin` of it, Alert beyond
pub fn classify(value: f64, min: f64, max: f64, margin: f64) -> AlertLevel {
    if min <= value && value <= max {
        AlertLevel::Ok
    } else if min - margin <= value && value <= max + margin {
        AlertLevel::Warn
    } else {
        AlertLevel::Alert
    }
}

/// Default bands: probe temperature 2..8 °C (margin 1), humidity 30..70 % (margin 5)
pub fn default_bands() -> HashMap<Channel, Band> {
    HashMap::from([
        (Channel::ProbeTemp, Band::new(2.0, 8.0, 1.0)),
        (Channel::Humidity, Band::new(30.0, 70.0, 5.0)),
    ])
}

/// Per-channel band configuration
#[derive(Debug, Clone)]
pub struct AlertEvaluator {
    bands: HashMap<Channel, Band>,
}

impl Default for AlertEvaluator {
    fn default() -> Self {
        Self {
            bands: default_bands(),
        }
    }
}

impl AlertEvaluator {
    /// Build from explicit bands, validating each one
    pub fn new(bands: HashMap<Channel, Band>) -> Result<Self, ConfigError> {
        for (channel, band) in &bands {
            band.validate(*channel)?;
        }
        Ok(Self { bands })
    }

    pub fn band(&self, channel: Channel) -> Option<&Band> {
        self.bands.get(&channel)
    }

    pub fn bands(&self) -> &HashMap<Channel, Band> {
        &self.bands
    }

    /// Level for a channel value; `None` when the channel has no band
    pub fn evaluate(&self, channel: Channel, value: f64) -> Option<AlertLevel> {
        self.bands.get(&channel).map(|band| band.classify(value))
    }
}

/// A level change on one `(device_id, channel)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertTransition {
    pub device_id: String,
    pub channel: Channel,
    pub previous: Option<AlertLevel>,
    pub level: AlertLevel,
    pub value: f64,
    pub band: Band,
    pub at: DateTime<Utc>,
}

impl AlertTransition {
    /// Operator-facing description
    pub fn message(&self) -> String {
        let unit = self.channel.unit();
        match self.level {
            AlertLevel::Ok => format!(
                "{} back in range on device {}: {:.1}{}",
                self.channel.label(),
                self.device_id,
                self.value,
                unit
            ),
            AlertLevel::Warn | AlertLevel::Alert => {
                let side = if self.value < self.band.min { "below" } else { "above" };
                format!(
                    "{} {} range on device {}: {:.1}{} (range {:.1}-{:.1}{})",
                    self.channel.label(),
                    side,
                    self.device_id,
                    self.value,
                    unit,
                    self.band.min,
                    self.band.max,
                    unit
                )
            }
        }
    }
}

/// Last known level per channel of one device
#[derive(Debug, Clone, Default)]
pub struct AlertTracker {
    levels: HashMap<Channel, AlertLevel>,
}

impl AlertTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a level; returns a transition when it differs from the last
    /// one. The first observation of a channel always transitions.
    pub fn observe(
        &mut self,
        device_id: &str,
        channel: Channel,
        value: f64,
        band: Band,
        at: DateTime<Utc>,
    ) -> Option<AlertTransition> {
        let level = band.classify(value);
        let previous = self.levels.insert(channel, level);
        if previous == Some(level) {
            return None;
        }

        Some(AlertTransition {
            device_id: device_id.to_string(),
            channel,
            previous,
            level,
            value,
            band,
            at,
        })
    }

    pub fn level(&self, channel: Channel) -> Option<AlertLevel> {
        self.levels.get(&channel).copied()
    }

    pub fn levels(&self) -> &HashMap<Channel, AlertLevel> {
        &self.levels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_reference_points() {
        assert_eq!(classify(5.0, 2.0, 8.0, 1.0), AlertLevel::Ok);
        assert_eq!(classify(1.0, 2.0, 8.0, 1.0), AlertLevel::Warn);
        assert_eq!(classify(0.0, 2.0, 8.0, 1.0), AlertLevel::Alert);
        assert_eq!(classify(8.5, 2.0, 8.0, 1.0), AlertLevel::Warn);
        assert_eq!(classify(9.5, 2.0, 8.0, 1.0), AlertLevel::Alert);
    }

    #[test]
    fn test_band_edges_inclusive() {
        let band = Band::new(2.0, 8.0, 1.0);
        assert_eq!(band.classify(2.0), AlertLevel::Ok);
        assert_eq!(band.classify(8.0), AlertLevel::Ok);
        assert_eq!(band.classify(9.0), AlertLevel::Warn);
        assert_eq!(band.classify(1.0), AlertLevel::Warn);
    }

    #[test]
    fn test_band_validation() {
        assert!(Band::new(2.0, 8.0, 1.0).validate(Channel::ProbeTemp).is_ok());
        assert!(matches!(
            Band::new(8.0, 2.0, 1.0).validate(Channel::ProbeTemp),
            Err(ConfigError::InvalidBand { .. })
        ));
        assert!(Band::new(2.0, 8.0, -1.0).validate(Channel::Humidity).is_err());
        assert!(Band::new(f64::NAN, 8.0, 1.0).validate(Channel::Humidity).is_err());
    }

    #[test]
    fn test_evaluator_defaults() {
        let evaluator = AlertEvaluator::default();
        assert_eq!(evaluator.evaluate(Channel::ProbeTemp, 5.0), Some(AlertLevel::Ok));
        assert_eq!(evaluator.evaluate(Channel::Humidity, 73.0), Some(AlertLevel::Warn));
        assert_eq!(evaluator.evaluate(Channel::Light, 900.0), None);
    }

    #[test]
    fn test_tracker_emits_only_on_change() {
        let mut tracker = AlertTracker::new();
        let band = Band::new(2.0, 8.0, 1.0);
        let now = Utc::now();

        let first = tracker.observe("1", Channel::ProbeTemp, 5.0, band, now).unwrap();
        assert_eq!(first.previous, None);
        assert_eq!(first.level, AlertLevel::Ok);

        assert!(tracker.observe("1", Channel::ProbeTemp, 6.0, band, now).is_none());

        let warn = tracker.observe("1", Channel::ProbeTemp, 8.6, band, now).unwrap();
        assert_eq!(warn.previous, Some(AlertLevel::Ok));
        assert_eq!(warn.level, AlertLevel::Warn);

        // Oscillating inside the margin stays quiet
        assert!(tracker.observe("1", Channel::ProbeTemp, 8.9, band, now).is_none());
        assert!(tracker.observe("1", Channel::ProbeTemp, 8.2, band, now).is_none());

        let alert = tracker.observe("1", Channel::ProbeTemp, 10.0, band, now).unwrap();
        assert_eq!(alert.level, AlertLevel::Alert);
        assert_eq!(tracker.level(Channel::ProbeTemp), Some(AlertLevel::Alert));
    }

    #[test]
    fn test_transition_message() {
        let transition = AlertTransition {
            device_id: "4".to_string(),
            channel: Channel::Humidity,
            previous: Some(AlertLevel::Ok),
            level: AlertLevel::Warn,
            value: 72.5,
            band: Band::new(30.0, 70.0, 5.0),
            at: Utc::now(),
        };
        assert_eq!(
            transition.message(),
            "Humidity above range on device 4: 72.5% (range 30.0-70.0%)"
        );
    }
}
