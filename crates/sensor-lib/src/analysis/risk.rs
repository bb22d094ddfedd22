//! Fuzzy trend risk scoring
//!
//! Breakpoints and weights are fixed; operators read the score directly,
//! so it must stay explainable.

use super::alert::Band;
use super::trend::RegressionResult;
use crate::models::Channel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const SLOPE_WEIGHT: f64 = 0.4;
const FIT_WEIGHT: f64 = 0.3;
const PROXIMITY_WEIGHT: f64 = 0.3;

const MEDIUM_THRESHOLD: f64 = 0.35;
const HIGH_THRESHOLD: f64 = 0.7;

/// Distance outside the band still considered "near"
const PROXIMITY_MARGIN: f64 = 1.0;

/// Membership for "steep slope"
pub fn fuzzify_slope(slope: f64) -> f64 {
    let magnitude = slope.abs();
    if magnitude < 0.01 {
        0.1
    } else if magnitude < 0.03 {
        0.5
    } else {
        1.0
    }
}

/// Membership for "trustworthy fit"
pub fn fuzzify_fit(r_squared: f64) -> f64 {
    if r_squared < 0.3 {
        0.2
    } else if r_squared < 0.6 {
        0.6
    } else {
        1.0
    }
}

/// Membership for "close to or past the band edge"
pub fn fuzzify_proximity(value: f64, min: f64, max: f64) -> f64 {
    if (min..=max).contains(&value) {
        0.2
    } else if (min - PROXIMITY_MARGIN..=max + PROXIMITY_MARGIN).contains(&value) {
        0.6
    } else {
        1.0
    }
}

/// Discrete risk level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn from_score(score: f64) -> Self {
        if score < MEDIUM_THRESHOLD {
            RiskLevel::Low
        } else if score < HIGH_THRESHOLD {
            RiskLevel::Medium
        } else {
            RiskLevel::High
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Continuous score in [0, 1] and its level
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub score: f64,
    pub level: RiskLevel,
}

/// Stateless fuzzy classifier
#[derive(Debug, Clone, Copy, Default)]
pub struct RiskClassifier;

impl RiskClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(
        &self,
        slope: f64,
        r_squared: f64,
        value: f64,
        min: f64,
        max: f64,
    ) -> RiskAssessment {
        let score = SLOPE_WEIGHT * fuzzify_slope(slope)
            + FIT_WEIGHT * fuzzify_fit(r_squared)
            + PROXIMITY_WEIGHT * fuzzify_proximity(value, min, max);

        RiskAssessment {
            score,
            level: RiskLevel::from_score(score),
        }
    }

    /// Classify a fitted window against a channel band
    pub fn assess(&self, regression: &RegressionResult, value: f64, band: &Band) -> RiskAssessment {
        self.classify(regression.slope, regression.r_squared, value, band.min, band.max)
    }
}

/// Risk record keyed by device, channel and window size
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskEvent {
    pub device_id: String,
    pub channel: Channel,
    pub window_size: usize,
    pub value: f64,
    pub regression: RegressionResult,
    pub assessment: RiskAssessment,
    pub at: DateTime<Utc>,
}
