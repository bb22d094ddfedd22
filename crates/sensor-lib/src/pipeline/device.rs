//! Per-device analysis state

use crate::analysis::{
    AlertEvaluator, AlertLevel, AlertTracker, AlertTransition, RiskClassifier, RiskEvent,
    TrendAnalyzer,
};
use crate::models::SensorReading;

/// Everything one reading produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceOutcome {
    pub risks: Vec<RiskEvent>,
    pub transitions: Vec<AlertTransition>,
    /// Worst banded level in this reading, if any banded channel was present
    pub worst_level: Option<AlertLevel>,
}

/// Windows and alert state owned by exactly one worker
#[derive(Debug, Clone)]
pub struct DeviceAnalyzer {
    device_id: String,
    trend: TrendAnalyzer,
    tracker: AlertTracker,
}

impl DeviceAnalyzer {
    pub fn new(device_id: impl Into<String>, window_size: usize) -> Self {
        Self {
            device_id: device_id.into(),
            trend: TrendAnalyzer::new(window_size),
            tracker: AlertTracker::new(),
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn tracker(&self) -> &AlertTracker {
        &self.tracker
    }

    /// Feed every banded channel of a reading through banding and trend risk
    pub fn process(
        &mut self,
        reading: &SensorReading,
        evaluator: &AlertEvaluator,
        classifier: &RiskClassifier,
    ) -> DeviceOutcome {
        let mut outcome = DeviceOutcome::default();

        for (channel, value) in reading.channels() {
            let Some(band) = evaluator.band(channel).copied() else {
                continue;
            };

            let level = band.classify(value);
            outcome.worst_level = outcome.worst_level.max(Some(level));

            if let Some(transition) =
                self.tracker
                    .observe(&self.device_id, channel, value, band, reading.received_at)
            {
                outcome.transitions.push(transition);
            }

            if let Some(regression) = self.trend.push(channel, value) {
                outcome.risks.push(RiskEvent {
                    device_id: self.device_id.clone(),
                    channel,
                    window_size: self.trend.window_size(),
                    value,
                    assessment: classifier.assess(&regression, value, &band),
                    regression,
                    at: reading.received_at,
                });
            }
        }

        outcome
    }
}
