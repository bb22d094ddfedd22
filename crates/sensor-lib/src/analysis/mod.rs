//! Trend, risk and threshold analysis
//!
//! Two independent signals are produced per reading: threshold banding
//! (`alert`) and fuzzy trend risk (`trend` + `risk`). Neither overrides the
//! other; consumers decide how to combine them.

pub mod alert;
pub mod history;
pub mod risk;
pub mod trend;

pub use alert::{
    classify, default_bands, AlertEvaluator, AlertLevel, AlertTracker, AlertTransition, Band,
};
pub use history::{AlertHistory, AlertRecord, DEFAULT_HISTORY_CAPACITY};
pub use risk::{
    fuzzify_fit, fuzzify_proximity, fuzzify_slope, RiskAssessment, RiskClassifier, RiskEvent,
    RiskLevel,
};
pub use trend::{
    fit, RegressionResult, SlidingWindow, TrendAnalyzer, TrendDirection, DEFAULT_WINDOW_SIZE,
    MIN_SAMPLES,
};
