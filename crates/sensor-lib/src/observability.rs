//! Observability infrastructure for the telemetry pipeline
//!
//! Provides:
//! - Prometheus metrics (frame decoding, link lifecycle, analysis output)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for per-reading analysis latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<TelemetryMetricsInner> = OnceLock::new();

struct TelemetryMetricsInner {
    frames_decoded: IntCounter,
    frames_malformed: IntCounter,
    readings_published: IntCounter,
    readings_dropped: IntCounter,
    readings_discarded: IntCounter,
    reconnect_attempts: IntCounter,
    link_state: IntGauge,
    devices_tracked: IntGauge,
    alert_transitions: IntCounterVec,
    risk_assessments: IntCounterVec,
    analysis_latency_seconds: Histogram,
}

impl TelemetryMetricsInner {
    fn new() -> Self {
        Self {
            frames_decoded: register_int_counter!(
                "sensor_telemetry_frames_decoded_total",
                "Wire lines decoded into raw records"
            )
            .expect("Failed to register frames_decoded"),

            frames_malformed: register_int_counter!(
                "sensor_telemetry_frames_malformed_total",
                "Wire lines discarded as malformed"
            )
            .expect("Failed to register frames_malformed"),

            readings_published: register_int_counter!(
                "sensor_telemetry_readings_published_total",
                "Normalized readings published by the poller"
            )
            .expect("Failed to register readings_published"),

            readings_dropped: register_int_counter!(
                "sensor_telemetry_readings_dropped_total",
                "Readings lost by slow consumers"
            )
            .expect("Failed to register readings_dropped"),

            readings_discarded: register_int_counter!(
                "sensor_telemetry_readings_discarded_total",
                "Readings discarded because they carried no device id"
            )
            .expect("Failed to register readings_discarded"),

            reconnect_attempts: register_int_counter!(
                "sensor_telemetry_reconnect_attempts_total",
                "Failed link open attempts"
            )
            .expect("Failed to register reconnect_attempts"),

            link_state: register_int_gauge!(
                "sensor_telemetry_link_state",
                "Link state (0=disconnected 1=connecting 2=connected 3=backoff 4=cooldown)"
            )
            .expect("Failed to register link_state"),

            devices_tracked: register_int_gauge!(
                "sensor_telemetry_devices_tracked",
                "Devices currently tracked by the analyzer"
            )
            .expect("Failed to register devices_tracked"),

            alert_transitions: register_int_counter_vec!(
                "sensor_telemetry_alert_transitions_total",
                "Alert level transitions by new level",
                &["level"]
            )
            .expect("Failed to register alert_transitions"),

            risk_assessments: register_int_counter_vec!(
                "sensor_telemetry_risk_assessments_total",
                "Trend risk assessments by level",
                &["level"]
            )
            .expect("Failed to register risk_assessments"),

            analysis_latency_seconds: register_histogram!(
                "sensor_telemetry_analysis_latency_seconds",
                "Time spent analysing one reading",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register analysis_latency_seconds"),
        }
    }
}

/// Telemetry metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share the
/// same underlying metrics.
#[derive(Clone)]
pub struct TelemetryMetrics {
    _private: (),
}

impl Default for TelemetryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TelemetryMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryMetrics").finish()
    }
}

impl TelemetryMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(TelemetryMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &TelemetryMetricsInner {
        GLOBAL_METRICS.get_or_init(TelemetryMetricsInner::new)
    }

    pub fn inc_frames_decoded(&self) {
        self.inner().frames_decoded.inc();
    }

    pub fn inc_frames_malformed(&self) {
        self.inner().frames_malformed.inc();
    }

    pub fn inc_readings_published(&self) {
        self.inner().readings_published.inc();
    }

    /// Count readings a lagging consumer never saw
    pub fn add_readings_dropped(&self, count: u64) {
        self.inner().readings_dropped.inc_by(count);
    }

    /// Readings lost by lagging subscribers since process start
    pub fn readings_dropped(&self) -> u64 {
        self.inner().readings_dropped.get()
    }

    pub fn inc_readings_discarded(&self) {
        self.inner().readings_discarded.inc();
    }

    pub fn inc_reconnect_attempts(&self) {
        self.inner().reconnect_attempts.inc();
    }

    pub fn set_link_state(&self, code: i64) {
        self.inner().link_state.set(code);
    }

    pub fn set_devices_tracked(&self, count: i64) {
        self.inner().devices_tracked.set(count);
    }

    pub fn inc_alert_transition(&self, level: &str) {
        self.inner()
            .alert_transitions
            .with_label_values(&[level])
            .inc();
    }

    pub fn inc_risk_assessment(&self, level: &str) {
        self.inner()
            .risk_assessments
            .with_label_values(&[level])
            .inc();
    }

    pub fn observe_analysis_latency(&self, duration_secs: f64) {
        self.inner().analysis_latency_seconds.observe(duration_secs);
    }
}

/// Structured logger for pipeline events
///
/// One consistently shaped event per domain occurrence, keyed by the
/// `event` field.
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    source: String,
}

impl StructuredLogger {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    /// Log agent startup
    pub fn log_startup(&self, version: &str, port: &str, baud: u32) {
        info!(
            event = "agent_started",
            source = %self.source,
            agent_version = %version,
            port = %port,
            baud = baud,
            "Telemetry agent started"
        );
    }

    /// Log agent shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            source = %self.source,
            reason = %reason,
            "Telemetry agent shutting down"
        );
    }

    /// Log an observable link status change
    pub fn log_link_status(&self, status: &str, attempt: u32, detail: Option<&str>) {
        match status {
            "cooldown" => warn!(
                event = "link_status",
                source = %self.source,
                status = %status,
                attempt = attempt,
                detail = ?detail,
                "Link retries exhausted, cooling down"
            ),
            _ => info!(
                event = "link_status",
                source = %self.source,
                status = %status,
                attempt = attempt,
                detail = ?detail,
                "Link status changed"
            ),
        }
    }

    /// Log an alert level transition
    pub fn log_alert_transition(
        &self,
        device_id: &str,
        channel: &str,
        previous: Option<&str>,
        level: &str,
        value: f64,
    ) {
        match level {
            "alert" => warn!(
                event = "alert_transition",
                source = %self.source,
                device_id = %device_id,
                channel = %channel,
                previous = ?previous,
                level = %level,
                value = value,
                "Channel entered alert"
            ),
            _ => info!(
                event = "alert_transition",
                source = %self.source,
                device_id = %device_id,
                channel = %channel,
                previous = ?previous,
                level = %level,
                value = value,
                "Channel level changed"
            ),
        }
    }

    /// Log a trend risk assessment
    pub fn log_risk(
        &self,
        device_id: &str,
        channel: &str,
        window_size: usize,
        slope: f64,
        r_squared: f64,
        score: f64,
        level: &str,
    ) {
        info!(
            event = "risk_assessed",
            source = %self.source,
            device_id = %device_id,
            channel = %channel,
            window_size = window_size,
            slope = slope,
            r_squared = r_squared,
            score = score,
            level = %level,
            "Trend risk assessed"
        );
    }

    /// Log a discarded wire line
    pub fn log_malformed_frame(&self, error: &str) {
        warn!(
            event = "frame_malformed",
            source = %self.source,
            error = %error,
            "Discarded malformed frame"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = TelemetryMetrics::new();
        metrics.inc_frames_decoded();
        metrics.inc_frames_malformed();
        metrics.add_readings_dropped(3);
        metrics.set_link_state(2);
        metrics.inc_alert_transition("warn");
        metrics.inc_risk_assessment("low");
        metrics.observe_analysis_latency(0.0002);
    }

    #[test]
    fn test_metrics_registered_in_default_registry() {
        let metrics = TelemetryMetrics::new();
        metrics.clone().inc_reconnect_attempts();

        let names: Vec<String> = prometheus::gather()
            .iter()
            .map(|f| f.get_name().to_string())
            .collect();
        assert!(names.contains(&"sensor_telemetry_reconnect_attempts_total".to_string()));
        assert!(names.contains(&"sensor_telemetry_link_state".to_string()));
    }

    #[test]
    fn test_structured_logger() {
        let logger = StructuredLogger::new("test-agent");
        logger.log_startup("0.1.0", "SIMULATE", 115200);
        logger.log_link_status("reconnecting", 2, Some("device not found"));
        logger.log_alert_transition("7", "humidity", None, "warn", 72.0);
        logger.log_risk("7", "probe_temp", 10, 0.05, 0.9, 0.88, "high");
        logger.log_malformed_frame("malformed frame");
        logger.log_shutdown("test");
    }
}
