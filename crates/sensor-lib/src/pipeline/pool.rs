//! Sharded analysis workers

use super::{DeviceAnalyzer, LevelTally};
use crate::analysis::{
    default_bands, AlertEvaluator, AlertHistory, AlertTransition, Band, RiskClassifier,
    RiskEvent, DEFAULT_HISTORY_CAPACITY, DEFAULT_WINDOW_SIZE, MIN_SAMPLES,
};
use crate::error::ConfigError;
use crate::models::{Channel, SensorReading};
use crate::observability::{StructuredLogger, TelemetryMetrics};
use crate::registry::DeviceRegistry;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Configuration for the analyzer pool
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Samples per channel window (default: 10)
    pub window_size: usize,
    /// Number of shard workers (default: 2)
    pub shards: usize,
    /// Readings queued per shard
    pub shard_queue: usize,
    /// Buffered analysis events
    pub event_capacity: usize,
    pub bands: HashMap<Channel, Band>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            shards: 2,
            shard_queue: 64,
            event_capacity: 256,
            bands: default_bands(),
        }
    }
}

impl AnalysisConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_size < MIN_SAMPLES {
            return Err(ConfigError::InvalidWindow(self.window_size));
        }
        for (channel, band) in &self.bands {
            band.validate(*channel)?;
        }
        Ok(())
    }
}

/// Output of the analyzer pool
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisEvent {
    Risk(RiskEvent),
    Alert(AlertTransition),
}

impl AnalysisEvent {
    pub fn device_id(&self) -> &str {
        match self {
            AnalysisEvent::Risk(r) => &r.device_id,
            AnalysisEvent::Alert(t) => &t.device_id,
        }
    }
}

/// State shared between the pool and its readers
#[derive(Debug, Clone)]
pub struct AnalysisShared {
    pub registry: Arc<DeviceRegistry>,
    pub history: AlertHistory,
    pub tally: Arc<LevelTally>,
    pub metrics: TelemetryMetrics,
    pub logger: StructuredLogger,
}

impl Default for AnalysisShared {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl AnalysisShared {
    pub fn new(history_capacity: usize) -> Self {
        Self {
            registry: Arc::new(DeviceRegistry::new()),
            history: AlertHistory::new(history_capacity),
            tally: Arc::new(LevelTally::new()),
            metrics: TelemetryMetrics::new(),
            logger: StructuredLogger::new("sensor-analyzer"),
        }
    }
}

/// Shard index for a device id
pub fn shard_for(device_id: &str, shards: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    device_id.hash(&mut hasher);
    (hasher.finish() % shards.max(1) as u64) as usize
}

/// Dispatcher plus shard workers
pub struct AnalyzerPool {
    config: AnalysisConfig,
    evaluator: Arc<AlertEvaluator>,
    shared: AnalysisShared,
    events_tx: mpsc::Sender<AnalysisEvent>,
}

impl AnalyzerPool {
    /// Validate the configuration and create the pool with its event stream
    pub fn new(
        config: AnalysisConfig,
        shared: AnalysisShared,
    ) -> Result<(Self, mpsc::Receiver<AnalysisEvent>), ConfigError> {
        config.validate()?;
        let evaluator = Arc::new(AlertEvaluator::new(config.bands.clone())?);
        let (events_tx, events_rx) = mpsc::channel(config.event_capacity.max(1));

        Ok((
            Self {
                config,
                evaluator,
                shared,
                events_tx,
            },
            events_rx,
        ))
    }

    /// Consume readings until shutdown or until the reading stream closes.
    /// Shards drain their queues before this returns.
    pub async fn run(
        self,
        mut readings: broadcast::Receiver<SensorReading>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        let shards = self.config.shards.max(1);
        info!(
            shards,
            window_size = self.config.window_size,
            "Starting analyzer pool"
        );

        let mut senders = Vec::with_capacity(shards);
        let mut workers: Vec<JoinHandle<()>> = Vec::with_capacity(shards);
        for index in 0..shards {
            let (tx, rx) = mpsc::channel(self.config.shard_queue.max(1));
            senders.push(tx);
            workers.push(tokio::spawn(run_shard(
                index,
                rx,
                self.config.window_size,
                self.evaluator.clone(),
                self.shared.clone(),
                self.events_tx.clone(),
            )));
        }
        drop(self.events_tx);

        loop {
            tokio::select! {
                msg = readings.recv() => match msg {
                    Ok(reading) => {
                        if !self.shared.registry.observe(&reading) {
                            debug!(device_id = %reading.device_id, "Skipping inactive device");
                            continue;
                        }
                        self.shared
                            .metrics
                            .set_devices_tracked(self.shared.registry.len() as i64);

                        let shard = shard_for(&reading.device_id, shards);
                        if senders[shard].send(reading).await.is_err() {
                            warn!(shard, "Analyzer shard exited unexpectedly");
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Analyzer lagging behind, oldest readings dropped");
                        self.shared.metrics.add_readings_dropped(skipped);
                    }
                    Err(RecvError::Closed) => {
                        info!("Reading stream closed");
                        break;
                    }
                },
                _ = shutdown.recv() => {
                    info!("Shutting down analyzer pool");
                    break;
                }
            }
        }

        drop(senders);
        for worker in workers {
            if let Err(e) = worker.await {
                warn!(error = %e, "Analyzer shard failed");
            }
        }
    }
}

async fn run_shard(
    index: usize,
    mut rx: mpsc::Receiver<SensorReading>,
    window_size: usize,
    evaluator: Arc<AlertEvaluator>,
    shared: AnalysisShared,
    events: mpsc::Sender<AnalysisEvent>,
) {
    let classifier = RiskClassifier::new();
    let mut devices: HashMap<String, DeviceAnalyzer> = HashMap::new();

    while let Some(reading) = rx.recv().await {
        let start = Instant::now();
        let analyzer = devices
            .entry(reading.device_id.clone())
            .or_insert_with(|| DeviceAnalyzer::new(reading.device_id.clone(), window_size));
        let outcome = analyzer.process(&reading, &evaluator, &classifier);

        if let Some(level) = outcome.worst_level {
            shared.tally.record(level);
        }

        for transition in outcome.transitions {
            shared
                .registry
                .set_alert_level(&transition.device_id, transition.channel, transition.level);
            shared.history.record(&transition).await;
            shared.metrics.inc_alert_transition(transition.level.as_str());
            shared.logger.log_alert_transition(
                &transition.device_id,
                transition.channel.as_str(),
                transition.previous.as_ref().map(|l| l.as_str()),
                transition.level.as_str(),
                transition.value,
            );
            emit(&events, AnalysisEvent::Alert(transition));
        }

        for risk in outcome.risks {
            shared
                .registry
                .set_risk(&risk.device_id, risk.channel, risk.assessment);
            shared.metrics.inc_risk_assessment(risk.assessment.level.as_str());
            shared.logger.log_risk(
                &risk.device_id,
                risk.channel.as_str(),
                risk.window_size,
                risk.regression.slope,
                risk.regression.r_squared,
                risk.assessment.score,
                risk.assessment.level.as_str(),
            );
            emit(&events, AnalysisEvent::Risk(risk));
        }

        shared
            .metrics
            .observe_analysis_latency(start.elapsed().as_secs_f64());
    }

    debug!(shard = index, devices = devices.len(), "Analyzer shard stopped");
}

/// Never blocks a shard on a slow event consumer
fn emit(events: &mpsc::Sender<AnalysisEvent>, event: AnalysisEvent) {
    match events.try_send(event) {
        Ok(()) => {}
        Err(TrySendError::Full(event)) => {
            debug!(device_id = %event.device_id(), "Event queue full, dropping event");
        }
        Err(TrySendError::Closed(_)) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::AlertLevel;
    use chrono::Utc;
    use std::time::Duration;

    fn reading(device_id: &str, probe: f64) -> SensorReading {
        SensorReading {
            device_id: device_id.to_string(),
            ambient_temp: None,
            probe_temp: Some(probe),
            humidity: None,
            light: None,
            acceleration: None,
            battery: None,
            dew_point: None,
            sequence: None,
            alarm_flag: "N".to_string(),
            is_sensor_error: false,
            received_at: Utc::now(),
        }
    }

    async fn collect(mut rx: mpsc::Receiver<AnalysisEvent>) -> Vec<AnalysisEvent> {
        let mut events = Vec::new();
        while let Ok(Some(event)) = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_shard_for_is_stable_and_bounded() {
        for id in ["0", "1", "sensor-17", ""] {
            let shard = shard_for(id, 4);
            assert!(shard < 4);
            assert_eq!(shard, shard_for(id, 4));
        }
        assert_eq!(shard_for("anything", 0), 0);
    }

    #[test]
    fn test_config_validation() {
        let config = AnalysisConfig {
            window_size: 2,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidWindow(2)));

        let mut config = AnalysisConfig::default();
        config
            .bands
            .insert(Channel::Humidity, Band::new(70.0, 30.0, 5.0));
        assert!(AnalyzerPool::new(config, AnalysisShared::default()).is_err());
    }

    #[tokio::test]
    async fn test_pool_processes_in_order_per_device() {
        let shared = AnalysisShared::new(50);
        let (pool, events_rx) = AnalyzerPool::new(
            AnalysisConfig {
                window_size: 3,
                shards: 3,
                ..Default::default()
            },
            shared.clone(),
        )
        .unwrap();

        let (readings_tx, readings_rx) = broadcast::channel(64);
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = tokio::spawn(pool.run(readings_rx, shutdown_rx));

        for (id, probe) in [("a", 5.0), ("b", 5.0), ("a", 8.5), ("b", 5.1), ("a", 10.0), ("b", 5.2)] {
            readings_tx.send(reading(id, probe)).unwrap();
        }
        drop(readings_tx);
        task.await.unwrap();

        let events = collect(events_rx).await;
        let a_levels: Vec<AlertLevel> = events
            .iter()
            .filter_map(|e| match e {
                AnalysisEvent::Alert(t) if t.device_id == "a" => Some(t.level),
                _ => None,
            })
            .collect();
        assert_eq!(a_levels, vec![AlertLevel::Ok, AlertLevel::Warn, AlertLevel::Alert]);

        let risks: Vec<&RiskEvent> = events
            .iter()
            .filter_map(|e| match e {
                AnalysisEvent::Risk(r) => Some(r),
                _ => None,
            })
            .collect();
        assert_eq!(risks.len(), 2);
        assert!(risks.iter().all(|r| r.window_size == 3));

        assert_eq!(shared.registry.len(), 2);
        assert_eq!(
            shared.registry.get("a").unwrap().worst_level(),
            Some(AlertLevel::Alert)
        );
        // warn and alert for "a"; "b" stayed in band
        assert_eq!(shared.history.len().await, 2);

        let tally = shared.tally.snapshot();
        assert_eq!((tally.ok, tally.warn, tally.alert), (4, 1, 1));
    }

    #[tokio::test]
    async fn test_inactive_devices_skipped() {
        let shared = AnalysisShared::new(10);
        let (pool, events_rx) = AnalyzerPool::new(
            AnalysisConfig {
                shards: 1,
                ..Default::default()
            },
            shared.clone(),
        )
        .unwrap();

        shared.registry.observe(&reading("muted", 5.0));
        shared.registry.set_active("muted", false);

        let (readings_tx, readings_rx) = broadcast::channel(16);
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = tokio::spawn(pool.run(readings_rx, shutdown_rx));

        readings_tx.send(reading("muted", 12.0)).unwrap();
        readings_tx.send(reading("live", 12.0)).unwrap();
        drop(readings_tx);
        task.await.unwrap();

        let events = collect(events_rx).await;
        assert!(!events.is_empty());
        assert!(events.iter().all(|e| e.device_id() == "live"));
        assert!(shared.registry.get("muted").unwrap().alert_levels.is_empty());
    }

    #[tokio::test]
    async fn test_lagging_pool_counts_dropped_readings() {
        let shared = AnalysisShared::new(10);
        let (pool, _events_rx) = AnalyzerPool::new(
            AnalysisConfig {
                shards: 1,
                ..Default::default()
            },
            shared.clone(),
        )
        .unwrap();

        let (readings_tx, readings_rx) = broadcast::channel(4);
        for _ in 0..10 {
            readings_tx.send(reading("a", 5.0)).unwrap();
        }
        drop(readings_tx);

        let dropped_before = shared.metrics.readings_dropped();
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        pool.run(readings_rx, shutdown_rx).await;

        // Metrics are process-wide, other tests may add to them
        assert!(shared.metrics.readings_dropped() - dropped_before >= 6);
        assert_eq!(shared.registry.get("a").unwrap().readings, 4);
        assert_eq!(shared.tally.snapshot().ok, 4);
    }

    #[tokio::test]
    async fn test_shutdown_signal_stops_pool() {
        let (pool, _events_rx) =
            AnalyzerPool::new(AnalysisConfig::default(), AnalysisShared::default()).unwrap();
        let (_readings_tx, readings_rx) = broadcast::channel::<SensorReading>(4);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = tokio::spawn(pool.run(readings_rx, shutdown_rx));

        shutdown_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("pool stopped")
            .unwrap();
    }
}
