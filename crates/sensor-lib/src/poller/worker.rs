//! The polling loop

use super::{LinkStatus, OutboundCommand, PollerConfig, PollerHandle, PollerReport, COMMAND_QUEUE_SIZE};
use crate::error::LinkError;
use crate::ingest::{FramedReader, Normalizer};
use crate::link::{ConnectOutcome, LinkConfig, ReconnectPolicy, SerialLink, SimulationConfig, Transport};
use crate::models::SensorReading;
use crate::observability::{StructuredLogger, TelemetryMetrics};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// What woke the loop while connected
enum Wake {
    Stop,
    Command(Option<OutboundCommand>),
    Read(Result<Option<Vec<u8>>, LinkError>),
}

/// Owns a link, a frame decoder and a normalizer, and publishes readings
pub struct SensorPoller {
    link: SerialLink,
    reader: FramedReader,
    normalizer: Normalizer,
    config: PollerConfig,
    readings_tx: broadcast::Sender<SensorReading>,
    status_tx: watch::Sender<LinkStatus>,
    commands_rx: mpsc::Receiver<OutboundCommand>,
    commands_open: bool,
    stop_rx: watch::Receiver<bool>,
    metrics: TelemetryMetrics,
    logger: StructuredLogger,
    report: PollerReport,
}

impl SensorPoller {
    /// Run until a stop is requested or the handle is dropped
    pub async fn run(mut self) -> PollerReport {
        info!(
            link = %self.link.describe(),
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "Starting sensor poller"
        );

        loop {
            if *self.stop_rx.borrow() {
                break;
            }

            if !self.link.is_connected() {
                let outcome = self.link.advance(Instant::now()).await;
                self.on_connect_outcome(outcome);
                self.metrics.set_link_state(self.link.state().code());

                if !self.link.is_connected() {
                    if self.pause(self.config.poll_interval).await {
                        break;
                    }
                    continue;
                }
            }

            let wake = tokio::select! {
                biased;
                _ = self.stop_rx.changed() => Wake::Stop,
                cmd = self.commands_rx.recv(), if self.commands_open => Wake::Command(cmd),
                read = self.link.read_frame() => Wake::Read(read),
            };

            match wake {
                Wake::Stop => break,
                Wake::Command(Some(cmd)) => {
                    self.handle_command(cmd).await;
                    continue;
                }
                Wake::Command(None) => {
                    self.commands_open = false;
                    continue;
                }
                Wake::Read(Ok(Some(bytes))) => self.ingest(&bytes),
                Wake::Read(Ok(None)) => {}
                Wake::Read(Err(e)) => self.on_link_lost(&e).await,
            }

            if self.pause(self.config.poll_interval).await {
                break;
            }
        }

        self.link.close().await;
        self.metrics.set_link_state(self.link.state().code());
        self.status_tx.send_replace(LinkStatus::Stopped);
        info!(
            readings = self.report.readings_published,
            malformed = self.report.frames_malformed,
            "Sensor poller stopped"
        );

        self.report
    }

    /// Sleep between iterations. Commands arriving meanwhile are answered.
    /// Returns true when a stop was requested.
    async fn pause(&mut self, duration: Duration) -> bool {
        let deadline = tokio::time::sleep(duration);
        tokio::pin!(deadline);

        loop {
            let cmd = tokio::select! {
                biased;
                _ = self.stop_rx.changed() => return true,
                cmd = self.commands_rx.recv(), if self.commands_open => cmd,
                _ = &mut deadline => return false,
            };

            match cmd {
                Some(cmd) => self.handle_command(cmd).await,
                None => self.commands_open = false,
            }
        }
    }

    fn on_connect_outcome(&mut self, outcome: ConnectOutcome) {
        match outcome {
            ConnectOutcome::Connected => {
                self.reader.reset();
                self.publish_status(LinkStatus::Connected, None);
            }
            ConnectOutcome::Failed { attempt, error, .. } => {
                self.report.reconnect_attempts += 1;
                self.metrics.inc_reconnect_attempts();
                if !error.is_recoverable() {
                    warn!(error = %error, "Link rejected its configuration, will keep retrying");
                }
                let detail = error.to_string();
                self.publish_status(LinkStatus::Reconnecting { attempt }, Some(&detail));
            }
            ConnectOutcome::Waiting { attempt, .. } => {
                self.publish_status(LinkStatus::Reconnecting { attempt }, None);
            }
            ConnectOutcome::Cooldown { remaining } => {
                self.publish_status(
                    LinkStatus::Cooldown {
                        retry_in_secs: remaining.as_secs(),
                    },
                    None,
                );
            }
        }
    }

    /// Publish a status, logging only when the phase changes
    fn publish_status(&self, status: LinkStatus, detail: Option<&str>) {
        let attempt = match status {
            LinkStatus::Reconnecting { attempt } => attempt,
            _ => 0,
        };
        let changed_phase = !self.status_tx.borrow().same_phase(&status);

        self.status_tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status.clone();
                true
            }
        });

        if changed_phase {
            self.logger.log_link_status(status.as_str(), attempt, detail);
        } else if let Some(detail) = detail {
            debug!(status = %status, attempt, detail, "Link still unavailable");
        }
    }

    fn ingest(&mut self, bytes: &[u8]) {
        for frame in self.reader.feed(bytes) {
            let record = match frame {
                Ok(record) => record,
                Err(e) => {
                    self.report.frames_malformed += 1;
                    self.metrics.inc_frames_malformed();
                    self.logger.log_malformed_frame(&e.to_string());
                    continue;
                }
            };
            self.report.frames_decoded += 1;
            self.metrics.inc_frames_decoded();

            let reading = self.normalizer.normalize(&record);
            if reading.device_id.is_empty() {
                self.report.readings_discarded += 1;
                self.metrics.inc_readings_discarded();
                debug!("Discarded reading without device id");
                continue;
            }

            // Err only means nobody is subscribed right now
            if self.readings_tx.send(reading).is_ok() {
                self.report.readings_published += 1;
                self.metrics.inc_readings_published();
            }
        }
    }

    async fn handle_command(&mut self, cmd: OutboundCommand) {
        let result = self.link.write(&cmd.bytes).await;
        match &result {
            Ok(()) => {
                self.report.writes += 1;
                debug!(bytes = cmd.bytes.len(), "Wrote outbound message");
            }
            Err(LinkError::NotConnected) => {}
            Err(e) => self.on_link_lost(e).await,
        }
        // The caller may have given up waiting
        let _ = cmd.reply.send(result);
    }

    async fn on_link_lost(&mut self, error: &LinkError) {
        warn!(link = %self.link.describe(), error = %error, "Link lost");
        self.link.mark_lost().await;
        self.reader.reset();
        self.metrics.set_link_state(self.link.state().code());
        let detail = error.to_string();
        self.publish_status(LinkStatus::Disconnected, Some(&detail));
    }
}

/// Builder for creating and starting a poller
pub struct PollerBuilder {
    link_config: LinkConfig,
    transport: Option<Box<dyn Transport>>,
    config: PollerConfig,
    metrics: Option<TelemetryMetrics>,
    logger: Option<StructuredLogger>,
}

impl PollerBuilder {
    /// Start from a validated link configuration
    pub fn new(link_config: LinkConfig) -> Self {
        Self {
            link_config,
            transport: None,
            config: PollerConfig::default(),
            metrics: None,
            logger: None,
        }
    }

    /// Replace the whole loop configuration
    pub fn config(mut self, config: PollerConfig) -> Self {
        self.config = config;
        self
    }

    /// Use an explicit transport instead of the one the link config selects
    pub fn transport(mut self, transport: Box<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity;
        self
    }

    pub fn policy(mut self, policy: ReconnectPolicy) -> Self {
        self.config.policy = policy;
        self
    }

    pub fn simulation(mut self, simulation: SimulationConfig) -> Self {
        self.config.simulation = simulation;
        self
    }

    pub fn metrics(mut self, metrics: TelemetryMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Spawn the poller on the current tokio runtime
    pub fn spawn(self) -> PollerHandle {
        let config = self.config;
        let link = match self.transport {
            Some(transport) => SerialLink::new(
                self.link_config,
                transport,
                config.policy,
                config.read_timeout,
            ),
            None => SerialLink::from_config(
                self.link_config,
                config.simulation.clone(),
                config.policy,
                config.read_timeout,
            ),
        };

        let (readings_tx, _) = broadcast::channel(config.channel_capacity.max(1));
        let (status_tx, status_rx) = watch::channel(LinkStatus::Disconnected);
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_QUEUE_SIZE);
        let (stop_tx, stop_rx) = watch::channel(false);

        let poller = SensorPoller {
            link,
            reader: FramedReader::new(config.max_line_len),
            normalizer: Normalizer::new(),
            config,
            readings_tx: readings_tx.clone(),
            status_tx,
            commands_rx,
            commands_open: true,
            stop_rx,
            metrics: self.metrics.unwrap_or_default(),
            logger: self
                .logger
                .unwrap_or_else(|| StructuredLogger::new("sensor-poller")),
            report: PollerReport::default(),
        };

        let join = tokio::spawn(poller.run());

        PollerHandle {
            stop_tx,
            readings: readings_tx,
            status: status_rx,
            commands: commands_tx,
            join,
        }
    }
}
