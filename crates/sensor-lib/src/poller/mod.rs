//! Background reader for one sensor link
//!
//! The poller task is the only user of its `SerialLink`. Consumers interact
//! with it through a `PollerHandle`: readings on a broadcast channel, link
//! status on a watch channel, outbound writes through a command queue.

mod worker;


pub use worker::{PollerBuilder, SensorPoller};

use crate::error::{LinkError, PollerError};
use crate::ingest::DEFAULT_MAX_LINE_LEN;
use crate::link::{ReconnectPolicy, SimulationConfig, DEFAULT_READ_TIMEOUT};
use crate::models::SensorReading;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;

/// Pause between loop iterations
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Readings buffered per subscriber before the oldest are dropped
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Queued outbound writes
const COMMAND_QUEUE_SIZE: usize = 16;

/// Configuration for the polling loop
#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub poll_interval: Duration,
    pub read_timeout: Duration,
    /// Readings kept per subscriber, rounded up to a power of two. A
    /// subscriber that falls further behind loses the oldest ones.
    pub channel_capacity: usize,
    pub max_line_len: usize,
    pub policy: ReconnectPolicy,
    pub simulation: SimulationConfig,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            read_timeout: DEFAULT_READ_TIMEOUT,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            max_line_len: DEFAULT_MAX_LINE_LEN,
            policy: ReconnectPolicy::default(),
            simulation: SimulationConfig::default(),
        }
    }
}

/// Observable link status published by the poller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LinkStatus {
    Disconnected,
    Reconnecting { attempt: u32 },
    Connected,
    Cooldown { retry_in_secs: u64 },
    Stopped,
}

impl LinkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkStatus::Disconnected => "disconnected",
            LinkStatus::Reconnecting { .. } => "reconnecting",
            LinkStatus::Connected => "connected",
            LinkStatus::Cooldown { .. } => "cooldown",
            LinkStatus::Stopped => "stopped",
        }
    }

    /// Whether two statuses describe the same phase, ignoring counters
    pub fn same_phase(&self, other: &LinkStatus) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

impl std::fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Totals reported by a poller once it has stopped
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollerReport {
    pub frames_decoded: u64,
    pub frames_malformed: u64,
    pub readings_published: u64,
    pub readings_discarded: u64,
    pub reconnect_attempts: u64,
    pub writes: u64,
}

/// Outbound write queued for the poller
#[derive(Debug)]
pub(crate) struct OutboundCommand {
    pub bytes: Vec<u8>,
    pub reply: oneshot::Sender<Result<(), LinkError>>,
}

/// Handle to a running poller
#[derive(Debug)]
pub struct PollerHandle {
    stop_tx: watch::Sender<bool>,
    readings: broadcast::Sender<SensorReading>,
    status: watch::Receiver<LinkStatus>,
    commands: mpsc::Sender<OutboundCommand>,
    join: JoinHandle<PollerReport>,
}

impl PollerHandle {
    /// New subscriber; sees readings published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<SensorReading> {
        self.readings.subscribe()
    }

    /// Watch link status changes
    pub fn status(&self) -> watch::Receiver<LinkStatus> {
        self.status.clone()
    }

    pub fn current_status(&self) -> LinkStatus {
        self.status.borrow().clone()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Write bytes to the device through the poller. Resolves once the
    /// write was attempted; a failed write is not retried.
    pub async fn send(&self, bytes: impl Into<Vec<u8>>) -> Result<(), PollerError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(OutboundCommand {
                bytes: bytes.into(),
                reply,
            })
            .await
            .map_err(|_| PollerError::Stopped)?;

        rx.await.map_err(|_| PollerError::Stopped)??;
        Ok(())
    }

    /// Request a stop and wait until the task has closed the link
    pub async fn stop(self) -> Result<PollerReport, PollerError> {
        // Err only if the task already exited
        let _ = self.stop_tx.send(true);
        self.join
            .await
            .map_err(|e| PollerError::Join(e.to_string()))
    }
}
