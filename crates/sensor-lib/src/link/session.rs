//! One serial session: a transport driven by the lifecycle state machine

use super::{create_transport, LinkConfig, LinkState, ReconnectPolicy, SimulationConfig, Transport};
use crate::error::LinkError;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Default bound on a single blocking read
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Size of the scratch buffer used for reads
const READ_CHUNK_SIZE: usize = 1024;

/// Result of trying to advance a link that is not connected
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectOutcome {
    /// The link is (now) connected
    Connected,
    /// An open attempt failed; the link is backing off
    Failed {
        attempt: u32,
        error: LinkError,
        retry_in: Duration,
    },
    /// Still inside a backoff window
    Waiting { attempt: u32, remaining: Duration },
    /// Retry budget exhausted; quiet until the cooldown ends
    Cooldown { remaining: Duration },
}

/// Owns exactly one connection and applies lifecycle transitions to it
pub struct SerialLink {
    config: LinkConfig,
    policy: ReconnectPolicy,
    transport: Box<dyn Transport>,
    state: LinkState,
    read_timeout: Duration,
    buf: Vec<u8>,
}

impl SerialLink {
    /// Create a link over an explicit transport
    pub fn new(
        config: LinkConfig,
        transport: Box<dyn Transport>,
        policy: ReconnectPolicy,
        read_timeout: Duration,
    ) -> Self {
        Self {
            config,
            policy,
            transport,
            state: LinkState::Disconnected,
            read_timeout,
            buf: vec![0u8; READ_CHUNK_SIZE],
        }
    }

    /// Create a link with the transport its configuration selects
    pub fn from_config(
        config: LinkConfig,
        simulation: SimulationConfig,
        policy: ReconnectPolicy,
        read_timeout: Duration,
    ) -> Self {
        let transport = create_transport(&config, simulation);
        Self::new(config, transport, policy, read_timeout)
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    pub fn describe(&self) -> String {
        self.transport.describe()
    }

    /// Move a non-connected link forward, opening the transport when the
    /// schedule allows. Never sleeps; the caller paces the calls.
    pub async fn advance(&mut self, now: Instant) -> ConnectOutcome {
        self.state = self.state.start().tick(now, &self.policy);

        match self.state {
            LinkState::Connected => ConnectOutcome::Connected,
            LinkState::Connecting { attempt } => match self.open_transport(now).await {
                (Ok(()), _) => {
                    self.state = self.state.on_connect_success();
                    info!(link = %self.transport.describe(), attempt, "Link connected");
                    ConnectOutcome::Connected
                }
                (Err(error), failed_at) => {
                    self.state = self.state.on_connect_failure(failed_at, &self.policy);
                    let retry_in = self.state.remaining(failed_at).unwrap_or_default();
                    debug!(
                        link = %self.transport.describe(),
                        attempt,
                        error = %error,
                        retry_in_secs = retry_in.as_secs(),
                        "Link open failed"
                    );
                    ConnectOutcome::Failed {
                        attempt,
                        error,
                        retry_in,
                    }
                }
            },
            LinkState::Backoff { attempt, .. } => ConnectOutcome::Waiting {
                attempt,
                remaining: self.state.remaining(now).unwrap_or_default(),
            },
            LinkState::ExhaustedCooldown { .. } => ConnectOutcome::Cooldown {
                remaining: self.state.remaining(now).unwrap_or_default(),
            },
            // start() never leaves the link disconnected
            LinkState::Disconnected => ConnectOutcome::Waiting {
                attempt: 0,
                remaining: Duration::ZERO,
            },
        }
    }

    /// Open the transport. The returned instant is `now` moved forward by
    /// however long the open call took.
    async fn open_transport(&mut self, now: Instant) -> (Result<(), LinkError>, Instant) {
        let started = Instant::now();
        let result = self.transport.open().await;
        (result, now + started.elapsed())
    }

    /// Read the next chunk of bytes, waiting at most the read timeout.
    ///
    /// Returns `Ok(None)` on timeout or transient driver errors. Any other
    /// error is returned for the caller to translate via [`SerialLink::mark_lost`].
    pub async fn read_frame(&mut self) -> Result<Option<Vec<u8>>, LinkError> {
        if !self.state.is_connected() {
            return Err(LinkError::NotConnected);
        }

        match self.transport.read(&mut self.buf, self.read_timeout).await {
            Ok(Some(n)) => Ok(Some(self.buf[..n].to_vec())),
            Ok(None) => Ok(None),
            Err(e) if e.is_transient() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Write bytes once; failures are returned, never retried here
    pub async fn write(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        if !self.state.is_connected() {
            return Err(LinkError::NotConnected);
        }
        self.transport.write(bytes).await
    }

    /// Translate a broken connection into `Disconnected`, releasing the handle
    pub async fn mark_lost(&mut self) {
        self.transport.close().await;
        self.state = self.state.on_link_lost();
    }

    /// Explicit close from any state
    pub async fn close(&mut self) {
        self.transport.close().await;
        self.state = self.state.close();
        debug!(link = %self.transport.describe(), "Link closed");
    }
}
