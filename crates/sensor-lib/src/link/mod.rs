//! Serial link lifecycle
//!
//! This module owns the byte-stream connection to a sensor node. It provides
//! a pure state machine for reconnect decisions, a transport abstraction with
//! a real serial backend and a synthetic waveform generator, and the
//! `SerialLink` session that ties them together.

mod config;
mod serial;
mod session;
mod simulate;
mod state;


pub use config::{
    LinkConfig, PortIdentifier, SIMULATE_NUMERIC_SENTINEL, SIMULATE_SENTINEL, SUPPORTED_BAUD_RATES,
};
pub use serial::{list_ports, PortInfo, SerialTransport};
pub use session::{ConnectOutcome, SerialLink, DEFAULT_READ_TIMEOUT};
pub use simulate::{SimulatedTransport, SimulationConfig};
pub use state::{LinkState, ReconnectPolicy, DEFAULT_COOLDOWN, DEFAULT_MAX_DELAY, DEFAULT_MAX_RETRIES};

use crate::error::LinkError;
use std::time::Duration;

pub use async_trait::async_trait;

/// Byte-stream backend for a link
#[async_trait]
pub trait Transport: Send {
    /// Acquire the underlying handle
    async fn open(&mut self) -> Result<(), LinkError>;

    /// Read available bytes, waiting at most `timeout`.
    /// `Ok(None)` means nothing arrived in time.
    async fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<Option<usize>, LinkError>;

    /// Write all bytes
    async fn write(&mut self, bytes: &[u8]) -> Result<(), LinkError>;

    /// Release the underlying handle; a no-op when nothing is open
    async fn close(&mut self);

    /// Short description for logs
    fn describe(&self) -> String;
}

/// Create the transport selected by a link configuration
pub fn create_transport(config: &LinkConfig, simulation: SimulationConfig) -> Box<dyn Transport> {
    match config.port() {
        PortIdentifier::Simulate => {
            tracing::info!(nodes = ?simulation.nodes, "Simulation mode enabled");
            Box::new(SimulatedTransport::new(simulation))
        }
        PortIdentifier::Device(path) => {
            tracing::info!(port = %path, baud = config.baud(), "Using serial transport");
            Box::new(SerialTransport::new(path.clone(), config.baud()))
        }
    }
}
