//! Synthetic sensor nodes
//!
//! Produces wire-format JSON lines with sinusoidal temperature, humidity,
//! light and battery curves per virtual node, so the full decode and analysis
//! path can run without hardware.

use super::{async_trait, Transport};
use crate::error::LinkError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::TAU;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Settings for the waveform generator
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Virtual node ids
    pub nodes: Vec<u32>,
    /// Mean period between samples of one node
    pub interval: Duration,
    /// Maximum deviation from the period, either direction
    pub jitter: Duration,
    /// Fixed RNG seed for reproducible runs
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            nodes: vec![0, 1, 2],
            interval: Duration::from_secs(10),
            jitter: Duration::from_secs(2),
            seed: None,
        }
    }
}

/// One virtual node's waveform state
#[derive(Debug, Clone)]
struct VirtualNode {
    id: u32,
    base_phase: f64,
    counter: u64,
    next_due: Instant,
}

/// Transport that generates readings instead of touching hardware
pub struct SimulatedTransport {
    config: SimulationConfig,
    rng: StdRng,
    nodes: Vec<VirtualNode>,
    pending: Vec<u8>,
    open: bool,
}

impl SimulatedTransport {
    pub fn new(config: SimulationConfig) -> Self {
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let now = Instant::now();
        let nodes = config
            .nodes
            .iter()
            .map(|&id| VirtualNode {
                id,
                base_phase: rng.gen_range(0.0..TAU),
                counter: 0,
                next_due: now,
            })
            .collect();

        Self {
            config,
            rng,
            nodes,
            pending: Vec::new(),
            open: false,
        }
    }

    /// Wire line for the next sample of a node, advancing its schedule
    fn sample(&mut self, index: usize) -> String {
        let jitter = self.next_jitter();
        let noise = self.rng.gen_range(-0.05..=0.05);
        let period = self.config.interval.as_secs_f64() + jitter;

        let node = &mut self.nodes[index];
        let line = waveform_line(node.id, node.base_phase, node.counter, noise);

        node.counter += 1;
        node.next_due = Instant::now() + Duration::from_secs_f64(period.max(0.0));
        line
    }

    fn next_jitter(&mut self) -> f64 {
        let max = self.config.jitter.as_secs_f64();
        if max <= 0.0 {
            0.0
        } else {
            self.rng.gen_range(-max..=max)
        }
    }

    fn earliest_due(&self) -> Option<(usize, Instant)> {
        self.nodes
            .iter()
            .enumerate()
            .min_by_key(|(_, n)| n.next_due)
            .map(|(i, n)| (i, n.next_due))
    }
}

/// Render one sample of the node waveforms as a JSON line
fn waveform_line(node_id: u32, base_phase: f64, counter: u64, noise: f64) -> String {
    let phase = base_phase + counter as f64 * 0.1;

    let ambient = 22.0 + 3.0 * phase.sin();
    let probe = ambient + 2.0 + 0.5 * (phase + 1.5).sin();
    let humidity = 45.0 + 10.0 * (phase - 1.0).sin();
    let light = 300.0 + 150.0 * (phase + 0.5).sin();
    let battery = 80.0 + 10.0 * (phase / 2.0).sin();
    let accel = 0.3 + 0.2 * (phase * 3.1 + node_id as f64).sin() + noise;

    let frame = serde_json::json!({
        "id": node_id,
        "ta": round_to(ambient, 2),
        "ts": round_to(probe, 2),
        "h": round_to(humidity, 2),
        "lz": round_to(light, 2),
        "bat": round_to(battery, 2),
        "a": round_to(accel, 3),
        "seq": counter,
    });

    format!("{}\n", frame)
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

#[async_trait]
impl Transport for SimulatedTransport {
    async fn open(&mut self) -> Result<(), LinkError> {
        self.open = true;
        info!(nodes = self.nodes.len(), "Simulated link opened");
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<Option<usize>, LinkError> {
        if !self.open {
            return Err(LinkError::NotConnected);
        }

        if self.pending.is_empty() {
            let Some((index, due)) = self.earliest_due() else {
                tokio::time::sleep(timeout).await;
                return Ok(None);
            };

            let wait = due.saturating_duration_since(Instant::now());
            if wait > timeout {
                tokio::time::sleep(timeout).await;
                return Ok(None);
            }
            if !wait.is_zero() {
                tokio::time::sleep(wait).await;
            }

            let line = self.sample(index);
            self.pending.extend_from_slice(line.as_bytes());
        }

        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(Some(n))
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        if !self.open {
            return Err(LinkError::NotConnected);
        }
        info!(
            message = %String::from_utf8_lossy(bytes),
            "Simulated link accepted outbound message"
        );
        Ok(())
    }

    async fn close(&mut self) {
        if self.open {
            self.open = false;
            self.pending.clear();
            debug!("Simulated link closed");
        }
    }

    fn describe(&self) -> String {
        format!("simulation({} nodes)", self.nodes.len())
    }
}
