//! Agent configuration

use anyhow::{Context, Result};
use sensor_lib::analysis::{default_bands, Band};
use sensor_lib::link::{LinkConfig, ReconnectPolicy, SimulationConfig};
use sensor_lib::pipeline::AnalysisConfig;
use sensor_lib::{Channel, PollerConfig};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Environment variable prefix, e.g. `SENSOR_PORT`
const ENV_PREFIX: &str = "SENSOR";

/// Nested key separator, e.g. `SENSOR_BANDS__HUMIDITY__MIN`
const ENV_SEPARATOR: &str = "__";

/// Optional config file (toml/json/yaml) read before the environment
const CONFIG_FILE_ENV: &str = "SENSOR_AGENT_CONFIG";

/// Agent configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Name attached to structured log events
    #[serde(default = "default_source_name")]
    pub source_name: String,

    /// Serial device path, or `SIMULATE` / `-1` for synthetic data
    #[serde(default = "default_port")]
    pub port: String,

    #[serde(default = "default_baud")]
    pub baud: u32,

    /// API server port for health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    #[serde(default = "default_window_size")]
    pub window_size: usize,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Readings buffered per subscriber
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    #[serde(default = "default_shards")]
    pub shards: usize,

    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,

    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,

    /// Comma-separated virtual node ids for simulation mode
    #[serde(default = "default_simulation_nodes")]
    pub simulation_nodes: String,

    #[serde(default = "default_simulation_interval_secs")]
    pub simulation_interval_secs: u64,

    #[serde(default)]
    pub simulation_seed: Option<u64>,

    /// Per-channel overrides of the default bands
    #[serde(default)]
    pub bands: HashMap<Channel, BandOverride>,
}

/// Partial band; unset fields keep the default
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BandOverride {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub margin: Option<f64>,
}

fn default_source_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "sensor-agent".to_string())
}

fn default_port() -> String {
    "SIMULATE".to_string()
}

fn default_baud() -> u32 {
    115200
}

fn default_api_port() -> u16 {
    8080
}

fn default_window_size() -> usize {
    10
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_read_timeout_ms() -> u64 {
    1000
}

fn default_channel_capacity() -> usize {
    256
}

fn default_shards() -> usize {
    2
}

fn default_history_capacity() -> usize {
    500
}

fn default_max_retries() -> u32 {
    5
}

fn default_max_delay_secs() -> u64 {
    16
}

fn default_cooldown_secs() -> u64 {
    30
}

fn default_simulation_nodes() -> String {
    "0,1,2".to_string()
}

fn default_simulation_interval_secs() -> u64 {
    10
}

impl AgentConfig {
    /// Load configuration from an optional config file and the environment
    pub fn load() -> Result<Self> {
        let file = std::env::var(CONFIG_FILE_ENV).ok();
        let mut builder = config::Config::builder();
        if let Some(path) = file.as_deref() {
            builder = builder.add_source(config::File::from(Path::new(path)));
        }
        builder = builder.add_source(environment());

        Self::from_config(builder.build()?)
    }

    /// Load from a config file plus an explicit variable map instead of the
    /// process environment
    pub fn load_from(file: Option<&Path>, env: HashMap<String, String>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path));
        }
        builder = builder.add_source(environment().source(Some(env)));

        Self::from_config(builder.build()?)
    }

    fn from_config(config: config::Config) -> Result<Self> {
        config
            .try_deserialize()
            .context("Invalid agent configuration")
    }

    /// Validated link settings; errors here are fatal at startup
    pub fn link_config(&self) -> Result<LinkConfig> {
        LinkConfig::parse(&self.port, self.baud).context("Invalid link configuration")
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            max_retries: self.max_retries,
            max_delay: Duration::from_secs(self.max_delay_secs),
            cooldown: Duration::from_secs(self.cooldown_secs),
        }
    }

    pub fn simulation_config(&self) -> Result<SimulationConfig> {
        let nodes = self
            .simulation_nodes
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<u32>()
                    .with_context(|| format!("Invalid simulation node id '{}'", s))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(SimulationConfig {
            nodes,
            interval: Duration::from_secs(self.simulation_interval_secs),
            seed: self.simulation_seed,
            ..Default::default()
        })
    }

    pub fn poller_config(&self) -> Result<PollerConfig> {
        Ok(PollerConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            channel_capacity: self.channel_capacity,
            policy: self.reconnect_policy(),
            simulation: self.simulation_config()?,
            ..Default::default()
        })
    }

    /// Default bands with overrides applied
    pub fn bands(&self) -> HashMap<Channel, Band> {
        let mut bands = default_bands();
        for (channel, o) in &self.bands {
            let base = bands
                .get(channel)
                .copied()
                .unwrap_or(Band::new(f64::NEG_INFINITY, f64::INFINITY, 0.0));
            bands.insert(
                *channel,
                Band::new(
                    o.min.unwrap_or(base.min),
                    o.max.unwrap_or(base.max),
                    o.margin.unwrap_or(base.margin),
                ),
            );
        }
        bands
    }

    pub fn analysis_config(&self) -> Result<AnalysisConfig> {
        let config = AnalysisConfig {
            window_size: self.window_size,
            shards: self.shards,
            bands: self.bands(),
            ..Default::default()
        };
        config.validate().context("Invalid analysis configuration")?;
        Ok(config)
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator(ENV_SEPARATOR)
}
