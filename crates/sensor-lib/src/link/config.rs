//! Link configuration consumed by the core

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Port value that selects the synthetic waveform generator
pub const SIMULATE_SENTINEL: &str = "SIMULATE";

/// Legacy numeric sentinel accepted for the same purpose
pub const SIMULATE_NUMERIC_SENTINEL: &str = "-1";

/// Standard rates accepted for a physical port
pub const SUPPORTED_BAUD_RATES: &[u32] = &[
    300, 600, 1200, 2400, 4800, 9600, 14400, 19200, 38400, 57600, 115200, 230400, 460800, 921600,
];

/// Where a link reads its bytes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortIdentifier {
    /// OS device path or name (e.g. `/dev/ttyUSB0`, `COM3`)
    Device(String),
    /// Synthetic readings instead of real hardware
    Simulate,
}

impl PortIdentifier {
    /// Parse a user supplied port value, recognising the simulation sentinels
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(ConfigError::EmptyPort);
        }

        if trimmed.eq_ignore_ascii_case(SIMULATE_SENTINEL) || trimmed == SIMULATE_NUMERIC_SENTINEL {
            return Ok(PortIdentifier::Simulate);
        }

        Ok(PortIdentifier::Device(trimmed.to_string()))
    }

    pub fn is_simulated(&self) -> bool {
        matches!(self, PortIdentifier::Simulate)
    }
}

impl std::fmt::Display for PortIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortIdentifier::Device(path) => f.write_str(path),
            PortIdentifier::Simulate => f.write_str(SIMULATE_SENTINEL),
        }
    }
}

/// Immutable link settings for one session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkConfig {
    port: PortIdentifier,
    baud: u32,
}

impl LinkConfig {
    /// Validate and build a link configuration
    pub fn new(port: PortIdentifier, baud: u32) -> Result<Self, ConfigError> {
        if let PortIdentifier::Device(path) = &port {
            if path.trim().is_empty() {
                return Err(ConfigError::EmptyPort);
            }
            if !SUPPORTED_BAUD_RATES.contains(&baud) {
                return Err(ConfigError::UnsupportedBaud(baud));
            }
        }

        Ok(Self { port, baud })
    }

    /// Parse a port string and validate the pair
    pub fn parse(port: &str, baud: u32) -> Result<Self, ConfigError> {
        Self::new(PortIdentifier::parse(port)?, baud)
    }

    /// Simulation link; baud is irrelevant
    pub fn simulated() -> Self {
        Self {
            port: PortIdentifier::Simulate,
            baud: 0,
        }
    }

    pub fn port(&self) -> &PortIdentifier {
        &self.port
    }

    pub fn baud(&self) -> u32 {
        self.baud
    }

    pub fn is_simulated(&self) -> bool {
        self.port.is_simulated()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sentinels() {
        assert_eq!(PortIdentifier::parse("SIMULATE").unwrap(), PortIdentifier::Simulate);
        assert_eq!(PortIdentifier::parse("simulate").unwrap(), PortIdentifier::Simulate);
        assert_eq!(PortIdentifier::parse("-1").unwrap(), PortIdentifier::Simulate);
        assert_eq!(
            PortIdentifier::parse(" /dev/ttyUSB0 ").unwrap(),
            PortIdentifier::Device("/dev/ttyUSB0".to_string())
        );
        assert_eq!(PortIdentifier::parse("  "), Err(ConfigError::EmptyPort));
    }

    #[test]
    fn test_baud_validation() {
        assert!(LinkConfig::parse("/dev/ttyUSB0", 115200).is_ok());
        assert_eq!(
            LinkConfig::parse("/dev/ttyUSB0", 12345),
            Err(ConfigError::UnsupportedBaud(12345))
        );
        assert_eq!(
            LinkConfig::parse("COM3", 0),
            Err(ConfigError::UnsupportedBaud(0))
        );
    }

    #[test]
    fn test_simulation_ignores_baud() {
        let config = LinkConfig::parse("-1", 0).unwrap();
        assert!(config.is_simulated());
    }
}
