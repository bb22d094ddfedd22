//! Core library for field sensor telemetry
//!
//! This crate provides:
//! - Serial link lifecycle with backoff, cooldown and a simulation mode
//! - Newline-delimited JSON framing and reading normalization
//! - A background poller publishing normalized readings
//! - Sliding-window trend fitting, fuzzy risk scoring and threshold alerts
//! - Health checks and observability

pub mod analysis;
pub mod error;
pub mod health;
pub mod ingest;
pub mod link;
pub mod models;
pub mod observability;
pub mod pipeline;
pub mod poller;
pub mod registry;

#[cfg(test)]
mod testing;

pub use error::{ConfigError, FrameError, LinkError, PollerError};
pub use health::{
    Component, ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse,
    ReadinessResponse,
};
pub use models::*;
pub use observability::{StructuredLogger, TelemetryMetrics};
pub use poller::{LinkStatus, PollerBuilder, PollerConfig, PollerHandle, PollerReport};
pub use registry::{DeviceRegistry, DeviceSnapshot};
