//! Telemetry agent: configuration and HTTP surface
//!
//! The binary in `main.rs` wires these to a running poller and analyzer pool.

pub mod api;
pub mod config;
