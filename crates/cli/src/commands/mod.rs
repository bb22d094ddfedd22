//! Subcommand implementations

pub mod agent;
pub mod analyze;
pub mod serial;
