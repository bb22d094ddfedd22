//! Output formatting utilities

use chrono::{DateTime, Local, Utc};
use clap::ValueEnum;
use colored::Colorize;
use sensor_lib::{analysis::AlertLevel, analysis::RiskLevel, Channel, ComponentStatus, LinkStatus};
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print serializable data as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print rows as a rounded table, or a notice when empty
pub fn print_rows<T: Tabled>(rows: Vec<T>, empty: &str) {
    if rows.is_empty() {
        print_warning(empty);
        return;
    }
    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{}", table);
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Value with its channel unit, `-` when absent
pub fn format_value(channel: Channel, value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.2}{}", v, channel.unit()),
        None => "-".to_string(),
    }
}

/// Local time for display
pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Color an alert level
pub fn color_level(level: AlertLevel) -> String {
    let text = level.as_str();
    match level {
        AlertLevel::Ok => text.green().to_string(),
        AlertLevel::Warn => text.yellow().to_string(),
        AlertLevel::Alert => text.red().bold().to_string(),
    }
}

/// Color a risk level
pub fn color_risk(level: RiskLevel) -> String {
    let text = level.as_str();
    match level {
        RiskLevel::Low => text.green().to_string(),
        RiskLevel::Medium => text.yellow().to_string(),
        RiskLevel::High => text.red().bold().to_string(),
    }
}

/// Color a link status
pub fn color_link(status: &LinkStatus) -> String {
    let text = status.to_string();
    match status {
        LinkStatus::Connected => text.green().to_string(),
        LinkStatus::Disconnected | LinkStatus::Reconnecting { .. } => text.yellow().to_string(),
        LinkStatus::Cooldown { .. } | LinkStatus::Stopped => text.red().to_string(),
    }
}

/// Color a health component status
pub fn color_component(status: ComponentStatus) -> String {
    match status {
        ComponentStatus::Healthy => "healthy".green().to_string(),
        ComponentStatus::Degraded => "degraded".yellow().to_string(),
        ComponentStatus::Unhealthy => "unhealthy".red().to_string(),
    }
}

/// Color status based on value
pub fn color_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "active" => status.green().to_string(),
        "inactive" => status.yellow().to_string(),
        _ => status.to_string(),
    }
}
