//! Commands that query a running sensor agent

use anyhow::Result;
use colored::Colorize;
use sensor_lib::{Channel, DeviceSnapshot};
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{
    color_component, color_level, color_link, color_risk, color_status, format_timestamp,
    print_json, print_rows, print_success, OutputFormat,
};

/// Show link, health and tally of the agent
pub async fn show_status(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health = client.health().await?;
    let summary = client.summary().await?;

    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "health": health,
            "summary": summary,
        }))?,
        OutputFormat::Table => {
            println!("{}", "Agent Status".bold());
            println!("{}", "=".repeat(50));
            println!("Health:          {}", color_component(health.status));
            println!("Link:            {}", color_link(&summary.link));
            println!(
                "Devices:         {} ({} active)",
                summary.devices, summary.active_devices
            );
            println!("Alerts stored:   {}", summary.alerts_stored);
            if summary.readings_dropped > 0 {
                println!(
                    "Dropped:         {}",
                    summary.readings_dropped.to_string().yellow()
                );
            }
            println!();
            println!("{}", "Readings by level".bold());
            println!("{}", "-".repeat(50));
            println!("ok:              {}", summary.tally.ok.to_string().green());
            println!("warn:            {}", summary.tally.warn.to_string().yellow());
            println!("alert:           {}", summary.tally.alert.to_string().red());

            let mut components: Vec<_> = health.components.iter().collect();
            components.sort_by(|a, b| a.0.cmp(b.0));
            println!();
            println!("{}", "Components".bold());
            println!("{}", "-".repeat(50));
            for (name, component) in components {
                let status = color_component(component.status);
                match &component.message {
                    Some(message) => println!("{:<16} {} ({})", name, status, message),
                    None => println!("{:<16} {}", name, status),
                }
            }
        }
    }

    Ok(())
}

/// Row for the devices table
#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "Device")]
    device_id: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Readings")]
    readings: u64,
    #[tabled(rename = "Level")]
    level: String,
    #[tabled(rename = "Risk")]
    risk: String,
    #[tabled(rename = "Last Seen")]
    last_seen: String,
}

impl From<&DeviceSnapshot> for DeviceRow {
    fn from(device: &DeviceSnapshot) -> Self {
        let risk = device
            .risks
            .iter()
            .max_by(|a, b| a.1.score.total_cmp(&b.1.score))
            .map(|(channel, r)| format!("{} {}", color_risk(r.level), channel))
            .unwrap_or_else(|| "-".to_string());

        Self {
            device_id: device.device_id.clone(),
            state: color_status(if device.active { "active" } else { "inactive" }),
            readings: device.readings,
            level: device
                .worst_level()
                .map(color_level)
                .unwrap_or_else(|| "-".to_string()),
            risk,
            last_seen: format_timestamp(&device.last_seen),
        }
    }
}

/// List devices known to the agent
pub async fn list_devices(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let devices = client.devices().await?;

    match format {
        OutputFormat::Json => print_json(&devices)?,
        OutputFormat::Table => {
            let rows = devices.iter().map(DeviceRow::from).collect();
            print_rows(rows, "No devices have reported yet");
        }
    }

    Ok(())
}

/// Enable or disable analysis for one device
pub async fn set_active(
    client: &ApiClient,
    device_id: &str,
    active: bool,
    format: OutputFormat,
) -> Result<()> {
    let device = client.set_device_active(device_id, active).await?;

    match format {
        OutputFormat::Json => print_json(&device)?,
        OutputFormat::Table => {
            let verb = if device.active { "enabled" } else { "disabled" };
            print_success(&format!("Device {} {}", device.device_id.cyan(), verb));
        }
    }

    Ok(())
}

/// Row for the alerts table
#[derive(Tabled)]
struct AlertRow {
    #[tabled(rename = "Time")]
    at: String,
    #[tabled(rename = "Level")]
    level: String,
    #[tabled(rename = "Message")]
    message: String,
}

/// Show (or clear) the agent's alert history
pub async fn show_alerts(
    client: &ApiClient,
    channel: Option<Channel>,
    limit: usize,
    clear: bool,
    format: OutputFormat,
) -> Result<()> {
    if clear {
        client.clear_alerts().await?;
        print_success("Alert history cleared");
        return Ok(());
    }

    let alerts = client.alerts(channel, limit).await?;

    match format {
        OutputFormat::Json => print_json(&alerts)?,
        OutputFormat::Table => {
            let rows = alerts
                .iter()
                .map(|a| AlertRow {
                    at: format_timestamp(&a.at),
                    level: color_level(a.level),
                    message: a.message.clone(),
                })
                .collect();
            print_rows(rows, "No alerts recorded");
        }
    }

    Ok(())
}
