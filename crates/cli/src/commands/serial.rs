//! Local serial commands: port listing and a live monitor

use anyhow::{Context, Result};
use colored::Colorize;
use sensor_lib::analysis::{default_bands, AlertEvaluator, RiskClassifier, DEFAULT_WINDOW_SIZE};
use sensor_lib::link::{list_ports, LinkConfig};
use sensor_lib::pipeline::DeviceAnalyzer;
use sensor_lib::{Channel, LinkStatus, PollerBuilder, SensorReading};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tabled::Tabled;
use tokio::sync::broadcast::error::RecvError;

use crate::output::{
    color_level, color_link, color_risk, format_timestamp, format_value, print_info, print_json,
    print_rows, print_success, print_warning, OutputFormat,
};

/// How long `--send` waits for the link before giving up
const SEND_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Row for the ports table
#[derive(Tabled)]
struct PortRow {
    #[tabled(rename = "Port")]
    name: String,
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Description")]
    description: String,
}

/// List serial ports visible to the OS
pub fn list(format: OutputFormat) -> Result<()> {
    let ports = list_ports().context("Failed to enumerate serial ports")?;

    match format {
        OutputFormat::Json => print_json(&ports)?,
        OutputFormat::Table => {
            let rows = ports
                .into_iter()
                .map(|p| PortRow {
                    name: p.name,
                    kind: p.kind,
                    description: p.description.unwrap_or_else(|| "-".to_string()),
                })
                .collect();
            print_rows(rows, "No serial ports found");
            print_info("Use SIMULATE as the port to run without hardware");
        }
    }

    Ok(())
}

/// Options for the live monitor
pub struct MonitorOptions {
    pub port: String,
    pub baud: u32,
    pub count: Option<u64>,
    pub send: Option<String>,
    pub seed: Option<u64>,
}

/// Run a local poller and print readings with their alert and risk levels
pub async fn monitor(options: MonitorOptions, format: OutputFormat) -> Result<()> {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    monitor_until(options, format, ctrl_c).await?;
    Ok(())
}

/// Monitor until `shutdown` resolves or the count is reached. Returns the
/// number of readings seen.
async fn monitor_until(
    options: MonitorOptions,
    format: OutputFormat,
    shutdown: impl Future<Output = ()>,
) -> Result<u64> {
    let link = LinkConfig::parse(&options.port, options.baud).context("Invalid link settings")?;
    let mut builder = PollerBuilder::new(link.clone());
    if let Some(seed) = options.seed {
        builder = builder.simulation(sensor_lib::link::SimulationConfig {
            seed: Some(seed),
            ..Default::default()
        });
    }
    let poller = builder.spawn();
    let mut readings = poller.subscribe();
    let mut status = poller.status();

    if let OutputFormat::Table = format {
        print_info(&format!(
            "Monitoring {} (Ctrl-C to stop)",
            link.port().to_string().cyan()
        ));
    }

    if let Some(message) = &options.send {
        send_when_connected(&poller, &mut status, message).await?;
    }

    let evaluator = AlertEvaluator::new(default_bands())?;
    let classifier = RiskClassifier::new();
    let mut analyzers: HashMap<String, DeviceAnalyzer> = HashMap::new();
    let mut seen = 0u64;
    tokio::pin!(shutdown);

    loop {
        if options.count.is_some_and(|limit| seen >= limit) {
            break;
        }

        tokio::select! {
            _ = &mut shutdown => break,
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = status.borrow_and_update().clone();
                if let OutputFormat::Table = format {
                    println!("{} link {}", "·".dimmed(), color_link(&current));
                }
            }
            received = readings.recv() => match received {
                Ok(reading) => {
                    seen += 1;
                    let analyzer = analyzers
                        .entry(reading.device_id.clone())
                        .or_insert_with(|| DeviceAnalyzer::new(reading.device_id.clone(), DEFAULT_WINDOW_SIZE));
                    let outcome = analyzer.process(&reading, &evaluator, &classifier);

                    match format {
                        OutputFormat::Json => println!("{}", serde_json::to_string(&reading)?),
                        OutputFormat::Table => {
                            print_reading(&reading);
                            for transition in &outcome.transitions {
                                if transition.previous.is_some() || transition.level.is_notable() {
                                    println!("    {} {}", color_level(transition.level), transition.message());
                                }
                            }
                            for risk in &outcome.risks {
                                println!(
                                    "    {} risk {} ({:.2}, slope {:.4}, R² {:.2})",
                                    risk.channel,
                                    color_risk(risk.assessment.level),
                                    risk.assessment.score,
                                    risk.regression.slope,
                                    risk.regression.r_squared
                                );
                            }
                        }
                    }
                }
                Err(RecvError::Lagged(n)) => print_warning(&format!("Skipped {} readings", n)),
                Err(RecvError::Closed) => break,
            },
        }
    }

    let report = poller.stop().await?;
    if let OutputFormat::Table = format {
        print_success(&format!(
            "Stopped after {} readings ({} frames, {} malformed, {} reconnects)",
            seen, report.frames_decoded, report.frames_malformed, report.reconnect_attempts
        ));
    }

    Ok(seen)
}

async fn send_when_connected(
    poller: &sensor_lib::PollerHandle,
    status: &mut tokio::sync::watch::Receiver<LinkStatus>,
    message: &str,
) -> Result<()> {
    tokio::time::timeout(
        SEND_CONNECT_TIMEOUT,
        status.wait_for(|s| matches!(s, LinkStatus::Connected)),
    )
    .await
    .context("Link did not connect in time")?
    .context("Poller stopped before connecting")?;

    let mut bytes = message.as_bytes().to_vec();
    if !bytes.ends_with(b"\n") {
        bytes.push(b'\n');
    }
    poller.send(bytes).await.context("Failed to send message")?;
    print_success(&format!("Sent {:?}", message));
    Ok(())
}

fn print_reading(reading: &SensorReading) {
    let fields = [
        ("ta", Channel::AmbientTemp),
        ("ts", Channel::ProbeTemp),
        ("h", Channel::Humidity),
        ("lz", Channel::Light),
        ("a", Channel::Acceleration),
        ("bat", Channel::Battery),
        ("dp", Channel::DewPoint),
    ];
    let values: Vec<String> = fields
        .iter()
        .map(|(key, channel)| format!("{}={}", key, format_value(*channel, reading.value(*channel))))
        .collect();

    let mut line = format!(
        "{} [{}] {}",
        format_timestamp(&reading.received_at).dimmed(),
        reading.device_id.cyan(),
        values.join(" ")
    );
    if reading.is_sensor_error {
        line.push_str(&format!(" {}", "sensor error".red()));
    }
    if reading.alarm_flag != "N" {
        line.push_str(&format!(" alarm={}", reading.alarm_flag.yellow()));
    }
    println!("{}", line);
}
