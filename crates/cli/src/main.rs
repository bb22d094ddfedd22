//! Field sensor telemetry CLI
//!
//! A command-line tool for listing serial ports, watching a sensor link
//! locally, running offline trend and dew point calculations, and querying
//! a running sensor agent.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{agent, analyze, serial};
use sensor_lib::analysis::DEFAULT_WINDOW_SIZE;
use sensor_lib::Channel;

/// Field sensor telemetry CLI
#[derive(Parser)]
#[command(name = "sensorctl")]
#[command(author, version, about = "CLI for field sensor telemetry", long_about = None)]
pub struct Cli {
    /// Agent API URL (can also be set via SENSORCTL_API_URL env var)
    #[arg(long, env = "SENSORCTL_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List serial ports on this machine
    Ports,

    /// Watch a sensor link locally and print readings
    Monitor {
        /// Serial port, or SIMULATE for synthetic nodes
        #[arg(long, short)]
        port: Option<String>,

        /// Baud rate
        #[arg(long, short)]
        baud: Option<u32>,

        /// Stop after this many readings
        #[arg(long, short = 'n')]
        count: Option<u64>,

        /// Text command to write once the link is up
        #[arg(long)]
        send: Option<String>,

        /// Seed for simulated nodes
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Fit a trend over values and score its risk
    Analyze {
        /// Channel the values belong to (e.g. probe_temp, humidity)
        #[arg(long, short, default_value = "probe_temp")]
        channel: Channel,

        /// Samples considered, newest last
        #[arg(long, short, default_value_t = DEFAULT_WINDOW_SIZE)]
        window: usize,

        /// Lower bound of the acceptable range
        #[arg(long, allow_negative_numbers = true)]
        min: Option<f64>,

        /// Upper bound of the acceptable range
        #[arg(long, allow_negative_numbers = true)]
        max: Option<f64>,

        /// Warning margin around the range
        #[arg(long)]
        margin: Option<f64>,

        /// Values, oldest first
        #[arg(required = true, allow_negative_numbers = true)]
        values: Vec<f64>,
    },

    /// Compute the dew point for a temperature and relative humidity
    DewPoint {
        /// Temperature in °C
        #[arg(allow_negative_numbers = true)]
        temperature: f64,

        /// Relative humidity in %
        humidity: f64,
    },

    /// Show agent health, link status and level tally
    Status,

    /// Manage devices tracked by the agent
    #[command(subcommand)]
    Devices(DevicesCommands),

    /// Show the agent's alert history
    Alerts {
        /// Only alerts for this channel
        #[arg(long, short)]
        channel: Option<Channel>,

        /// Maximum number of alerts
        #[arg(long, short, default_value = "50")]
        limit: usize,

        /// Clear the history instead of listing it
        #[arg(long)]
        clear: bool,
    },
}

#[derive(Subcommand)]
pub enum DevicesCommands {
    /// List devices
    List,

    /// Resume analysis for a device
    Enable {
        /// Device ID
        id: String,
    },

    /// Ignore a device's readings in analysis
    Disable {
        /// Device ID
        id: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let verbose = cli.verbose;

    if let Err(e) = run(cli).await {
        if verbose {
            output::print_error(&format!("{:?}", e));
        } else {
            output::print_error(&format!("{:#}", e));
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let settings = config::Config::load()?;
    let format = cli.format;

    match cli.command {
        Commands::Ports => serial::list(format)?,
        Commands::Monitor {
            port,
            baud,
            count,
            send,
            seed,
        } => {
            let options = serial::MonitorOptions {
                port: settings
                    .port(port)
                    .unwrap_or_else(|| sensor_lib::link::SIMULATE_SENTINEL.to_string()),
                baud: settings.baud(baud),
                count,
                send,
                seed,
            };
            serial::monitor(options, format).await?;
        }
        Commands::Analyze {
            channel,
            window,
            min,
            max,
            margin,
            values,
        } => {
            let band = analyze::resolve_band(channel, min, max, margin)?;
            analyze::analyze(channel, &values, window, band, format)?;
        }
        Commands::DewPoint {
            temperature,
            humidity,
        } => analyze::show_dew_point(temperature, humidity, format)?,
        Commands::Status => {
            let client = client::ApiClient::new(&settings.api_url(cli.api_url))?;
            agent::show_status(&client, format).await?;
        }
        Commands::Devices(devices_cmd) => {
            let client = client::ApiClient::new(&settings.api_url(cli.api_url))?;
            match devices_cmd {
                DevicesCommands::List => agent::list_devices(&client, format).await?,
                DevicesCommands::Enable { id } => {
                    agent::set_active(&client, &id, true, format).await?
                }
                DevicesCommands::Disable { id } => {
                    agent::set_active(&client, &id, false, format).await?
                }
            }
        }
        Commands::Alerts {
            channel,
            limit,
            clear,
        } => {
            let client = client::ApiClient::new(&settings.api_url(cli.api_url))?;
            agent::show_alerts(&client, channel, limit, clear, format).await?;
        }
    }

    Ok(())
}
