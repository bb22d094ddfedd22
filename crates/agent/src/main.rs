//! Sensor Agent - field sensor telemetry daemon
//!
//! Polls a serial-attached sensor gateway (or the built-in simulation),
//! scores trends and threshold alerts per device, and serves health,
//! metrics and analysis state over HTTP.

use anyhow::{Context, Result};
use sensor_agent::{api, config::AgentConfig};
use sensor_lib::{
    health::{Component, HealthRegistry},
    observability::{StructuredLogger, TelemetryMetrics},
    pipeline::{AnalysisEvent, AnalysisShared, AnalyzerPool},
    PollerBuilder,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting sensor-agent");

    let config = AgentConfig::load()?;
    let link_config = config.link_config()?;
    let poller_config = config.poller_config()?;
    let analysis_config = config.analysis_config()?;
    info!(
        source = %config.source_name,
        port = %link_config.port(),
        baud = link_config.baud(),
        "Agent configured"
    );

    let health_registry = HealthRegistry::new();

    let metrics = TelemetryMetrics::new();
    let logger = StructuredLogger::new(&config.source_name);
    logger.log_startup(
        AGENT_VERSION,
        &link_config.port().to_string(),
        link_config.baud(),
    );

    let poller = PollerBuilder::new(link_config)
        .config(poller_config)
        .metrics(metrics.clone())
        .logger(logger.clone())
        .spawn();
    let readings = poller.subscribe();
    let mut link_status = poller.status();
    health_registry.task_started(Component::Poller).await;

    let mut shared = AnalysisShared::new(config.history_capacity);
    shared.metrics = metrics.clone();
    shared.logger = logger.clone();

    let (pool, mut events) =
        AnalyzerPool::new(analysis_config, shared.clone()).context("Invalid analysis setup")?;
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    health_registry.task_started(Component::Analyzer).await;
    let pool_health = health_registry.clone();
    let pool_handle = tokio::spawn(async move {
        pool.run(readings, shutdown_rx).await;
        pool_health
            .task_stopped(Component::Analyzer, "analyzer pool exited")
            .await;
    });

    // Mirror link status into the health registry
    let status_health = health_registry.clone();
    tokio::spawn(async move {
        let initial = link_status.borrow_and_update().clone();
        status_health.apply_link_status(&initial).await;
        while link_status.changed().await.is_ok() {
            let status = link_status.borrow_and_update().clone();
            status_health.apply_link_status(&status).await;
        }
        status_health
            .task_stopped(Component::Poller, "poller stopped")
            .await;
    });

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                AnalysisEvent::Risk(risk) => debug!(
                    device_id = %risk.device_id,
                    channel = %risk.channel,
                    score = risk.assessment.score,
                    level = risk.assessment.level.as_str(),
                    "Risk event"
                ),
                AnalysisEvent::Alert(transition) => debug!(
                    device_id = %transition.device_id,
                    message = %transition.message(),
                    "Alert event"
                ),
            }
        }
    });

    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        metrics.clone(),
        shared,
        poller.status(),
    ));

    health_registry.set_ready(true).await;

    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    health_registry.begin_shutdown().await;

    match poller.stop().await {
        Ok(report) => info!(
            frames_decoded = report.frames_decoded,
            frames_malformed = report.frames_malformed,
            readings_published = report.readings_published,
            reconnect_attempts = report.reconnect_attempts,
            "Poller stopped"
        ),
        Err(e) => warn!(error = %e, "Poller did not stop cleanly"),
    }

    // Err only when the pool already exited on stream close
    let _ = shutdown_tx.send(());
    if let Err(e) = pool_handle.await {
        warn!(error = %e, "Analyzer pool task failed");
    }

    api_handle.abort();
    info!("Shutting down");

    Ok(())
}
