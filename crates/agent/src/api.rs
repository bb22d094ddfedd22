//! HTTP API for health checks, Prometheus metrics and analysis state

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use prometheus::{Encoder, TextEncoder};
use sensor_lib::{
    analysis::AlertRecord,
    health::{ComponentStatus, HealthRegistry},
    observability::TelemetryMetrics,
    pipeline::{AnalysisShared, TallySnapshot},
    Channel, DeviceSnapshot, LinkStatus,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// Alerts returned when no limit is given
const DEFAULT_ALERT_LIMIT: usize = 50;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: TelemetryMetrics,
    pub analysis: AnalysisShared,
    pub link_status: watch::Receiver<LinkStatus>,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        metrics: TelemetryMetrics,
        analysis: AnalysisShared,
        link_status: watch::Receiver<LinkStatus>,
    ) -> Self {
        Self {
            health_registry,
            metrics,
            analysis,
            link_status,
        }
    }
}

/// Error body for API failures
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still operational
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

async fn list_devices(State(state): State<Arc<AppState>>) -> Json<Vec<DeviceSnapshot>> {
    Json(state.analysis.registry.list())
}

async fn get_device(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match state.analysis.registry.get(&id) {
        Some(device) => Json(device).into_response(),
        None => error_response(StatusCode::NOT_FOUND, format!("unknown device '{}'", id)),
    }
}

/// Body for the activation endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct ActivationRequest {
    pub active: bool,
}

async fn set_device_active(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<ActivationRequest>,
) -> Response {
    let registry = &state.analysis.registry;
    if !registry.set_active(&id, request.active) {
        return error_response(StatusCode::NOT_FOUND, format!("unknown device '{}'", id));
    }

    info!(device_id = %id, active = request.active, "Device activation updated via API");
    match registry.get(&id) {
        Some(device) => Json(device).into_response(),
        None => error_response(StatusCode::NOT_FOUND, format!("unknown device '{}'", id)),
    }
}

/// Query parameters for the alert history
#[derive(Debug, Default, Deserialize)]
pub struct AlertQuery {
    pub channel: Option<String>,
    pub limit: Option<usize>,
}

async fn list_alerts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AlertQuery>,
) -> Response {
    let channel = match query.channel.as_deref().map(str::parse::<Channel>) {
        None => None,
        Some(Ok(channel)) => Some(channel),
        Some(Err(e)) => return error_response(StatusCode::BAD_REQUEST, e),
    };
    let limit = query.limit.unwrap_or(DEFAULT_ALERT_LIMIT);

    let alerts: Vec<AlertRecord> = state.analysis.history.recent(channel, limit).await;
    Json(alerts).into_response()
}

async fn clear_alerts(State(state): State<Arc<AppState>>) -> StatusCode {
    state.analysis.history.clear().await;
    info!("Alert history cleared via API");
    StatusCode::NO_CONTENT
}

/// Dashboard summary
#[derive(Debug, Serialize, Deserialize)]
pub struct Summary {
    pub link: LinkStatus,
    pub devices: usize,
    pub active_devices: usize,
    pub tally: TallySnapshot,
    pub alerts_stored: usize,
    pub readings_dropped: u64,
    pub generated_at: DateTime<Utc>,
}

async fn summary(State(state): State<Arc<AppState>>) -> Json<Summary> {
    let devices = state.analysis.registry.list();
    let link = state.link_status.borrow().clone();

    Json(Summary {
        link,
        devices: devices.len(),
        active_devices: devices.iter().filter(|d| d.active).count(),
        tally: state.analysis.tally.snapshot(),
        alerts_stored: state.analysis.history.len().await,
        readings_dropped: state.metrics.readings_dropped(),
        generated_at: Utc::now(),
    })
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/v1/devices", get(list_devices))
        .route("/api/v1/devices/:id", get(get_device))
        .route("/api/v1/devices/:id/active", post(set_device_active))
        .route("/api/v1/alerts", get(list_alerts).delete(clear_alerts))
        .route("/api/v1/summary", get(summary))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
