//! Integration tests for the agent API endpoints

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{TimeZone, Utc};
use sensor_agent::api::{create_router, AppState};
use sensor_lib::{
    analysis::{default_bands, AlertLevel, AlertTransition},
    health::{Component, HealthRegistry},
    observability::TelemetryMetrics,
    pipeline::AnalysisShared,
    Channel, LinkStatus, SensorReading,
};
use std::sync::Arc;
use tokio::sync::watch;
use tower::ServiceExt;

struct TestApp {
    router: Router,
    state: Arc<AppState>,
    status_tx: watch::Sender<LinkStatus>,
}

async fn setup_test_app() -> TestApp {
    let health_registry = HealthRegistry::new();
    health_registry.task_started(Component::Poller).await;
    health_registry.task_started(Component::Analyzer).await;
    health_registry
        .apply_link_status(&LinkStatus::Connected)
        .await;

    let (status_tx, status_rx) = watch::channel(LinkStatus::Disconnected);
    let state = Arc::new(AppState::new(
        health_registry,
        TelemetryMetrics::new(),
        AnalysisShared::new(16),
        status_rx,
    ));

    TestApp {
        router: create_router(state.clone()),
        state,
        status_tx,
    }
}

fn reading(device_id: &str, probe_temp: f64) -> SensorReading {
    SensorReading {
        device_id: device_id.to_string(),
        ambient_temp: Some(21.0),
        probe_temp: Some(probe_temp),
        humidity: Some(50.0),
        light: None,
        acceleration: None,
        battery: Some(90.0),
        dew_point: None,
        sequence: None,
        alarm_flag: "N".to_string(),
        is_sensor_error: false,
        received_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
    }
}

fn transition(device_id: &str, channel: Channel, level: AlertLevel, value: f64) -> AlertTransition {
    AlertTransition {
        device_id: device_id.to_string(),
        channel,
        previous: Some(AlertLevel::Ok),
        level,
        value,
        band: default_bands()[&channel],
        at: Utc::now(),
    }
}

async fn get(app: &TestApp, uri: &str) -> (StatusCode, serde_json::Value) {
    send(app, Request::builder().uri(uri).body(Body::empty()).unwrap()).await
}

async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if body.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn test_healthz_returns_ok_when_healthy() {
    let app = setup_test_app().await;

    let (status, health) = get(&app, "/healthz").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "healthy");
    assert!(health["components"]["link"].is_object());
    assert!(health["components"]["poller"].is_object());
    assert!(health["components"]["analyzer"].is_object());
}

#[tokio::test]
async fn test_healthz_degraded_while_reconnecting() {
    let app = setup_test_app().await;
    app.state
        .health_registry
        .apply_link_status(&LinkStatus::Reconnecting { attempt: 2 })
        .await;

    let (status, health) = get(&app, "/healthz").await;

    // Degraded still returns 200 (operational)
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "degraded");
}

#[tokio::test]
async fn test_healthz_returns_503_in_cooldown() {
    let app = setup_test_app().await;
    app.state
        .health_registry
        .apply_link_status(&LinkStatus::Cooldown { retry_in_secs: 30 })
        .await;

    let (status, health) = get(&app, "/healthz").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(health["status"], "unhealthy");
}

#[tokio::test]
async fn test_readyz_follows_ready_flag() {
    let app = setup_test_app().await;

    let (status, readiness) = get(&app, "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(readiness["ready"], false);

    app.state.health_registry.set_ready(true).await;
    let (status, readiness) = get(&app, "/readyz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(readiness["ready"], true);

    app.state.health_registry.begin_shutdown().await;
    let (status, readiness) = get(&app, "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(readiness["reason"], "agent shutting down");
}

#[tokio::test]
async fn test_metrics_endpoint_returns_prometheus_format() {
    let app = setup_test_app().await;
    app.state.metrics.inc_frames_decoded();
    app.state.metrics.observe_analysis_latency(0.002);

    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers().get("content-type").unwrap();
    assert!(content_type.to_str().unwrap().contains("text/plain"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let metrics_text = String::from_utf8(body.to_vec()).unwrap();

    assert!(metrics_text.contains("sensor_telemetry_frames_decoded_total"));
    assert!(metrics_text.contains("sensor_telemetry_analysis_latency_seconds_bucket"));
    assert!(metrics_text.contains("sensor_telemetry_link_state"));
}

#[tokio::test]
async fn test_devices_listed_and_fetched() {
    let app = setup_test_app().await;
    let registry = &app.state.analysis.registry;
    registry.observe(&reading("7", 4.0));
    registry.observe(&reading("3", 5.0));
    registry.observe(&reading("7", 4.2));

    let (status, devices) = get(&app, "/api/v1/devices").await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = devices
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["device_id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["3", "7"]);

    let (status, device) = get(&app, "/api/v1/devices/7").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(device["readings"], 2);
    assert_eq!(device["active"], true);
    assert_eq!(device["last_reading"]["probe_temp"], 4.2);

    let (status, error) = get(&app, "/api/v1/devices/99").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(error["error"].as_str().unwrap().contains("99"));
}

#[tokio::test]
async fn test_device_activation_toggle() {
    let app = setup_test_app().await;
    app.state.analysis.registry.observe(&reading("4", 4.0));

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/devices/4/active")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"active": false}"#))
        .unwrap();
    let (status, device) = send(&app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(device["active"], false);
    assert!(!app.state.analysis.registry.is_active("4"));

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/devices/missing/active")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"active": true}"#))
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_alerts_filtered_by_channel_and_limited() {
    let app = setup_test_app().await;
    let history = &app.state.analysis.history;
    history
        .record(&transition("1", Channel::ProbeTemp, AlertLevel::Warn, 8.5))
        .await;
    history
        .record(&transition("1", Channel::Humidity, AlertLevel::Alert, 80.0))
        .await;
    history
        .record(&transition("2", Channel::ProbeTemp, AlertLevel::Alert, 11.0))
        .await;

    let (status, alerts) = get(&app, "/api/v1/alerts").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(alerts.as_array().unwrap().len(), 3);
    // Newest first
    assert_eq!(alerts[0]["device_id"], "2");

    let (_, alerts) = get(&app, "/api/v1/alerts?channel=probe_temp&limit=1").await;
    let alerts = alerts.as_array().unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0]["channel"], "probe_temp");
    assert_eq!(alerts[0]["level"], "alert");

    let (status, error) = get(&app, "/api/v1/alerts?channel=pressure").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(error["error"].as_str().unwrap().contains("pressure"));
}

#[tokio::test]
async fn test_clear_alerts() {
    let app = setup_test_app().await;
    app.state
        .analysis
        .history
        .record(&transition("1", Channel::Humidity, AlertLevel::Warn, 72.0))
        .await;

    let request = Request::builder()
        .method("DELETE")
        .uri("/api/v1/alerts")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, request).await;

    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(app.state.analysis.history.is_empty().await);
}

#[tokio::test]
async fn test_summary_reports_link_and_counts() {
    let app = setup_test_app().await;
    let registry = &app.state.analysis.registry;
    registry.observe(&reading("1", 4.0));
    registry.observe(&reading("2", 4.0));
    registry.set_active("2", false);
    app.state.analysis.tally.record(AlertLevel::Warn);
    app.status_tx.send_replace(LinkStatus::Connected);

    let (status, summary) = get(&app, "/api/v1/summary").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["link"]["status"], "connected");
    assert_eq!(summary["devices"], 2);
    assert_eq!(summary["active_devices"], 1);
    assert_eq!(summary["tally"]["warn"], 1);
    assert_eq!(summary["alerts_stored"], 0);
    assert!(summary["readings_dropped"].is_u64());
}
