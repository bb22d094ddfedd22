//! CLI integration tests

use std::process::{Command, Output};

fn sensorctl(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_sensorctl"))
        .args(args)
        .env_remove("SENSORCTL_API_URL")
        .output()
        .expect("Failed to execute command")
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = sensorctl(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(
        stdout.contains("field sensor telemetry"),
        "Should show app description"
    );
    for command in ["ports", "monitor", "analyze", "dew-point", "status", "devices", "alerts"] {
        assert!(stdout.contains(command), "Should show {} command", command);
    }
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = sensorctl(&["--version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("sensorctl"), "Should show binary name");
}

#[test]
fn test_monitor_help() {
    let output = sensorctl(&["monitor", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("--port"), "Should show port option");
    assert!(stdout.contains("--baud"), "Should show baud option");
    assert!(stdout.contains("--send"), "Should show send option");
}

#[test]
fn test_devices_help() {
    let output = sensorctl(&["devices", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("list"));
    assert!(stdout.contains("enable"));
    assert!(stdout.contains("disable"));
}

/// Test api-url option
#[test]
fn test_api_url_option() {
    let output = sensorctl(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(stdout.contains("--api-url"), "Should show api-url option");
    assert!(stdout.contains("SENSORCTL_API_URL"), "Should show env var");
    assert!(stdout.contains("--format"), "Should show format option");
}

#[test]
fn test_dew_point_json() {
    let output = sensorctl(&["--format", "json", "dew-point", "20", "50"]);
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["dew_point"], 9.3);
}

#[test]
fn test_dew_point_undefined_for_dry_air() {
    let output = sensorctl(&["--format", "json", "dew-point", "20", "0"]);
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(value["dew_point"].is_null());
}

#[test]
fn test_analyze_rising_probe_temperature() {
    let output = sensorctl(&[
        "--format", "json", "analyze", "--channel", "probe_temp", "5.0", "5.5", "6.0", "6.5",
        "7.0", "7.5",
    ]);
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["samples"], 6);
    assert_eq!(value["slope"], 0.5);
    assert_eq!(value["r_squared"], 1.0);
    assert_eq!(value["direction"], "rising");
    assert_eq!(value["level"], "ok");
    assert_eq!(value["risk_level"], "high");
}

#[test]
fn test_analyze_channel_without_default_range_fails() {
    let output = sensorctl(&["analyze", "--channel", "light", "100", "200", "300"]);
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("--min"));
}

/// Test invalid command error handling
#[test]
fn test_invalid_command() {
    let output = sensorctl(&["invalid-command"]);
    assert!(!output.status.success(), "Invalid command should fail");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("error") || stderr.contains("invalid"),
        "Should show error message"
    );
}

#[test]
fn test_invalid_channel_rejected() {
    let output = sensorctl(&["alerts", "--channel", "pressure"]);
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("pressure"));
}

/// Test missing required argument error handling
#[test]
fn test_missing_argument() {
    let output = sensorctl(&["devices", "enable"]);
    assert!(!output.status.success(), "Missing argument should fail");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("required") || stderr.contains("error"),
        "Should show error about missing argument"
    );
}
