// Integration test for configuration file support

use fleetmon::config::MonitorConfig;
use fleetmon::error::MonitorError;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_load_full_toml_config() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("fleetmon.toml");

    let toml_content = r#"
        metrics_interval_ms = 2000
        health_check_interval_ms = 10000
        command_timeout_ms = 1500
        history_capacity = 20
        alert_history_capacity = 10
        restart_window_secs = 600
        event_buffer = 64

        [thresholds]
        cpu = 75.0
        memory = 90.0
        disk_space = 95.0
        response_time_ms = 250
        restart_count = 5
    "#;

    fs::write(&config_path, toml_content).unwrap();

    let config = MonitorConfig::from_file(&config_path).unwrap();
    assert_eq!(config.metrics_interval(), Duration::from_secs(2));
    assert_eq!(config.health_check_interval(), Duration::from_secs(10));
    assert_eq!(config.command_timeout(), Duration::from_millis(1500));
    assert_eq!(config.history_capacity, 20);
    assert_eq!(config.alert_history_capacity, 10);
    assert_eq!(config.restart_window(), Duration::from_secs(600));
    assert_eq!(config.event_buffer, 64);
    assert_eq!(config.thresholds.cpu, 75.0);
    assert_eq!(config.thresholds.memory, 90.0);
    assert_eq!(config.thresholds.disk_space, 95.0);
    assert_eq!(config.thresholds.response_time_ms, 250);
    assert_eq!(config.thresholds.restart_count, 5);
}

#[test]
fn test_load_json_config_with_camel_case_thresholds() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("fleetmon.json");

    let json_content = r#"{
        "metrics_interval_ms": 500,
        "thresholds": {
            "cpu": 60.0,
            "restartCount": 2,
            "responseTimeMs": 800
        }
    }"#;

    fs::write(&config_path, json_content).unwrap();

    let config = MonitorConfig::from_file(&config_path).unwrap();
    assert_eq!(config.metrics_interval_ms, 500);
    assert_eq!(config.health_check_interval_ms, 30_000);
    assert_eq!(config.thresholds.cpu, 60.0);
    assert_eq!(config.thresholds.memory, 85.0);
    assert_eq!(config.thresholds.restart_count, 2);
    assert_eq!(config.thresholds.response_time_ms, 800);
}

#[test]
fn test_empty_file_uses_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("fleetmon.toml");
    fs::write(&config_path, "").unwrap();

    let config = MonitorConfig::from_file(&config_path).unwrap();
    assert_eq!(config, MonitorConfig::default());
}

#[test]
fn test_missing_file() {
    let temp_dir = TempDir::new().unwrap();
    let result = MonitorConfig::from_file(&temp_dir.path().join("absent.toml"));

    assert!(matches!(result, Err(MonitorError::ConfigError(_))));
}

#[test]
fn test_malformed_toml() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("fleetmon.toml");
    fs::write(&config_path, "metrics_interval_ms = \"fast\"").unwrap();

    assert!(matches!(
        MonitorConfig::from_file(&config_path),
        Err(MonitorError::InvalidConfig(_))
    ));
}

#[test]
fn test_validation_runs_after_parsing() {
    let temp_dir = TempDir::new().unwrap();

    let cases = [
        ("zero_interval.toml", "health_check_interval_ms = 0"),
        ("zero_history.toml", "history_capacity = 0"),
        ("cpu_over.toml", "[thresholds]\ncpu = 120.0"),
        ("no_restarts.toml", "[thresholds]\nrestart_count = 0"),
    ];

    for (name, contents) in cases {
        let config_path = temp_dir.path().join(name);
        fs::write(&config_path, contents).unwrap();

        let result = MonitorConfig::from_file(&config_path);
        assert!(
            matches!(result, Err(MonitorError::ConfigValidationError(_))),
            "{} was accepted",
            name
        );
    }
}
