use crate::error::{MonitorError, Result};
use crate::monitor::types::AlertThresholds;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Monitor configuration with scheduling, capacity and threshold settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Interval between metric samples (in milliseconds)
    #[serde(default = "default_metrics_interval")]
    pub metrics_interval_ms: u64,

    /// Interval between health checks (in milliseconds)
    #[serde(default = "default_health_check_interval")]
    pub health_check_interval_ms: u64,

    /// Upper bound for any external command run by a collector (in milliseconds)
    #[serde(default = "default_command_timeout")]
    pub command_timeout_ms: u64,

    /// Number of samples retained per server
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Number of alert log entries retained per server
    #[serde(default = "default_alert_history_capacity")]
    pub alert_history_capacity: usize,

    /// Sliding window for counting automatic restarts (in seconds)
    #[serde(default = "default_restart_window")]
    pub restart_window_secs: u64,

    /// Capacity of the outbound event channel
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// Initial alert thresholds
    #[serde(default)]
    pub thresholds: AlertThresholds,
}

// Default value functions for serde
fn default_metrics_interval() -> u64 {
    5_000
}

fn default_health_check_interval() -> u64 {
    30_000
}

fn default_command_timeout() -> u64 {
    3_000
}

fn default_history_capacity() -> usize {
    100
}

fn default_alert_history_capacity() -> usize {
    50
}

fn default_restart_window() -> u64 {
    3_600
}

fn default_event_buffer() -> usize {
    1_024
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            metrics_interval_ms: default_metrics_interval(),
            health_check_interval_ms: default_health_check_interval(),
            command_timeout_ms: default_command_timeout(),
            history_capacity: default_history_capacity(),
            alert_history_capacity: default_alert_history_capacity(),
            restart_window_secs: default_restart_window(),
            event_buffer: default_event_buffer(),
            thresholds: AlertThresholds::default(),
        }
    }
}

impl MonitorConfig {
    /// Load monitor configuration from a file (supports TOML and JSON)
    pub fn from_file(path: &Path) -> Result<MonitorConfig> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| MonitorError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("");

        let config: MonitorConfig = match extension {
            "toml" => toml::from_str(&contents)
                .map_err(|e| MonitorError::InvalidConfig(format!("Failed to parse TOML: {}", e)))?,
            "json" => serde_json::from_str(&contents)
                .map_err(|e| MonitorError::InvalidConfig(format!("Failed to parse JSON: {}", e)))?,
            _ => {
                return Err(MonitorError::InvalidConfig(format!(
                    "Unsupported file format: {}. Use .toml or .json",
                    extension
                )))
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.metrics_interval_ms == 0 {
            return Err(MonitorError::ConfigValidationError(
                "metrics_interval_ms must be at least 1".to_string(),
            ));
        }

        if self.health_check_interval_ms == 0 {
            return Err(MonitorError::ConfigValidationError(
                "health_check_interval_ms must be at least 1".to_string(),
            ));
        }

        if self.command_timeout_ms == 0 {
            return Err(MonitorError::ConfigValidationError(
                "command_timeout_ms must be at least 1".to_string(),
            ));
        }

        if self.history_capacity == 0 || self.alert_history_capacity == 0 {
            return Err(MonitorError::ConfigValidationError(
                "history capacities must be at least 1".to_string(),
            ));
        }

        if self.restart_window_secs == 0 {
            return Err(MonitorError::ConfigValidationError(
                "restart_window_secs must be at least 1".to_string(),
            ));
        }

        if self.event_buffer == 0 {
            return Err(MonitorError::ConfigValidationError(
                "event_buffer must be at least 1".to_string(),
            ));
        }

        self.thresholds
            .validate()
            .map_err(|e| MonitorError::ConfigValidationError(e.to_string()))
    }

    pub fn metrics_interval(&self) -> Duration {
        Duration::from_millis(self.metrics_interval_ms)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn restart_window(&self) -> Duration {
        Duration::from_secs(self.restart_window_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_monitor_config_defaults() {
        let config = MonitorConfig::default();

        assert_eq!(config.metrics_interval_ms, 5_000);
        assert_eq!(config.health_check_interval_ms, 30_000);
        assert_eq!(config.history_capacity, 100);
        assert_eq!(config.alert_history_capacity, 50);
        assert_eq!(config.restart_window_secs, 3_600);
        assert_eq!(config.thresholds.restart_count, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_interval() {
        let config = MonitorConfig {
            metrics_interval_ms: 0,
            ..Default::default()
        };

        assert!(matches!(
            config.validate(),
            Err(MonitorError::ConfigValidationError(_))
        ));
    }

    #[test]
    fn test_validate_bad_threshold() {
        let mut config = MonitorConfig::default();
        config.thresholds.cpu = 0.0;

        assert!(matches!(
            config.validate(),
            Err(MonitorError::ConfigValidationError(_))
        ));
    }

    #[test]
    fn test_durations() {
        let config = MonitorConfig::default();
        assert_eq!(config.metrics_interval(), Duration::from_secs(5));
        assert_eq!(config.health_check_interval(), Duration::from_secs(30));
        assert_eq!(config.command_timeout(), Duration::from_secs(3));
        assert_eq!(config.restart_window(), Duration::from_secs(3_600));
    }

    #[test]
    fn test_from_file_partial_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("monitor.toml");

        fs::write(
            &config_path,
            r#"
            metrics_interval_ms = 1000

            [thresholds]
            cpu = 70.0
            "#,
        )
        .unwrap();

        let config = MonitorConfig::from_file(&config_path).unwrap();
        assert_eq!(config.metrics_interval_ms, 1000);
        assert_eq!(config.health_check_interval_ms, 30_000);
        assert_eq!(config.thresholds.cpu, 70.0);
        assert_eq!(config.thresholds.memory, 85.0);
    }

    #[test]
    fn test_from_file_unsupported_extension() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("monitor.yaml");
        fs::write(&config_path, "metrics_interval_ms: 10").unwrap();

        assert!(matches!(
            MonitorConfig::from_file(&config_path),
            Err(MonitorError::InvalidConfig(_))
        ));
    }
}
