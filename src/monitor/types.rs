use crate::error::{MonitorError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque key identifying a monitored server instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServerId(pub String);

impl ServerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ServerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ServerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Handle to an already-running server process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessHandle {
    pub pid: u32,
}

impl ProcessHandle {
    pub fn new(pid: u32) -> Self {
        Self { pid }
    }
}

/// Per-server monitoring options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    pub name: String,
    #[serde(default)]
    pub auto_restart: bool,
}

impl ServerConfig {
    pub fn new(name: impl Into<String>, auto_restart: bool) -> Self {
        Self {
            name: name.into(),
            auto_restart,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskIo {
    pub read: u64,
    pub write: u64,
}

/// One raw sample produced by a collector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSample {
    pub cpu: f64,
    pub memory: f64,
    pub uptime_seconds: u64,
    pub connections: u32,
    pub disk_io: DiskIo,
    pub timestamp: DateTime<Utc>,
}

impl MetricsSample {
    /// A zeroed sample, used as the fallback for fields that never succeeded
    pub fn empty() -> Self {
        Self {
            cpu: 0.0,
            memory: 0.0,
            uptime_seconds: 0,
            connections: 0,
            disk_io: DiskIo::default(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    Running,
    Stopped,
    Error,
}

impl std::fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerStatus::Running => write!(f, "running"),
            ServerStatus::Stopped => write!(f, "stopped"),
            ServerStatus::Error => write!(f, "error"),
        }
    }
}

/// Latest known metrics of a server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMetrics {
    pub cpu: f64,
    pub memory: f64,
    pub uptime_seconds: u64,
    pub connections: u32,
    pub disk_io: DiskIo,
    pub status: ServerStatus,
    pub timestamp: DateTime<Utc>,
}

impl ServerMetrics {
    pub fn initial() -> Self {
        Self {
            cpu: 0.0,
            memory: 0.0,
            uptime_seconds: 0,
            connections: 0,
            disk_io: DiskIo::default(),
            status: ServerStatus::Running,
            timestamp: Utc::now(),
        }
    }

    pub fn from_sample(sample: &MetricsSample) -> Self {
        Self {
            cpu: sample.cpu,
            memory: sample.memory,
            uptime_seconds: sample.uptime_seconds,
            connections: sample.connections,
            disk_io: sample.disk_io,
            status: ServerStatus::Running,
            timestamp: sample.timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Unknown,
    Healthy,
    Warning,
    Degraded,
    Critical,
    Crashed,
}

impl HealthStatus {
    /// Whether this status warrants an automatic restart request
    pub fn is_critical(&self) -> bool {
        matches!(self, HealthStatus::Critical | HealthStatus::Crashed)
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Unknown => write!(f, "unknown"),
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Warning => write!(f, "warning"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Critical => write!(f, "critical"),
            HealthStatus::Crashed => write!(f, "crashed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthIssue {
    pub severity: AlertSeverity,
    pub message: String,
}

impl HealthIssue {
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: AlertSeverity::Warning,
            message: message.into(),
        }
    }

    pub fn critical(message: impl Into<String>) -> Self {
        Self {
            severity: AlertSeverity::Critical,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthRecord {
    pub score: u8,
    pub status: HealthStatus,
    pub issues: Vec<HealthIssue>,
    pub last_check: Option<DateTime<Utc>>,
}

impl HealthRecord {
    pub fn unknown() -> Self {
        Self {
            score: 100,
            status: HealthStatus::Unknown,
            issues: Vec::new(),
            last_check: None,
        }
    }
}

/// Metrics tracked by the alert engine, in evaluation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertMetric {
    Cpu,
    Memory,
}

impl AlertMetric {
    pub const TRACKED: [AlertMetric; 2] = [AlertMetric::Cpu, AlertMetric::Memory];

    pub fn label(&self) -> &'static str {
        match self {
            AlertMetric::Cpu => "CPU",
            AlertMetric::Memory => "Memory",
        }
    }

    pub fn value_of(&self, sample: &MetricsSample) -> f64 {
        match self {
            AlertMetric::Cpu => sample.cpu,
            AlertMetric::Memory => sample.memory,
        }
    }

    pub fn threshold_of(&self, thresholds: &AlertThresholds) -> f64 {
        match self {
            AlertMetric::Cpu => thresholds.cpu,
            AlertMetric::Memory => thresholds.memory,
        }
    }
}

impl std::fmt::Display for AlertMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertMetric::Cpu => write!(f, "cpu"),
            AlertMetric::Memory => write!(f, "memory"),
        }
    }
}

/// Kind of an alert log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertType {
    Cpu,
    Memory,
    Restart,
}

impl AlertType {
    pub fn is_restart(&self) -> bool {
        matches!(self, AlertType::Restart)
    }
}

impl From<AlertMetric> for AlertType {
    fn from(metric: AlertMetric) -> Self {
        match metric {
            AlertMetric::Cpu => AlertType::Cpu,
            AlertMetric::Memory => AlertType::Memory,
        }
    }
}

impl std::fmt::Display for AlertType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertType::Cpu => write!(f, "cpu"),
            AlertType::Memory => write!(f, "memory"),
            AlertType::Restart => write!(f, "restart"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertHistoryEntry {
    pub server_id: ServerId,
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub resolved: bool,
}

/// Process-wide alert thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertThresholds {
    #[serde(default = "default_cpu_threshold")]
    pub cpu: f64,
    #[serde(default = "default_memory_threshold")]
    pub memory: f64,
    #[serde(default = "default_disk_space_threshold", alias = "disk_space")]
    pub disk_space: f64,
    #[serde(default = "default_response_time_ms", alias = "response_time_ms")]
    pub response_time_ms: u64,
    /// Maximum automatic restarts per restart window
    #[serde(default = "default_restart_count", alias = "restart_count")]
    pub restart_count: u32,
}

fn default_cpu_threshold() -> f64 {
    80.0
}

fn default_memory_threshold() -> f64 {
    85.0
}

fn default_disk_space_threshold() -> f64 {
    90.0
}

fn default_response_time_ms() -> u64 {
    1000
}

fn default_restart_count() -> u32 {
    3
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            cpu: default_cpu_threshold(),
            memory: default_memory_threshold(),
            disk_space: default_disk_space_threshold(),
            response_time_ms: default_response_time_ms(),
            restart_count: default_restart_count(),
        }
    }
}

impl AlertThresholds {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("cpu", self.cpu),
            ("memory", self.memory),
            ("diskSpace", self.disk_space),
        ] {
            if !(value > 0.0 && value <= 100.0) {
                return Err(MonitorError::InvalidThreshold(format!(
                    "{} must be within (0, 100], got {}",
                    name, value
                )));
            }
        }

        if self.response_time_ms == 0 {
            return Err(MonitorError::InvalidThreshold(
                "responseTimeMs must be at least 1".to_string(),
            ));
        }

        if self.restart_count == 0 {
            return Err(MonitorError::InvalidThreshold(
                "restartCount must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Merge a partial update, returning the candidate without committing it
    pub fn merged(&self, update: &ThresholdsUpdate) -> AlertThresholds {
        AlertThresholds {
            cpu: update.cpu.unwrap_or(self.cpu),
            memory: update.memory.unwrap_or(self.memory),
            disk_space: update.disk_space.unwrap_or(self.disk_space),
            response_time_ms: update.response_time_ms.unwrap_or(self.response_time_ms),
            restart_count: update.restart_count.unwrap_or(self.restart_count),
        }
    }
}

/// Partial threshold update; absent fields keep their current value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdsUpdate {
    #[serde(default)]
    pub cpu: Option<f64>,
    #[serde(default)]
    pub memory: Option<f64>,
    #[serde(default)]
    pub disk_space: Option<f64>,
    #[serde(default)]
    pub response_time_ms: Option<u64>,
    #[serde(default)]
    pub restart_count: Option<u32>,
}
