use thiserror::Error;

/// Main error type for the fleet monitor
#[derive(Debug, Error)]
pub enum MonitorError {
    // Sampling errors
    #[error("Failed to collect metrics for PID {pid}: {reason}")]
    Collection { pid: u32, reason: String },

    #[error("Process not found: {0}")]
    ProcessNotFound(u32),

    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("Timeout error: {0}")]
    TimeoutError(String),

    #[error("Background task failed: {0}")]
    TaskFailed(String),

    // Policy outcomes
    #[error("Restart denied for {server_id}: {count} restarts in window (max {max})")]
    PolicyDenied {
        server_id: String,
        count: usize,
        max: u32,
    },

    // Registry errors
    #[error("Server not monitored: {0}")]
    ServerNotFound(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid configuration file: {0}")]
    InvalidConfig(String),

    #[error("Configuration validation failed: {0}")]
    ConfigValidationError(String),

    #[error("Invalid alert threshold: {0}")]
    InvalidThreshold(String),

    // IO errors (automatically converted from std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MonitorError {
    /// Wrap any failure of the authoritative process query as a collection error
    pub fn collection(pid: u32, reason: impl Into<String>) -> Self {
        MonitorError::Collection {
            pid,
            reason: reason.into(),
        }
    }
}

/// Result type alias for monitor operations
pub type Result<T> = std::result::Result<T, MonitorError>;
