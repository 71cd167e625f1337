//! Fleet performance monitoring: periodic sampling, threshold alerts,
//! health scoring and throttled auto-restart requests.

pub mod alerts;
pub mod collector;
pub mod events;
pub mod health;
pub mod registry;
pub mod restart;
pub mod scheduler;
pub mod service;
pub mod types;

pub use collector::{LivenessProbe, MetricsCollector, SignalProbe, SystemShell, TokioShell};
pub use events::{EventBus, EventSink, MonitorEvent};
pub use registry::ServerSnapshot;
pub use service::{MonitoringStatus, ServerMonitor};
pub use types::{
    AlertHistoryEntry, AlertThresholds, AlertType, HealthRecord, HealthStatus, MetricsSample,
    ProcessHandle, ServerConfig, ServerId, ServerMetrics, ServerStatus, ThresholdsUpdate,
};
