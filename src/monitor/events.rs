// Outbound notifications consumed by the broadcast layer and process lifecycle management

use crate::monitor::types::{
    AlertHistoryEntry, AlertThresholds, AlertType, HealthRecord, MetricsSample, ServerId,
    ServerMetrics,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

/// Every observable state change of the monitor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum MonitorEvent {
    MonitoringStarted,
    MonitoringStopped,
    #[serde(rename_all = "camelCase")]
    ServerMonitoringStarted { server_id: ServerId, pid: u32 },
    #[serde(rename_all = "camelCase")]
    ServerMonitoringStopped { server_id: ServerId },
    #[serde(rename_all = "camelCase")]
    ServerMetricsUpdated {
        server_id: ServerId,
        metrics: ServerMetrics,
        history: Vec<MetricsSample>,
    },
    #[serde(rename_all = "camelCase")]
    ServerError { server_id: ServerId, error: String },
    #[serde(rename_all = "camelCase")]
    PerformanceAlert {
        server_id: ServerId,
        alert: AlertHistoryEntry,
        timestamp: DateTime<Utc>,
        server_name: String,
    },
    #[serde(rename_all = "camelCase")]
    AlertResolved {
        server_id: ServerId,
        #[serde(rename = "type")]
        alert_type: AlertType,
    },
    #[serde(rename_all = "camelCase")]
    ServerHealthUpdated {
        server_id: ServerId,
        health: HealthRecord,
        server_name: String,
    },
    #[serde(rename_all = "camelCase")]
    ServerHealthCritical {
        server_id: ServerId,
        health: HealthRecord,
        server_name: String,
    },
    #[serde(rename_all = "camelCase")]
    AutoRestartTriggered {
        server_id: ServerId,
        reason: String,
        server_name: String,
    },
    #[serde(rename_all = "camelCase")]
    AutoRestartBlocked {
        server_id: ServerId,
        reason: String,
        count: usize,
    },
    ThresholdsUpdated { thresholds: AlertThresholds },
}

impl MonitorEvent {
    /// Wire name of the event
    pub fn name(&self) -> &'static str {
        match self {
            MonitorEvent::MonitoringStarted => "monitoring-started",
            MonitorEvent::MonitoringStopped => "monitoring-stopped",
            MonitorEvent::ServerMonitoringStarted { .. } => "server-monitoring-started",
            MonitorEvent::ServerMonitoringStopped { .. } => "server-monitoring-stopped",
            MonitorEvent::ServerMetricsUpdated { .. } => "server-metrics-updated",
            MonitorEvent::ServerError { .. } => "server-error",
            MonitorEvent::PerformanceAlert { .. } => "performance-alert",
            MonitorEvent::AlertResolved { .. } => "alert-resolved",
            MonitorEvent::ServerHealthUpdated { .. } => "server-health-updated",
            MonitorEvent::ServerHealthCritical { .. } => "server-health-critical",
            MonitorEvent::AutoRestartTriggered { .. } => "auto-restart-triggered",
            MonitorEvent::AutoRestartBlocked { .. } => "auto-restart-blocked",
            MonitorEvent::ThresholdsUpdated { .. } => "thresholds-updated",
        }
    }

    /// Server the event concerns, if any
    pub fn server_id(&self) -> Option<&ServerId> {
        match self {
            MonitorEvent::MonitoringStarted
            | MonitorEvent::MonitoringStopped
            | MonitorEvent::ThresholdsUpdated { .. } => None,
            MonitorEvent::ServerMonitoringStarted { server_id, .. }
            | MonitorEvent::ServerMonitoringStopped { server_id }
            | MonitorEvent::ServerMetricsUpdated { server_id, .. }
            | MonitorEvent::ServerError { server_id, .. }
            | MonitorEvent::PerformanceAlert { server_id, .. }
            | MonitorEvent::AlertResolved { server_id, .. }
            | MonitorEvent::ServerHealthUpdated { server_id, .. }
            | MonitorEvent::ServerHealthCritical { server_id, .. }
            | MonitorEvent::AutoRestartTriggered { server_id, .. }
            | MonitorEvent::AutoRestartBlocked { server_id, .. } => Some(server_id),
        }
    }
}

/// Publish contract the monitor calls into
pub trait EventSink: Send + Sync {
    fn publish(&self, event: MonitorEvent);
}

impl<F> EventSink for F
where
    F: Fn(MonitorEvent) + Send + Sync,
{
    fn publish(&self, event: MonitorEvent) {
        self(event)
    }
}

/// Fan-out sink backed by a tokio broadcast channel
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<MonitorEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl EventSink for EventBus {
    fn publish(&self, event: MonitorEvent) {
        let name = event.name();
        if self.sender.send(event).is_err() {
            trace!("No subscribers for {}", name);
        }
    }
}
