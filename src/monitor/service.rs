use crate::config::MonitorConfig;
use crate::error::{MonitorError, Result};
use crate::monitor::alerts::{AlertEngine, AlertTransition};
use crate::monitor::collector::{platform_collector, LivenessProbe, MetricsCollector, SignalProbe};
use crate::monitor::events::{EventSink, MonitorEvent};
use crate::monitor::health::HealthScorer;
use crate::monitor::registry::{MonitorRegistry, ServerSnapshot, ServerTasks};
use crate::monitor::restart::RestartThrottle;
use crate::monitor::scheduler::PeriodicTask;
use crate::monitor::types::{
    AlertHistoryEntry, AlertThresholds, HealthRecord, HealthStatus, ProcessHandle, ServerConfig,
    ServerId, ServerMetrics, ServerStatus, ThresholdsUpdate,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Summary returned by `ServerMonitor::get_monitoring_status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringStatus {
    pub enabled: bool,
    pub servers: usize,
    pub active_servers: usize,
    pub active_tasks: usize,
    pub thresholds: AlertThresholds,
    pub metrics_interval_ms: u64,
    pub health_check_interval_ms: u64,
}

/// Fleet monitor: owns the registry, drives both periodic cycles per server
/// and publishes every state change to the configured sink.
///
/// Cloning is cheap and yields a handle to the same monitor.
#[derive(Clone)]
pub struct ServerMonitor {
    core: Arc<MonitorCore>,
}

struct MonitorCore {
    config: MonitorConfig,
    enabled: AtomicBool,
    registry: MonitorRegistry,
    thresholds: RwLock<AlertThresholds>,
    collector: Arc<dyn MetricsCollector>,
    probe: Arc<dyn LivenessProbe>,
    sink: Arc<dyn EventSink>,
    alerts: AlertEngine,
    scorer: HealthScorer,
    throttle: RestartThrottle,
}

impl ServerMonitor {
    /// Create a monitor using the platform collector and signal-based probe
    pub fn new(config: MonitorConfig, sink: Arc<dyn EventSink>) -> Result<Self> {
        let collector = platform_collector(config.command_timeout());
        Self::with_parts(config, collector, Arc::new(SignalProbe), sink)
    }

    /// Create a monitor from explicit collaborators
    pub fn with_parts(
        config: MonitorConfig,
        collector: Arc<dyn MetricsCollector>,
        probe: Arc<dyn LivenessProbe>,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self> {
        config.validate()?;

        let core = MonitorCore {
            registry: MonitorRegistry::new(config.history_capacity, config.alert_history_capacity),
            thresholds: RwLock::new(config.thresholds.clone()),
            throttle: RestartThrottle::new(config.restart_window()),
            enabled: AtomicBool::new(false),
            collector,
            probe,
            sink,
            alerts: AlertEngine::new(),
            scorer: HealthScorer::new(),
            config,
        };

        Ok(Self {
            core: Arc::new(core),
        })
    }

    /// Turn the global monitoring switch on
    pub fn start_monitoring(&self) {
        if !self.core.enabled.swap(true, Ordering::SeqCst) {
            info!("Monitoring started");
            self.core.sink.publish(MonitorEvent::MonitoringStarted);
        }
    }

    /// Turn the global monitoring switch off, cancelling every server's tasks
    pub async fn stop_monitoring(&self) {
        if !self.core.enabled.swap(false, Ordering::SeqCst) {
            return;
        }

        for server_id in self.core.registry.ids().await {
            match self.core.registry.unregister(&server_id).await {
                Ok(true) => self.core.sink.publish(MonitorEvent::ServerMonitoringStopped {
                    server_id,
                }),
                Ok(false) => {}
                // Removed concurrently
                Err(e) => debug!("Skipping {} during shutdown: {}", server_id, e),
            }
        }

        info!("Monitoring stopped");
        self.core.sink.publish(MonitorEvent::MonitoringStopped);
    }

    pub fn is_monitoring(&self) -> bool {
        self.core.enabled.load(Ordering::SeqCst)
    }

    /// Begin monitoring a running server process
    ///
    /// Any existing monitoring of the same id is cancelled and replaced by a
    /// fresh record. Turns global monitoring on if it is off.
    pub async fn start_server_monitoring(
        &self,
        server_id: ServerId,
        handle: ProcessHandle,
        config: ServerConfig,
    ) -> Result<()> {
        if config.name.trim().is_empty() {
            return Err(MonitorError::ConfigValidationError(
                "server name must not be empty".to_string(),
            ));
        }

        self.start_monitoring();

        let replaced = self
            .core
            .registry
            .register(server_id.clone(), handle, config, |id| {
                MonitorCore::spawn_tasks(&self.core, id)
            })
            .await;

        if let Some(previous_pid) = replaced {
            if previous_pid != handle.pid {
                self.core.forget_if_unused(previous_pid).await;
            }
        }

        info!(
            "Monitoring server {} (PID {}) every {}ms, health every {}ms",
            server_id,
            handle.pid,
            self.core.config.metrics_interval_ms,
            self.core.config.health_check_interval_ms
        );
        self.core.sink.publish(MonitorEvent::ServerMonitoringStarted {
            server_id,
            pid: handle.pid,
        });

        Ok(())
    }

    /// Cancel both periodic tasks of a server, keeping its data for queries
    pub async fn stop_server_monitoring(&self, server_id: &ServerId) -> Result<()> {
        if self.core.registry.unregister(server_id).await? {
            info!("Stopped monitoring server {}", server_id);
            self.core.sink.publish(MonitorEvent::ServerMonitoringStopped {
                server_id: server_id.clone(),
            });
        }
        Ok(())
    }

    /// Delete every trace of a server, stopping it first if needed
    pub async fn clear_server_data(&self, server_id: &ServerId) -> Result<()> {
        let (pid, was_active) = self.core.registry.remove(server_id).await?;
        self.core.forget_if_unused(pid).await;

        if was_active {
            self.core.sink.publish(MonitorEvent::ServerMonitoringStopped {
                server_id: server_id.clone(),
            });
        }

        info!("Cleared monitoring data for {}", server_id);
        Ok(())
    }

    /// Merge a partial update into the shared thresholds
    ///
    /// The merged result is validated before it replaces the current values.
    pub async fn update_alert_thresholds(
        &self,
        update: ThresholdsUpdate,
    ) -> Result<AlertThresholds> {
        let mut thresholds = self.core.thresholds.write().await;
        let candidate = thresholds.merged(&update);
        candidate.validate()?;
        *thresholds = candidate.clone();
        drop(thresholds);

        info!("Alert thresholds updated: {:?}", candidate);
        self.core.sink.publish(MonitorEvent::ThresholdsUpdated {
            thresholds: candidate.clone(),
        });

        Ok(candidate)
    }

    pub async fn thresholds(&self) -> AlertThresholds {
        self.core.thresholds.read().await.clone()
    }

    pub async fn get_server_metrics(&self, server_id: &ServerId) -> Option<ServerSnapshot> {
        self.core.registry.get(server_id).await
    }

    pub async fn get_all_server_metrics(&self) -> Vec<ServerSnapshot> {
        self.core.registry.get_all().await
    }

    /// Most recent `limit` alert log entries, oldest first
    pub async fn get_alert_history(
        &self,
        server_id: &ServerId,
        limit: Option<usize>,
    ) -> Vec<AlertHistoryEntry> {
        match self.core.registry.record(server_id).await {
            Some(record) => record.lock().await.recent_alerts(limit),
            None => Vec::new(),
        }
    }

    pub async fn get_monitoring_status(&self) -> MonitoringStatus {
        MonitoringStatus {
            enabled: self.is_monitoring(),
            servers: self.core.registry.len().await,
            active_servers: self.core.registry.active_server_count().await,
            active_tasks: self.core.registry.active_task_count().await,
            thresholds: self.thresholds().await,
            metrics_interval_ms: self.core.config.metrics_interval_ms,
            health_check_interval_ms: self.core.config.health_check_interval_ms,
        }
    }

    /// Run one metrics cycle now, outside the regular schedule
    pub async fn run_metrics_cycle(&self, server_id: &ServerId) -> Result<ServerMetrics> {
        self.core.run_metrics_cycle(server_id).await
    }

    /// Run one health check now, outside the regular schedule
    pub async fn run_health_check(&self, server_id: &ServerId) -> Result<HealthRecord> {
        self.core.run_health_check(server_id).await
    }
}

impl MonitorCore {
    // Tasks hold a weak handle so a dropped monitor is not kept alive by its timers
    fn spawn_tasks(core: &Arc<MonitorCore>, server_id: &ServerId) -> ServerTasks {
        let metrics_period = core.config.metrics_interval();
        let health_period = core.config.health_check_interval();

        let metrics = {
            let core = Arc::downgrade(core);
            let server_id = server_id.clone();
            PeriodicTask::spawn(
                format!("metrics:{}", server_id),
                metrics_period,
                move || {
                    let core = Weak::clone(&core);
                    let server_id = server_id.clone();
                    async move {
                        if let Some(core) = core.upgrade() {
                            // Failures are already logged and published
                            let _ = core.run_metrics_cycle(&server_id).await;
                        }
                    }
                },
            )
        };

        let health = {
            let core = Arc::downgrade(core);
            let server_id = server_id.clone();
            PeriodicTask::spawn(
                format!("health:{}", server_id),
                health_period,
                move || {
                    let core = Weak::clone(&core);
                    let server_id = server_id.clone();
                    async move {
                        if let Some(core) = core.upgrade() {
                            if let Err(e) = core.run_health_check(&server_id).await {
                                error!("Health check failed for {}: {}", server_id, e);
                            }
                        }
                    }
                },
            )
        };

        ServerTasks { metrics, health }
    }

    // Cached samples are per PID, so keep them while another server shares the PID
    async fn forget_if_unused(&self, pid: u32) {
        if self.registry.pid_in_use(pid).await {
            debug!("PID {} still monitored, keeping cached sample", pid);
        } else {
            self.collector.forget(pid).await;
        }
    }

    async fn run_metrics_cycle(&self, server_id: &ServerId) -> Result<ServerMetrics> {
        let record = self
            .registry
            .record(server_id)
            .await
            .ok_or_else(|| MonitorError::ServerNotFound(server_id.to_string()))?;

        // Sample without holding the record so the health task is not blocked
        let pid = {
            let record = record.lock().await;
            if record.is_stopped() {
                debug!("Skipping metrics cycle for stopped server {}", server_id);
                return Ok(record.current_metrics.clone());
            }
            record.pid
        };
        let result = self.collector.collect(pid).await;
        let thresholds = self.thresholds.read().await.clone();

        let mut record = record.lock().await;
        // Stopped while sampling: the record keeps its final state
        if record.is_stopped() {
            debug!("Discarding sample for stopped server {}", server_id);
            return Ok(record.current_metrics.clone());
        }
        let server_name = record.config.name.clone();

        let sample = match result {
            Ok(sample) => sample,
            Err(e) => {
                record.mark_status(ServerStatus::Error);
                drop(record);

                warn!("Metrics collection failed for {}: {}", server_id, e);
                self.sink.publish(MonitorEvent::ServerError {
                    server_id: server_id.clone(),
                    error: e.to_string(),
                });
                return Err(e);
            }
        };

        record.record_sample(sample.clone());
        let transitions =
            self.alerts
                .evaluate(server_id, &mut record.alert_flags, &sample, &thresholds);

        let metrics = record.current_metrics.clone();
        let mut events = vec![MonitorEvent::ServerMetricsUpdated {
            server_id: server_id.clone(),
            metrics: metrics.clone(),
            history: record.history_vec(),
        }];

        for transition in transitions {
            match transition {
                AlertTransition::Raised { entry, .. } => {
                    record.push_alert(entry.clone());
                    events.push(MonitorEvent::PerformanceAlert {
                        server_id: server_id.clone(),
                        timestamp: entry.timestamp,
                        alert: entry,
                        server_name: server_name.clone(),
                    });
                }
                AlertTransition::Resolved { metric } => {
                    record.resolve_alert(metric.into());
                    events.push(MonitorEvent::AlertResolved {
                        server_id: server_id.clone(),
                        alert_type: metric.into(),
                    });
                }
            }
        }
        drop(record);

        for event in events {
            self.sink.publish(event);
        }

        Ok(metrics)
    }

    async fn run_health_check(&self, server_id: &ServerId) -> Result<HealthRecord> {
        let record = self
            .registry
            .record(server_id)
            .await
            .ok_or_else(|| MonitorError::ServerNotFound(server_id.to_string()))?;

        let pid = {
            let record = record.lock().await;
            if record.is_stopped() {
                debug!("Skipping health check for stopped server {}", server_id);
                return Ok(record.health.clone());
            }
            record.pid
        };

        // The liveness check may block, so it runs off the runtime and outside the record lock
        let probe = Arc::clone(&self.probe);
        let liveness = tokio::task::spawn_blocking(move || probe.check(pid))
            .await
            .map_err(|e| MonitorError::TaskFailed(format!("liveness check: {}", e)))?;

        let max_restarts = self.thresholds.read().await.restart_count;
        let now = Utc::now();

        let mut record = record.lock().await;
        if record.is_stopped() {
            debug!("Discarding health check for stopped server {}", server_id);
            return Ok(record.health.clone());
        }
        let server_name = record.config.name.clone();

        let health = self
            .scorer
            .assess(pid, liveness, &record.current_metrics, now);
        record.health = health.clone();

        let mut events = Vec::new();
        if health.status == HealthStatus::Crashed {
            warn!("Server {} (PID {}) crashed", server_id, record.pid);
            events.push(MonitorEvent::ServerHealthCritical {
                server_id: server_id.clone(),
                health: health.clone(),
                server_name: server_name.clone(),
            });
        } else {
            events.push(MonitorEvent::ServerHealthUpdated {
                server_id: server_id.clone(),
                health: health.clone(),
                server_name: server_name.clone(),
            });
        }

        if health.status.is_critical() && record.config.auto_restart {
            let reason = format!("Health {} (score {})", health.status, health.score);

            match self
                .throttle
                .request_restart(&mut record, max_restarts, &reason, now)
            {
                Ok(count) => {
                    info!(
                        "Auto-restart requested for {} ({}/{} in window): {}",
                        server_id, count, max_restarts, reason
                    );
                    events.push(MonitorEvent::AutoRestartTriggered {
                        server_id: server_id.clone(),
                        reason,
                        server_name,
                    });
                }
                Err(MonitorError::PolicyDenied { count, max, .. }) => {
                    warn!(
                        "Auto-restart blocked for {}: {} restarts in window (max {})",
                        server_id, count, max
                    );
                    events.push(MonitorEvent::AutoRestartBlocked {
                        server_id: server_id.clone(),
                        reason: format!(
                            "Restart limit reached: {} restarts in the last {} minutes",
                            count,
                            self.throttle.window().as_secs() / 60
                        ),
                        count,
                    });
                }
                Err(e) => return Err(e),
            }
        }
        drop(record);

        for event in events {
            self.sink.publish(event);
        }

        Ok(health)
    }
}
