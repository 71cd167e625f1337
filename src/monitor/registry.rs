use crate::error::{MonitorError, Result};
use crate::monitor::alerts::AlertFlags;
use crate::monitor::scheduler::PeriodicTask;
use crate::monitor::types::{
    AlertHistoryEntry, AlertType, HealthRecord, MetricsSample, ProcessHandle, ServerConfig,
    ServerId, ServerMetrics, ServerStatus,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// Record shared between a server's two periodic tasks
pub type SharedRecord = Arc<Mutex<ServerMonitorRecord>>;

/// The two recurring tasks owned by one monitored server
#[derive(Debug)]
pub struct ServerTasks {
    pub metrics: PeriodicTask,
    pub health: PeriodicTask,
}

impl ServerTasks {
    fn cancel(&self) {
        self.metrics.cancel();
        self.health.cancel();
    }

    fn active_count(&self) -> usize {
        [&self.metrics, &self.health]
            .iter()
            .filter(|task| task.is_active())
            .count()
    }
}

/// In-memory monitoring state of a single server
#[derive(Debug)]
pub struct ServerMonitorRecord {
    pub server_id: ServerId,
    pub pid: u32,
    pub start_time: DateTime<Utc>,
    pub config: ServerConfig,
    pub current_metrics: ServerMetrics,
    pub health: HealthRecord,
    pub alert_flags: AlertFlags,
    history: VecDeque<MetricsSample>,
    history_capacity: usize,
    alert_log: VecDeque<AlertHistoryEntry>,
    alert_capacity: usize,
    tasks: Option<ServerTasks>,
}

impl ServerMonitorRecord {
    pub fn new(
        server_id: ServerId,
        handle: ProcessHandle,
        config: ServerConfig,
        history_capacity: usize,
        alert_capacity: usize,
    ) -> Self {
        Self {
            server_id,
            pid: handle.pid,
            start_time: Utc::now(),
            config,
            current_metrics: ServerMetrics::initial(),
            health: HealthRecord::unknown(),
            alert_flags: AlertFlags::default(),
            history: VecDeque::with_capacity(history_capacity),
            history_capacity: history_capacity.max(1),
            alert_log: VecDeque::with_capacity(alert_capacity),
            alert_capacity: alert_capacity.max(1),
            tasks: None,
        }
    }

    /// Append a sample, evicting the oldest beyond capacity, and make it current
    pub fn record_sample(&mut self, sample: MetricsSample) {
        // A stopped record keeps its status; only re-registration revives it
        let status = match self.current_metrics.status {
            ServerStatus::Stopped => ServerStatus::Stopped,
            _ => ServerStatus::Running,
        };

        self.current_metrics = ServerMetrics::from_sample(&sample);
        self.current_metrics.status = status;

        if self.history.len() >= self.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(sample);
    }

    pub fn mark_status(&mut self, status: ServerStatus) {
        self.current_metrics.status = status;
    }

    /// Whether monitoring was stopped for this record
    pub fn is_stopped(&self) -> bool {
        self.current_metrics.status == ServerStatus::Stopped
    }

    pub fn history(&self) -> &VecDeque<MetricsSample> {
        &self.history
    }

    pub fn history_vec(&self) -> Vec<MetricsSample> {
        self.history.iter().cloned().collect()
    }

    /// Append to the alert log, evicting the oldest beyond capacity
    pub fn push_alert(&mut self, entry: AlertHistoryEntry) {
        if self.alert_log.len() >= self.alert_capacity {
            self.alert_log.pop_front();
        }
        self.alert_log.push_back(entry);
    }

    /// Mark the most recent unresolved entry of `alert_type` as resolved
    pub fn resolve_alert(&mut self, alert_type: AlertType) {
        if let Some(entry) = self
            .alert_log
            .iter_mut()
            .rev()
            .find(|entry| entry.alert_type == alert_type && !entry.resolved)
        {
            entry.resolved = true;
        }
    }

    pub fn alert_log(&self) -> &VecDeque<AlertHistoryEntry> {
        &self.alert_log
    }

    /// Most recent `limit` log entries, oldest first
    pub fn recent_alerts(&self, limit: Option<usize>) -> Vec<AlertHistoryEntry> {
        let limit = limit.unwrap_or(self.alert_log.len());
        let skip = self.alert_log.len().saturating_sub(limit);
        self.alert_log.iter().skip(skip).cloned().collect()
    }

    fn attach_tasks(&mut self, tasks: ServerTasks) {
        if let Some(previous) = self.tasks.replace(tasks) {
            previous.cancel();
        }
    }

    /// Cancel both tasks; returns whether any was still active
    fn cancel_tasks(&mut self) -> bool {
        match self.tasks.take() {
            Some(tasks) => {
                let was_active = tasks.active_count() > 0;
                tasks.cancel();
                was_active
            }
            None => false,
        }
    }

    pub fn is_monitoring(&self) -> bool {
        self.tasks
            .as_ref()
            .map(|tasks| tasks.active_count() > 0)
            .unwrap_or(false)
    }

    pub fn active_task_count(&self) -> usize {
        self.tasks
            .as_ref()
            .map(ServerTasks::active_count)
            .unwrap_or(0)
    }

    pub fn snapshot(&self) -> ServerSnapshot {
        ServerSnapshot {
            server_id: self.server_id.clone(),
            pid: self.pid,
            name: self.config.name.clone(),
            auto_restart: self.config.auto_restart,
            start_time: self.start_time,
            current_metrics: self.current_metrics.clone(),
            history: self.history_vec(),
            health: self.health.clone(),
            alert_flags: self.alert_flags.clone(),
            monitoring: self.is_monitoring(),
        }
    }
}

/// Read-only copy of a record returned by queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerSnapshot {
    pub server_id: ServerId,
    pub pid: u32,
    pub name: String,
    pub auto_restart: bool,
    pub start_time: DateTime<Utc>,
    pub current_metrics: ServerMetrics,
    pub history: Vec<MetricsSample>,
    pub health: HealthRecord,
    pub alert_flags: AlertFlags,
    pub monitoring: bool,
}

/// Owner of every server's monitoring record
pub struct MonitorRegistry {
    records: RwLock<HashMap<ServerId, SharedRecord>>,
    history_capacity: usize,
    alert_capacity: usize,
}

impl MonitorRegistry {
    pub fn new(history_capacity: usize, alert_capacity: usize) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            history_capacity,
            alert_capacity,
        }
    }

    /// Create a fresh record, cancelling and replacing any previous one
    ///
    /// `spawn_tasks` is invoked while the registry is write-locked, so two
    /// concurrent registrations of the same id cannot both leave tasks
    /// running. Returns the PID of the replaced record, if there was one.
    pub async fn register<F>(
        &self,
        server_id: ServerId,
        handle: ProcessHandle,
        config: ServerConfig,
        spawn_tasks: F,
    ) -> Option<u32>
    where
        F: FnOnce(&ServerId) -> ServerTasks,
    {
        let mut records = self.records.write().await;

        let replaced = match records.remove(&server_id) {
            Some(previous) => {
                let mut previous = previous.lock().await;
                previous.cancel_tasks();
                debug!("Replaced monitoring record for {}", server_id);
                Some(previous.pid)
            }
            None => None,
        };

        let mut record = ServerMonitorRecord::new(
            server_id.clone(),
            handle,
            config,
            self.history_capacity,
            self.alert_capacity,
        );
        record.attach_tasks(spawn_tasks(&server_id));

        records.insert(server_id, Arc::new(Mutex::new(record)));
        replaced
    }

    /// Cancel both tasks and mark the server stopped, keeping its data
    ///
    /// Returns whether monitoring was active before the call.
    pub async fn unregister(&self, server_id: &ServerId) -> Result<bool> {
        let record = self
            .record(server_id)
            .await
            .ok_or_else(|| MonitorError::ServerNotFound(server_id.to_string()))?;

        let mut record = record.lock().await;
        let was_active = record.cancel_tasks();
        record.mark_status(ServerStatus::Stopped);
        Ok(was_active)
    }

    /// Delete a record entirely, cancelling its tasks first
    pub async fn remove(&self, server_id: &ServerId) -> Result<(u32, bool)> {
        let record = self
            .records
            .write()
            .await
            .remove(server_id)
            .ok_or_else(|| MonitorError::ServerNotFound(server_id.to_string()))?;

        let mut record = record.lock().await;
        let was_active = record.cancel_tasks();
        Ok((record.pid, was_active))
    }

    pub async fn record(&self, server_id: &ServerId) -> Option<SharedRecord> {
        self.records.read().await.get(server_id).cloned()
    }

    pub async fn record_sample(&self, server_id: &ServerId, sample: MetricsSample) -> Result<()> {
        let record = self
            .record(server_id)
            .await
            .ok_or_else(|| MonitorError::ServerNotFound(server_id.to_string()))?;
        record.lock().await.record_sample(sample);
        Ok(())
    }

    pub async fn get(&self, server_id: &ServerId) -> Option<ServerSnapshot> {
        let record = self.record(server_id).await?;
        let snapshot = record.lock().await.snapshot();
        Some(snapshot)
    }

    /// Snapshots of every record, ordered by server id
    pub async fn get_all(&self) -> Vec<ServerSnapshot> {
        let mut snapshots = Vec::new();
        for record in self.all_records().await {
            snapshots.push(record.lock().await.snapshot());
        }
        snapshots.sort_by(|a, b| a.server_id.cmp(&b.server_id));
        snapshots
    }

    pub async fn ids(&self) -> Vec<ServerId> {
        let mut ids: Vec<ServerId> = self.records.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Whether any remaining record refers to `pid`
    pub async fn pid_in_use(&self, pid: u32) -> bool {
        for record in self.all_records().await {
            if record.lock().await.pid == pid {
                return true;
            }
        }
        false
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    pub async fn active_server_count(&self) -> usize {
        let mut count = 0;
        for record in self.all_records().await {
            if record.lock().await.is_monitoring() {
                count += 1;
            }
        }
        count
    }

    pub async fn active_task_count(&self) -> usize {
        let mut count = 0;
        for record in self.all_records().await {
            count += record.lock().await.active_task_count();
        }
        count
    }

    // Clone the handles so no record lock is taken under the map lock
    async fn all_records(&self) -> Vec<SharedRecord> {
        self.records.read().await.values().cloned().collect()
    }
}
