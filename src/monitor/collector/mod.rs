// Collector module - Per-process resource sampling

mod posix;
mod probe;
mod shell;
mod windows;

pub use posix::PosixCollector;
pub use probe::{LivenessProbe, SignalProbe};
pub use shell::{SystemShell, TokioShell};
pub use windows::WindowsCollector;

use crate::error::Result;
use crate::monitor::types::MetricsSample;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

/// Produces resource samples for a process
#[async_trait]
pub trait MetricsCollector: Send + Sync {
    /// Sample CPU, memory, uptime, connections and disk I/O for `pid`
    ///
    /// Fails with `MonitorError::Collection` only when the process itself can
    /// no longer be addressed. Individual fields that cannot be read fall back
    /// to their last-known value, or zero.
    async fn collect(&self, pid: u32) -> Result<MetricsSample>;

    /// Drop any cached state kept for `pid`
    async fn forget(&self, pid: u32);
}

/// Build the collector for the platform this binary was compiled for
pub fn platform_collector(command_timeout: Duration) -> Arc<dyn MetricsCollector> {
    let shell: Arc<dyn SystemShell> = Arc::new(TokioShell::new(command_timeout));

    if cfg!(windows) {
        Arc::new(WindowsCollector::new(shell))
    } else {
        Arc::new(PosixCollector::new(shell))
    }
}

/// Cache of the last successful sample per PID, backing partial failures
#[derive(Debug, Default)]
pub(crate) struct LastKnown {
    samples: Mutex<HashMap<u32, MetricsSample>>,
}

impl LastKnown {
    pub(crate) async fn get(&self, pid: u32) -> MetricsSample {
        self.samples
            .lock()
            .await
            .get(&pid)
            .cloned()
            .unwrap_or_else(MetricsSample::empty)
    }

    pub(crate) async fn store(&self, pid: u32, sample: &MetricsSample) {
        self.samples.lock().await.insert(pid, sample.clone());
    }

    pub(crate) async fn remove(&self, pid: u32) {
        self.samples.lock().await.remove(&pid);
    }

    #[cfg(test)]
    pub(crate) async fn len(&self) -> usize {
        self.samples.lock().await.len()
    }
}

/// Resolve one field, degrading to `fallback` when it could not be read
pub(crate) fn field_or<T, E: Display>(
    pid: u32,
    field: &str,
    value: std::result::Result<Option<T>, E>,
    fallback: T,
) -> T {
    match value {
        Ok(Some(v)) => v,
        Ok(None) => {
            debug!("PID {}: {} unavailable, using last known value", pid, field);
            fallback
        }
        Err(e) => {
            debug!("PID {}: failed to read {}: {}", pid, field, e);
            fallback
        }
    }
}
