use crate::error::{MonitorError, Result};
use crate::monitor::registry::ServerMonitorRecord;
use crate::monitor::types::{AlertHistoryEntry, AlertSeverity, AlertType};
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Sliding-window limit on automatic restart requests
///
/// The ledger is the server's own alert log: every authorized restart appends
/// a `restart` entry, and later requests count those entries inside the
/// trailing window.
#[derive(Debug, Clone)]
pub struct RestartThrottle {
    window: chrono::Duration,
}

impl RestartThrottle {
    pub fn new(window: Duration) -> Self {
        Self {
            window: chrono::Duration::from_std(window).unwrap_or(chrono::Duration::MAX),
        }
    }

    /// Count restart entries newer than `now - window`
    ///
    /// Entries stamped in the future (clock stepped backwards) still count.
    pub fn count_recent_restarts<'a, I>(&self, entries: I, now: DateTime<Utc>) -> usize
    where
        I: IntoIterator<Item = &'a AlertHistoryEntry>,
    {
        let cutoff = now.checked_sub_signed(self.window);

        entries
            .into_iter()
            .filter(|entry| entry.alert_type.is_restart())
            .filter(|entry| cutoff.map(|cutoff| entry.timestamp > cutoff).unwrap_or(true))
            .count()
    }

    /// Authorize or deny one restart request for `record`
    ///
    /// On success the restart is recorded in the ledger and the new count in
    /// the window is returned. When `max_restarts` is already reached the
    /// request fails with `MonitorError::PolicyDenied` and nothing is recorded.
    pub fn request_restart(
        &self,
        record: &mut ServerMonitorRecord,
        max_restarts: u32,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let count = self.count_recent_restarts(record.alert_log(), now);

        if count >= max_restarts as usize {
            return Err(MonitorError::PolicyDenied {
                server_id: record.server_id.to_string(),
                count,
                max: max_restarts,
            });
        }

        record.push_alert(AlertHistoryEntry {
            server_id: record.server_id.clone(),
            alert_type: AlertType::Restart,
            severity: AlertSeverity::Info,
            message: reason.to_string(),
            timestamp: now,
            resolved: false,
        });

        Ok(count + 1)
    }

    pub fn window(&self) -> Duration {
        self.window.to_std().unwrap_or(Duration::MAX)
    }
}

impl Default for RestartThrottle {
    fn default() -> Self {
        Self::new(Duration::from_secs(3_600))
    }
}
