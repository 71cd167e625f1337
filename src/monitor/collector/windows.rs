use super::{field_or, LastKnown, MetricsCollector, SystemShell};
use crate::error::{MonitorError, Result};
use crate::monitor::types::{DiskIo, MetricsSample};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use sysinfo::System;

/// Collector for Windows hosts
///
/// Uses `tasklist` for the process-table query, the WMI perf-formatted
/// process class (through `wmic`) for CPU and elapsed time, `netstat` for the
/// connection table and `wmic process` for I/O transfer counters.
pub struct WindowsCollector {
    shell: Arc<dyn SystemShell>,
    last_known: LastKnown,
    /// Total physical memory in bytes
    total_memory: u64,
    logical_cores: usize,
}

impl WindowsCollector {
    pub fn new(shell: Arc<dyn SystemShell>) -> Self {
        let mut system = System::new();
        system.refresh_memory();

        let logical_cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        Self::with_host(shell, system.total_memory(), logical_cores)
    }

    /// Create a collector with explicit host capacity
    pub fn with_host(shell: Arc<dyn SystemShell>, total_memory: u64, logical_cores: usize) -> Self {
        Self {
            shell,
            last_known: LastKnown::default(),
            total_memory,
            logical_cores: logical_cores.max(1),
        }
    }

    async fn cpu_and_uptime(&self, pid: u32) -> Result<(Option<f64>, Option<u64>)> {
        let filter = format!("IDProcess={}", pid);
        let output = self
            .shell
            .run(
                "wmic",
                &[
                    "path",
                    "Win32_PerfFormattedData_PerfProc_Process",
                    "where",
                    &filter,
                    "get",
                    "PercentProcessorTime,ElapsedTime",
                    "/value",
                ],
            )
            .await?;

        let values = parse_wmic_values(&output);
        let cpu = values
            .get("PercentProcessorTime")
            .and_then(|v| v.parse::<f64>().ok())
            .map(|raw| (raw / self.logical_cores as f64).min(100.0));
        let uptime = values
            .get("ElapsedTime")
            .and_then(|v| v.parse::<u64>().ok());

        Ok((cpu, uptime))
    }

    async fn connections(&self, pid: u32) -> Result<Option<u32>> {
        let output = self.shell.run("netstat", &["-ano", "-p", "TCP"]).await?;
        Ok(Some(count_netstat_connections(&output, pid)))
    }

    async fn disk_io(&self, pid: u32) -> Result<Option<DiskIo>> {
        let filter = format!("ProcessId={}", pid);
        let output = self
            .shell
            .run(
                "wmic",
                &[
                    "process",
                    "where",
                    &filter,
                    "get",
                    "ReadTransferCount,WriteTransferCount",
                    "/value",
                ],
            )
            .await?;

        let values = parse_wmic_values(&output);
        let read = values
            .get("ReadTransferCount")
            .and_then(|v| v.parse::<u64>().ok());
        let write = values
            .get("WriteTransferCount")
            .and_then(|v| v.parse::<u64>().ok());

        Ok(read.zip(write).map(|(read, write)| DiskIo { read, write }))
    }

    fn memory_percent(&self, working_set_kb: u64) -> Option<f64> {
        if self.total_memory == 0 {
            return None;
        }
        Some(working_set_kb as f64 * 1024.0 / self.total_memory as f64 * 100.0)
    }
}

#[async_trait]
impl MetricsCollector for WindowsCollector {
    async fn collect(&self, pid: u32) -> Result<MetricsSample> {
        let previous = self.last_known.get(pid).await;
        let filter = format!("PID eq {}", pid);

        // The process-table query decides whether the process is addressable
        let output = self
            .shell
            .run("tasklist", &["/FI", &filter, "/FO", "CSV", "/NH"])
            .await
            .map_err(|e| MonitorError::collection(pid, e.to_string()))?;

        let working_set_kb = parse_tasklist_memory_kb(&output, pid)
            .ok_or_else(|| MonitorError::collection(pid, "process not in task list"))?;

        let (cpu, uptime) = match self.cpu_and_uptime(pid).await {
            Ok(values) => values,
            Err(e) => {
                tracing::debug!("PID {}: perf counter query failed: {}", pid, e);
                (None, None)
            }
        };

        let sample = MetricsSample {
            cpu: field_or(pid, "cpu", Ok::<_, MonitorError>(cpu), previous.cpu),
            memory: field_or(
                pid,
                "memory",
                Ok::<_, MonitorError>(self.memory_percent(working_set_kb)),
                previous.memory,
            ),
            uptime_seconds: field_or(
                pid,
                "uptime",
                Ok::<_, MonitorError>(uptime),
                previous.uptime_seconds,
            ),
            connections: field_or(
                pid,
                "connections",
                self.connections(pid).await,
                previous.connections,
            ),
            disk_io: field_or(pid, "disk I/O", self.disk_io(pid).await, previous.disk_io),
            timestamp: Utc::now(),
        };

        self.last_known.store(pid, &sample).await;
        Ok(sample)
    }

    async fn forget(&self, pid: u32) {
        self.last_known.remove(pid).await;
    }
}

/// Extract the working set (KB) for `pid` from `tasklist /FO CSV /NH` output
///
/// Rows look like `"java.exe","4242","Console","1","512,340 K"`. When no
/// process matches, tasklist prints an `INFO:` line instead.
pub(crate) fn parse_tasklist_memory_kb(output: &str, pid: u32) -> Option<u64> {
    let pid = pid.to_string();

    output
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with('"'))
        .find_map(|line| {
            let fields: Vec<&str> = line
                .trim_matches('"')
                .split("\",\"")
                .collect();

            if fields.len() < 5 || fields[1] != pid {
                return None;
            }

            let digits: String = fields[4].chars().filter(char::is_ascii_digit).collect();
            digits.parse::<u64>().ok()
        })
}

/// Parse `Key=Value` lines emitted by `wmic ... /value`
pub(crate) fn parse_wmic_values(output: &str) -> HashMap<String, String> {
    output
        .lines()
        .filter_map(|line| line.trim().split_once('='))
        .filter(|(_, value)| !value.trim().is_empty())
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .collect()
}

/// Count established TCP rows owned by `pid` in `netstat -ano` output
pub(crate) fn count_netstat_connections(output: &str, pid: u32) -> u32 {
    let pid = pid.to_string();

    output
        .lines()
        .filter(|line| {
            let columns: Vec<&str> = line.split_whitespace().collect();
            columns.len() >= 5 && columns[3] == "ESTABLISHED" && columns[4] == pid
        })
        .count() as u32
}
