use super::{field_or, LastKnown, MetricsCollector, SystemShell};
use crate::error::{MonitorError, Result};
use crate::monitor::types::{DiskIo, MetricsSample};
use async_trait::async_trait;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;

/// Collector for Linux, macOS and other POSIX hosts
///
/// Uses `ps` for the process-table query, `ss` (Linux) or `lsof` for the
/// connection table and `/proc/<pid>/io` for disk accounting where present.
pub struct PosixCollector {
    shell: Arc<dyn SystemShell>,
    last_known: LastKnown,
}

/// One parsed `ps -o pcpu=,pmem=,etime=` row; each column may be unreadable
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PsRow {
    pub cpu: Option<f64>,
    pub memory: Option<f64>,
    pub uptime_seconds: Option<u64>,
}

impl PosixCollector {
    pub fn new(shell: Arc<dyn SystemShell>) -> Self {
        Self {
            shell,
            last_known: LastKnown::default(),
        }
    }

    async fn connections(&self, pid: u32) -> Result<Option<u32>> {
        if cfg!(target_os = "linux") {
            let output = self.shell.run("ss", &["-Htanp"]).await?;
            Ok(Some(count_ss_connections(&output, pid)))
        } else {
            let pid_arg = pid.to_string();
            let output = self
                .shell
                .run(
                    "lsof",
                    &["-nP", "-a", "-p", &pid_arg, "-iTCP", "-sTCP:ESTABLISHED"],
                )
                .await?;
            Ok(Some(count_lsof_connections(&output)))
        }
    }

    async fn disk_io(&self, pid: u32) -> Result<Option<DiskIo>> {
        let path = PathBuf::from(format!("/proc/{}/io", pid));
        let contents = self.shell.read_file(&path).await?;
        Ok(parse_proc_io(&contents))
    }
}

#[async_trait]
impl MetricsCollector for PosixCollector {
    async fn collect(&self, pid: u32) -> Result<MetricsSample> {
        let previous = self.last_known.get(pid).await;
        let pid_arg = pid.to_string();

        // The process-table query decides whether the process is addressable
        let output = self
            .shell
            .run("ps", &["-o", "pcpu=,pmem=,etime=", "-p", &pid_arg])
            .await
            .map_err(|e| MonitorError::collection(pid, e.to_string()))?;

        let row = parse_ps_row(&output)
            .ok_or_else(|| MonitorError::collection(pid, "process not in process table"))?;

        let sample = MetricsSample {
            cpu: field_or(pid, "cpu", Ok::<_, MonitorError>(row.cpu), previous.cpu),
            memory: field_or(pid, "memory", Ok::<_, MonitorError>(row.memory), previous.memory),
            uptime_seconds: field_or(
                pid,
                "uptime",
                Ok::<_, MonitorError>(row.uptime_seconds),
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

/// Parse the first non-empty row of `ps -o pcpu=,pmem=,etime=`
///
/// Returns `None` when the process is not listed at all.
pub(crate) fn parse_ps_row(output: &str) -> Option<PsRow> {
    let line = output.lines().map(str::trim).find(|l| !l.is_empty())?;
    let mut fields = line.split_whitespace();

    Some(PsRow {
        cpu: fields.next().and_then(|f| f.parse::<f64>().ok()),
        memory: fields.next().and_then(|f| f.parse::<f64>().ok()),
        uptime_seconds: fields.next().and_then(parse_etime),
    })
}

/// Parse the `[[dd-]hh:]mm:ss` elapsed-time format used by `ps`
pub(crate) fn parse_etime(value: &str) -> Option<u64> {
    let (days, clock) = match value.split_once('-') {
        Some((d, rest)) => (d.parse::<u64>().ok()?, rest),
        None => (0, value),
    };

    let parts = clock
        .split(':')
        .map(|p| p.parse::<u64>().ok())
        .collect::<Option<Vec<_>>>()?;

    let (hours, minutes, seconds) = match parts.as_slice() {
        [m, s] => (0, *m, *s),
        [h, m, s] => (*h, *m, *s),
        _ => return None,
    };

    Some(days * 86_400 + hours * 3_600 + minutes * 60 + seconds)
}

/// Count established sockets owned by `pid` in `ss -Htanp` output
pub(crate) fn count_ss_connections(output: &str, pid: u32) -> u32 {
    let needle = format!("pid={},", pid);
    output
        .lines()
        .filter(|line| line.starts_with("ESTAB") && line.contains(&needle))
        .count() as u32
}

/// Count connection rows in `lsof` output (first line is the header)
pub(crate) fn count_lsof_connections(output: &str) -> u32 {
    output
        .lines()
        .skip(1)
        .filter(|line| !line.trim().is_empty())
        .count() as u32
}

/// Extract `read_bytes` and `write_bytes` from `/proc/<pid>/io`
pub(crate) fn parse_proc_io(contents: &str) -> Option<DiskIo> {
    let mut read = None;
    let mut write = None;

    for line in contents.lines() {
        if let Some((key, value)) = line.split_once(':') {
            match key.trim() {
                "read_bytes" => read = value.trim().parse::<u64>().ok(),
                "write_bytes" => write = value.trim().parse::<u64>().ok(),
                _ => {}
            }
        }
    }

    Some(DiskIo {
        read: read?,
        write: write?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::collector::testing::ScriptedShell;

    const PROC_IO: &str = "rchar: 2012\nwchar: 1024\nsyscr: 7\nsyscw: 3\nread_bytes: 4096\nwrite_bytes: 8192\ncancelled_write_bytes: 0\n";

    fn collector_with(shell: Arc<ScriptedShell>) -> PosixCollector {
        PosixCollector::new(shell)
    }

    #[test]
    fn test_parse_ps_row() {
        let row = parse_ps_row("  12.5  3.1     01:02:03\n").unwrap();
        assert_eq!(row.cpu, Some(12.5));
        assert_eq!(row.memory, Some(3.1));
        assert_eq!(row.uptime_seconds, Some(3_723));
    }

    #[test]
    fn test_parse_ps_row_partial_columns() {
        let row = parse_ps_row("garbage 4.0\n").unwrap();
        assert_eq!(row.cpu, None);
        assert_eq!(row.memory, Some(4.0));
        assert_eq!(row.uptime_seconds, None);
    }

    #[test]
    fn test_parse_ps_row_empty() {
        assert!(parse_ps_row("").is_none());
        assert!(parse_ps_row("\n   \n").is_none());
    }

    #[test]
    fn test_parse_etime_formats() {
        assert_eq!(parse_etime("05:09"), Some(309));
        assert_eq!(parse_etime("2:00:00"), Some(7_200));
        assert_eq!(parse_etime("3-00:00:01"), Some(259_201));
        assert_eq!(parse_etime("abc"), None);
        assert_eq!(parse_etime("1:2:3:4"), None);
    }

    #[test]
    fn test_count_ss_connections() {
        let output = "\
ESTAB 0 0 10.0.0.2:25565 10.0.0.9:51234 users:((\"java\",pid=4242,fd=51))
ESTAB 0 0 10.0.0.2:25565 10.0.0.7:50000 users:((\"java\",pid=4242,fd=52))
LISTEN 0 50 0.0.0.0:25565 0.0.0.0:* users:((\"java\",pid=4242,fd=40))
ESTAB 0 0 10.0.0.2:22 10.0.0.1:40000 users:((\"sshd\",pid=42420,fd=3))
";
        assert_eq!(count_ss_connections(output, 4242), 2);
        assert_eq!(count_ss_connections(output, 42420), 1);
        assert_eq!(count_ss_connections(output, 1), 0);
    }

    #[test]
    fn test_count_lsof_connections() {
        let output = "\
COMMAND  PID USER   FD   TYPE DEVICE SIZE/OFF NODE NAME
java    4242 game   51u  IPv4 0x1      0t0  TCP 10.0.0.2:25565->10.0.0.9:51234 (ESTABLISHED)
java    4242 game   52u  IPv4 0x2      0t0  TCP 10.0.0.2:25565->10.0.0.7:50000 (ESTABLISHED)
";
        assert_eq!(count_lsof_connections(output), 2);
        assert_eq!(count_lsof_connections(""), 0);
    }

    #[test]
    fn test_parse_proc_io() {
        let io = parse_proc_io(PROC_IO).unwrap();
        assert_eq!(io.read, 4096);
        assert_eq!(io.write, 8192);

        assert!(parse_proc_io("rchar: 1\n").is_none());
    }

    #[tokio::test]
    async fn test_collect_full_sample() {
        let shell = Arc::new(ScriptedShell::default());
        shell.respond("ps", " 42.0  10.5  00:30\n");
        shell.respond(
            "ss",
            "ESTAB 0 0 a:1 b:2 users:((\"srv\",pid=77,fd=3))\n",
        );
        shell.respond("lsof", "COMMAND PID\nsrv 77 TCP\n");
        shell.respond("/proc/77/io", PROC_IO);

        let collector = collector_with(shell);
        let sample = collector.collect(77).await.unwrap();

        assert_eq!(sample.cpu, 42.0);
        assert_eq!(sample.memory, 10.5);
        assert_eq!(sample.uptime_seconds, 30);
        assert_eq!(sample.connections, 1);
        assert_eq!(sample.disk_io, DiskIo { read: 4096, write: 8192 });
    }

    #[tokio::test]
    async fn test_collect_process_gone_is_collection_error() {
        let shell = Arc::new(ScriptedShell::default());
        shell.fail("ps", "exit status: 1");

        let collector = collector_with(shell);
        let result = collector.collect(77).await;

        assert!(matches!(
            result,
            Err(MonitorError::Collection { pid: 77, .. })
        ));
    }

    #[tokio::test]
    async fn test_collect_partial_failure_uses_last_known() {
        let shell = Arc::new(ScriptedShell::default());
        shell.respond("ps", " 5.0  1.0  00:10\n");
        shell.respond(
            "ss",
            "ESTAB 0 0 a:1 b:2 users:((\"srv\",pid=77,fd=3))\nESTAB 0 0 a:1 c:2 users:((\"srv\",pid=77,fd=4))\n",
        );
        shell.respond("lsof", "COMMAND PID\nsrv 77 TCP\nsrv 77 TCP\n");
        shell.respond("/proc/77/io", PROC_IO);

        let collector = collector_with(Arc::clone(&shell));
        let first = collector.collect(77).await.unwrap();
        assert_eq!(first.connections, 2);

        // Connection table and I/O accounting become unavailable
        shell.fail("ss", "timed out");
        shell.fail("lsof", "timed out");
        shell.fail("/proc/77/io", "no such file");
        shell.respond("ps", " 9.0  2.0  00:15\n");

        let second = collector.collect(77).await.unwrap();
        assert_eq!(second.cpu, 9.0);
        assert_eq!(second.connections, 2);
        assert_eq!(second.disk_io, DiskIo { read: 4096, write: 8192 });
    }

    #[tokio::test]
    async fn test_collect_partial_failure_without_history_is_zero() {
        let shell = Arc::new(ScriptedShell::default());
        shell.respond("ps", " 5.0  1.0  00:10\n");

        let collector = collector_with(shell);
        let sample = collector.collect(88).await.unwrap();

        assert_eq!(sample.connections, 0);
        assert_eq!(sample.disk_io, DiskIo::default());
    }

    #[tokio::test]
    async fn test_forget_clears_cache() {
        let shell = Arc::new(ScriptedShell::default());
        shell.respond("ps", " 5.0  1.0  00:10\n");

        let collector = collector_with(shell);
        collector.collect(88).await.unwrap();
        assert_eq!(collector.last_known.len().await, 1);

        collector.forget(88).await;
        assert_eq!(collector.last_known.len().await, 0);
    }
}
