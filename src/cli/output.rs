// Output formatting for monitor events and the shutdown summary

use crate::monitor::types::AlertSeverity;
use crate::monitor::{HealthStatus, MonitorEvent, ServerSnapshot, ServerStatus};
use chrono::Local;
use colored::*;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

/// Print one event, either as a JSON line or a colored log line
pub fn print_event(event: &MonitorEvent, json: bool) {
    if json {
        match serde_json::to_string(event) {
            Ok(line) => println!("{}", line),
            Err(e) => eprintln!("{} {}", "✗ Error:".red().bold(), e),
        }
    } else {
        println!(
            "{} {}",
            format!("[{}]", Local::now().format("%H:%M:%S")).dimmed(),
            format_event(event)
        );
    }
}

/// Human readable rendering of an event
pub fn format_event(event: &MonitorEvent) -> String {
    match event {
        MonitorEvent::MonitoringStarted => format!("{} Monitoring started", "ℹ".blue().bold()),
        MonitorEvent::MonitoringStopped => format!("{} Monitoring stopped", "ℹ".blue().bold()),

        MonitorEvent::ServerMonitoringStarted { server_id, pid } => format!(
            "{} Watching {} (PID {})",
            "✓".green().bold(),
            server_id.as_str().cyan(),
            pid
        ),

        MonitorEvent::ServerMonitoringStopped { server_id } => {
            format!("{} Stopped watching {}", "ℹ".blue().bold(), server_id)
        }

        MonitorEvent::ServerMetricsUpdated {
            server_id, metrics, ..
        } => format!(
            "{} cpu {:.1}% mem {:.1}% conn {} up {}",
            server_id.as_str().cyan(),
            metrics.cpu,
            metrics.memory,
            metrics.connections,
            format_uptime(metrics.uptime_seconds)
        )
        .dimmed()
        .to_string(),

        MonitorEvent::ServerError { server_id, error } => format!(
            "{} {}: {}",
            "✗".red().bold(),
            server_id.as_str().cyan(),
            error
        ),

        MonitorEvent::PerformanceAlert {
            alert, server_name, ..
        } => {
            let marker = match alert.severity {
                AlertSeverity::Critical => "⚠".red().bold(),
                _ => "⚠".yellow().bold(),
            };
            format!("{} {}: {}", marker, server_name.cyan(), alert.message)
        }

        MonitorEvent::AlertResolved {
            server_id,
            alert_type,
        } => format!(
            "{} {}: {} alert resolved",
            "✓".green().bold(),
            server_id.as_str().cyan(),
            alert_type
        ),

        MonitorEvent::ServerHealthUpdated {
            health, server_name, ..
        }
        | MonitorEvent::ServerHealthCritical {
            health, server_name, ..
        } => format!(
            "{} health {} (score {})",
            server_name.cyan(),
            format_health_colored(&health.status),
            health.score
        ),

        MonitorEvent::AutoRestartTriggered {
            reason,
            server_name,
            ..
        } => format!(
            "{} Restart requested for {}: {}",
            "↻".yellow().bold(),
            server_name.cyan(),
            reason
        ),

        MonitorEvent::AutoRestartBlocked {
            server_id, reason, ..
        } => format!(
            "{} Restart blocked for {}: {}",
            "✗".red().bold(),
            server_id.as_str().cyan(),
            reason
        ),

        MonitorEvent::ThresholdsUpdated { thresholds } => format!(
            "{} Thresholds: cpu {:.1}% memory {:.1}% restarts {}",
            "ℹ".blue().bold(),
            thresholds.cpu,
            thresholds.memory,
            thresholds.restart_count
        ),
    }
}

/// Print a table with the final state of every server
pub fn print_summary(snapshots: &[ServerSnapshot]) {
    if snapshots.is_empty() {
        println!("{}", "No servers were monitored".yellow());
        return;
    }

    #[derive(Tabled)]
    struct ServerRow {
        #[tabled(rename = "Server")]
        server: String,
        #[tabled(rename = "PID")]
        pid: u32,
        #[tabled(rename = "Status")]
        status: String,
        #[tabled(rename = "CPU")]
        cpu: String,
        #[tabled(rename = "Memory")]
        memory: String,
        #[tabled(rename = "Conns")]
        connections: u32,
        #[tabled(rename = "Uptime")]
        uptime: String,
        #[tabled(rename = "Health")]
        health: String,
        #[tabled(rename = "Samples")]
        samples: usize,
    }

    let rows: Vec<ServerRow> = snapshots
        .iter()
        .map(|s| ServerRow {
            server: truncate(&s.name, 20),
            pid: s.pid,
            status: format_status_colored(&s.current_metrics.status),
            cpu: format!("{:.1}%", s.current_metrics.cpu),
            memory: format!("{:.1}%", s.current_metrics.memory),
            connections: s.current_metrics.connections,
            uptime: format_uptime(s.current_metrics.uptime_seconds),
            health: format!(
                "{} ({})",
                format_health_colored(&s.health.status),
                s.health.score
            ),
            samples: s.history.len(),
        })
        .collect();

    let mut table = Table::new(rows);
    table
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Alignment::center()));

    println!("\n{}\n", table);
    println!(
        "{}",
        format!("Total: {} server(s)", snapshots.len())
            .dimmed()
            .italic()
    );
}

fn format_status_colored(status: &ServerStatus) -> String {
    match status {
        ServerStatus::Running => status.to_string().green().to_string(),
        ServerStatus::Stopped => status.to_string().bright_black().to_string(),
        ServerStatus::Error => status.to_string().red().bold().to_string(),
    }
}

fn format_health_colored(status: &HealthStatus) -> String {
    match status {
        HealthStatus::Healthy => status.to_string().green().to_string(),
        HealthStatus::Warning => status.to_string().yellow().to_string(),
        HealthStatus::Degraded => status.to_string().yellow().bold().to_string(),
        HealthStatus::Critical | HealthStatus::Crashed => {
            status.to_string().red().bold().to_string()
        }
        HealthStatus::Unknown => status.to_string().bright_black().to_string(),
    }
}

/// Format an uptime in seconds as a short human-readable string
fn format_uptime(secs: u64) -> String {
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        let (mins, secs) = (secs / 60, secs % 60);
        if secs > 0 {
            format!("{}m {}s", mins, secs)
        } else {
            format!("{}m", mins)
        }
    } else if secs < 86400 {
        let (hours, mins) = (secs / 3600, (secs % 3600) / 60);
        if mins > 0 {
            format!("{}h {}m", hours, mins)
        } else {
            format!("{}h", hours)
        }
    } else {
        let (days, hours) = (secs / 86400, (secs % 86400) / 3600);
        if hours > 0 {
            format!("{}d {}h", days, hours)
        } else {
            format!("{}d", days)
        }
    }
}

/// Truncate a string to at most `max_len` characters
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::types::{AlertHistoryEntry, AlertType, HealthRecord, ServerId};
    use chrono::Utc;

    fn plain() {
        colored::control::set_override(false);
    }

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(30), "30s");
        assert_eq!(format_uptime(90), "1m 30s");
        assert_eq!(format_uptime(120), "2m");
        assert_eq!(format_uptime(3700), "1h 1m");
        assert_eq!(format_uptime(90000), "1d 1h");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("this is a very long string", 10), "this is...");
        assert_eq!(truncate("ñññññññññññññ", 5), "ññ...");
    }

    #[test]
    fn test_format_alert_event() {
        plain();
        let event = MonitorEvent::PerformanceAlert {
            server_id: ServerId::from("api"),
            alert: AlertHistoryEntry {
                server_id: ServerId::from("api"),
                alert_type: AlertType::Cpu,
                severity: AlertSeverity::Warning,
                message: "CPU usage 85.0% exceeds threshold 80.0%".to_string(),
                timestamp: Utc::now(),
                resolved: false,
            },
            timestamp: Utc::now(),
            server_name: "API".to_string(),
        };

        let line = format_event(&event);
        assert!(line.contains("API"));
        assert!(line.contains("CPU usage 85.0% exceeds threshold 80.0%"));
    }

    #[test]
    fn test_format_health_event() {
        plain();
        let mut health = HealthRecord::unknown();
        health.status = HealthStatus::Crashed;
        health.score = 0;

        let line = format_event(&MonitorEvent::ServerHealthCritical {
            server_id: ServerId::from("api"),
            health,
            server_name: "API".to_string(),
        });
        assert!(line.contains("crashed"));
        assert!(line.contains("score 0"));
    }
}
