// CLI module - watch a set of server processes and stream monitor events

mod output;

use crate::config::MonitorConfig;
use crate::error::{MonitorError, Result};
use crate::monitor::{
    EventBus, MonitorEvent, ProcessHandle, ServerConfig, ServerId, ServerMonitor,
    ThresholdsUpdate,
};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::broadcast::Receiver;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Fleetmon - performance monitor for a fleet of server processes
#[derive(Parser, Debug)]
#[command(name = "fleetmon")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Server to monitor, as NAME=PID (repeatable)
    #[arg(short, long = "watch", value_name = "NAME=PID", required = true)]
    watch: Vec<String>,

    /// Monitor configuration file (TOML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Request restarts when a watched server becomes critical
    #[arg(short, long)]
    auto_restart: bool,

    /// Override the metrics sampling interval
    #[arg(long, value_name = "MS")]
    metrics_interval_ms: Option<u64>,

    /// Override the health check interval
    #[arg(long, value_name = "MS")]
    health_interval_ms: Option<u64>,

    /// CPU alert threshold in percent
    #[arg(long)]
    cpu_threshold: Option<f64>,

    /// Memory alert threshold in percent
    #[arg(long)]
    memory_threshold: Option<f64>,

    /// Stop after this many seconds instead of waiting for Ctrl+C
    #[arg(long, value_name = "SECS")]
    duration: Option<u64>,

    /// Print events as JSON lines
    #[arg(long)]
    json: bool,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Cli {
    /// Run the CLI application
    pub async fn run() -> anyhow::Result<()> {
        let cli = Cli::parse();
        cli.init_tracing();
        cli.execute().await
    }

    fn init_tracing(&self) {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&self.log_level));

        // Logs go to stderr so stdout stays a clean event stream
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    async fn execute(&self) -> anyhow::Result<()> {
        let config = self.load_config()?;
        let targets = parse_watch_targets(&self.watch, self.auto_restart)?;

        let bus = EventBus::new(config.event_buffer);
        let events = bus.subscribe();
        let monitor = ServerMonitor::new(config, Arc::new(bus))?;

        let printer = tokio::spawn(print_events(events, self.json));

        if let Some(update) = self.threshold_update() {
            monitor.update_alert_thresholds(update).await?;
        }

        for (server_id, handle, server_config) in targets {
            monitor
                .start_server_monitoring(server_id, handle, server_config)
                .await?;
        }

        self.wait_for_shutdown().await;

        monitor.stop_monitoring().await;
        let snapshots = monitor.get_all_server_metrics().await;

        // Dropping the last monitor handle closes the bus and ends the printer
        drop(monitor);
        if let Err(e) = printer.await {
            warn!("Event printer ended abnormally: {}", e);
        }

        if !self.json {
            output::print_summary(&snapshots);
        }

        Ok(())
    }

    fn load_config(&self) -> Result<MonitorConfig> {
        let mut config = match &self.config {
            Some(path) => MonitorConfig::from_file(path)?,
            None => MonitorConfig::default(),
        };

        if let Some(ms) = self.metrics_interval_ms {
            config.metrics_interval_ms = ms;
        }
        if let Some(ms) = self.health_interval_ms {
            config.health_check_interval_ms = ms;
        }

        config.validate()?;
        Ok(config)
    }

    fn threshold_update(&self) -> Option<ThresholdsUpdate> {
        if self.cpu_threshold.is_none() && self.memory_threshold.is_none() {
            return None;
        }

        Some(ThresholdsUpdate {
            cpu: self.cpu_threshold,
            memory: self.memory_threshold,
            ..Default::default()
        })
    }

    async fn wait_for_shutdown(&self) {
        let deadline = async {
            match self.duration {
                Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => info!("Received Ctrl+C, shutting down"),
                Err(e) => warn!("Failed to listen for Ctrl+C: {}", e),
            },
            _ = deadline => info!("Monitoring duration elapsed"),
        }
    }
}

/// Parse watch targets from NAME=PID format
fn parse_watch_targets(
    targets: &[String],
    auto_restart: bool,
) -> Result<Vec<(ServerId, ProcessHandle, ServerConfig)>> {
    let mut parsed: Vec<(ServerId, ProcessHandle, ServerConfig)> =
        Vec::with_capacity(targets.len());

    for target in targets {
        let (name, pid) = target
            .split_once('=')
            .map(|(name, pid)| (name.trim(), pid.trim()))
            .filter(|(name, _)| !name.is_empty())
            .ok_or_else(|| {
                MonitorError::ConfigError(format!(
                    "Invalid watch target format: '{}'. Expected NAME=PID",
                    target
                ))
            })?;

        let pid: u32 = pid.parse().map_err(|_| {
            MonitorError::ConfigError(format!("Invalid PID '{}' for server '{}'", pid, name))
        })?;

        if parsed.iter().any(|(id, _, _)| id.as_str() == name) {
            return Err(MonitorError::ConfigError(format!(
                "Server '{}' is listed more than once",
                name
            )));
        }

        parsed.push((
            ServerId::new(name),
            ProcessHandle::new(pid),
            ServerConfig::new(name, auto_restart),
        ));
    }

    Ok(parsed)
}

async fn print_events(mut events: Receiver<MonitorEvent>, json: bool) {
    loop {
        match events.recv().await {
            Ok(event) => output::print_event(&event, json),
            Err(RecvError::Lagged(skipped)) => {
                warn!("Event stream lagged, {} event(s) dropped", skipped)
            }
            Err(RecvError::Closed) => break,
        }
    }
}
