//! Threshold alerts with a hysteresis band.
//!
//! A metric starts alerting when a sample rises strictly above its threshold
//! and stops only once a sample falls to 80% of the threshold or below.
//! Samples in between leave the current state unchanged.

use crate::monitor::types::{
    AlertHistoryEntry, AlertMetric, AlertSeverity, AlertThresholds, AlertType, MetricsSample,
    ServerId,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Fraction of the threshold a sample must fall to before an alert resolves
pub const RESOLVE_RATIO: f64 = 0.8;

/// Samples at or above this percentage raise critical rather than warning alerts
pub const CRITICAL_LEVEL: f64 = 95.0;

/// Per-metric alerting state of one server
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertFlags(BTreeMap<AlertMetric, bool>);

impl AlertFlags {
    pub fn is_alerting(&self, metric: AlertMetric) -> bool {
        self.0.get(&metric).copied().unwrap_or(false)
    }

    pub fn set(&mut self, metric: AlertMetric, alerting: bool) {
        self.0.insert(metric, alerting);
    }

    pub fn alerting(&self) -> impl Iterator<Item = AlertMetric> + '_ {
        self.0
            .iter()
            .filter(|(_, alerting)| **alerting)
            .map(|(metric, _)| *metric)
    }
}

/// State change produced by evaluating one sample
#[derive(Debug, Clone, PartialEq)]
pub enum AlertTransition {
    Raised {
        metric: AlertMetric,
        entry: AlertHistoryEntry,
    },
    Resolved {
        metric: AlertMetric,
    },
}

/// Hysteresis evaluator shared by all servers
#[derive(Debug, Clone, Copy, Default)]
pub struct AlertEngine;

impl AlertEngine {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate every tracked metric of `sample`, updating `flags` in place
    ///
    /// Metrics are evaluated in `AlertMetric::TRACKED` order and independently
    /// of one another.
    pub fn evaluate(
        &self,
        server_id: &ServerId,
        flags: &mut AlertFlags,
        sample: &MetricsSample,
        thresholds: &AlertThresholds,
    ) -> Vec<AlertTransition> {
        let mut transitions = Vec::new();

        for metric in AlertMetric::TRACKED {
            let value = metric.value_of(sample);
            let threshold = metric.threshold_of(thresholds);

            if flags.is_alerting(metric) {
                if value <= threshold * RESOLVE_RATIO {
                    flags.set(metric, false);
                    info!(
                        "{} alert resolved for {} ({:.1}% <= {:.1}%)",
                        metric.label(),
                        server_id,
                        value,
                        threshold * RESOLVE_RATIO
                    );
                    transitions.push(AlertTransition::Resolved { metric });
                }
            } else if value > threshold {
                flags.set(metric, true);
                let entry = Self::raise(server_id, metric, value, threshold, sample);
                warn!("{} for {}", entry.message, server_id);
                transitions.push(AlertTransition::Raised { metric, entry });
            }
        }

        transitions
    }

    fn raise(
        server_id: &ServerId,
        metric: AlertMetric,
        value: f64,
        threshold: f64,
        sample: &MetricsSample,
    ) -> AlertHistoryEntry {
        let severity = if value >= CRITICAL_LEVEL {
            AlertSeverity::Critical
        } else {
            AlertSeverity::Warning
        };

        AlertHistoryEntry {
            server_id: server_id.clone(),
            alert_type: AlertType::from(metric),
            severity,
            message: format!(
                "{} usage {:.1}% exceeds threshold {:.1}%",
                metric.label(),
                value,
                threshold
            ),
            timestamp: sample.timestamp,
            resolved: false,
        }
    }
}
