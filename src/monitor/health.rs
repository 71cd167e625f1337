use crate::error::Result;
use crate::monitor::collector::LivenessProbe;
use crate::monitor::types::{HealthIssue, HealthRecord, HealthStatus, ServerMetrics};
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

const BASE_SCORE: i32 = 100;

/// Liveness probe plus weighted deductions over the latest metrics
#[derive(Debug, Clone, Copy, Default)]
pub struct HealthScorer;

impl HealthScorer {
    pub fn new() -> Self {
        Self
    }

    /// Run a full health check for a process
    pub fn evaluate(
        &self,
        probe: &dyn LivenessProbe,
        pid: u32,
        metrics: &ServerMetrics,
        now: DateTime<Utc>,
    ) -> HealthRecord {
        self.assess(pid, probe.check(pid), metrics, now)
    }

    /// Score a process from an already completed liveness probe
    ///
    /// A failed probe short-circuits to a crashed record with score 0;
    /// otherwise the score is derived from `metrics`.
    pub fn assess(
        &self,
        pid: u32,
        liveness: Result<()>,
        metrics: &ServerMetrics,
        now: DateTime<Utc>,
    ) -> HealthRecord {
        if let Err(e) = liveness {
            warn!("Liveness probe failed for PID {}: {}", pid, e);
            return Self::crashed(now);
        }

        let record = self.score(metrics, now);
        debug!(
            "PID {} health {} (score {}, {} issue(s))",
            pid,
            record.status,
            record.score,
            record.issues.len()
        );
        record
    }

    pub fn crashed(now: DateTime<Utc>) -> HealthRecord {
        HealthRecord {
            score: 0,
            status: HealthStatus::Crashed,
            issues: vec![HealthIssue::critical("process crashed")],
            last_check: Some(now),
        }
    }

    /// Deduct from 100 for each independent CPU and memory issue
    pub fn score(&self, metrics: &ServerMetrics, now: DateTime<Utc>) -> HealthRecord {
        let mut score = BASE_SCORE;
        let mut issues = Vec::new();

        if metrics.cpu > 90.0 {
            score -= 30;
            issues.push(HealthIssue::critical(format!(
                "critical CPU usage: {:.1}%",
                metrics.cpu
            )));
        } else if metrics.cpu > 80.0 {
            score -= 15;
            issues.push(HealthIssue::warning(format!(
                "high CPU usage: {:.1}%",
                metrics.cpu
            )));
        }

        if metrics.memory > 95.0 {
            score -= 25;
            issues.push(HealthIssue::critical(format!(
                "critical memory usage: {:.1}%",
                metrics.memory
            )));
        } else if metrics.memory > 85.0 {
            score -= 10;
            issues.push(HealthIssue::warning(format!(
                "high memory usage: {:.1}%",
                metrics.memory
            )));
        }

        let score = score.clamp(0, BASE_SCORE);

        HealthRecord {
            score: score as u8,
            status: Self::bucket(score),
            issues,
            last_check: Some(now),
        }
    }

    pub fn bucket(score: i32) -> HealthStatus {
        match score {
            s if s >= 80 => HealthStatus::Healthy,
            s if s >= 60 => HealthStatus::Warning,
            s if s >= 30 => HealthStatus::Degraded,
            _ => HealthStatus::Critical,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MonitorError;

    struct FixedProbe(bool);

    impl LivenessProbe for FixedProbe {
        fn check(&self, pid: u32) -> Result<()> {
            if self.0 {
                Ok(())
            } else {
                Err(MonitorError::ProcessNotFound(pid))
            }
        }
    }

    fn metrics(cpu: f64, memory: f64) -> ServerMetrics {
        let mut metrics = ServerMetrics::initial();
        metrics.cpu = cpu;
        metrics.memory = memory;
        metrics
    }

    #[test]
    fn test_healthy_without_issues() {
        let record = HealthScorer::new().score(&metrics(20.0, 30.0), Utc::now());
        assert_eq!(record.score, 100);
        assert_eq!(record.status, HealthStatus::Healthy);
        assert!(record.issues.is_empty());
        assert!(record.last_check.is_some());
    }

    #[test]
    fn test_deduction_boundaries() {
        let scorer = HealthScorer::new();
        let now = Utc::now();

        // Boundaries are exclusive on the lower side
        assert_eq!(scorer.score(&metrics(80.0, 85.0), now).score, 100);
        assert_eq!(scorer.score(&metrics(80.5, 0.0), now).score, 85);
        assert_eq!(scorer.score(&metrics(90.0, 0.0), now).score, 85);
        assert_eq!(scorer.score(&metrics(90.5, 0.0), now).score, 70);
        assert_eq!(scorer.score(&metrics(0.0, 85.5), now).score, 90);
        assert_eq!(scorer.score(&metrics(0.0, 95.0), now).score, 90);
        assert_eq!(scorer.score(&metrics(0.0, 95.5), now).score, 75);
    }

    #[test]
    fn test_deductions_are_additive() {
        let record = HealthScorer::new().score(&metrics(99.0, 99.0), Utc::now());
        assert_eq!(record.score, 45);
        assert_eq!(record.status, HealthStatus::Degraded);
        assert_eq!(record.issues.len(), 2);
    }

    #[test]
    fn test_buckets() {
        assert_eq!(HealthScorer::bucket(100), HealthStatus::Healthy);
        assert_eq!(HealthScorer::bucket(80), HealthStatus::Healthy);
        assert_eq!(HealthScorer::bucket(79), HealthStatus::Warning);
        assert_eq!(HealthScorer::bucket(60), HealthStatus::Warning);
        assert_eq!(HealthScorer::bucket(59), HealthStatus::Degraded);
        assert_eq!(HealthScorer::bucket(30), HealthStatus::Degraded);
        assert_eq!(HealthScorer::bucket(29), HealthStatus::Critical);
        assert_eq!(HealthScorer::bucket(0), HealthStatus::Critical);
    }

    #[test]
    fn test_probe_failure_is_crash_regardless_of_metrics() {
        let scorer = HealthScorer::new();
        let record = scorer.evaluate(&FixedProbe(false), 42, &metrics(1.0, 1.0), Utc::now());

        assert_eq!(record.score, 0);
        assert_eq!(record.status, HealthStatus::Crashed);
        assert_eq!(record.issues, vec![HealthIssue::critical("process crashed")]);
    }

    #[test]
    fn test_probe_success_scores_metrics() {
        let scorer = HealthScorer::new();
        let record = scorer.evaluate(&FixedProbe(true), 42, &metrics(95.0, 50.0), Utc::now());

        assert_eq!(record.score, 70);
        assert_eq!(record.status, HealthStatus::Warning);
    }
}
