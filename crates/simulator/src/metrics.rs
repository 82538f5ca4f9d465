//! Metrics collection and reporting.

use cohort_core::Notification;
use cohort_simulation::{NotificationRecord, SimulationStats};
use cohort_types::DomainId;
use hdrhistogram::Histogram;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Collects metrics from the notification stream.
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    grants: BTreeMap<DomainId, u64>,
    cycles_completed: u64,
    partial_acquisitions: u64,
    slot_visits: u64,
    slot_unavailable: u64,
    envelopes_dropped: u64,
    /// Request-to-grant wait in microseconds.
    wait: Histogram<u64>,
}

impl MetricsCollector {
    /// Create an empty collector.
    pub fn new() -> Result<Self, hdrhistogram::CreationError> {
        Ok(Self {
            grants: BTreeMap::new(),
            cycles_completed: 0,
            partial_acquisitions: 0,
            slot_visits: 0,
            slot_unavailable: 0,
            envelopes_dropped: 0,
            wait: Histogram::new(3)?,
        })
    }

    /// Record one notification.
    pub fn record(&mut self, record: &NotificationRecord) {
        match &record.notification {
            Notification::EntryGranted { domain, waited, .. } => {
                *self.grants.entry(*domain).or_default() += 1;
                self.wait.saturating_record(waited.as_micros() as u64);
            }
            Notification::ResourcesAcquired { holds_all, .. } => {
                if !holds_all {
                    self.partial_acquisitions += 1;
                }
            }
            Notification::SlotVisited { .. } => self.slot_visits += 1,
            Notification::SlotUnavailable { .. } => self.slot_unavailable += 1,
            Notification::WorkflowCycleCompleted { .. } => self.cycles_completed += 1,
            Notification::EnvelopeDropped { .. } => self.envelopes_dropped += 1,
            Notification::ResourcesReturned { .. } => {}
        }
    }

    fn wait_at(&self, quantile: f64) -> Duration {
        Duration::from_micros(self.wait.value_at_quantile(quantile))
    }

    /// Produce the final report.
    pub fn report(
        &self,
        seed: u64,
        simulated: Duration,
        stats: &SimulationStats,
        violations: usize,
        quiesced: bool,
    ) -> SimulationReport {
        SimulationReport {
            seed,
            simulated,
            grants: self.grants.clone(),
            cycles_completed: self.cycles_completed,
            partial_acquisitions: self.partial_acquisitions,
            slot_visits: self.slot_visits,
            slot_unavailable: self.slot_unavailable,
            envelopes_dropped: self.envelopes_dropped,
            envelopes_delivered: stats.envelopes_delivered,
            decode_failures: stats.decode_failures,
            bytes_sent: stats.bytes_sent,
            mean_wait: Duration::from_micros(self.wait.mean() as u64),
            p50_wait: self.wait_at(0.50),
            p90_wait: self.wait_at(0.90),
            p99_wait: self.wait_at(0.99),
            max_wait: Duration::from_micros(self.wait.max()),
            violations,
            quiesced,
        }
    }
}

/// Summary of one simulation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationReport {
    pub seed: u64,
    /// Simulated time covered, drain included.
    pub simulated: Duration,
    /// Granted entries per domain.
    pub grants: BTreeMap<DomainId, u64>,
    pub cycles_completed: u64,
    /// Counted entries that did not end with every kind held.
    pub partial_acquisitions: u64,
    pub slot_visits: u64,
    pub slot_unavailable: u64,
    pub envelopes_dropped: u64,
    pub envelopes_delivered: u64,
    /// Deliveries dropped because their bytes did not decode.
    pub decode_failures: u64,
    pub bytes_sent: u64,
    pub mean_wait: Duration,
    pub p50_wait: Duration,
    pub p90_wait: Duration,
    pub p99_wait: Duration,
    pub max_wait: Duration,
    /// Invariant violations found.
    pub violations: usize,
    /// Whether every outstanding request finished after pacing stopped.
    pub quiesced: bool,
}

impl SimulationReport {
    /// Total granted entries across domains.
    pub fn total_grants(&self) -> u64 {
        self.grants.values().sum()
    }

    /// Workflow cycles per simulated second.
    pub fn cycles_per_second(&self) -> f64 {
        let secs = self.simulated.as_secs_f64();
        if secs > 0.0 {
            self.cycles_completed as f64 / secs
        } else {
            0.0
        }
    }

    /// Check if the run kept every invariant.
    pub fn is_clean(&self) -> bool {
        self.violations == 0
            && self.envelopes_dropped == 0
            && self.decode_failures == 0
            && self.quiesced
    }
}

impl fmt::Display for SimulationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "seed {} ({:?} simulated)", self.seed, self.simulated)?;
        for (domain, grants) in &self.grants {
            writeln!(f, "  {domain}: {grants} grants")?;
        }
        writeln!(
            f,
            "  cycles: {} ({:.2}/s), partial acquisitions: {}",
            self.cycles_completed,
            self.cycles_per_second(),
            self.partial_acquisitions
        )?;
        writeln!(
            f,
            "  slots: {} visits, {} unavailable",
            self.slot_visits, self.slot_unavailable
        )?;
        writeln!(
            f,
            "  envelopes: {} delivered, {} dropped, {} undecodable, {} bytes",
            self.envelopes_delivered,
            self.envelopes_dropped,
            self.decode_failures,
            self.bytes_sent
        )?;
        writeln!(
            f,
            "  wait: mean {:?}, p50 {:?}, p90 {:?}, p99 {:?}, max {:?}",
            self.mean_wait, self.p50_wait, self.p90_wait, self.p99_wait, self.max_wait
        )?;
        write!(f, "  violations: {}", self.violations)?;
        if !self.quiesced {
            write!(f, " (did not quiesce)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cohort_messages::Intent;
    use cohort_types::{LamportTime, OrderKey, PeerId};

    fn granted(waited_ms: u64) -> NotificationRecord {
        NotificationRecord {
            peer: PeerId(0),
            at: Duration::ZERO,
            notification: Notification::EntryGranted {
                domain: DomainId(0),
                request: OrderKey::new(LamportTime(1), PeerId(0)),
                intent: Intent::Acquire,
                at: Duration::ZERO,
                waited: Duration::from_millis(waited_ms),
            },
        }
    }

    #[test]
    fn test_wait_percentiles() {
        let mut metrics = MetricsCollector::new().unwrap();
        for ms in 1..=100 {
            metrics.record(&granted(ms));
        }

        let stats = SimulationStats::default();
        let report = metrics.report(1, Duration::from_secs(10), &stats, 0, true);
        assert_eq!(report.total_grants(), 100);
        assert!(report.p50_wait >= Duration::from_millis(49));
        assert!(report.p50_wait <= Duration::from_millis(51));
        assert!(report.max_wait >= Duration::from_millis(100));
        assert!(report.is_clean());
    }

    #[test]
    fn test_counts_workflow_notifications() {
        let mut metrics = MetricsCollector::new().unwrap();
        let record = |notification| NotificationRecord {
            peer: PeerId(0),
            at: Duration::ZERO,
            notification,
        };
        metrics.record(&record(Notification::WorkflowCycleCompleted { cycles: 1 }));
        metrics.record(&record(Notification::ResourcesAcquired {
            domain: DomainId(0),
            acquired: Vec::new(),
            holds_all: false,
        }));

        let stats = SimulationStats::default();
        let report = metrics.report(1, Duration::from_secs(2), &stats, 0, true);
        assert_eq!(report.cycles_completed, 1);
        assert_eq!(report.partial_acquisitions, 1);
        assert_eq!(report.cycles_per_second(), 0.5);
    }

    #[test]
    fn test_undecodable_deliveries_make_run_unclean() {
        let metrics = MetricsCollector::new().unwrap();
        let stats = SimulationStats {
            decode_failures: 2,
            ..SimulationStats::default()
        };

        let report = metrics.report(1, Duration::from_secs(1), &stats, 0, true);
        assert_eq!(report.decode_failures, 2);
        assert!(!report.is_clean());
        assert!(report.to_string().contains("2 undecodable"));
    }
}
