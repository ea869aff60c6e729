use chrono::{DateTime, Utc};

use crate::driver::ReplicationThreads;
use crate::health::HealthState;
use crate::history::{plot_points, PlotPoint};
use crate::lag::LagMeasurement;
use crate::sample::{OutcomeKind, Sample};

/// Outcome of the primary's sample in one cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryStatus {
    pub endpoint: String,
    pub outcome: OutcomeKind,
    /// Failure detail, empty when the sample was ok
    pub detail: String,
    /// Replicas registered with the primary, when it could be listed
    pub attached_replicas: Option<usize>,
}

impl PrimaryStatus {
    pub(crate) fn from_sample(sample: &Sample) -> Self {
        Self {
            endpoint: sample.endpoint.clone(),
            outcome: sample.outcome.kind(),
            detail: sample.outcome.detail(),
            attached_replicas: sample
                .outcome
                .report()
                .and_then(|report| report.attached_replicas),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.outcome == OutcomeKind::Ok
    }
}

/// State of one replica after a recorded cycle
#[derive(Debug, Clone, PartialEq)]
pub struct ReplicaReport {
    pub replica: String,
    pub health: HealthState,
    /// Measurement recorded in this cycle
    pub latest: LagMeasurement,
    /// IO/SQL thread states from this cycle's sample, if it succeeded
    pub threads: Option<ReplicationThreads>,
    /// Full history window, oldest first, `latest` included
    pub window: Vec<LagMeasurement>,
}

impl ReplicaReport {
    /// Chart series of the window, invalid entries as gaps
    pub fn plot_points(&self) -> Vec<PlotPoint> {
        plot_points(&self.window)
    }
}

/// Everything a presenter needs after one recorded cycle
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    /// 1-based cycle number
    pub cycle: u64,
    pub completed_at: DateTime<Utc>,
    pub primary: PrimaryStatus,
    /// One entry per replica, in configuration order
    pub replicas: Vec<ReplicaReport>,
}

impl CycleReport {
    pub fn replica(&self, id: &str) -> Option<&ReplicaReport> {
        self.replicas.iter().find(|r| r.replica == id)
    }
}
