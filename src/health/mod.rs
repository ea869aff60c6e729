//! Replication health classification
//!
//! Health is derived from a short trailing window of lag measurements rather
//! than a single sample, so one transient error or spike does not flap the
//! reported state.

mod classifier;

pub use classifier::{classify, ClassifierConfig};

use std::fmt;

/// Health of one replica
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HealthState {
    /// Replicating within the lagging threshold
    Healthy,
    /// Latest lag at or above the lagging threshold
    Lagging,
    /// Lag at or above the stalled threshold for the whole window
    Stalled,
    /// Primary unreachable, or the replica unreachable for the whole window
    Disconnected,
    /// Latest sample failed but the replica was fine just before
    #[default]
    Unknown,
}

impl HealthState {
    pub const ALL: [HealthState; 5] = [
        HealthState::Healthy,
        HealthState::Lagging,
        HealthState::Stalled,
        HealthState::Disconnected,
        HealthState::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthState::Healthy => "healthy",
            HealthState::Lagging => "lagging",
            HealthState::Stalled => "stalled",
            HealthState::Disconnected => "disconnected",
            HealthState::Unknown => "unknown",
        }
    }

    /// Whether the replica is keeping up well enough to serve reads
    pub fn is_healthy(&self) -> bool {
        *self == HealthState::Healthy
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
