//! Poll scheduler
//!
//! Drives one cycle per interval tick: sample every endpoint, derive and
//! classify each replica's lag, append to the history store, then publish a
//! [`CycleReport`] for presentation.

mod poller;
mod report;

pub use poller::Poller;
pub use report::{CycleReport, PrimaryStatus, ReplicaReport};

use std::fmt;

use crate::config::ConfigError;
use crate::history::StoreError;

/// Lifecycle state of the poller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchedulerState {
    /// Waiting for the first tick, or a tick just fired
    Idle,
    /// Samples of the current cycle are in flight
    Sampling,
    /// Measurements of the current cycle are being classified and stored
    Recording,
    /// Cycle recorded, sleeping until the next tick
    WaitingNext,
    /// Cancelled; no further cycles will run
    Stopped,
}

impl SchedulerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchedulerState::Idle => "idle",
            SchedulerState::Sampling => "sampling",
            SchedulerState::Recording => "recording",
            SchedulerState::WaitingNext => "waiting_next",
            SchedulerState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fatal monitor error
///
/// Database failures are never reported here; they end up in the samples.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("History store misuse: {0}")]
    Store(#[from] StoreError),
}
