//! Per-replica lag history
//!
//! The poll scheduler is the only writer. Readers get owned copies taken
//! under a read lock, so they never observe a window mid-append.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{debug, info};

use super::window::{HistoryWindow, PlotPoint};
use crate::health::HealthState;
use crate::lag::LagMeasurement;

/// Misuse of the store by its caller
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Replica {0} is not registered")]
    UnregisteredReplica(String),
    #[error("Measurement for {measurement} appended to replica {replica}")]
    ReplicaMismatch { replica: String, measurement: String },
}

/// Bounded lag histories keyed by replica id
pub struct TimeSeriesStore {
    /// Replica id -> history
    windows: DashMap<String, Arc<RwLock<HistoryWindow>>>,
    /// Capacity of every window
    capacity: usize,
}

impl TimeSeriesStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            windows: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Register a replica; returns false if it already was
    pub fn register(&self, replica: &str) -> bool {
        let mut is_new = false;
        self.windows.entry(replica.to_string()).or_insert_with(|| {
            is_new = true;
            Arc::new(RwLock::new(HistoryWindow::new(self.capacity)))
        });
        if is_new {
            info!(replica = %replica, capacity = self.capacity, "Registered replica history");
        }
        is_new
    }

    fn get(&self, replica: &str) -> Result<Arc<RwLock<HistoryWindow>>, StoreError> {
        self.windows
            .get(replica)
            .map(|w| w.value().clone())
            .ok_or_else(|| StoreError::UnregisteredReplica(replica.to_string()))
    }

    /// Append the newest measurement, evicting the oldest beyond capacity
    pub fn append(&self, replica: &str, measurement: LagMeasurement) -> Result<(), StoreError> {
        if measurement.replica != replica {
            return Err(StoreError::ReplicaMismatch {
                replica: replica.to_string(),
                measurement: measurement.replica,
            });
        }
        let window = self.get(replica)?;
        let mut w = window.write();
        w.push(measurement);
        debug!(replica = %replica, len = w.len(), "Appended measurement");
        Ok(())
    }

    /// Snapshot of a replica's history, oldest first
    pub fn window(&self, replica: &str) -> Result<Vec<LagMeasurement>, StoreError> {
        Ok(self.get(replica)?.read().snapshot())
    }

    /// Newest measurement of a replica
    pub fn latest(&self, replica: &str) -> Result<Option<LagMeasurement>, StoreError> {
        Ok(self.get(replica)?.read().latest().cloned())
    }

    /// Chart series of a replica, invalid entries as gaps
    pub fn plot_points(&self, replica: &str) -> Result<Vec<PlotPoint>, StoreError> {
        Ok(self.get(replica)?.read().plot_points())
    }

    /// Registered replica ids, sorted
    pub fn replicas(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.windows.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get the number of registered replicas
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Count replicas by the health of their newest measurement
    ///
    /// Replicas without any measurement count as unknown.
    pub fn stats(&self) -> StoreStats {
        let mut stats = StoreStats {
            total: self.windows.len(),
            ..StoreStats::default()
        };

        for entry in self.windows.iter() {
            let health = entry
                .value()
                .read()
                .latest()
                .map(|m| m.health)
                .unwrap_or_default();
            match health {
                HealthState::Healthy => stats.healthy += 1,
                HealthState::Lagging => stats.lagging += 1,
                HealthState::Stalled => stats.stalled += 1,
                HealthState::Disconnected => stats.disconnected += 1,
                HealthState::Unknown => stats.unknown += 1,
            }
        }

        stats
    }
}

/// Replica counts by latest health
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub total: usize,
    pub healthy: usize,
    pub lagging: usize,
    pub stalled: usize,
    pub disconnected: usize,
    pub unknown: usize,
}

impl StoreStats {
    pub fn count(&self, state: HealthState) -> usize {
        match state {
            HealthState::Healthy => self.healthy,
            HealthState::Lagging => self.lagging,
            HealthState::Stalled => self.stalled,
            HealthState::Disconnected => self.disconnected,
            HealthState::Unknown => self.unknown,
        }
    }
}
