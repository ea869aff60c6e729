use std::time::Duration;

use super::HealthState;
use crate::config::HealthConfig;
use crate::lag::{Lag, LagMeasurement};

/// Classifier window and thresholds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifierConfig {
    /// Number of trailing measurements considered (k)
    pub window_size: usize,
    pub lagging_threshold: Duration,
    pub stalled_threshold: Duration,
    /// Fallback thresholds for lags that only carry a byte distance
    pub lagging_distance: Option<u64>,
    pub stalled_distance: Option<u64>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self::from(&HealthConfig::default())
    }
}

impl From<&HealthConfig> for ClassifierConfig {
    fn from(config: &HealthConfig) -> Self {
        Self {
            window_size: config.window_size.max(1),
            lagging_threshold: Duration::from_millis(config.lagging_threshold_ms),
            stalled_threshold: Duration::from_millis(config.stalled_threshold_ms),
            lagging_distance: config.lagging_distance,
            stalled_distance: config.stalled_distance,
        }
    }
}

impl ClassifierConfig {
    fn is_lagging(&self, lag: &Lag) -> bool {
        meets(lag, self.lagging_threshold, self.lagging_distance)
    }

    fn is_stalled(&self, lag: &Lag) -> bool {
        meets(lag, self.stalled_threshold, self.stalled_distance)
    }
}

/// Delay decides when known; otherwise the distance, if a distance threshold is set
fn meets(lag: &Lag, threshold: Duration, distance_threshold: Option<u64>) -> bool {
    match lag.delay {
        Some(delay) => delay >= threshold,
        None => matches!(
            (lag.distance, distance_threshold),
            (Some(distance), Some(limit)) if distance >= limit
        ),
    }
}

/// Classify the newest measurement of `history`
///
/// `history` is the replica's trailing history in insertion order, ending
/// with the measurement being classified. Only the last k entries are read,
/// so histories that share their last k measurements classify the same.
/// Rules, first match wins:
///
/// 1. newest invalid because the primary failed: `Disconnected`
/// 2. newest invalid: `Disconnected` if the k-1 before it were invalid too, else `Unknown`
/// 3. k measurements present and every valid lag among them at or above the
///    stalled threshold: `Stalled`
/// 4. newest lag at or above the lagging threshold: `Lagging`
/// 5. `Healthy`
pub fn classify(history: &[LagMeasurement], config: &ClassifierConfig) -> HealthState {
    let k = config.window_size.max(1);
    let window = &history[history.len().saturating_sub(k)..];
    let Some((latest, previous)) = window.split_last() else {
        return HealthState::Unknown;
    };

    if latest.primary_failed() {
        return HealthState::Disconnected;
    }

    let Some(latest_lag) = latest.lag() else {
        let sustained = previous.len() == k - 1 && previous.iter().all(|m| !m.is_valid());
        return if sustained {
            HealthState::Disconnected
        } else {
            HealthState::Unknown
        };
    };

    // The newest entry is valid here, so at least one lag is checked
    let stalled = window
        .iter()
        .filter_map(|m| m.lag())
        .all(|lag| config.is_stalled(lag));
    if window.len() == k && stalled {
        return HealthState::Stalled;
    }

    if config.is_lagging(latest_lag) {
        return HealthState::Lagging;
    }

    HealthState::Healthy
}
