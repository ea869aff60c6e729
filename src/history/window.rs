use std::collections::VecDeque;

use tracing::warn;

use crate::lag::LagMeasurement;

/// One point of a replica's lag chart
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlotPoint {
    /// Seconds before the newest measurement
    pub seconds_ago: f64,
    /// Delay in seconds, `None` where the measurement was invalid (a gap)
    pub delay_secs: Option<f64>,
}

/// Bounded, insertion-ordered lag history of one replica
///
/// Appending beyond capacity evicts the oldest entry. Order is insertion
/// order: a timestamp that does not advance (wall clock stepped back) is
/// logged and kept where it was appended.
#[derive(Debug, Clone)]
pub struct HistoryWindow {
    capacity: usize,
    entries: VecDeque<LagMeasurement>,
}

impl HistoryWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, measurement: LagMeasurement) {
        if let Some(latest) = self.entries.back() {
            if measurement.timestamp <= latest.timestamp {
                warn!(
                    replica = %measurement.replica,
                    latest = %latest.timestamp,
                    timestamp = %measurement.timestamp,
                    "Measurement timestamp did not advance, clock may have stepped back"
                );
            }
        }
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(measurement);
    }

    pub fn latest(&self) -> Option<&LagMeasurement> {
        self.entries.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LagMeasurement> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Owned copy, oldest first
    pub fn snapshot(&self) -> Vec<LagMeasurement> {
        self.entries.iter().cloned().collect()
    }

    /// Chart series relative to the newest entry, invalid entries as gaps
    pub fn plot_points(&self) -> Vec<PlotPoint> {
        plot_points(&self.entries)
    }
}

/// Chart series of an ordered history, relative to its newest entry
///
/// Invalid measurements become `None` gaps, never zero.
pub fn plot_points<'a, I>(entries: I) -> Vec<PlotPoint>
where
    I: IntoIterator<Item = &'a LagMeasurement>,
    I::IntoIter: Clone,
{
    let entries = entries.into_iter();
    let Some(latest) = entries.clone().last() else {
        return Vec::new();
    };
    entries
        .map(|m| PlotPoint {
            seconds_ago: (latest.timestamp - m.timestamp)
                .to_std()
                .map(|d| d.as_secs_f64())
                .unwrap_or(0.0),
            delay_secs: m.lag().and_then(|lag| lag.delay_secs()),
        })
        .collect()
}
