//! Lag measurements derived from a (primary, replica) sample pair
//!
//! A measurement is either a valid [`Lag`] or an invalid reading that names
//! which side failed. Invalid readings carry no magnitude and are drawn as
//! gaps, never as zero.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::health::HealthState;
use crate::sample::{OutcomeKind, Sample};

/// Which sample of the pair invalidated a measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Primary,
    Replica,
}

/// Why a measurement is invalid
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub side: Side,
    pub kind: OutcomeKind,
    pub detail: String,
}

/// Replication lag of one replica against the primary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lag {
    /// Time between the primary's clock and the replica's last applied transaction
    pub delay: Option<Duration>,
    /// Binlog bytes the replica still has to execute (same log file only)
    pub distance: Option<u64>,
    /// A negative difference was clamped to zero
    pub clamped: bool,
}

impl Lag {
    pub fn delay_secs(&self) -> Option<f64> {
        self.delay.map(|d| d.as_secs_f64())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reading {
    Valid(Lag),
    Invalid(Failure),
}

/// Lag of one replica for one cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LagMeasurement {
    pub replica: String,
    pub timestamp: DateTime<Utc>,
    pub reading: Reading,
    /// Set by the health classifier before the measurement is stored
    pub health: HealthState,
}

impl LagMeasurement {
    pub fn is_valid(&self) -> bool {
        matches!(self.reading, Reading::Valid(_))
    }

    pub fn lag(&self) -> Option<&Lag> {
        match &self.reading {
            Reading::Valid(lag) => Some(lag),
            Reading::Invalid(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&Failure> {
        match &self.reading {
            Reading::Valid(_) => None,
            Reading::Invalid(failure) => Some(failure),
        }
    }

    /// Invalid because the primary sample failed
    pub fn primary_failed(&self) -> bool {
        matches!(&self.reading, Reading::Invalid(f) if f.side == Side::Primary)
    }

    pub fn with_health(mut self, health: HealthState) -> Self {
        self.health = health;
        self
    }
}

/// Derive the lag of `replica` against `primary` for the same cycle
///
/// The returned measurement's health is `Unknown` until classified.
pub fn compute(primary: &Sample, replica: &Sample) -> LagMeasurement {
    LagMeasurement {
        replica: replica.endpoint.clone(),
        timestamp: replica.taken_at,
        reading: reading(primary, replica),
        health: HealthState::Unknown,
    }
}

fn reading(primary: &Sample, replica: &Sample) -> Reading {
    // Primary failure takes precedence: it invalidates every replica at once
    let Some(p) = primary.outcome.report() else {
        return Reading::Invalid(Failure {
            side: Side::Primary,
            kind: primary.outcome.kind(),
            detail: primary.outcome.detail(),
        });
    };
    let Some(r) = replica.outcome.report() else {
        return Reading::Invalid(Failure {
            side: Side::Replica,
            kind: replica.outcome.kind(),
            detail: replica.outcome.detail(),
        });
    };

    let mut clamped = false;

    let delay = r.applied_at.map(|applied_at| {
        let diff = p.server_time.signed_duration_since(applied_at);
        // Negative when clocks are skewed or the replica overtook the sampled position
        diff.to_std().unwrap_or_else(|_| {
            clamped = true;
            Duration::ZERO
        })
    });

    let distance = match (&p.position, &r.position) {
        (Some(pp), Some(rp)) => pp.signed_distance_from(rp).map(|d| {
            if d < 0 {
                clamped = true;
                0
            } else {
                u64::try_from(d).unwrap_or(u64::MAX)
            }
        }),
        _ => None,
    };

    if delay.is_none() && distance.is_none() {
        return Reading::Invalid(Failure {
            side: Side::Replica,
            kind: OutcomeKind::QueryFailed,
            detail: "no comparable position between primary and replica".into(),
        });
    }

    Reading::Valid(Lag {
        delay,
        distance,
        clamped,
    })
}
