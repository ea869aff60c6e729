use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{CycleReport, MonitorError, PrimaryStatus, ReplicaReport, SchedulerState};
use crate::config::{Config, ConfigError};
use crate::driver::Driver;
use crate::health::{classify, ClassifierConfig, HealthState};
use crate::history::TimeSeriesStore;
use crate::lag::{self, LagMeasurement};
use crate::metrics::metrics;
use crate::sample::{Role, Sample, Sampler, ServerEndpoint};

/// Reports a subscriber may fall behind by before it starts losing the oldest
const REPORT_CHANNEL_CAPACITY: usize = 16;

/// Periodic driver of sample → lag → classify → store
///
/// The poller is the only writer of the history store. Cycles never overlap:
/// a cycle that overruns the interval is followed immediately by the next
/// one and missed ticks are skipped.
pub struct Poller<D> {
    sampler: Sampler<D>,
    store: Arc<TimeSeriesStore>,
    classifier: ClassifierConfig,
    interval: Duration,
    primary: ServerEndpoint,
    replicas: Vec<ServerEndpoint>,
    state_tx: watch::Sender<SchedulerState>,
    reports_tx: broadcast::Sender<CycleReport>,
}

impl<D: Driver> Poller<D> {
    /// Build a poller for the configured topology and register every replica
    /// in `store`
    pub fn new(
        config: &Config,
        sampler: Sampler<D>,
        store: Arc<TimeSeriesStore>,
    ) -> Result<Self, MonitorError> {
        config.validate()?;
        if store.capacity() < config.health.window_size {
            return Err(ConfigError::Invalid(format!(
                "store capacity {} is smaller than health.window_size {}",
                store.capacity(),
                config.health.window_size
            ))
            .into());
        }

        let primary = ServerEndpoint::from_config(&config.primary, Role::Primary)?;
        let replicas = config
            .replicas
            .iter()
            .map(|r| ServerEndpoint::from_config(r, Role::Replica))
            .collect::<Result<Vec<_>, _>>()?;

        for replica in &replicas {
            store.register(replica.id());
        }

        let (state_tx, _) = watch::channel(SchedulerState::Idle);
        let (reports_tx, _) = broadcast::channel(REPORT_CHANNEL_CAPACITY);

        Ok(Self {
            sampler,
            store,
            classifier: ClassifierConfig::from(&config.health),
            interval: config.poll.interval(),
            primary,
            replicas,
            state_tx,
            reports_tx,
        })
    }

    /// Receive a report after every recorded cycle
    pub fn subscribe(&self) -> broadcast::Receiver<CycleReport> {
        self.reports_tx.subscribe()
    }

    /// Watch the scheduler state
    pub fn state(&self) -> watch::Receiver<SchedulerState> {
        self.state_tx.subscribe()
    }

    pub fn store(&self) -> Arc<TimeSeriesStore> {
        self.store.clone()
    }

    pub fn primary(&self) -> &ServerEndpoint {
        &self.primary
    }

    pub fn replicas(&self) -> &[ServerEndpoint] {
        &self.replicas
    }

    /// Run cycles until `cancel` fires
    ///
    /// Cancellation is honoured between states. In-flight samples are never
    /// aborted; a cycle whose sampling finishes after cancellation is dropped
    /// without recording anything. Returns an error only on store misuse.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), MonitorError> {
        info!(
            primary = %self.primary.addr(),
            replicas = self.replicas.len(),
            interval_ms = self.interval.as_millis() as u64,
            timeout_ms = self.sampler.timeout().as_millis() as u64,
            "Poller started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut cycle: u64 = 0;

        let result = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break Ok(()),
                _ = ticker.tick() => {}
            }
            self.transition(SchedulerState::Idle);

            cycle += 1;
            self.transition(SchedulerState::Sampling);
            let started = Instant::now();
            let (primary, replicas) = self
                .sampler
                .sample_cycle(&self.primary, &self.replicas)
                .await;

            if cancel.is_cancelled() {
                metrics().record_dropped_cycle();
                info!(cycle, "Shutdown requested while sampling, cycle dropped");
                break Ok(());
            }

            self.transition(SchedulerState::Recording);
            match self.record(cycle, &primary, &replicas) {
                Ok(report) => {
                    metrics().record_cycle(
                        started.elapsed().as_secs_f64(),
                        report.completed_at.timestamp_millis() as f64 / 1000.0,
                    );
                    // No subscriber is fine; slow ones lose old reports
                    let _ = self.reports_tx.send(report);
                }
                Err(e) => {
                    error!(cycle, error = %e, "Failed to record cycle");
                    break Err(e);
                }
            }
            self.transition(SchedulerState::WaitingNext);
        };

        self.transition(SchedulerState::Stopped);
        info!(cycles = cycle, "Poller stopped");
        result
    }

    fn transition(&self, next: SchedulerState) {
        let previous = self.state_tx.send_replace(next);
        if previous != next {
            debug!(from = %previous, to = %next, "Scheduler state");
        }
    }

    /// Turn one cycle's samples into stored measurements
    ///
    /// Every replica is classified before the first append, so a store
    /// error leaves the cycle unrecorded.
    fn record(
        &self,
        cycle: u64,
        primary: &Sample,
        samples: &[Sample],
    ) -> Result<CycleReport, MonitorError> {
        metrics().record_sample(primary.role, primary.outcome.kind());
        if !primary.outcome.is_ok() {
            warn!(
                cycle,
                primary = %primary.endpoint,
                outcome = %primary.outcome.kind(),
                detail = %primary.outcome.detail(),
                "Primary sample failed, replicas disconnected for this cycle"
            );
        }

        let mut classified = Vec::with_capacity(samples.len());
        for sample in samples {
            metrics().record_sample(sample.role, sample.outcome.kind());
            if !sample.outcome.is_ok() {
                warn!(
                    cycle,
                    replica = %sample.endpoint,
                    outcome = %sample.outcome.kind(),
                    detail = %sample.outcome.detail(),
                    "Replica sample failed"
                );
            }
            let threads = sample.outcome.report().and_then(|report| report.threads);
            if let Some(threads) = threads.filter(|t| !t.is_running()) {
                warn!(
                    cycle,
                    replica = %sample.endpoint,
                    io = %threads.io,
                    sql = %threads.sql,
                    "Replication threads not running"
                );
            }

            let measurement = lag::compute(primary, sample);
            let mut history = self.store.window(&measurement.replica)?;
            let previous = history.last().map(|m| m.health);
            history.push(measurement.clone());
            let health = classify(&history, &self.classifier);
            classified.push((measurement.with_health(health), previous, threads));
        }

        let mut replicas = Vec::with_capacity(classified.len());
        for (measurement, previous, threads) in classified {
            let replica = measurement.replica.clone();
            self.store.append(&replica, measurement.clone())?;
            log_health_change(cycle, previous, &measurement);
            metrics().record_measurement(&measurement);

            replicas.push(ReplicaReport {
                health: measurement.health,
                window: self.store.window(&replica)?,
                latest: measurement,
                threads,
                replica,
            });
        }

        metrics().set_health_counts(&self.store.stats());

        Ok(CycleReport {
            cycle,
            completed_at: Utc::now(),
            primary: PrimaryStatus::from_sample(primary),
            replicas,
        })
    }
}

fn log_health_change(cycle: u64, previous: Option<HealthState>, measurement: &LagMeasurement) {
    if previous == Some(measurement.health) {
        return;
    }
    let from = previous.map_or("none", |h| h.as_str());
    let delay_secs = measurement.lag().and_then(|lag| lag.delay_secs());

    if measurement.health.is_healthy() || measurement.health == HealthState::Unknown {
        info!(
            cycle,
            replica = %measurement.replica,
            from,
            to = %measurement.health,
            delay_secs = ?delay_secs,
            "Replica health changed"
        );
    } else {
        warn!(
            cycle,
            replica = %measurement.replica,
            from,
            to = %measurement.health,
            delay_secs = ?delay_secs,
            "Replica health changed"
        );
    }
}
