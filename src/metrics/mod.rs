//! Prometheus metrics for the replication monitor
//!
//! Exposes metrics via HTTP endpoint for Prometheus scraping.

use prometheus::core::Collector;
use prometheus::{
    Gauge, GaugeVec, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    Opts, Registry,
};
use std::sync::OnceLock;

use crate::health::HealthState;
use crate::history::StoreStats;
use crate::lag::LagMeasurement;
use crate::sample::{OutcomeKind, Role};

/// Global metrics registry
static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Get the global metrics instance
pub fn metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::new)
}

/// Monitor metrics collection
pub struct Metrics {
    /// Registry for all metrics
    pub registry: Registry,

    // Sampling
    /// Samples taken by role and outcome
    pub samples_total: IntCounterVec,

    // Cycles
    /// Poll cycles fully recorded
    pub cycles_total: IntCounter,
    /// Poll cycles sampled but dropped on cancellation
    pub cycles_dropped_total: IntCounter,
    /// Sampling + recording time of one cycle
    pub cycle_duration_seconds: Histogram,
    /// Unix time of the last recorded cycle
    pub last_cycle_timestamp: Gauge,

    // Replication
    /// Latest valid delay per replica (absent while invalid)
    pub replica_lag_seconds: GaugeVec,
    /// Latest binlog distance per replica (absent while unknown)
    pub replica_lag_bytes: IntGaugeVec,
    /// 1 for the current health state of each replica, 0 for the others
    pub replica_health: IntGaugeVec,
    /// Replicas per health state
    pub replicas_by_health: IntGaugeVec,
    /// Number of monitored replicas
    pub replicas: IntGauge,
}

fn register<C: Collector + Clone + 'static>(registry: &Registry, collector: C) -> C {
    registry.register(Box::new(collector.clone())).unwrap();
    collector
}

impl Metrics {
    /// Create a new metrics collection
    pub fn new() -> Self {
        let registry = Registry::new();

        let samples_total = register(
            &registry,
            IntCounterVec::new(
                Opts::new("lagwatch_samples_total", "Status samples taken"),
                &["role", "outcome"],
            )
            .unwrap(),
        );

        let cycles_total = register(
            &registry,
            IntCounter::new("lagwatch_cycles_total", "Poll cycles recorded").unwrap(),
        );

        let cycles_dropped_total = register(
            &registry,
            IntCounter::new(
                "lagwatch_cycles_dropped_total",
                "Poll cycles sampled but not recorded because of shutdown",
            )
            .unwrap(),
        );

        let cycle_duration_seconds = register(
            &registry,
            Histogram::with_opts(
                HistogramOpts::new(
                    "lagwatch_cycle_duration_seconds",
                    "Time to sample and record one poll cycle",
                )
                .buckets(vec![
                    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
                ]),
            )
            .unwrap(),
        );

        let last_cycle_timestamp = register(
            &registry,
            Gauge::new(
                "lagwatch_last_cycle_timestamp_seconds",
                "Unix time of the last recorded poll cycle",
            )
            .unwrap(),
        );

        let replica_lag_seconds = register(
            &registry,
            GaugeVec::new(
                Opts::new(
                    "lagwatch_replica_lag_seconds",
                    "Replication delay of the latest valid measurement",
                ),
                &["replica"],
            )
            .unwrap(),
        );

        let replica_lag_bytes = register(
            &registry,
            IntGaugeVec::new(
                Opts::new(
                    "lagwatch_replica_lag_bytes",
                    "Binlog bytes the replica has yet to execute",
                ),
                &["replica"],
            )
            .unwrap(),
        );

        let replica_health = register(
            &registry,
            IntGaugeVec::new(
                Opts::new("lagwatch_replica_health", "Current health state per replica"),
                &["replica", "state"],
            )
            .unwrap(),
        );

        let replicas_by_health = register(
            &registry,
            IntGaugeVec::new(
                Opts::new("lagwatch_replicas", "Replicas per health state"),
                &["state"],
            )
            .unwrap(),
        );

        let replicas = register(
            &registry,
            IntGauge::new("lagwatch_replicas_monitored", "Monitored replicas").unwrap(),
        );

        Self {
            registry,
            samples_total,
            cycles_total,
            cycles_dropped_total,
            cycle_duration_seconds,
            last_cycle_timestamp,
            replica_lag_seconds,
            replica_lag_bytes,
            replica_health,
            replicas_by_health,
            replicas,
        }
    }

    /// Record a sample outcome
    pub fn record_sample(&self, role: Role, outcome: OutcomeKind) {
        self.samples_total
            .with_label_values(&[role.as_str(), outcome.as_str()])
            .inc();
    }

    /// Record a recorded cycle
    pub fn record_cycle(&self, duration_secs: f64, completed_at_secs: f64) {
        self.cycles_total.inc();
        self.cycle_duration_seconds.observe(duration_secs);
        self.last_cycle_timestamp.set(completed_at_secs);
    }

    /// Record a cycle dropped on cancellation
    pub fn record_dropped_cycle(&self) {
        self.cycles_dropped_total.inc();
    }

    /// Update the per-replica gauges from its newest measurement
    pub fn record_measurement(&self, measurement: &LagMeasurement) {
        let replica = measurement.replica.as_str();

        match measurement.lag().and_then(|lag| lag.delay_secs()) {
            Some(secs) => self.replica_lag_seconds.with_label_values(&[replica]).set(secs),
            None => {
                // Gaps stay gaps: drop the series instead of reporting a stale value
                let _ = self.replica_lag_seconds.remove_label_values(&[replica]);
            }
        }

        match measurement.lag().and_then(|lag| lag.distance) {
            Some(bytes) => self
                .replica_lag_bytes
                .with_label_values(&[replica])
                .set(i64::try_from(bytes).unwrap_or(i64::MAX)),
            None => {
                let _ = self.replica_lag_bytes.remove_label_values(&[replica]);
            }
        }

        for state in HealthState::ALL {
            let value = i64::from(state == measurement.health);
            self.replica_health
                .with_label_values(&[replica, state.as_str()])
                .set(value);
        }
    }

    /// Update health state counts
    pub fn set_health_counts(&self, stats: &StoreStats) {
        self.replicas.set(stats.total as i64);
        for state in HealthState::ALL {
            self.replicas_by_health
                .with_label_values(&[state.as_str()])
                .set(stats.count(state) as i64);
        }
    }

    /// Get metrics as Prometheus text format
    pub fn gather(&self) -> String {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::warn!(error = %e, "Failed to encode metrics");
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Start the metrics HTTP server
pub async fn start_metrics_server(addr: &str) -> anyhow::Result<()> {
    use http_body_util::Full;
    use hyper::body::Bytes;
    use hyper::server::conn::http1;
    use hyper::service::service_fn;
    use hyper::{Request, Response, StatusCode};
    use hyper_util::rt::TokioIo;
    use std::convert::Infallible;
    use std::net::SocketAddr;
    use tokio::net::TcpListener;
    use tracing::{error, info};

    fn respond(status: StatusCode, body: String) -> Response<Full<Bytes>> {
        let mut response = Response::new(Full::new(Bytes::from(body)));
        *response.status_mut() = status;
        response
    }

    async fn handle_request(
        req: Request<hyper::body::Incoming>,
    ) -> Result<Response<Full<Bytes>>, Infallible> {
        match req.uri().path() {
            "/metrics" => {
                let mut response = respond(StatusCode::OK, metrics().gather());
                response.headers_mut().insert(
                    hyper::header::CONTENT_TYPE,
                    hyper::header::HeaderValue::from_static(
                        "text/plain; version=0.0.4; charset=utf-8",
                    ),
                );
                Ok(response)
            }
            "/health" => Ok(respond(StatusCode::OK, "OK".to_string())),
            _ => Ok(respond(StatusCode::NOT_FOUND, "Not Found".to_string())),
        }
    }

    let addr: SocketAddr = addr.parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "Metrics server listening");

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);

        tokio::spawn(async move {
            if let Err(e) = http1::Builder::new()
                .serve_connection(io, service_fn(handle_request))
                .await
            {
                error!(error = %e, "Metrics server connection error");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;

    use super::*;
    use crate::lag::{Failure, Lag, Reading, Side};

    fn measurement(replica: &str, reading: Reading, health: HealthState) -> LagMeasurement {
        LagMeasurement {
            replica: replica.into(),
            timestamp: Utc::now(),
            reading,
            health,
        }
    }

    #[test]
    fn test_record_measurement_sets_and_clears_lag() {
        let m = Metrics::new();
        m.record_measurement(&measurement(
            "r1",
            Reading::Valid(Lag {
                delay: Some(Duration::from_millis(2500)),
                distance: Some(512),
                clamped: false,
            }),
            HealthState::Healthy,
        ));
        assert_eq!(m.replica_lag_seconds.with_label_values(&["r1"]).get(), 2.5);
        assert_eq!(m.replica_lag_bytes.with_label_values(&["r1"]).get(), 512);
        assert_eq!(
            m.replica_health.with_label_values(&["r1", "healthy"]).get(),
            1
        );

        m.record_measurement(&measurement(
            "r1",
            Reading::Invalid(Failure {
                side: Side::Replica,
                kind: OutcomeKind::Timeout,
                detail: String::new(),
            }),
            HealthState::Unknown,
        ));
        let text = m.gather();
        assert!(!text.contains("lagwatch_replica_lag_seconds{"));
        assert_eq!(
            m.replica_health.with_label_values(&["r1", "healthy"]).get(),
            0
        );
        assert_eq!(
            m.replica_health.with_label_values(&["r1", "unknown"]).get(),
            1
        );
    }

    #[test]
    fn test_gather_contains_counters() {
        let m = Metrics::new();
        m.record_sample(Role::Replica, OutcomeKind::Timeout);
        m.record_cycle(0.2, 1_700_000_000.0);
        m.record_dropped_cycle();
        let text = m.gather();
        assert!(text.contains("lagwatch_samples_total{outcome=\"timeout\",role=\"replica\"} 1"));
        assert!(text.contains("lagwatch_cycles_total 1"));
        assert!(text.contains("lagwatch_cycles_dropped_total 1"));
    }

    #[test]
    fn test_health_counts() {
        let m = Metrics::new();
        m.set_health_counts(&StoreStats {
            total: 3,
            healthy: 2,
            stalled: 1,
            ..StoreStats::default()
        });
        assert_eq!(m.replicas.get(), 3);
        assert_eq!(m.replicas_by_health.with_label_values(&["healthy"]).get(), 2);
        assert_eq!(m.replicas_by_health.with_label_values(&["stalled"]).get(), 1);
        assert_eq!(m.replicas_by_health.with_label_values(&["lagging"]).get(), 0);
    }
}
