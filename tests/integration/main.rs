//! Integration test entry point
//!
//! Scenario tests run against an in-process fake driver and always run.
//! Live tests need a real primary/replica pair:
//!
//! Run with: LAGWATCH_RUN_INTEGRATION_TESTS=1 cargo test --test integration
//!
//! Environment variables:
//! - LAGWATCH_RUN_INTEGRATION_TESTS: Set to "1" to enable live tests
//! - LAGWATCH_TEST_PRIMARY_HOST / LAGWATCH_TEST_PRIMARY_PORT (default: 127.0.0.1:3306)
//! - LAGWATCH_TEST_REPLICA_HOST / LAGWATCH_TEST_REPLICA_PORT (default: 127.0.0.1:3307)
//! - LAGWATCH_TEST_USER: MySQL user on both servers, authenticating with
//!   mysql_native_password (default: root)
//! - LAGWATCH_TEST_PASS: MySQL password (default: empty)
//! - LAGWATCH_TEST_DB: Scratch database on the primary (default: lagwatch_test)

mod live;
mod scenarios;

use std::collections::HashMap;
use std::env;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use lagwatch::config::{Config, EndpointConfig};
use lagwatch::driver::{
    Driver, DriverError, LogPosition, ReplicationThreads, StatusReport, ThreadState,
};
use lagwatch::{CycleReport, MonitorError, Poller, Role, Sampler, ServerEndpoint, TimeSeriesStore};
use mysql::{OptsBuilder, Pool, PooledConn};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Check if live integration tests should run
pub fn should_run_integration_tests() -> bool {
    env::var("LAGWATCH_RUN_INTEGRATION_TESTS")
        .map(|v| v == "1")
        .unwrap_or(false)
}

/// Skip test if live integration tests are not enabled
#[macro_export]
macro_rules! skip_if_not_enabled {
    () => {
        if !crate::should_run_integration_tests() {
            eprintln!("Skipping integration test (set LAGWATCH_RUN_INTEGRATION_TESTS=1 to run)");
            return;
        }
    };
}

// ============================================================================
// Fake driver
// ============================================================================

/// Scripted behavior of one fake server, keyed by host
#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    /// Healthy primary at the given binlog offset
    Primary { offset: u64 },
    /// Replica `delay_secs` behind, executed up to `offset`
    Replica { delay_secs: i64, offset: u64 },
    /// Replica reporting a position but no delay (SQL thread stopped)
    PositionOnly { offset: u64 },
    /// Connection refused
    Down,
    /// Connects, then never answers
    Hang,
}

/// In-process driver whose servers can be re-scripted while the poller runs
#[derive(Clone, Default)]
pub struct FakeDriver {
    behaviors: Arc<Mutex<HashMap<String, Behavior>>>,
}

impl FakeDriver {
    pub fn new(behaviors: &[(&str, Behavior)]) -> Self {
        let driver = Self::default();
        for (host, behavior) in behaviors {
            driver.set(host, *behavior);
        }
        driver
    }

    pub fn set(&self, host: &str, behavior: Behavior) {
        self.behaviors.lock().insert(host.to_string(), behavior);
    }
}

#[async_trait]
impl Driver for FakeDriver {
    type Connection = Behavior;

    async fn connect(&self, endpoint: &ServerEndpoint) -> Result<Behavior, DriverError> {
        let behavior = self.behaviors.lock().get(endpoint.host()).copied();
        match behavior {
            Some(Behavior::Down) | None => Err(DriverError::Connection(format!(
                "{}: connection refused",
                endpoint.addr()
            ))),
            Some(behavior) => Ok(behavior),
        }
    }

    async fn query_status(
        &self,
        conn: &mut Behavior,
        _role: Role,
    ) -> Result<StatusReport, DriverError> {
        let now = Utc::now();
        match *conn {
            Behavior::Primary { offset } => Ok(StatusReport {
                server_time: now,
                position: Some(LogPosition::new("binlog.000001", offset)),
                applied_at: None,
                threads: None,
                attached_replicas: None,
            }),
            Behavior::Replica { delay_secs, offset } => Ok(StatusReport {
                server_time: now,
                position: Some(LogPosition::new("binlog.000001", offset)),
                applied_at: Some(now - TimeDelta::seconds(delay_secs)),
                threads: Some(ReplicationThreads {
                    io: ThreadState::Running,
                    sql: ThreadState::Running,
                }),
                attached_replicas: None,
            }),
            Behavior::PositionOnly { offset } => Ok(StatusReport {
                server_time: now,
                position: Some(LogPosition::new("binlog.000001", offset)),
                applied_at: None,
                threads: Some(ReplicationThreads {
                    io: ThreadState::Running,
                    sql: ThreadState::Stopped,
                }),
                attached_replicas: None,
            }),
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(DriverError::Query("no answer".into()))
            }
            Behavior::Down => Err(DriverError::Query("server went away".into())),
        }
    }

    async fn close(&self, _conn: Behavior) {}
}

/// Config with a `primary` host and replicas named after their hosts
pub fn scenario_config(replicas: &[&str]) -> Config {
    let mut config = Config::default();
    config.primary.host = "primary".into();
    config.replicas = replicas
        .iter()
        .map(|host| EndpointConfig {
            name: Some(host.to_string()),
            host: host.to_string(),
            port: 3306,
            user: "monitor".into(),
            password: String::new(),
        })
        .collect();
    config.poll.interval_ms = 1_000;
    config.poll.sample_timeout_ms = 500;
    config
}

/// A running poller over a fake driver
pub struct Harness {
    pub driver: FakeDriver,
    pub store: Arc<TimeSeriesStore>,
    pub reports: broadcast::Receiver<CycleReport>,
    cancel: CancellationToken,
    handle: JoinHandle<Result<(), MonitorError>>,
}

impl Harness {
    pub fn start(driver: FakeDriver, config: &Config) -> Self {
        let store = Arc::new(TimeSeriesStore::new(config.history.capacity));
        let sampler = Sampler::new(driver.clone(), config.poll.sample_timeout());
        let poller = Poller::new(config, sampler, store.clone()).expect("valid config");
        let reports = poller.subscribe();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(poller.run(cancel.clone()));
        Self {
            driver,
            store,
            reports,
            cancel,
            handle,
        }
    }

    pub async fn next(&mut self) -> CycleReport {
        self.reports.recv().await.expect("poller is running")
    }

    pub async fn stop(self) {
        self.cancel.cancel();
        self.handle
            .await
            .expect("poller task panicked")
            .expect("poller failed");
    }
}

// ============================================================================
// Live servers
// ============================================================================

/// Live primary/replica pair from environment
#[derive(Debug, Clone)]
pub struct LiveTestConfig {
    pub primary_host: String,
    pub primary_port: u16,
    pub replica_host: String,
    pub replica_port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

/// Get the live pair from environment
pub fn get_live_config() -> LiveTestConfig {
    fn port(var: &str, default: u16) -> u16 {
        env::var(var)
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(default)
    }

    LiveTestConfig {
        primary_host: env::var("LAGWATCH_TEST_PRIMARY_HOST")
            .unwrap_or_else(|_| "127.0.0.1".to_string()),
        primary_port: port("LAGWATCH_TEST_PRIMARY_PORT", 3306),
        replica_host: env::var("LAGWATCH_TEST_REPLICA_HOST")
            .unwrap_or_else(|_| "127.0.0.1".to_string()),
        replica_port: port("LAGWATCH_TEST_REPLICA_PORT", 3307),
        user: env::var("LAGWATCH_TEST_USER").unwrap_or_else(|_| "root".to_string()),
        password: env::var("LAGWATCH_TEST_PASS").unwrap_or_default(),
        database: env::var("LAGWATCH_TEST_DB").unwrap_or_else(|_| "lagwatch_test".to_string()),
    }
}

impl LiveTestConfig {
    fn endpoint(&self, name: &str, host: &str, port: u16) -> EndpointConfig {
        EndpointConfig {
            name: Some(name.to_string()),
            host: host.to_string(),
            port,
            user: self.user.clone(),
            password: self.password.clone(),
        }
    }

    /// Monitor config for the live pair
    pub fn monitor_config(&self) -> Config {
        let mut config = Config::default();
        config.primary = self.endpoint("primary", &self.primary_host, self.primary_port);
        config.replicas = vec![self.endpoint("replica", &self.replica_host, self.replica_port)];
        config.poll.interval_ms = 500;
        config.poll.sample_timeout_ms = 2_000;
        config.metrics.enabled = false;
        config
    }

    pub fn primary_endpoint(&self) -> ServerEndpoint {
        ServerEndpoint::new(
            "primary",
            &self.primary_host,
            self.primary_port,
            Role::Primary,
            &self.user,
            &self.password,
        )
        .expect("valid primary endpoint")
    }

    pub fn replica_endpoint(&self) -> ServerEndpoint {
        ServerEndpoint::new(
            "replica",
            &self.replica_host,
            self.replica_port,
            Role::Replica,
            &self.user,
            &self.password,
        )
        .expect("valid replica endpoint")
    }

    /// Get a connection to the primary, outside the monitor
    pub fn primary_conn(&self) -> PooledConn {
        let opts = OptsBuilder::new()
            .ip_or_hostname(Some(&self.primary_host))
            .tcp_port(self.primary_port)
            .user(Some(&self.user))
            .pass(Some(&self.password));
        Pool::new(opts)
            .expect("Failed to create connection pool")
            .get_conn()
            .expect("Failed to get connection")
    }
}
