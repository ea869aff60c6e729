//! Live tests against a real primary/replica pair

use std::sync::Arc;
use std::time::Duration;

use lagwatch::{
    HealthState, MySqlDriver, OutcomeKind, Poller, Role, Sampler, ServerEndpoint, TimeSeriesStore,
};
use mysql::prelude::*;
use tokio_util::sync::CancellationToken;

use crate::{get_live_config, skip_if_not_enabled};

fn sampler() -> Sampler<MySqlDriver> {
    Sampler::new(MySqlDriver::new(), Duration::from_secs(3))
}

#[tokio::test]
async fn test_primary_sample_has_position() {
    skip_if_not_enabled!();

    let config = get_live_config();
    let sample = sampler().sample(&config.primary_endpoint()).await;
    assert_eq!(sample.outcome.kind(), OutcomeKind::Ok, "{}", sample.outcome.detail());

    let report = sample.outcome.report().unwrap();
    let position = report.position.as_ref().expect("binary logging enabled");
    assert!(position.file.contains('.'), "log file {}", position.file);
    assert!(report.applied_at.is_none());
}

#[tokio::test]
async fn test_replica_sample_has_applied_position() {
    skip_if_not_enabled!();

    let config = get_live_config();
    let sample = sampler().sample(&config.replica_endpoint()).await;
    assert_eq!(sample.outcome.kind(), OutcomeKind::Ok, "{}", sample.outcome.detail());

    let report = sample.outcome.report().unwrap();
    assert!(report.applied_at.is_some() || report.position.is_some());
    assert!(report.threads.is_some());
}

#[tokio::test]
async fn test_primary_queried_as_replica_fails() {
    skip_if_not_enabled!();

    let config = get_live_config();
    let as_replica = ServerEndpoint::new(
        "primary-as-replica",
        &config.primary_host,
        config.primary_port,
        Role::Replica,
        &config.user,
        &config.password,
    )
    .unwrap();
    let sample = sampler().sample(&as_replica).await;
    assert_eq!(sample.outcome.kind(), OutcomeKind::QueryFailed);
}

#[tokio::test]
async fn test_wrong_password_is_unreachable() {
    skip_if_not_enabled!();

    let config = get_live_config();
    let endpoint = ServerEndpoint::new(
        "primary",
        &config.primary_host,
        config.primary_port,
        Role::Primary,
        &config.user,
        "definitely-not-the-password",
    )
    .unwrap();
    let sample = sampler().sample(&endpoint).await;
    assert_eq!(sample.outcome.kind(), OutcomeKind::Unreachable);
}

#[tokio::test]
async fn test_replica_catches_up_after_writes() {
    skip_if_not_enabled!();

    let config = get_live_config();
    let mut conn = config.primary_conn();
    conn.query_drop(format!("CREATE DATABASE IF NOT EXISTS {}", config.database))
        .expect("CREATE DATABASE should succeed");
    conn.query_drop(format!(
        "CREATE TABLE IF NOT EXISTS {}.ticks (id BIGINT AUTO_INCREMENT PRIMARY KEY, note VARCHAR(64))",
        config.database
    ))
    .expect("CREATE TABLE should succeed");
    for i in 0..50 {
        conn.query_drop(format!(
            "INSERT INTO {}.ticks (note) VALUES ('tick {}')",
            config.database, i
        ))
        .expect("INSERT should succeed");
    }

    let monitor_config = config.monitor_config();
    let store = Arc::new(TimeSeriesStore::new(monitor_config.history.capacity));
    let sampler = Sampler::new(MySqlDriver::new(), monitor_config.poll.sample_timeout());
    let poller = Poller::new(&monitor_config, sampler, store.clone()).unwrap();
    let mut reports = poller.subscribe();
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(poller.run(cancel.clone()));

    let mut caught_up = false;
    for _ in 0..20 {
        let report = reports.recv().await.unwrap();
        assert!(report.primary.is_ok(), "{}", report.primary.detail);
        let replica = report.replica("replica").unwrap();
        assert_ne!(replica.health, HealthState::Disconnected);
        if replica.health == HealthState::Healthy {
            caught_up = true;
            break;
        }
    }

    cancel.cancel();
    handle.await.unwrap().unwrap();
    assert!(caught_up, "replica never became healthy");
    assert!(!store.window("replica").unwrap().is_empty());

    let _ = conn.query_drop(format!("DROP TABLE IF EXISTS {}.ticks", config.database));
}
