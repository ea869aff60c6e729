//! Multi-cycle monitoring scenarios against the fake driver

use lagwatch::{HealthState, OutcomeKind};

use crate::{scenario_config, Behavior, FakeDriver, Harness};

fn healthy_pair() -> FakeDriver {
    FakeDriver::new(&[
        ("primary", Behavior::Primary { offset: 10_000 }),
        ("r1", Behavior::Replica { delay_secs: 1, offset: 9_800 }),
        ("r2", Behavior::Replica { delay_secs: 1, offset: 9_900 }),
    ])
}

#[tokio::test(start_paused = true)]
async fn test_sustained_outage_becomes_disconnected_then_recovers() {
    let mut harness = Harness::start(healthy_pair(), &scenario_config(&["r1", "r2"]));

    for _ in 0..2 {
        let report = harness.next().await;
        assert_eq!(report.replica("r1").unwrap().health, HealthState::Healthy);
    }

    harness.driver.set("r1", Behavior::Down);

    // k = 5: the first four failures only make the replica unknown
    for _ in 0..4 {
        let report = harness.next().await;
        let r1 = report.replica("r1").unwrap();
        assert_eq!(r1.latest.failure().unwrap().kind, OutcomeKind::Unreachable);
        assert_eq!(r1.health, HealthState::Unknown);
        assert_eq!(report.replica("r2").unwrap().health, HealthState::Healthy);
    }

    let report = harness.next().await;
    assert_eq!(report.replica("r1").unwrap().health, HealthState::Disconnected);

    harness
        .driver
        .set("r1", Behavior::Replica { delay_secs: 0, offset: 10_000 });
    let report = harness.next().await;
    let r1 = report.replica("r1").unwrap();
    assert!(r1.latest.is_valid());
    assert_eq!(r1.health, HealthState::Healthy);

    // Outage cycles stay in the chart as gaps
    let gaps = r1.plot_points().iter().filter(|p| p.delay_secs.is_none()).count();
    assert_eq!(gaps, 5);

    harness.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_growing_lag_becomes_stalled() {
    let mut harness = Harness::start(healthy_pair(), &scenario_config(&["r1", "r2"]));

    let report = harness.next().await;
    assert_eq!(report.replica("r1").unwrap().health, HealthState::Healthy);

    harness
        .driver
        .set("r1", Behavior::Replica { delay_secs: 45, offset: 1_000 });

    // Above the stalled threshold but fewer than k samples so far
    for _ in 0..4 {
        let report = harness.next().await;
        assert_eq!(report.replica("r1").unwrap().health, HealthState::Lagging);
    }

    let report = harness.next().await;
    let r1 = report.replica("r1").unwrap();
    assert_eq!(r1.health, HealthState::Stalled);
    assert_eq!(r1.latest.lag().unwrap().distance, Some(9_000));
    assert_eq!(harness.store.stats().stalled, 1);
    assert_eq!(harness.store.stats().healthy, 1);

    // One sample back under the lagging threshold clears it at once
    harness
        .driver
        .set("r1", Behavior::Replica { delay_secs: 2, offset: 9_990 });
    let report = harness.next().await;
    assert_eq!(report.replica("r1").unwrap().health, HealthState::Healthy);

    harness.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_primary_outage_disconnects_every_replica() {
    let mut harness = Harness::start(healthy_pair(), &scenario_config(&["r1", "r2"]));
    harness.next().await;

    harness.driver.set("primary", Behavior::Hang);
    let report = harness.next().await;
    assert_eq!(report.primary.outcome, OutcomeKind::Timeout);
    for replica in &report.replicas {
        assert!(replica.latest.primary_failed());
        assert_eq!(replica.health, HealthState::Disconnected);
    }
    assert_eq!(harness.store.stats().disconnected, 2);

    harness
        .driver
        .set("primary", Behavior::Primary { offset: 10_000 });
    let report = harness.next().await;
    assert!(report.primary.is_ok());
    for replica in &report.replicas {
        assert_eq!(replica.health, HealthState::Healthy);
    }

    harness.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_history_stays_bounded() {
    let mut config = scenario_config(&["r1"]);
    config.history.capacity = 8;
    let mut harness = Harness::start(healthy_pair(), &config);

    let mut last = None;
    for _ in 0..20 {
        last = Some(harness.next().await);
    }
    let report = last.unwrap();
    assert_eq!(report.cycle, 20);
    assert_eq!(report.replica("r1").unwrap().window.len(), 8);
    assert_eq!(harness.store.window("r1").unwrap().len(), 8);

    let window = harness.store.window("r1").unwrap();
    assert!(window.windows(2).all(|w| w[0].timestamp < w[1].timestamp));

    harness.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_distance_only_replica_uses_distance_thresholds() {
    let mut config = scenario_config(&["r1"]);
    config.health.lagging_distance = Some(1_000);
    let driver = FakeDriver::new(&[
        ("primary", Behavior::Primary { offset: 50_000 }),
        ("r1", Behavior::PositionOnly { offset: 40_000 }),
    ]);
    let mut harness = Harness::start(driver, &config);

    let report = harness.next().await;
    let r1 = report.replica("r1").unwrap();
    let lag = r1.latest.lag().unwrap();
    assert_eq!(lag.delay, None);
    assert_eq!(lag.distance, Some(10_000));
    assert_eq!(r1.health, HealthState::Lagging);
    assert!(!r1.threads.unwrap().is_running());
    // No delay means nothing to chart
    assert_eq!(r1.plot_points()[0].delay_secs, None);

    harness.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_replica_ahead_of_primary_is_clamped() {
    let driver = FakeDriver::new(&[
        ("primary", Behavior::Primary { offset: 10_000 }),
        ("r1", Behavior::Replica { delay_secs: -30, offset: 12_000 }),
    ]);
    let mut harness = Harness::start(driver, &scenario_config(&["r1"]));

    let report = harness.next().await;
    let lag = *report.replica("r1").unwrap().latest.lag().unwrap();
    assert!(lag.clamped);
    assert_eq!(lag.distance, Some(0));
    assert_eq!(lag.delay.map(|d| d.as_secs()), Some(0));
    assert_eq!(report.replica("r1").unwrap().health, HealthState::Healthy);

    harness.stop().await;
}
