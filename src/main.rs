use std::sync::Arc;

use anyhow::Context;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

use lagwatch::config::{self, Config};
use lagwatch::metrics::start_metrics_server;
use lagwatch::{CycleReport, MySqlDriver, Poller, Sampler, TimeSeriesStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    // Load configuration
    let config = match std::env::args().nth(1) {
        Some(path) => {
            let config = config::load_config(&path)
                .with_context(|| format!("failed to load config from {path}"))?;
            info!(path = %path, "Loaded configuration");
            config
        }
        None => load_or_default_config(),
    };

    let sampler = Sampler::new(MySqlDriver::new(), config.poll.sample_timeout());
    let store = Arc::new(TimeSeriesStore::new(config.history.capacity));
    let poller = Poller::new(&config, sampler, store)?;

    if config.metrics.enabled {
        let addr = config.metrics.listen_addr.clone();
        tokio::spawn(async move {
            if let Err(e) = start_metrics_server(&addr).await {
                error!(addr = %addr, error = %e, "Metrics server failed");
            }
        });
    }

    let presenter = tokio::spawn(present(poller.subscribe()));

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received");
                shutdown.cancel();
            }
            Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
        }
    });

    // The report channel closes once the poller is gone, ending the presenter
    poller.run(cancel).await?;
    presenter.await?;
    Ok(())
}

/// Log one line per replica for every recorded cycle
async fn present(mut reports: broadcast::Receiver<CycleReport>) {
    loop {
        match reports.recv().await {
            Ok(report) => log_report(&report),
            Err(RecvError::Lagged(missed)) => {
                warn!(missed, "Presenter fell behind, skipped cycle reports");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

fn log_report(report: &CycleReport) {
    if let Some(attached) = report.primary.attached_replicas {
        if attached < report.replicas.len() {
            warn!(
                cycle = report.cycle,
                primary = %report.primary.endpoint,
                attached,
                monitored = report.replicas.len(),
                "Fewer replicas attached to the primary than monitored"
            );
        }
    }
    for replica in &report.replicas {
        let lag = replica.latest.lag();
        info!(
            cycle = report.cycle,
            replica = %replica.replica,
            health = %replica.health,
            delay_secs = ?lag.and_then(|l| l.delay_secs()),
            distance = ?lag.and_then(|l| l.distance),
            threads = ?replica.threads.map(|t| t.to_string()),
            window = replica.window.len(),
            "Replication lag"
        );
    }
}

fn load_or_default_config() -> Config {
    // Try to load from config file
    let config_paths = ["config/lagwatch.toml", "lagwatch.toml"];

    for path in config_paths {
        match config::load_config(path) {
            Ok(config) => {
                info!(path = path, "Loaded configuration");
                return config;
            }
            Err(e) => {
                warn!(path = path, error = %e, "Failed to load config");
            }
        }
    }

    warn!("Using default configuration");
    Config::default()
}
