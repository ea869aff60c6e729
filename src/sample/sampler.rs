use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tracing::debug;

use super::{Outcome, Role, Sample, ServerEndpoint};
use crate::driver::{Driver, DriverError, StatusReport};

/// Takes one bounded status sample per endpoint
///
/// Never fails: connection errors, query errors and timeouts are folded into
/// the sample's [`Outcome`].
pub struct Sampler<D> {
    driver: Arc<D>,
    timeout: Duration,
}

impl<D> Clone for Sampler<D> {
    fn clone(&self) -> Self {
        Self {
            driver: self.driver.clone(),
            timeout: self.timeout,
        }
    }
}

impl<D: Driver> Sampler<D> {
    pub fn new(driver: D, timeout: Duration) -> Self {
        Self::with_driver(Arc::new(driver), timeout)
    }

    pub fn with_driver(driver: Arc<D>, timeout: Duration) -> Self {
        Self { driver, timeout }
    }

    /// Per-sample timeout, connect included
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Sample a single endpoint
    pub async fn sample(&self, endpoint: &ServerEndpoint) -> Sample {
        let taken_at = Utc::now();

        let outcome = match tokio::time::timeout(self.timeout, self.query(endpoint)).await {
            Ok(Ok(report)) => Self::check_report(endpoint.role(), report),
            Ok(Err(DriverError::Connection(e))) => Outcome::Unreachable(e),
            Ok(Err(DriverError::Query(e))) => Outcome::QueryFailed(e),
            Err(_) => Outcome::Timeout,
        };

        if outcome.is_ok() {
            debug!(endpoint = %endpoint.id(), role = %endpoint.role(), "Sample ok");
        } else {
            debug!(
                endpoint = %endpoint.id(),
                role = %endpoint.role(),
                outcome = %outcome.kind(),
                detail = %outcome.detail(),
                "Sample failed"
            );
        }

        Sample {
            endpoint: endpoint.id().to_string(),
            role: endpoint.role(),
            taken_at,
            outcome,
        }
    }

    /// Sample the primary and every replica concurrently
    ///
    /// Returns once all samples are in, replicas in input order.
    pub async fn sample_cycle(
        &self,
        primary: &ServerEndpoint,
        replicas: &[ServerEndpoint],
    ) -> (Sample, Vec<Sample>) {
        futures::join!(
            self.sample(primary),
            join_all(replicas.iter().map(|r| self.sample(r)))
        )
    }

    async fn query(&self, endpoint: &ServerEndpoint) -> Result<StatusReport, DriverError> {
        let mut conn = self.driver.connect(endpoint).await?;
        let result = self.driver.query_status(&mut conn, endpoint.role()).await;
        self.driver.close(conn).await;
        result
    }

    /// A replica must report something comparable against the primary
    fn check_report(role: Role, report: StatusReport) -> Outcome {
        if role == Role::Replica && report.applied_at.is_none() && report.position.is_none() {
            return Outcome::QueryFailed("replica reports no applied position".into());
        }
        Outcome::Ok(report)
    }
}
