//! Replication lag monitoring engine
//!
//! Samples a primary and its replicas on a fixed interval, derives each
//! replica's lag, classifies replication health over a short trailing window
//! and keeps a bounded lag history per replica for presentation.

pub mod config;
pub mod driver;
pub mod health;
pub mod history;
pub mod lag;
pub mod metrics;
pub mod protocol;
pub mod sample;
pub mod scheduler;

pub use config::{load_config, Config, ConfigError};
pub use driver::{
    Driver, DriverError, MySqlDriver, ReplicationThreads, StatusReport, ThreadState,
};
pub use health::{classify, ClassifierConfig, HealthState};
pub use history::{HistoryWindow, PlotPoint, StoreError, TimeSeriesStore};
pub use lag::{LagMeasurement, Reading};
pub use sample::{Outcome, OutcomeKind, Role, Sample, Sampler, ServerEndpoint};
pub use scheduler::{CycleReport, MonitorError, Poller, ReplicaReport, SchedulerState};
