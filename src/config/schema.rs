use std::collections::HashSet;
use std::time::Duration;

use serde::Deserialize;

use super::ConfigError;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server accepting writes
    pub primary: EndpointConfig,
    /// Servers replicating from the primary
    #[serde(default)]
    pub replicas: Vec<EndpointConfig>,
    /// Polling cadence
    #[serde(default)]
    pub poll: PollConfig,
    /// Health classification
    #[serde(default)]
    pub health: HealthConfig,
    /// In-memory lag history
    #[serde(default)]
    pub history: HistoryConfig,
    /// Prometheus exposition
    #[serde(default)]
    pub metrics: MetricsConfig,
}

// ============================================================================
// Endpoint Configuration
// ============================================================================

/// Connection settings for one monitored MySQL server
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    /// Optional display name, defaults to host:port
    #[serde(default)]
    pub name: Option<String>,
    /// Hostname or IP
    pub host: String,
    /// Port number
    #[serde(default = "default_port")]
    pub port: u16,
    /// MySQL username (needs REPLICATION CLIENT)
    pub user: String,
    /// MySQL password
    #[serde(default)]
    pub password: String,
}

fn default_port() -> u16 {
    3306
}

impl EndpointConfig {
    /// Get the address string (host:port)
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Identity used for the replica's history and metrics labels
    pub fn id(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.addr())
    }
}

// ============================================================================
// Poll Configuration
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct PollConfig {
    /// Interval between poll cycles (milliseconds)
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Timeout for one status sample, connect included (milliseconds)
    #[serde(default = "default_sample_timeout_ms")]
    pub sample_timeout_ms: u64,
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_sample_timeout_ms() -> u64 {
    3000
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            sample_timeout_ms: default_sample_timeout_ms(),
        }
    }
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn sample_timeout(&self) -> Duration {
        Duration::from_millis(self.sample_timeout_ms)
    }
}

// ============================================================================
// Health Configuration
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct HealthConfig {
    /// Trailing measurements considered by the classifier (k)
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    /// Delay at or above which a replica is Lagging (milliseconds)
    #[serde(default = "default_lagging_threshold_ms")]
    pub lagging_threshold_ms: u64,
    /// Delay sustained over the whole window that marks a replica Stalled (milliseconds)
    #[serde(default = "default_stalled_threshold_ms")]
    pub stalled_threshold_ms: u64,
    /// Binlog byte distance treated as Lagging when no delay is known
    #[serde(default)]
    pub lagging_distance: Option<u64>,
    /// Binlog byte distance treated as Stalled when no delay is known
    #[serde(default)]
    pub stalled_distance: Option<u64>,
}

fn default_window_size() -> usize {
    5
}

fn default_lagging_threshold_ms() -> u64 {
    5_000
}

fn default_stalled_threshold_ms() -> u64 {
    30_000
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            lagging_threshold_ms: default_lagging_threshold_ms(),
            stalled_threshold_ms: default_stalled_threshold_ms(),
            lagging_distance: None,
            stalled_distance: None,
        }
    }
}

// ============================================================================
// History / Metrics Configuration
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryConfig {
    /// Measurements retained per replica
    #[serde(default = "default_history_capacity")]
    pub capacity: usize,
}

fn default_history_capacity() -> usize {
    300
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: default_history_capacity(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    #[serde(default = "default_metrics_addr")]
    pub listen_addr: String,
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_metrics_addr() -> String {
    "127.0.0.1:9187".to_string()
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            listen_addr: default_metrics_addr(),
        }
    }
}

impl Default for Config {
    /// Local primary on 3306 with a single replica on 3307
    fn default() -> Self {
        Self {
            primary: EndpointConfig {
                name: None,
                host: "127.0.0.1".to_string(),
                port: 3306,
                user: "root".to_string(),
                password: String::new(),
            },
            replicas: vec![EndpointConfig {
                name: None,
                host: "127.0.0.1".to_string(),
                port: 3307,
                user: "root".to_string(),
                password: String::new(),
            }],
            poll: PollConfig::default(),
            health: HealthConfig::default(),
            history: HistoryConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Config {
    /// Check the invariants the monitor relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.replicas.is_empty() {
            return Err(ConfigError::Invalid("at least one replica is required".into()));
        }

        for endpoint in std::iter::once(&self.primary).chain(&self.replicas) {
            if endpoint.host.trim().is_empty() {
                return Err(ConfigError::InvalidEndpoint {
                    endpoint: endpoint.id(),
                    reason: "host is empty".into(),
                });
            }
            if endpoint.port == 0 {
                return Err(ConfigError::InvalidEndpoint {
                    endpoint: endpoint.id(),
                    reason: "port must be non-zero".into(),
                });
            }
        }

        let mut seen = HashSet::new();
        for replica in &self.replicas {
            if !seen.insert(replica.id()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate replica id: {}",
                    replica.id()
                )));
            }
        }

        if self.poll.interval_ms == 0 || self.poll.sample_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "poll interval and sample timeout must be non-zero".into(),
            ));
        }
        if self.health.window_size == 0 {
            return Err(ConfigError::Invalid("health.window_size must be at least 1".into()));
        }
        if self.history.capacity == 0 {
            return Err(ConfigError::Invalid("history.capacity must be at least 1".into()));
        }
        if self.history.capacity < self.health.window_size {
            return Err(ConfigError::Invalid(
                "history.capacity must hold at least health.window_size measurements".into(),
            ));
        }
        if self.health.stalled_threshold_ms < self.health.lagging_threshold_ms {
            return Err(ConfigError::Invalid(
                "stalled threshold must not be below lagging threshold".into(),
            ));
        }
        if let (Some(lagging), Some(stalled)) =
            (self.health.lagging_distance, self.health.stalled_distance)
        {
            if stalled < lagging {
                return Err(ConfigError::Invalid(
                    "stalled distance must not be below lagging distance".into(),
                ));
            }
        }
        Ok(())
    }
}
