//! Server endpoints and the per-cycle status samples taken from them

mod sampler;

pub use sampler::Sampler;

use std::fmt;

use chrono::{DateTime, Utc};

use crate::config::{ConfigError, EndpointConfig};
use crate::driver::StatusReport;

/// Role of a monitored server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Primary,
    Replica,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Primary => "primary",
            Role::Replica => "replica",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One monitored server; immutable once built
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEndpoint {
    id: String,
    host: String,
    port: u16,
    role: Role,
    user: String,
    password: String,
}

impl ServerEndpoint {
    /// Build a validated endpoint
    pub fn new(
        id: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        role: Role,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let id = id.into();
        let host = host.into();
        if host.trim().is_empty() {
            return Err(ConfigError::InvalidEndpoint {
                endpoint: id,
                reason: "host is empty".into(),
            });
        }
        if port == 0 {
            return Err(ConfigError::InvalidEndpoint {
                endpoint: id,
                reason: "port must be non-zero".into(),
            });
        }
        Ok(Self {
            id,
            host,
            port,
            role,
            user: user.into(),
            password: password.into(),
        })
    }

    pub fn from_config(config: &EndpointConfig, role: Role) -> Result<Self, ConfigError> {
        Self::new(
            config.id(),
            config.host.clone(),
            config.port,
            role,
            config.user.clone(),
            config.password.clone(),
        )
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub(crate) fn password(&self) -> &str {
        &self.password
    }

    /// Get the address string (host:port)
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Outcome category of a sample, without payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeKind {
    Ok,
    Unreachable,
    QueryFailed,
    Timeout,
}

impl OutcomeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeKind::Ok => "ok",
            OutcomeKind::Unreachable => "unreachable",
            OutcomeKind::QueryFailed => "query_failed",
            OutcomeKind::Timeout => "timeout",
        }
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one status query; expected failures live here, not in `Err`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Ok(StatusReport),
    Unreachable(String),
    QueryFailed(String),
    Timeout,
}

impl Outcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            Outcome::Ok(_) => OutcomeKind::Ok,
            Outcome::Unreachable(_) => OutcomeKind::Unreachable,
            Outcome::QueryFailed(_) => OutcomeKind::QueryFailed,
            Outcome::Timeout => OutcomeKind::Timeout,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Outcome::Ok(_))
    }

    pub fn report(&self) -> Option<&StatusReport> {
        match self {
            Outcome::Ok(report) => Some(report),
            _ => None,
        }
    }

    /// Human-readable failure detail
    pub fn detail(&self) -> String {
        match self {
            Outcome::Ok(_) => String::new(),
            Outcome::Unreachable(e) | Outcome::QueryFailed(e) => e.clone(),
            Outcome::Timeout => "sample timed out".to_string(),
        }
    }
}

/// Status of one endpoint at one instant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub endpoint: String,
    pub role: Role,
    pub taken_at: DateTime<Utc>,
    pub outcome: Outcome,
}
