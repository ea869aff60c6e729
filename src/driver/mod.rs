//! Database driver capability
//!
//! The monitoring engine only needs three things from a database client:
//! open a connection, read replication status, close the connection.
//! [`MySqlDriver`] provides them over the MySQL wire protocol; tests plug in
//! scripted drivers.

mod connection;
mod mysql;

pub use connection::{ConnectionError, MySqlConnection};
pub use mysql::MySqlDriver;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::sample::{Role, ServerEndpoint};

/// Binlog coordinates: file name and byte offset within it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogPosition {
    pub file: String,
    pub offset: u64,
}

impl LogPosition {
    pub fn new(file: impl Into<String>, offset: u64) -> Self {
        Self {
            file: file.into(),
            offset,
        }
    }

    /// Signed byte distance from `other` to `self`
    ///
    /// Only defined within the same log file; offsets in different files
    /// are not comparable without the file sizes in between.
    pub fn signed_distance_from(&self, other: &LogPosition) -> Option<i128> {
        (self.file == other.file).then(|| self.offset as i128 - other.offset as i128)
    }
}

/// State of one replication thread, ordered from best to worst
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ThreadState {
    Running,
    /// Receiver thread still (re)connecting to its source
    Connecting,
    Stopped,
}

impl ThreadState {
    /// Parse a `*_IO_Running` / `*_SQL_Running` column value
    pub fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("yes") {
            ThreadState::Running
        } else if value.eq_ignore_ascii_case("connecting") {
            ThreadState::Connecting
        } else {
            ThreadState::Stopped
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ThreadState::Running => "running",
            ThreadState::Connecting => "connecting",
            ThreadState::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for ThreadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Receiver (IO) and applier (SQL) thread states of a replica
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReplicationThreads {
    pub io: ThreadState,
    pub sql: ThreadState,
}

impl ReplicationThreads {
    pub fn is_running(&self) -> bool {
        self.io == ThreadState::Running && self.sql == ThreadState::Running
    }

    /// Per-thread worst of two channels
    pub fn worst(self, other: Self) -> Self {
        Self {
            io: self.io.max(other.io),
            sql: self.sql.max(other.sql),
        }
    }
}

impl std::fmt::Display for ReplicationThreads {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "io={} sql={}", self.io, self.sql)
    }
}

/// Replication status reported by one server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    /// Server clock at the time of the query
    pub server_time: DateTime<Utc>,
    /// Write position (primary) or executed position (replica)
    pub position: Option<LogPosition>,
    /// Primary-side time of the last transaction applied by a replica
    pub applied_at: Option<DateTime<Utc>>,
    /// Replica thread states, when the server reports them
    pub threads: Option<ReplicationThreads>,
    /// Replicas registered with a primary, when the listing is permitted
    pub attached_replicas: Option<usize>,
}

/// Failure of a driver call
#[derive(Debug, Clone, thiserror::Error)]
pub enum DriverError {
    /// The server could not be reached or refused the session
    #[error("Connection failed: {0}")]
    Connection(String),
    /// The session was up but the status query did not produce a report
    #[error("Status query failed: {0}")]
    Query(String),
}

/// Connection and status-query capability used by the sampler
#[async_trait]
pub trait Driver: Send + Sync + 'static {
    type Connection: Send;

    /// Open an authenticated session to the endpoint
    async fn connect(&self, endpoint: &ServerEndpoint) -> Result<Self::Connection, DriverError>;

    /// Read the replication status appropriate for `role`
    async fn query_status(
        &self,
        conn: &mut Self::Connection,
        role: Role,
    ) -> Result<StatusReport, DriverError>;

    /// Close the session; errors are irrelevant at this point
    async fn close(&self, conn: Self::Connection);
}
