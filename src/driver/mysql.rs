//! Replication status queries for MySQL primaries and replicas
//!
//! Primary: binlog write position, the server clock and the number of
//! registered replicas.
//! Replica: executed source position and `Seconds_Behind_Source`, turned into
//! the primary-side time of the last applied transaction, plus the state of
//! the IO and SQL threads.
//!
//! Both MySQL 8.4 (`SHOW BINARY LOG STATUS`, `SHOW REPLICA STATUS`,
//! `SHOW REPLICAS`) and older servers (`SHOW MASTER STATUS`,
//! `SHOW SLAVE STATUS`, `SHOW SLAVE HOSTS`) are supported; the newer
//! statement is tried first.

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use tracing::debug;

use super::connection::{ConnectionError, MySqlConnection};
use super::{Driver, DriverError, LogPosition, ReplicationThreads, StatusReport, ThreadState};
use crate::protocol::ResultSet;
use crate::sample::{Role, ServerEndpoint};

const SERVER_TIME_SQL: &str = "SELECT UNIX_TIMESTAMP(NOW(6))";
const PRIMARY_STATUS_SQL: [&str; 2] = ["SHOW BINARY LOG STATUS", "SHOW MASTER STATUS"];
const REPLICA_STATUS_SQL: [&str; 2] = ["SHOW REPLICA STATUS", "SHOW SLAVE STATUS"];
const REPLICA_HOSTS_SQL: [&str; 2] = ["SHOW REPLICAS", "SHOW SLAVE HOSTS"];

const SOURCE_FILE_COLUMNS: [&str; 2] = ["Relay_Source_Log_File", "Relay_Master_Log_File"];
const SOURCE_POS_COLUMNS: [&str; 2] = ["Exec_Source_Log_Pos", "Exec_Master_Log_Pos"];
const SECONDS_BEHIND_COLUMNS: [&str; 2] = ["Seconds_Behind_Source", "Seconds_Behind_Master"];
const IO_RUNNING_COLUMNS: [&str; 2] = ["Replica_IO_Running", "Slave_IO_Running"];
const SQL_RUNNING_COLUMNS: [&str; 2] = ["Replica_SQL_Running", "Slave_SQL_Running"];

/// [`Driver`] speaking the MySQL client protocol
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDriver;

impl MySqlDriver {
    pub fn new() -> Self {
        Self
    }

    async fn server_time(conn: &mut MySqlConnection) -> Result<DateTime<Utc>, DriverError> {
        let rs = conn.query(SERVER_TIME_SQL).await.map_err(query_error)?;
        let raw = rs
            .rows
            .first()
            .and_then(|row| row.first())
            .and_then(|v| v.as_deref())
            .ok_or_else(|| DriverError::Query("server time query returned no value".into()))?;
        parse_unix_timestamp(raw)
            .ok_or_else(|| DriverError::Query(format!("unparseable server time: {raw}")))
    }

    /// Run the first statement the server accepts
    async fn query_first_supported(
        conn: &mut MySqlConnection,
        statements: &[&str],
    ) -> Result<ResultSet, DriverError> {
        let mut last_err = None;
        for sql in statements {
            match conn.query(sql).await {
                Ok(rs) => return Ok(rs),
                // Syntax error: statement not known to this server version
                Err(ConnectionError::Server(msg)) => {
                    debug!(sql = %sql, error = %msg, "Status statement rejected, trying fallback");
                    last_err = Some(DriverError::Query(msg));
                }
                Err(e) => return Err(query_error(e)),
            }
        }
        Err(last_err.unwrap_or_else(|| DriverError::Query("no status statement".into())))
    }

    async fn primary_status(conn: &mut MySqlConnection) -> Result<StatusReport, DriverError> {
        let server_time = Self::server_time(conn).await?;
        let rs = Self::query_first_supported(conn, &PRIMARY_STATUS_SQL).await?;
        // Needs REPLICATION SLAVE; without it the count is simply unknown
        let hosts = match Self::query_first_supported(conn, &REPLICA_HOSTS_SQL).await {
            Ok(hosts) => Some(hosts),
            Err(e) => {
                debug!(error = %e, "Replica host listing unavailable");
                None
            }
        };
        Ok(primary_report(server_time, &rs, hosts.as_ref()))
    }

    async fn replica_status(conn: &mut MySqlConnection) -> Result<StatusReport, DriverError> {
        let server_time = Self::server_time(conn).await?;
        let rs = Self::query_first_supported(conn, &REPLICA_STATUS_SQL).await?;
        replica_report(server_time, &rs)
    }
}

#[async_trait]
impl Driver for MySqlDriver {
    type Connection = MySqlConnection;

    async fn connect(&self, endpoint: &ServerEndpoint) -> Result<MySqlConnection, DriverError> {
        let conn = MySqlConnection::connect(endpoint)
            .await
            .map_err(|e| DriverError::Connection(e.to_string()))?;
        debug!(
            endpoint = %endpoint.id(),
            server_version = %conn.server_version(),
            "Connected"
        );
        Ok(conn)
    }

    async fn query_status(
        &self,
        conn: &mut MySqlConnection,
        role: Role,
    ) -> Result<StatusReport, DriverError> {
        match role {
            Role::Primary => Self::primary_status(conn).await,
            Role::Replica => Self::replica_status(conn).await,
        }
    }

    async fn close(&self, conn: MySqlConnection) {
        conn.quit().await;
    }
}

fn query_error(e: ConnectionError) -> DriverError {
    DriverError::Query(e.to_string())
}

/// Parse `UNIX_TIMESTAMP(NOW(6))` output such as `1700000000.123456`
fn parse_unix_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let (secs, frac) = match raw.split_once('.') {
        Some((secs, frac)) => (secs, frac),
        None => (raw, ""),
    };
    let secs: i64 = secs.parse().ok()?;
    let nanos = if frac.is_empty() {
        0
    } else {
        // Right-pad to nanosecond precision
        let digits: String = frac.chars().chain(std::iter::repeat('0')).take(9).collect();
        digits.parse::<u32>().ok()?
    };
    DateTime::from_timestamp(secs, nanos)
}

/// Primary report from binlog status and the replica host listing
///
/// Binlog disabled leaves no position; a missing listing leaves the
/// attached replica count unknown.
fn primary_report(
    server_time: DateTime<Utc>,
    rs: &ResultSet,
    hosts: Option<&ResultSet>,
) -> StatusReport {
    let position = match (rs.first_value(&["File"]), rs.first_value(&["Position"])) {
        (Some(file), Some(pos)) => pos.parse().ok().map(|offset| LogPosition::new(file, offset)),
        _ => None,
    };
    StatusReport {
        server_time,
        position,
        applied_at: None,
        threads: None,
        attached_replicas: hosts.map(|hosts| hosts.rows.len()),
    }
}

/// One replication channel: one row of replica status
struct Channel {
    position: Option<LogPosition>,
    applied_at: Option<DateTime<Utc>>,
    threads: Option<ReplicationThreads>,
}

fn channel(server_time: DateTime<Utc>, rs: &ResultSet, row: usize) -> Channel {
    let position = match (
        rs.value(row, &SOURCE_FILE_COLUMNS),
        rs.value(row, &SOURCE_POS_COLUMNS),
    ) {
        (Some(file), Some(pos)) if !file.is_empty() => {
            pos.parse().ok().map(|offset| LogPosition::new(file, offset))
        }
        _ => None,
    };

    let applied_at = rs
        .value(row, &SECONDS_BEHIND_COLUMNS)
        .and_then(|v| v.parse::<i64>().ok())
        .and_then(TimeDelta::try_seconds)
        .and_then(|behind| server_time.checked_sub_signed(behind));

    let threads = match (
        rs.value(row, &IO_RUNNING_COLUMNS),
        rs.value(row, &SQL_RUNNING_COLUMNS),
    ) {
        (Some(io), Some(sql)) => Some(ReplicationThreads {
            io: ThreadState::parse(io),
            sql: ThreadState::parse(sql),
        }),
        _ => None,
    };

    Channel {
        position,
        applied_at,
        threads,
    }
}

/// Replica report from replica status
///
/// No status row means the server is not configured as a replica, which
/// is a query failure. NULL `Seconds_Behind_*` (SQL or IO thread stopped)
/// leaves `applied_at` empty.
///
/// A multi-source replica returns one row per channel and is reported by
/// its worst channel: the oldest applied-at time (unknown if any channel
/// has none) and the worst state per thread. Positions of different
/// channels name different sources' binlogs, so the position comes from
/// the first channel that has one, normally the default channel.
fn replica_report(server_time: DateTime<Utc>, rs: &ResultSet) -> Result<StatusReport, DriverError> {
    if rs.is_empty() {
        return Err(DriverError::Query(
            "server is not configured as a replica".into(),
        ));
    }

    let channels: Vec<Channel> = (0..rs.rows.len())
        .map(|row| channel(server_time, rs, row))
        .collect();

    let position = channels.iter().find_map(|c| c.position.clone());
    let applied_at = channels
        .iter()
        .map(|c| c.applied_at)
        .collect::<Option<Vec<_>>>()
        .and_then(|times| times.into_iter().min());
    let threads = channels
        .iter()
        .filter_map(|c| c.threads)
        .reduce(ReplicationThreads::worst);

    Ok(StatusReport {
        server_time,
        position,
        applied_at,
        threads,
        attached_replicas: None,
    })
}
