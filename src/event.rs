//! Recorded statement events.

use std::time::Instant;

use chrono::{DateTime, Utc};
use sea_orm::{DbBackend, DbErr};
use serde::Serialize;

use crate::config::PanelConfig;
use crate::params::{decode_params, serialize_params, Param};
use crate::parser::{is_select, ParsedSql};
use crate::stack::{self, StackFrame};

/// Alias reported for connections that do not name themselves.
pub const DEFAULT_ALIAS: &str = "default";

/// Database engine behind a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Vendor {
    Postgresql,
    Mysql,
    Sqlite,
    Oracle,
    Unknown,
}

impl Vendor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Vendor::Postgresql => "postgresql",
            Vendor::Mysql => "mysql",
            Vendor::Sqlite => "sqlite",
            Vendor::Oracle => "oracle",
            Vendor::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Vendor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<DbBackend> for Vendor {
    fn from(backend: DbBackend) -> Self {
        match backend {
            DbBackend::Postgres => Vendor::Postgresql,
            DbBackend::MySql => Vendor::Mysql,
            DbBackend::Sqlite => Vendor::Sqlite,
        }
    }
}

/// Transaction state of a PostgreSQL session, as reported by libpq.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Idle,
    Active,
    InTransaction,
    InError,
    Unknown,
}

impl TransactionStatus {
    pub fn is_idle(&self) -> bool {
        matches!(self, TransactionStatus::Idle)
    }
}

/// Isolation level of a PostgreSQL session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum IsolationLevel {
    Autocommit,
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
    Default,
}

impl IsolationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            IsolationLevel::Autocommit => "autocommit",
            IsolationLevel::ReadUncommitted => "read uncommitted",
            IsolationLevel::ReadCommitted => "read committed",
            IsolationLevel::RepeatableRead => "repeatable read",
            IsolationLevel::Serializable => "serializable",
            IsolationLevel::Default => "default",
        }
    }
}

/// Session details captured for PostgreSQL connections.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostgresDetails {
    pub trans_id: Option<String>,
    pub trans_status: TransactionStatus,
    /// The isolation level name, or `"unknown"` if the session could not report it.
    pub iso_level: String,
    pub encoding: String,
}

/// One executed statement.
#[derive(Debug, Clone, Serialize)]
pub struct QueryEvent {
    pub vendor: Vendor,
    pub alias: String,
    /// Statement with parameters rendered in, for display.
    pub sql: String,
    pub raw_sql: String,
    /// Decoded parameters as JSON, empty if they could not be serialized.
    pub params: String,
    pub raw_params: Option<Param>,
    /// Milliseconds spent in the driver call.
    pub duration: f64,
    pub start_time: DateTime<Utc>,
    pub stop_time: DateTime<Utc>,
    pub stacktrace: Vec<StackFrame>,
    pub is_select: bool,
    pub is_slow: bool,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub postgres: Option<PostgresDetails>,
}

/// Measures a driver call.
#[derive(Debug)]
pub(crate) struct Stopwatch {
    started_at: DateTime<Utc>,
    start: Instant,
}

/// Wall-clock bounds and duration of a finished driver call.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Timing {
    pub start_time: DateTime<Utc>,
    pub stop_time: DateTime<Utc>,
    pub duration_ms: f64,
}

impl Stopwatch {
    pub fn start() -> Self {
        Self {
            started_at: Utc::now(),
            start: Instant::now(),
        }
    }

    pub fn stop(self) -> Timing {
        let elapsed = self.start.elapsed();
        Timing {
            start_time: self.started_at,
            stop_time: Utc::now(),
            duration_ms: elapsed.as_secs_f64() * 1000.0,
        }
    }
}

/// What the recording layer saw of a single statement.
#[derive(Debug)]
pub(crate) struct Execution<'a> {
    pub vendor: Vendor,
    pub alias: &'a str,
    pub raw_sql: &'a str,
    pub sql: String,
    pub params: Option<&'a Param>,
    pub timing: Timing,
}

impl QueryEvent {
    pub(crate) fn capture(execution: Execution<'_>, config: &PanelConfig) -> Self {
        let Execution {
            vendor,
            alias,
            raw_sql,
            sql,
            params,
            timing,
        } = execution;

        let threshold_ms = config.slow_query_threshold.as_secs_f64() * 1000.0;

        Self {
            vendor,
            alias: alias.to_string(),
            sql,
            raw_sql: raw_sql.to_string(),
            params: serialize_params(&decode_params(params)),
            raw_params: params.cloned(),
            duration: timing.duration_ms,
            start_time: timing.start_time,
            stop_time: timing.stop_time,
            stacktrace: stack::capture(config),
            is_select: is_select(raw_sql),
            is_slow: timing.duration_ms > threshold_ms,
            postgres: None,
        }
    }

    /// Emit log events for this statement and, if given, the driver failure it produced.
    pub(crate) fn log(&self, config: &PanelConfig, failure: Option<&DbErr>) {
        let parsed = ParsedSql::parse(&self.raw_sql);

        tracing::debug!(
            db.system = %self.vendor,
            db.alias = %self.alias,
            db.operation = %parsed.operation,
            db.sql.table = parsed.table.as_deref().unwrap_or(""),
            duration_ms = self.duration,
            "query recorded"
        );

        if self.is_slow {
            let threshold_ms = config.slow_query_threshold.as_millis() as u64;
            tracing::warn!(
                db.alias = %self.alias,
                statement = %parsed.label(),
                duration_ms = self.duration,
                threshold_ms = threshold_ms,
                "Slow query detected"
            );
        }

        if let Some(err) = failure {
            tracing::error!(
                db.alias = %self.alias,
                statement = %parsed.label(),
                error = %err,
                "Database query failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn timing(duration_ms: f64) -> Timing {
        let now = Utc::now();
        Timing {
            start_time: now,
            stop_time: now,
            duration_ms,
        }
    }

    #[test]
    fn test_capture_fills_derived_fields() {
        let params = Param::map([("name", "O'Brien")]);
        let config = PanelConfig::lightweight();
        let event = QueryEvent::capture(
            Execution {
                vendor: Vendor::Sqlite,
                alias: "default",
                raw_sql: "  SELECT * FROM users WHERE name = :name",
                sql: "SELECT * FROM users WHERE name = 'O''Brien'".to_string(),
                params: Some(&params),
                timing: timing(12.5),
            },
            &config,
        );

        assert!(event.is_select);
        assert!(!event.is_slow);
        assert_eq!(event.params, r#"{"name":"O'Brien"}"#);
        assert_eq!(event.raw_params, Some(params));
        assert_eq!(event.duration, 12.5);
        assert!(event.stacktrace.is_empty());
        assert!(event.postgres.is_none());
    }

    #[test]
    fn test_capture_flags_slow_queries() {
        let config = PanelConfig::lightweight().with_slow_query_threshold(Duration::from_millis(10));
        let event = QueryEvent::capture(
            Execution {
                vendor: Vendor::Unknown,
                alias: "default",
                raw_sql: "DELETE FROM sessions",
                sql: "DELETE FROM sessions".to_string(),
                params: None,
                timing: timing(10.5),
            },
            &config,
        );

        assert!(event.is_slow);
        assert!(!event.is_select);
        assert_eq!(event.params, "null");
    }

    #[test]
    fn test_vendor_from_backend() {
        assert_eq!(Vendor::from(DbBackend::Postgres), Vendor::Postgresql);
        assert_eq!(Vendor::from(DbBackend::MySql).as_str(), "mysql");
    }

    #[test]
    fn test_postgres_details_flatten_into_event_json() {
        let mut event = QueryEvent::capture(
            Execution {
                vendor: Vendor::Postgresql,
                alias: "default",
                raw_sql: "SELECT 1",
                sql: "SELECT 1".to_string(),
                params: None,
                timing: timing(1.0),
            },
            &PanelConfig::lightweight(),
        );
        event.postgres = Some(PostgresDetails {
            trans_id: None,
            trans_status: TransactionStatus::InTransaction,
            iso_level: "unknown".to_string(),
            encoding: "UTF8".to_string(),
        });

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["vendor"], "postgresql");
        assert_eq!(json["trans_status"], "in_transaction");
        assert_eq!(json["iso_level"], "unknown");
    }
}
