//! Recording wrapper for SeaORM connections.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::{
    ConnectionTrait, DatabaseConnection, DbBackend, DbErr, ExecResult, QueryResult, Statement,
};

use crate::cursor::Recorder;
use crate::error::QueryTriggered;
use crate::event::{Execution, QueryEvent, Stopwatch, Vendor, DEFAULT_ALIAS};
use crate::params::{quote_params, Param};
use crate::parser::interpolate;
use crate::recording::{self, RecordingMode};

/// A SeaORM `DatabaseConnection` whose statements are recorded into a [`Recorder`].
///
/// This wrapper implements `ConnectionTrait`, so entity queries can run against it
/// directly. Every statement is timed and recorded the same way cursor statements
/// are, including failed ones.
///
/// The thread-local [`RecordingMode`] is checked when a statement starts. With a
/// multi-threaded runtime, tasks may resume on other workers, so forbidding queries
/// through [`crate::recording::forbid_queries`] is only reliable on a current-thread
/// runtime. A triggered query is reported as a `DbErr` that
/// [`QueryTriggered::matches`] recognises.
///
/// # Example
///
/// ```rust,ignore
/// use sea_orm::Database;
/// use sql_debug_panel::prelude::*;
///
/// let panel = QueryPanel::new(PanelConfig::default());
/// let db = Database::connect("postgres://localhost/mydb").await?;
/// let recorded = db.with_recorder(panel.clone());
///
/// let users = Users::find().all(&recorded).await?;
/// println!("{}", panel.summary());
/// ```
pub struct RecordedConnection {
    inner: DatabaseConnection,
    alias: String,
    sink: Arc<dyn Recorder>,
}

impl RecordedConnection {
    /// Record statements on `connection` into `sink` under the default alias.
    pub fn new(connection: DatabaseConnection, sink: Arc<dyn Recorder>) -> Self {
        Self {
            inner: connection,
            alias: DEFAULT_ALIAS.to_string(),
            sink,
        }
    }

    /// Set the alias statements are recorded under.
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }

    /// Get a reference to the underlying `DatabaseConnection`.
    pub fn inner(&self) -> &DatabaseConnection {
        &self.inner
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Consume the wrapper and return the inner `DatabaseConnection`.
    pub fn into_inner(self) -> DatabaseConnection {
        self.inner
    }

    async fn observe<T, F>(&self, sql: &str, params: Option<Param>, call: F) -> Result<T, DbErr>
    where
        F: Future<Output = Result<T, DbErr>>,
    {
        if recording::mode() == RecordingMode::RaiseOnQuery {
            return Err(QueryTriggered.into());
        }

        let stopwatch = Stopwatch::start();
        let result = call.await;
        let timing = stopwatch.stop();

        let config = self.sink.config();
        let quoted = quote_params(params.as_ref());
        let event = QueryEvent::capture(
            Execution {
                vendor: Vendor::from(self.inner.get_database_backend()),
                alias: &self.alias,
                raw_sql: sql,
                sql: interpolate(sql, quoted.as_ref()),
                params: params.as_ref(),
                timing,
            },
            config,
        );
        event.log(config, result.as_ref().err());
        self.sink.record(event);

        result
    }
}

impl std::fmt::Debug for RecordedConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordedConnection")
            .field("inner", &self.inner)
            .field("alias", &self.alias)
            .finish_non_exhaustive()
    }
}

impl AsRef<DatabaseConnection> for RecordedConnection {
    fn as_ref(&self) -> &DatabaseConnection {
        &self.inner
    }
}

fn statement_params(stmt: &Statement) -> Option<Param> {
    stmt.values
        .as_ref()
        .map(|values| Param::List(values.0.iter().map(Param::from).collect()))
}

#[async_trait]
impl ConnectionTrait for RecordedConnection {
    fn get_database_backend(&self) -> DbBackend {
        self.inner.get_database_backend()
    }

    async fn execute(&self, stmt: Statement) -> Result<ExecResult, DbErr> {
        let sql = stmt.sql.clone();
        let params = statement_params(&stmt);
        self.observe(&sql, params, self.inner.execute(stmt)).await
    }

    async fn execute_unprepared(&self, sql: &str) -> Result<ExecResult, DbErr> {
        self.observe(sql, None, self.inner.execute_unprepared(sql))
            .await
    }

    async fn query_one(&self, stmt: Statement) -> Result<Option<QueryResult>, DbErr> {
        let sql = stmt.sql.clone();
        let params = statement_params(&stmt);
        self.observe(&sql, params, self.inner.query_one(stmt)).await
    }

    async fn query_all(&self, stmt: Statement) -> Result<Vec<QueryResult>, DbErr> {
        let sql = stmt.sql.clone();
        let params = statement_params(&stmt);
        self.observe(&sql, params, self.inner.query_all(stmt)).await
    }

    fn support_returning(&self) -> bool {
        self.inner.support_returning()
    }

    fn is_mock_connection(&self) -> bool {
        self.inner.is_mock_connection()
    }
}

/// Extension trait for easy wrapping of database connections.
pub trait RecordingExt {
    /// Record this connection's statements into `sink`.
    fn with_recorder(self, sink: Arc<dyn Recorder>) -> RecordedConnection;
}

impl RecordingExt for DatabaseConnection {
    fn with_recorder(self, sink: Arc<dyn Recorder>) -> RecordedConnection {
        RecordedConnection::new(self, sink)
    }
}
