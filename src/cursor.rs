//! Driver-facing traits and the observing cursor wrappers.
//!
//! Hosts implement [`Cursor`] for their driver's cursor and [`Connection`] for the
//! connection handle that owns a [`CursorFactory`]. Cursors obtained through
//! [`Connection::cursor`] are [`ObservedCursor`]s: passed through untouched while the
//! connection is not wrapped, recorded into a [`Recorder`] once it is.

use std::sync::Arc;

use sea_orm::DbErr;

use crate::config::PanelConfig;
use crate::error::{CursorError, QueryTriggered};
use crate::event::{
    Execution, IsolationLevel, PostgresDetails, QueryEvent, Stopwatch, TransactionStatus, Vendor,
};
use crate::interceptor::CursorFactory;
use crate::params::{quote_params, Param, QuotedParams};
use crate::parser::interpolate;

/// A fetched row.
pub type Row = Vec<Param>;

/// The operations a driver cursor exposes.
pub trait Cursor {
    fn execute(&mut self, sql: &str, params: Option<&Param>) -> Result<(), DbErr>;

    fn execute_many(&mut self, sql: &str, param_list: &[Param]) -> Result<(), DbErr>;

    fn call_proc(&mut self, name: &str, params: Option<&Param>) -> Result<(), DbErr>;

    fn fetch_one(&mut self) -> Result<Option<Row>, DbErr>;

    fn fetch_all(&mut self) -> Result<Vec<Row>, DbErr> {
        let mut rows = Vec::new();
        while let Some(row) = self.fetch_one()? {
            rows.push(row);
        }
        Ok(rows)
    }

    fn close(&mut self) -> Result<(), DbErr>;

    /// Invoke a driver-specific operation not covered by this trait.
    fn forward(&mut self, operation: &str, _args: &[Param]) -> Result<Param, DbErr> {
        Err(DbErr::Custom(format!("cursor does not support `{operation}`")))
    }
}

/// Session introspection available on PostgreSQL connections.
pub trait PostgresSession {
    fn transaction_status(&self) -> TransactionStatus;

    /// May fail while the session is in an error state.
    fn isolation_level(&self) -> Result<IsolationLevel, DbErr>;

    fn encoding(&self) -> String;
}

/// A database connection whose cursors can be observed.
pub trait Connection: Sized {
    type Cursor: Cursor;

    /// Name of the connection in the host's registry.
    fn alias(&self) -> &str;

    fn vendor(&self) -> Vendor;

    /// The slot holding this connection's cursor factory.
    fn cursor_factory(&self) -> &CursorFactory<Self>;

    fn cursor_factory_mut(&mut self) -> &mut CursorFactory<Self>;

    /// Render `sql` with `params` the way the driver would have sent it.
    fn last_executed_query(
        &self,
        _cursor: &Self::Cursor,
        sql: &str,
        params: Option<&QuotedParams>,
    ) -> String {
        interpolate(sql, params)
    }

    /// PostgreSQL session introspection, for connections that support it.
    fn postgres(&self) -> Option<&dyn PostgresSession> {
        None
    }

    fn cursor(&self) -> Result<ObservedCursor<'_, Self>, DbErr> {
        self.cursor_with(&CursorArgs::default())
    }

    /// Create a cursor, forwarding driver-specific arguments to the factory.
    fn cursor_with(&self, args: &CursorArgs) -> Result<ObservedCursor<'_, Self>, DbErr> {
        self.cursor_factory().create(self, args)
    }
}

/// Optional arguments some drivers accept when creating a cursor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CursorArgs {
    /// Server-side cursor name.
    pub name: Option<String>,
    pub options: Vec<(String, Param)>,
}

impl CursorArgs {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Param>) -> Self {
        self.options.push((key.into(), value.into()));
        self
    }
}

/// Receives one event per executed statement.
pub trait Recorder: Send + Sync {
    fn record(&self, event: QueryEvent);

    /// Identifier of the transaction in flight on `alias`, if any.
    fn transaction_id(&self, _alias: &str, _status: TransactionStatus) -> Option<String> {
        None
    }

    /// Configuration read at every recorded statement.
    fn config(&self) -> &PanelConfig;
}

/// A cursor handed out by a connection's [`CursorFactory`].
pub enum ObservedCursor<'c, K: Connection> {
    /// The connection is not wrapped; calls go straight to the driver.
    Unobserved(K::Cursor),
    Normal(NormalCursor<'c, K>),
    /// Created while queries were forbidden; every operation fails.
    RaiseOnQuery(RaisingCursor),
}

impl<'c, K: Connection> ObservedCursor<'c, K> {
    pub fn execute(&mut self, sql: &str, params: Option<&Param>) -> Result<(), CursorError> {
        match self {
            ObservedCursor::Unobserved(cursor) => Ok(cursor.execute(sql, params)?),
            ObservedCursor::Normal(cursor) => cursor.execute(sql, params),
            ObservedCursor::RaiseOnQuery(cursor) => Err(cursor.trigger()),
        }
    }

    pub fn execute_many(&mut self, sql: &str, param_list: &[Param]) -> Result<(), CursorError> {
        match self {
            ObservedCursor::Unobserved(cursor) => Ok(cursor.execute_many(sql, param_list)?),
            ObservedCursor::Normal(cursor) => cursor.execute_many(sql, param_list),
            ObservedCursor::RaiseOnQuery(cursor) => Err(cursor.trigger()),
        }
    }

    pub fn call_proc(&mut self, name: &str, params: Option<&Param>) -> Result<(), CursorError> {
        match self {
            ObservedCursor::Unobserved(cursor) => Ok(cursor.call_proc(name, params)?),
            ObservedCursor::Normal(cursor) => cursor.call_proc(name, params),
            ObservedCursor::RaiseOnQuery(cursor) => Err(cursor.trigger()),
        }
    }

    pub fn fetch_one(&mut self) -> Result<Option<Row>, CursorError> {
        Ok(self.driver()?.fetch_one()?)
    }

    pub fn fetch_all(&mut self) -> Result<Vec<Row>, CursorError> {
        Ok(self.driver()?.fetch_all()?)
    }

    pub fn close(&mut self) -> Result<(), CursorError> {
        Ok(self.driver()?.close()?)
    }

    /// Forward a driver-specific operation to the underlying cursor.
    pub fn forward(&mut self, operation: &str, args: &[Param]) -> Result<Param, CursorError> {
        Ok(self.driver()?.forward(operation, args)?)
    }

    /// Run `f` with this cursor, then close it.
    ///
    /// An error from `close` is returned only if `f` itself succeeded.
    pub fn scoped<T, F>(mut self, f: F) -> Result<T, CursorError>
    where
        F: FnOnce(&mut Self) -> Result<T, CursorError>,
    {
        let result = f(&mut self);
        let closed = self.close();
        let value = result?;
        closed?;
        Ok(value)
    }

    /// The underlying driver cursor, or the triggered-query error.
    fn driver(&mut self) -> Result<&mut K::Cursor, CursorError> {
        match self {
            ObservedCursor::Unobserved(cursor) => Ok(cursor),
            ObservedCursor::Normal(cursor) => Ok(&mut cursor.cursor),
            ObservedCursor::RaiseOnQuery(cursor) => Err(cursor.trigger()),
        }
    }

    pub fn is_observed(&self) -> bool {
        !matches!(self, ObservedCursor::Unobserved(_))
    }
}

impl<'c, K: Connection> Iterator for ObservedCursor<'c, K> {
    type Item = Result<Row, CursorError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let ObservedCursor::RaiseOnQuery(cursor) = self {
            // Report the triggered query once so `for` loops terminate.
            if std::mem::replace(&mut cursor.iterated, true) {
                return None;
            }
        }
        self.fetch_one().transpose()
    }
}

/// Records every statement it executes into a [`Recorder`].
pub struct NormalCursor<'c, K: Connection> {
    cursor: K::Cursor,
    db: &'c K,
    sink: Arc<dyn Recorder>,
}

impl<'c, K: Connection> NormalCursor<'c, K> {
    pub(crate) fn new(cursor: K::Cursor, db: &'c K, sink: Arc<dyn Recorder>) -> Self {
        Self { cursor, db, sink }
    }

    pub fn execute(&mut self, sql: &str, params: Option<&Param>) -> Result<(), CursorError> {
        self.record(sql, params, |cursor| cursor.execute(sql, params))
    }

    pub fn execute_many(&mut self, sql: &str, param_list: &[Param]) -> Result<(), CursorError> {
        let recorded = Param::List(param_list.to_vec());
        self.record(sql, Some(&recorded), |cursor| {
            cursor.execute_many(sql, param_list)
        })
    }

    pub fn call_proc(&mut self, name: &str, params: Option<&Param>) -> Result<(), CursorError> {
        self.record(name, params, |cursor| cursor.call_proc(name, params))
    }

    /// Time `call`, record the statement whatever its outcome, then return the outcome.
    fn record<T>(
        &mut self,
        sql: &str,
        params: Option<&Param>,
        call: impl FnOnce(&mut K::Cursor) -> Result<T, DbErr>,
    ) -> Result<T, CursorError> {
        let stopwatch = Stopwatch::start();
        let result = call(&mut self.cursor);
        let timing = stopwatch.stop();

        let config = self.sink.config();
        let alias = self.db.alias();
        let quoted = quote_params(params);
        let rendered = self
            .db
            .last_executed_query(&self.cursor, sql, quoted.as_ref());

        let mut event = QueryEvent::capture(
            Execution {
                vendor: self.db.vendor(),
                alias,
                raw_sql: sql,
                sql: rendered,
                params,
                timing,
            },
            config,
        );
        event.postgres = self.vendor_details(alias);
        event.log(config, result.as_ref().err());
        self.sink.record(event);

        result.map_err(CursorError::from)
    }

    fn vendor_details(&self, alias: &str) -> Option<PostgresDetails> {
        match self.db.vendor() {
            Vendor::Postgresql => self
                .db
                .postgres()
                .map(|session| postgres_details(session, alias, self.sink.as_ref())),
            Vendor::Mysql | Vendor::Sqlite | Vendor::Oracle | Vendor::Unknown => None,
        }
    }
}

fn postgres_details(
    session: &dyn PostgresSession,
    alias: &str,
    sink: &dyn Recorder,
) -> PostgresDetails {
    let trans_status = session.transaction_status();
    // A session left in an error state may refuse to report its isolation level.
    let iso_level = match session.isolation_level() {
        Ok(level) => level.as_str().to_string(),
        Err(err) => {
            tracing::debug!(alias, error = %err, "isolation level unavailable");
            "unknown".to_string()
        }
    };

    PostgresDetails {
        trans_id: sink.transaction_id(alias, trans_status),
        trans_status,
        iso_level,
        encoding: session.encoding(),
    }
}

/// Stands in for a cursor created while queries were forbidden.
#[derive(Debug, Clone, Copy, Default)]
pub struct RaisingCursor {
    iterated: bool,
}

impl RaisingCursor {
    fn trigger(&self) -> CursorError {
        CursorError::QueryTriggered(QueryTriggered)
    }
}
