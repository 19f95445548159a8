//! Error types for recorded cursors.

use sea_orm::DbErr;
use thiserror::Error;

/// Raised when a statement is attempted while queries are forbidden on this thread.
///
/// See [`crate::recording::forbid_queries`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("SQL query triggered while queries are forbidden")]
pub struct QueryTriggered;

impl QueryTriggered {
    /// Check whether a driver error is a triggered query reported through SeaORM.
    pub fn matches(err: &DbErr) -> bool {
        matches!(err, DbErr::Custom(message) if message == &QueryTriggered.to_string())
    }
}

impl From<QueryTriggered> for DbErr {
    fn from(err: QueryTriggered) -> Self {
        DbErr::Custom(err.to_string())
    }
}

/// Error returned by an observed cursor.
#[derive(Debug, Error)]
pub enum CursorError {
    /// The underlying driver call failed. The error is carried unchanged.
    #[error(transparent)]
    Driver(#[from] DbErr),

    /// The cursor was created while queries were forbidden.
    #[error(transparent)]
    QueryTriggered(#[from] QueryTriggered),
}

impl CursorError {
    pub fn is_query_triggered(&self) -> bool {
        matches!(self, CursorError::QueryTriggered(_))
    }

    /// Return the driver error, if this is one.
    pub fn into_driver(self) -> Option<DbErr> {
        match self {
            CursorError::Driver(err) => Some(err),
            CursorError::QueryTriggered(_) => None,
        }
    }
}
