//! Installing and removing statement observation on a connection.
//!
//! A connection owns a [`CursorFactory`] slot. [`wrap`] replaces the factory in the
//! slot with an [`Interceptor`] that keeps the original and observes every cursor it
//! creates; [`unwrap`] puts the original back. Both are idempotent.
//!
//! Connections are owned by one thread at a time, so the slot needs no locking.

use std::fmt;
use std::sync::Arc;

use sea_orm::DbErr;

use crate::cursor::{Connection, CursorArgs, NormalCursor, ObservedCursor, RaisingCursor, Recorder};
use crate::recording::{self, RecordingMode};

/// A connection's cursor-creation function.
pub type CursorFn<K> =
    Arc<dyn Fn(&K, &CursorArgs) -> Result<<K as Connection>::Cursor, DbErr> + Send + Sync>;

/// The slot a connection creates its cursors through.
pub enum CursorFactory<K: Connection> {
    Original(CursorFn<K>),
    Intercepted(Interceptor<K>),
}

impl<K: Connection> CursorFactory<K> {
    /// Wrap a driver's cursor-creation function.
    pub fn new<F>(create: F) -> Self
    where
        F: Fn(&K, &CursorArgs) -> Result<K::Cursor, DbErr> + Send + Sync + 'static,
    {
        CursorFactory::Original(Arc::new(create))
    }

    pub fn create<'c>(&self, conn: &'c K, args: &CursorArgs) -> Result<ObservedCursor<'c, K>, DbErr> {
        match self {
            CursorFactory::Original(create) => create(conn, args).map(ObservedCursor::Unobserved),
            CursorFactory::Intercepted(interceptor) => interceptor.create(conn, args),
        }
    }

    pub fn is_intercepted(&self) -> bool {
        matches!(self, CursorFactory::Intercepted(_))
    }

    /// The driver's own factory, whether or not it is currently intercepted.
    pub fn original(&self) -> &CursorFn<K> {
        match self {
            CursorFactory::Original(create) => create,
            CursorFactory::Intercepted(interceptor) => &interceptor.original,
        }
    }

    fn intercept(&mut self, sink: Arc<dyn Recorder>) -> Option<&Interceptor<K>> {
        let original = match self {
            CursorFactory::Intercepted(_) => return None,
            CursorFactory::Original(create) => Arc::clone(create),
        };
        *self = CursorFactory::Intercepted(Interceptor { original, sink });
        match self {
            CursorFactory::Intercepted(interceptor) => Some(interceptor),
            CursorFactory::Original(_) => None,
        }
    }

    fn restore(&mut self) -> bool {
        let original = match self {
            CursorFactory::Original(_) => return false,
            CursorFactory::Intercepted(interceptor) => Arc::clone(&interceptor.original),
        };
        *self = CursorFactory::Original(original);
        true
    }
}

impl<K: Connection> fmt::Debug for CursorFactory<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CursorFactory::Original(_) => f.write_str("CursorFactory::Original"),
            CursorFactory::Intercepted(_) => f.write_str("CursorFactory::Intercepted"),
        }
    }
}

/// Creates cursors through the original factory and wraps them for observation.
pub struct Interceptor<K: Connection> {
    original: CursorFn<K>,
    sink: Arc<dyn Recorder>,
}

impl<K: Connection> Interceptor<K> {
    /// Create a cursor with the original factory, forwarding `args` untouched.
    ///
    /// The wrapper is chosen by the current thread's [`RecordingMode`].
    pub fn create<'c>(&self, conn: &'c K, args: &CursorArgs) -> Result<ObservedCursor<'c, K>, DbErr> {
        let cursor = (self.original)(conn, args)?;
        Ok(match recording::mode() {
            RecordingMode::Observe => {
                ObservedCursor::Normal(NormalCursor::new(cursor, conn, Arc::clone(&self.sink)))
            }
            RecordingMode::RaiseOnQuery => ObservedCursor::RaiseOnQuery(RaisingCursor::default()),
        })
    }

    pub fn original(&self) -> &CursorFn<K> {
        &self.original
    }

    pub fn sink(&self) -> &Arc<dyn Recorder> {
        &self.sink
    }
}

/// Install observation on `connection`, recording into `sink`.
///
/// Returns the installed interceptor, or `None` if the connection was already wrapped,
/// in which case nothing changes.
pub fn wrap<K: Connection>(connection: &mut K, sink: Arc<dyn Recorder>) -> Option<&Interceptor<K>> {
    let alias = connection.alias().to_string();
    let installed = connection.cursor_factory_mut().intercept(sink);
    match installed {
        Some(_) => tracing::debug!(alias = %alias, "cursor interception installed"),
        None => tracing::trace!(alias = %alias, "connection already wrapped"),
    }
    installed
}

/// Remove observation from `connection`, restoring its original factory.
///
/// Safe to call on a connection that is not wrapped.
pub fn unwrap<K: Connection>(connection: &mut K) {
    if connection.cursor_factory_mut().restore() {
        tracing::debug!(alias = connection.alias(), "cursor interception removed");
    }
}

/// The host's set of live connections for the current thread.
pub trait ConnectionRegistry {
    type Connection: Connection;

    fn connections(&mut self) -> impl Iterator<Item = &mut Self::Connection> + '_;
}

impl<K: Connection> ConnectionRegistry for Vec<K> {
    type Connection = K;

    fn connections(&mut self) -> impl Iterator<Item = &mut K> + '_ {
        self.iter_mut()
    }
}
