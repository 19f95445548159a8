//! # sql-debug-panel
//!
//! Per-request SQL recording for developer debug panels.
//!
//! This crate observes every statement a connection executes, recording the SQL, its
//! parameters, timing, the calling stack and (for PostgreSQL) transaction state, so a
//! debug toolbar can show what a request did to the database.
//!
//! ## Features
//!
//! - **Cursor Interception**: `wrap`/`unwrap` swap a connection's cursor factory for an
//!   observing proxy and back, idempotently
//! - **Recording Sink**: `QueryPanel` keeps the ordered events plus per-alias totals
//! - **Hidden Query Detection**: `forbid_queries` makes any statement on the current
//!   thread fail with `QueryTriggered`
//! - **SeaORM Support**: `RecordedConnection` records statements run through SeaORM
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sql_debug_panel::prelude::*;
//!
//! let panel = QueryPanel::new(PanelConfig::default());
//! panel.enable_instrumentation(&mut connections);
//!
//! let mut cursor = connections[0].cursor()?;
//! cursor.execute("SELECT * FROM users WHERE id = %s", Some(&Param::list([42])))?;
//!
//! panel.disable_instrumentation(&mut connections);
//! println!("{}", panel.summary()); // "1 query in 0.42ms"
//! ```
//!
//! ## Recorded Fields
//!
//! | Field | Description |
//! |-------|-------------|
//! | `vendor`, `alias` | Database engine and connection name |
//! | `sql` | Statement with quoted parameters rendered in |
//! | `raw_sql`, `raw_params` | Statement and parameters as passed to the driver |
//! | `params` | Parameters decoded to text, as JSON |
//! | `duration` | Milliseconds spent in the driver call |
//! | `stacktrace` | Calling frames, outermost first (when enabled) |
//! | `is_select`, `is_slow` | Read query and slow query flags |
//! | `trans_id`, `trans_status`, `iso_level`, `encoding` | PostgreSQL session state |

mod config;
mod connection;
mod cursor;
mod error;
mod event;
mod interceptor;
mod panel;
mod parser;
mod stack;

pub mod params;
pub mod recording;

pub use config::PanelConfig;
pub use connection::{RecordedConnection, RecordingExt};
pub use cursor::{
    Connection, Cursor, CursorArgs, NormalCursor, ObservedCursor, PostgresSession,
    RaisingCursor, Recorder, Row,
};
pub use error::{CursorError, QueryTriggered};
pub use event::{
    IsolationLevel, PostgresDetails, QueryEvent, TransactionStatus, Vendor, DEFAULT_ALIAS,
};
pub use interceptor::{unwrap, wrap, ConnectionRegistry, CursorFactory, CursorFn, Interceptor};
pub use panel::{AggregateState, DatabaseStats, PanelReport, PanelSummary, QueryPanel};
pub use params::{Param, QuotedParams};
pub use parser::{interpolate, is_select};
pub use recording::{forbid_queries, QueryBlocker, RecordingMode};
pub use stack::StackFrame;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        Connection, Cursor, CursorArgs, CursorFactory, Param, PanelConfig, QueryPanel,
        RecordedConnection, Recorder, RecordingExt, Vendor,
    };
}
