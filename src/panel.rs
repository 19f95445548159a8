//! The recording sink a debug panel reads from.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use uuid::Uuid;

use crate::config::PanelConfig;
use crate::cursor::Recorder;
use crate::event::{QueryEvent, TransactionStatus};
use crate::interceptor::{self, ConnectionRegistry};

/// Time and statement count for one connection alias.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DatabaseStats {
    pub time_spent: f64,
    pub num_queries: usize,
}

/// Running totals over every recorded statement.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregateState {
    /// Total milliseconds spent in driver calls.
    pub sql_time: f64,
    pub num_queries: usize,
    pub databases: BTreeMap<String, DatabaseStats>,
}

impl AggregateState {
    fn add(&mut self, alias: &str, duration: f64) {
        let stats = self.databases.entry(alias.to_string()).or_default();
        stats.time_spent += duration;
        stats.num_queries += 1;
        self.sql_time += duration;
        self.num_queries += 1;
    }
}

/// Headline numbers for the panel's navigation entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PanelSummary {
    pub count: usize,
    pub time: f64,
}

impl fmt::Display for PanelSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let noun = if self.count == 1 { "query" } else { "queries" };
        write!(f, "{} {} in {:.2}ms", self.count, noun, self.time)
    }
}

/// Everything the panel recorded, ready for rendering.
#[derive(Debug, Clone, Serialize)]
pub struct PanelReport {
    #[serde(flatten)]
    pub aggregate: AggregateState,
    pub queries: Vec<QueryEvent>,
}

#[derive(Debug, Default)]
struct PanelState {
    queries: Vec<QueryEvent>,
    aggregate: AggregateState,
    transaction_status: HashMap<String, TransactionStatus>,
    transaction_ids: HashMap<String, String>,
}

/// Collects the statements executed during one observation window.
///
/// Create one per request, [enable](QueryPanel::enable_instrumentation) it on the
/// thread's connections, and read it back once the request is done.
///
/// # Example
///
/// ```rust,ignore
/// let panel = QueryPanel::new(PanelConfig::default());
/// panel.enable_instrumentation(&mut connections);
/// handle_request(&connections)?;
/// panel.disable_instrumentation(&mut connections);
///
/// println!("{}", panel.summary());
/// ```
#[derive(Debug)]
pub struct QueryPanel {
    config: PanelConfig,
    state: Mutex<PanelState>,
}

impl QueryPanel {
    pub fn new(config: PanelConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            state: Mutex::new(PanelState::default()),
        })
    }

    /// Observe every connection in `registry`, recording into this panel.
    pub fn enable_instrumentation<R: ConnectionRegistry>(self: &Arc<Self>, registry: &mut R) {
        for connection in registry.connections() {
            let sink: Arc<dyn Recorder> = Arc::clone(self) as Arc<dyn Recorder>;
            interceptor::wrap(connection, sink);
        }
    }

    pub fn disable_instrumentation<R: ConnectionRegistry>(&self, registry: &mut R) {
        for connection in registry.connections() {
            interceptor::unwrap(connection);
        }
    }

    /// Recorded statements, in execution order.
    pub fn queries(&self) -> Vec<QueryEvent> {
        self.lock().queries.clone()
    }

    pub fn aggregate(&self) -> AggregateState {
        self.lock().aggregate.clone()
    }

    pub fn summary(&self) -> PanelSummary {
        let state = self.lock();
        PanelSummary {
            count: state.aggregate.num_queries,
            time: state.aggregate.sql_time,
        }
    }

    pub fn report(&self) -> PanelReport {
        let state = self.lock();
        PanelReport {
            aggregate: state.aggregate.clone(),
            queries: state.queries.clone(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PanelState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Recorder for QueryPanel {
    fn record(&self, event: QueryEvent) {
        let mut state = self.lock();
        state.aggregate.add(&event.alias, event.duration);
        state.queries.push(event);
    }

    /// A new id is minted whenever `alias` leaves the idle state; it is reused until
    /// the session is idle again.
    fn transaction_id(&self, alias: &str, status: TransactionStatus) -> Option<String> {
        let mut state = self.lock();
        let last = state.transaction_status.insert(alias.to_string(), status);

        if status.is_idle() {
            return None;
        }
        match last {
            Some(last) if !last.is_idle() => state.transaction_ids.get(alias).cloned(),
            _ => {
                let id = Uuid::new_v4().simple().to_string();
                state.transaction_ids.insert(alias.to_string(), id.clone());
                Some(id)
            }
        }
    }

    fn config(&self) -> &PanelConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Vendor;
    use chrono::Utc;

    fn event(alias: &str, duration: f64) -> QueryEvent {
        let now = Utc::now();
        QueryEvent {
            vendor: Vendor::Sqlite,
            alias: alias.to_string(),
            sql: "SELECT 1".to_string(),
            raw_sql: "SELECT 1".to_string(),
            params: "null".to_string(),
            raw_params: None,
            duration,
            start_time: now,
            stop_time: now,
            stacktrace: Vec::new(),
            is_select: true,
            is_slow: false,
            postgres: None,
        }
    }

    #[test]
    fn test_record_aggregates_per_alias() {
        let panel = QueryPanel::new(PanelConfig::default());
        panel.record(event("default", 1.5));
        panel.record(event("replica", 2.0));
        panel.record(event("default", 0.5));

        let aggregate = panel.aggregate();
        assert_eq!(aggregate.num_queries, 3);
        assert_eq!(aggregate.sql_time, 4.0);
        assert_eq!(
            aggregate.databases["default"],
            DatabaseStats {
                time_spent: 2.0,
                num_queries: 2
            }
        );
        assert_eq!(aggregate.databases["replica"].num_queries, 1);

        let aliases: Vec<String> = panel.queries().into_iter().map(|q| q.alias).collect();
        assert_eq!(aliases, vec!["default", "replica", "default"]);
    }

    #[test]
    fn test_summary_display() {
        let panel = QueryPanel::new(PanelConfig::default());
        assert_eq!(panel.summary().to_string(), "0 queries in 0.00ms");
        panel.record(event("default", 1.234));
        assert_eq!(panel.summary().to_string(), "1 query in 1.23ms");
    }

    #[test]
    fn test_transaction_ids_follow_status_transitions() {
        let panel = QueryPanel::new(PanelConfig::default());

        assert_eq!(panel.transaction_id("default", TransactionStatus::Idle), None);
        let first = panel
            .transaction_id("default", TransactionStatus::InTransaction)
            .unwrap();
        assert_eq!(first.len(), 32);
        assert_eq!(
            panel.transaction_id("default", TransactionStatus::InTransaction),
            Some(first.clone())
        );
        assert_eq!(panel.transaction_id("default", TransactionStatus::Idle), None);

        let second = panel
            .transaction_id("default", TransactionStatus::Active)
            .unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_transaction_ids_are_per_alias() {
        let panel = QueryPanel::new(PanelConfig::default());
        let a = panel.transaction_id("a", TransactionStatus::InTransaction);
        let b = panel.transaction_id("b", TransactionStatus::InTransaction);
        assert!(a.is_some() && b.is_some());
        assert_ne!(a, b);
    }

    #[test]
    fn test_report_serializes_totals_and_queries() {
        let panel = QueryPanel::new(PanelConfig::default());
        panel.record(event("default", 3.0));

        let json = serde_json::to_value(panel.report()).unwrap();
        assert_eq!(json["num_queries"], 1);
        assert_eq!(json["databases"]["default"]["time_spent"], 3.0);
        assert_eq!(json["queries"][0]["raw_sql"], "SELECT 1");
    }
}
