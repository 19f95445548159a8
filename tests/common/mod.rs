//! In-memory driver used by the integration tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use sea_orm::DbErr;
use sql_debug_panel::{
    Connection, Cursor, CursorArgs, CursorFactory, IsolationLevel, Param, PostgresSession, Row,
    TransactionStatus, Vendor,
};

/// Every driver call, in order.
pub type CallLog = Arc<Mutex<Vec<String>>>;

pub struct MemoryCursor {
    log: CallLog,
    rows: VecDeque<Row>,
    closed: bool,
}

impl MemoryCursor {
    fn push(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }

    fn check(&self, sql: &str) -> Result<(), DbErr> {
        if self.closed {
            return Err(DbErr::Custom("cursor already closed".into()));
        }
        if sql.contains("broken") {
            return Err(DbErr::Custom(format!("syntax error near \"{sql}\"")));
        }
        Ok(())
    }
}

impl Cursor for MemoryCursor {
    fn execute(&mut self, sql: &str, _params: Option<&Param>) -> Result<(), DbErr> {
        self.push(format!("execute:{sql}"));
        self.check(sql)
    }

    fn execute_many(&mut self, sql: &str, param_list: &[Param]) -> Result<(), DbErr> {
        self.push(format!("execute_many:{sql}:{}", param_list.len()));
        self.check(sql)
    }

    fn call_proc(&mut self, name: &str, _params: Option<&Param>) -> Result<(), DbErr> {
        self.push(format!("call_proc:{name}"));
        self.check(name)
    }

    fn fetch_one(&mut self) -> Result<Option<Row>, DbErr> {
        self.push("fetch_one".to_string());
        Ok(self.rows.pop_front())
    }

    fn close(&mut self) -> Result<(), DbErr> {
        self.push("close".to_string());
        self.closed = true;
        Ok(())
    }

    fn forward(&mut self, operation: &str, _args: &[Param]) -> Result<Param, DbErr> {
        self.push(format!("forward:{operation}"));
        match operation {
            "rowcount" => Ok(Param::Int(self.rows.len() as i64)),
            other => Err(DbErr::Custom(format!("no attribute `{other}`"))),
        }
    }
}

/// Scripted PostgreSQL session state.
#[derive(Debug, Clone)]
pub struct FakeSession {
    pub status: TransactionStatus,
    /// When set, reading the isolation level fails as it would on an aborted session.
    pub broken: bool,
}

impl PostgresSession for FakeSession {
    fn transaction_status(&self) -> TransactionStatus {
        self.status
    }

    fn isolation_level(&self) -> Result<IsolationLevel, DbErr> {
        if self.broken {
            Err(DbErr::Custom(
                "current transaction is aborted, commands ignored until end of transaction block"
                    .into(),
            ))
        } else {
            Ok(IsolationLevel::ReadCommitted)
        }
    }

    fn encoding(&self) -> String {
        "UTF8".to_string()
    }
}

pub struct MemoryConnection {
    alias: String,
    vendor: Vendor,
    factory: CursorFactory<MemoryConnection>,
    pub log: CallLog,
    pub rows: Vec<Row>,
    pub session: Option<FakeSession>,
}

impl MemoryConnection {
    pub fn new(alias: &str, vendor: Vendor) -> Self {
        let log = CallLog::default();
        let factory_log = Arc::clone(&log);
        Self {
            alias: alias.to_string(),
            vendor,
            factory: CursorFactory::new(move |conn: &MemoryConnection, args: &CursorArgs| {
                factory_log
                    .lock()
                    .unwrap()
                    .push(format!("cursor:{}", args.name.as_deref().unwrap_or("-")));
                Ok(MemoryCursor {
                    log: Arc::clone(&factory_log),
                    rows: conn.rows.iter().cloned().collect(),
                    closed: false,
                })
            }),
            log,
            rows: Vec::new(),
            session: None,
        }
    }

    pub fn postgresql(alias: &str, status: TransactionStatus) -> Self {
        let mut conn = Self::new(alias, Vendor::Postgresql);
        conn.session = Some(FakeSession {
            status,
            broken: false,
        });
        conn
    }

    pub fn calls(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn statement_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with("execute") || c.starts_with("call_proc"))
            .collect()
    }
}

impl Connection for MemoryConnection {
    type Cursor = MemoryCursor;

    fn alias(&self) -> &str {
        &self.alias
    }

    fn vendor(&self) -> Vendor {
        self.vendor
    }

    fn cursor_factory(&self) -> &CursorFactory<Self> {
        &self.factory
    }

    fn cursor_factory_mut(&mut self) -> &mut CursorFactory<Self> {
        &mut self.factory
    }

    fn postgres(&self) -> Option<&dyn PostgresSession> {
        self.session.as_ref().map(|s| s as &dyn PostgresSession)
    }
}
