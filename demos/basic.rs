//! Basic example showing how to record queries for a debug panel.
//!
//! Run with: cargo run --example basic

use std::collections::BTreeMap;
use std::time::Duration;

use sea_orm::{ConnectionTrait, DatabaseBackend, MockDatabase, MockExecResult, Statement, Value};
use sql_debug_panel::prelude::*;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,sql_debug_panel=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // A mock database stands in for a real server so the example runs anywhere.
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![BTreeMap::from([
            ("id", Value::Int(Some(42))),
            ("name", Value::from("O'Brien")),
        ])]])
        .append_exec_results([MockExecResult {
            last_insert_id: 0,
            rows_affected: 1,
        }])
        .into_connection();

    // One panel per request.
    let panel = QueryPanel::new(
        PanelConfig::development().with_slow_query_threshold(Duration::from_millis(250)),
    );
    let recorded = db.with_recorder(panel.clone());

    recorded
        .query_all(Statement::from_sql_and_values(
            DatabaseBackend::Postgres,
            "SELECT id, name FROM users WHERE name = $1",
            [Value::from("O'Brien")],
        ))
        .await?;

    recorded
        .execute(Statement::from_sql_and_values(
            DatabaseBackend::Postgres,
            "UPDATE users SET last_seen = now() WHERE id = $1",
            [Value::Int(Some(42))],
        ))
        .await?;

    tracing::info!(summary = %panel.summary(), "request finished");

    for event in panel.queries() {
        println!("[{}] {:.3}ms  {}", event.alias, event.duration, event.sql);
    }
    println!("{}", serde_json::to_string_pretty(&panel.report())?);

    Ok(())
}
