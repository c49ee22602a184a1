use anyhow::Result;
use rusqlite::Connection;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use sqlmate::configuration::DATABASE_ENV;
use sqlmate::executor::ToolExecutor;
use sqlmate::models::tool::ToolCall;
use sqlmate::session::{SessionParams, ToolSession};
use sqlmate::systems::{StdioSystem, System};

fn seeded_database() -> Result<TempDir> {
    let dir = tempfile::tempdir()?;
    let conn = Connection::open(dir.path().join("shop.db"))?;
    conn.execute_batch(
        "CREATE TABLE products (id INTEGER PRIMARY KEY, name TEXT NOT NULL, price REAL);
         INSERT INTO products (name, price) VALUES ('kettle', 25.0);
         INSERT INTO products (name, price) VALUES ('teapot', 40.0);",
    )?;
    Ok(dir)
}

async fn connect(dir: &TempDir) -> Result<(Arc<ToolSession>, ToolExecutor)> {
    connect_with_args(dir, &[]).await
}

async fn connect_with_args(
    dir: &TempDir,
    args: &[&str],
) -> Result<(Arc<ToolSession>, ToolExecutor)> {
    let params = SessionParams::new(env!("CARGO_BIN_EXE_sqlmate-tools"))
        .with_args(args.iter().copied())
        .with_env(DATABASE_ENV, dir.path().join("shop.db").display().to_string())
        .with_env("RUST_LOG", "debug")
        .with_timeout(Duration::from_secs(10));
    let session = Arc::new(ToolSession::initialize(params).await?);
    let system = StdioSystem::connect(session.clone()).await?;
    Ok((session, ToolExecutor::new(Arc::new(system))))
}

#[tokio::test]
async fn test_catalog_and_queries() -> Result<()> {
    let dir = seeded_database()?;
    let (session, executor) = connect(&dir).await?;

    assert_eq!(session.server_info().name, "sqlite");
    let names: Vec<&str> = executor.tools().iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["query_data", "get_schema", "analyze_table"]);

    let result = executor
        .execute(&ToolCall::new(
            "query_data",
            json!({"sql": "SELECT name, price FROM products ORDER BY price DESC"}),
        ))
        .await;
    assert!(result.success);
    assert_eq!(
        result.payload,
        "Query results (2 rows):\n\n| name | price |\n| --- | --- |\n| teapot | 40.0 |\n| kettle | 25.0 |\n"
    );

    let result = executor
        .execute(&ToolCall::new("get_schema", json!({})))
        .await;
    assert!(result.payload.contains("## Table: products"));

    let result = executor
        .execute(&ToolCall::new("analyze_table", json!({"table_name": "products"})))
        .await;
    assert!(result.payload.contains("Total rows: 2"));
    assert!(result.payload.contains("| price | REAL | 2 | 0 | 25.0 | 40.0 | 32.50 |"));

    session.teardown().await;
    Ok(())
}

#[tokio::test]
async fn test_failures_are_reported_as_text() -> Result<()> {
    let dir = seeded_database()?;
    let (session, executor) = connect(&dir).await?;

    let result = executor
        .execute(&ToolCall::new("query_data", json!({"sql": "SELECT * FROM orders"})))
        .await;
    assert!(!result.success);
    assert_eq!(
        result.payload,
        "Error executing tool query_data: SQL Error: no such table: orders"
    );

    let result = executor
        .execute(&ToolCall::new("drop_everything", json!({})))
        .await;
    assert_eq!(
        result.payload,
        "Error executing tool drop_everything: Unknown tool: drop_everything"
    );

    // Writes go through and are visible to later reads
    let result = executor
        .execute(&ToolCall::new(
            "query_data",
            json!({"sql": "DELETE FROM products WHERE price > 30"}),
        ))
        .await;
    assert_eq!(result.payload, "Query executed successfully. 1 rows affected.");

    session.teardown().await;
    Ok(())
}

#[tokio::test]
async fn test_direct_system_call_after_teardown() -> Result<()> {
    let dir = seeded_database()?;
    let (session, _) = connect(&dir).await?;
    let system = StdioSystem::connect(session.clone()).await?;

    session.teardown().await;
    assert!(system
        .call(ToolCall::new("get_schema", json!({})))
        .await
        .is_err());
    Ok(())
}

#[tokio::test]
async fn test_extra_arguments_do_not_change_the_database() -> Result<()> {
    let dir = seeded_database()?;
    let (session, executor) = connect_with_args(&dir, &["--log-level", "debug"]).await?;

    let result = executor
        .execute(&ToolCall::new("get_schema", json!({})))
        .await;
    assert!(result.payload.contains("## Table: products"));

    let result = executor
        .execute(&ToolCall::new(
            "query_data",
            json!({"sql": "CREATE TABLE audit (id INTEGER PRIMARY KEY)"}),
        ))
        .await;
    assert!(result.success);
    session.teardown().await;

    // The write landed in the configured file
    let conn = Connection::open(dir.path().join("shop.db"))?;
    let tables: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'audit'",
        [],
        |row| row.get(0),
    )?;
    assert_eq!(tables, 1);
    Ok(())
}
