#![cfg(feature = "test-utils-postgres")]

use std::error::Error;
use std::time::Duration;

use chrono::NaiveDate;
use sql_failover::{DriverError, FailureKind};
use sql_failover::prelude::*;
use sql_failover::test_utils::postgres::{EmbeddedPostgres, setup_postgres_embedded};

type TestResult = Result<(), Box<dyn Error + Send + Sync>>;

fn router(pg: &EmbeddedPostgres) -> Result<Router, SqlFailoverError> {
    Router::builder(pg.descriptor.clone())
        .driver(DriverKind::Postgres.driver())
        .retry_policy(RetryPolicy::with_backoff_unit(Duration::from_millis(10)))
        .build()
}

async fn backend_pid(router: &Router) -> Result<i64, Box<dyn Error + Send + Sync>> {
    // raw path: values arrive as text
    let rows = router.query("SELECT pg_backend_pid() AS pid").await?;
    let pid = rows.results[0]
        .get("pid")
        .and_then(RowValues::as_text)
        .ok_or("no pid column")?;
    Ok(pid.parse()?)
}

#[tokio::test]
async fn create_insert_select_round_trip() -> TestResult {
    let pg = setup_postgres_embedded("round_trip").await?;
    let router = router(&pg)?;
    router.connect().await?;

    router
        .query(
            "CREATE TABLE orders (
                id BIGINT PRIMARY KEY,
                customer TEXT,
                total DOUBLE PRECISION,
                placed TIMESTAMP,
                note TEXT
            )",
        )
        .await?;

    let placed = NaiveDate::from_ymd_opt(2024, 2, 29)
        .and_then(|d| d.and_hms_opt(13, 5, 0))
        .ok_or("bad date")?;
    let inserted = router
        .query(QueryAndParams::new(
            "INSERT INTO orders (id, customer, total, placed, note) VALUES ($1, $2, $3, $4, $5)",
            vec![
                RowValues::Int(1),
                RowValues::from("alice"),
                RowValues::Float(12.5),
                RowValues::Timestamp(placed),
                RowValues::from(None::<String>),
            ],
        ))
        .await?;
    assert_eq!(inserted.rows_affected, 1);

    let rows = router
        .query(QueryAndParams::new(
            "SELECT id, customer, total, placed, note FROM orders WHERE id = $1",
            vec![RowValues::Int(1)],
        ))
        .await?;
    assert_eq!(rows.len(), 1);
    let row = &rows.results[0];
    assert_eq!(row.get("id").and_then(RowValues::as_int), Some(&1));
    assert_eq!(row.get("customer").and_then(RowValues::as_text), Some("alice"));
    assert_eq!(row.get("total").and_then(RowValues::as_float), Some(12.5));
    assert_eq!(row.get("placed").and_then(RowValues::as_timestamp), Some(placed));
    assert!(row.get("note").is_some_and(RowValues::is_null));

    router.disconnect().await;
    pg.stop().await;
    Ok(())
}

#[tokio::test]
async fn raw_batches_sum_affected_rows() -> TestResult {
    let pg = setup_postgres_embedded("raw_batches").await?;
    let router = router(&pg)?;

    let batch = router
        .query(
            "CREATE TABLE t (x INTEGER);
             INSERT INTO t VALUES (1);
             INSERT INTO t VALUES (2), (3);",
        )
        .await?;
    assert_eq!(batch.rows_affected, 3);

    let rows = router.query("SELECT x FROM t ORDER BY x").await?;
    let xs: Vec<&str> = rows
        .iter()
        .filter_map(|row| row.get("x").and_then(RowValues::as_text))
        .collect();
    assert_eq!(xs, vec!["1", "2", "3"]);

    let deleted = router
        .query(QueryAndParams::new(
            "DELETE FROM t WHERE x > $1",
            vec![RowValues::Int(1)],
        ))
        .await?;
    assert_eq!(deleted.rows_affected, 2);

    router.disconnect().await;
    pg.stop().await;
    Ok(())
}

#[tokio::test]
async fn rejected_statement_is_not_retried() -> TestResult {
    let pg = setup_postgres_embedded("rejected").await?;
    let router = router(&pg)?;
    router.connect().await?;
    let pid = backend_pid(&router).await?;

    let err = router.query("SELEC 1").await.unwrap_err();
    assert!(matches!(err, SqlFailoverError::QueryError(_)));
    assert_eq!(err.kind(), Some(FailureKind::NonFatalQuery));
    assert_eq!(
        err.driver_error().and_then(DriverError::code),
        Some("42601")
    );

    let status = router.read_endpoint().status();
    assert_eq!(status.state, EndpointState::Connected);
    assert_eq!(status.query_attempts, 0);
    // same session, no reconnect
    assert_eq!(backend_pid(&router).await?, pid);

    router.disconnect().await;
    pg.stop().await;
    Ok(())
}

#[tokio::test]
async fn terminated_backend_is_replaced() -> TestResult {
    let pg = setup_postgres_embedded("terminated").await?;
    let router = router(&pg)?;
    router.connect().await?;
    let victim = backend_pid(&router).await?;

    let admin = router_for_admin(&pg)?;
    let killed = admin
        .query(QueryAndParams::new(
            "SELECT pg_terminate_backend($1) AS killed",
            vec![RowValues::Int(victim)],
        ))
        .await?;
    assert_eq!(
        killed.results[0].get("killed").and_then(RowValues::as_bool),
        Some(&true)
    );
    tokio::time::sleep(Duration::from_millis(200)).await;

    let replacement = backend_pid(&router).await?;
    assert_ne!(replacement, victim);
    assert!(router.read_endpoint().is_connected());

    admin.disconnect().await;
    router.disconnect().await;
    pg.stop().await;
    Ok(())
}

fn router_for_admin(pg: &EmbeddedPostgres) -> Result<Router, SqlFailoverError> {
    Router::postgres(pg.descriptor.clone(), None)
}
