#![cfg(feature = "test-utils")]

use std::sync::Arc;
use std::time::Duration;

use sql_failover::prelude::*;
use sql_failover::test_utils::ScriptedDriver;

fn descriptor(host: &str) -> ConnectionDescriptor {
    ConnectionDescriptor::builder()
        .host(host)
        .user("app")
        .password("pw")
        .database("orders")
        .build()
}

fn router(
    driver: &ScriptedDriver,
    read: ConnectionDescriptor,
    write: Option<ConnectionDescriptor>,
) -> Router {
    Router::builder(read)
        .write_opt(write)
        .driver(driver.as_driver())
        .log(Arc::new(NoopLog))
        .retry_policy(RetryPolicy::with_backoff_unit(Duration::ZERO))
        .build()
        .expect("valid router config")
}

fn served_by(result: &ResultSet) -> Option<&str> {
    result.results.first()?.get("host")?.as_text()
}

#[tokio::test]
async fn selects_go_to_read_everything_else_to_write() -> Result<(), SqlFailoverError> {
    let driver = ScriptedDriver::new();
    let router = router(&driver, descriptor("replica"), Some(descriptor("primary")));
    router.connect().await?;

    for sql in ["SELECT 1", "select * from orders", "   SeLeCt now()"] {
        let result = router.query(sql).await?;
        assert_eq!(served_by(&result), Some("replica"), "{sql}");
    }
    for sql in [
        "INSERT INTO orders VALUES (1)",
        "update orders set total = 0",
        "DELETE FROM orders",
        "WITH x AS (SELECT 1) SELECT * FROM x",
        "/* hint */ SELECT 1",
    ] {
        let result = router.query(sql).await?;
        assert_eq!(served_by(&result), Some("primary"), "{sql}");
    }
    Ok(())
}

#[tokio::test]
async fn equal_descriptors_share_one_endpoint() -> Result<(), SqlFailoverError> {
    let driver = ScriptedDriver::new();
    let router = router(&driver, descriptor("db"), Some(descriptor("db")));

    assert!(router.is_shared());
    assert!(Arc::ptr_eq(router.read_endpoint(), router.write_endpoint()));

    router.connect().await?;
    assert_eq!(driver.connect_calls(), 1);

    router.query("SELECT 1").await?;
    router.query("UPDATE orders SET total = 1").await?;
    let conns: Vec<u64> = driver.executed().iter().map(|q| q.conn_id).collect();
    assert_eq!(conns, vec![1, 1]);

    router.disconnect().await;
    assert_eq!(driver.destroy_calls(), 1);
    assert_eq!(driver.live_handles(), 0);
    Ok(())
}

#[tokio::test]
async fn missing_write_descriptor_aliases_read() {
    let driver = ScriptedDriver::new();
    let router = router(&driver, descriptor("db"), None);
    assert!(router.is_shared());
}

#[tokio::test]
async fn distinct_descriptors_connect_and_destroy_independently() -> Result<(), SqlFailoverError> {
    let driver = ScriptedDriver::new();
    let router = router(&driver, descriptor("replica"), Some(descriptor("primary")));
    assert!(!router.is_shared());

    router.connect().await?;
    assert_eq!(driver.connect_calls(), 2);
    assert_eq!(driver.connected_hosts(), vec!["replica", "primary"]);
    assert_eq!(driver.live_handles(), 2);

    router.disconnect().await;
    assert_eq!(driver.destroy_calls(), 2);
    assert_eq!(driver.live_handles(), 0);

    // idempotent
    router.disconnect().await;
    assert_eq!(driver.destroy_calls(), 2);
    Ok(())
}

#[tokio::test]
async fn same_host_different_database_is_not_shared() {
    let driver = ScriptedDriver::new();
    let other_db = ConnectionDescriptor {
        database: "archive".into(),
        ..descriptor("db")
    };
    let router = router(&driver, descriptor("db"), Some(other_db));
    assert!(!router.is_shared());
}

#[tokio::test]
async fn read_failure_stops_router_connect() {
    let driver = ScriptedDriver::new();
    driver.fail_connects(11, sql_failover::test_utils::refused());
    let router = router(&driver, descriptor("replica"), Some(descriptor("primary")));

    let err = router.connect().await.unwrap_err();
    assert!(matches!(err, SqlFailoverError::ConnectFailed { ref host, .. } if host == "replica"));
    assert!(driver.connected_hosts().iter().all(|h| h == "replica"));
}

#[tokio::test]
async fn query_as_overrides_classification() -> Result<(), SqlFailoverError> {
    let driver = ScriptedDriver::new();
    let router = router(&driver, descriptor("replica"), Some(descriptor("primary")));
    router.connect().await?;

    let result = router.query_as(QueryKind::Write, "SELECT * FROM orders").await?;
    assert_eq!(served_by(&result), Some("primary"));
    Ok(())
}

#[tokio::test]
async fn bound_values_use_parameterized_path() -> Result<(), SqlFailoverError> {
    let driver = ScriptedDriver::new();
    let router = router(&driver, descriptor("db"), None);
    router.connect().await?;

    router.query("SELECT 1").await?;
    router
        .query(QueryAndParams::new(
            "UPDATE orders SET note = $1, total = $2 WHERE id = $3",
            vec![RowValues::Absent, RowValues::Float(9.5), RowValues::Int(3)],
        ))
        .await?;

    let executed = driver.executed();
    assert_eq!(executed[0].params, None);
    assert_eq!(
        executed[1].params,
        Some(vec![RowValues::Null, RowValues::Float(9.5), RowValues::Int(3)])
    );
    Ok(())
}

#[test]
fn builder_requires_driver_and_complete_descriptor() {
    let err = Router::builder(descriptor("db")).build().unwrap_err();
    assert!(matches!(err, SqlFailoverError::ConfigError(_)));

    let driver = ScriptedDriver::new();
    let err = Router::builder(descriptor(""))
        .driver(driver.as_driver())
        .build()
        .unwrap_err();
    assert!(matches!(err, SqlFailoverError::ConfigError(msg) if msg == "host is required"));

    let err = Router::builder(descriptor("db"))
        .write(ConnectionDescriptor {
            database: String::new(),
            ..descriptor("primary")
        })
        .driver(driver.as_driver())
        .build()
        .unwrap_err();
    assert!(matches!(err, SqlFailoverError::ConfigError(msg) if msg == "database is required"));

    // construction does no I/O
    assert_eq!(driver.connect_calls(), 0);
}
