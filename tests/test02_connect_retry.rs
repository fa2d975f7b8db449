#![cfg(feature = "test-utils")]

use std::sync::Arc;
use std::time::Duration;

use sql_failover::FailureKind;
use sql_failover::prelude::*;
use sql_failover::test_utils::{RecordingLog, ScriptedDriver, refused};
use tokio::time::Instant;

fn endpoint(driver: &ScriptedDriver, policy: RetryPolicy, log: Arc<dyn EventLog>) -> Endpoint {
    let descriptor = ConnectionDescriptor::builder()
        .host("db")
        .database("orders")
        .build();
    Endpoint::new(Arc::new(descriptor), driver.as_driver(), log, policy)
}

fn instant_retries() -> RetryPolicy {
    RetryPolicy::with_backoff_unit(Duration::ZERO)
}

#[tokio::test]
async fn succeeds_on_tenth_attempt() -> Result<(), SqlFailoverError> {
    let driver = ScriptedDriver::new();
    driver.fail_connects(9, refused());
    let ep = endpoint(&driver, instant_retries(), Arc::new(NoopLog));

    ep.connect().await?;

    assert_eq!(driver.connect_calls(), 10);
    let status = ep.status();
    assert_eq!(status.state, EndpointState::Connected);
    assert_eq!(status.connect_attempts, 0);
    Ok(())
}

#[tokio::test]
async fn gives_up_after_eleventh_failure() {
    let driver = ScriptedDriver::new();
    driver.fail_connects(11, refused());
    let ep = endpoint(&driver, instant_retries(), Arc::new(NoopLog));

    let err = ep.connect().await.unwrap_err();

    assert_eq!(driver.connect_calls(), 11);
    assert_eq!(err.driver_error(), Some(&refused()));
    assert_eq!(err.kind(), Some(FailureKind::TransientConnect));
    assert!(matches!(err, SqlFailoverError::ConnectFailed { attempts: 10, .. }));
    assert_eq!(ep.status().state, EndpointState::Failed);
    assert_eq!(driver.live_handles(), 0);
}

#[tokio::test]
async fn failed_endpoint_can_connect_again() -> Result<(), SqlFailoverError> {
    let driver = ScriptedDriver::new();
    driver.fail_connects(11, refused());
    let ep = endpoint(&driver, instant_retries(), Arc::new(NoopLog));
    assert!(ep.connect().await.is_err());

    driver.fail_connects(3, refused());
    ep.connect().await?;
    assert_eq!(driver.connect_calls(), 15);
    assert!(ep.is_connected());
    Ok(())
}

#[tokio::test]
async fn connect_when_connected_is_a_no_op() -> Result<(), SqlFailoverError> {
    let driver = ScriptedDriver::new();
    let ep = endpoint(&driver, instant_retries(), Arc::new(NoopLog));
    ep.connect().await?;
    ep.connect().await?;
    assert_eq!(driver.connect_calls(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn concurrent_connects_never_hold_two_handles() -> Result<(), SqlFailoverError> {
    let driver = ScriptedDriver::new();
    driver.set_connect_delay(Duration::from_millis(50));
    driver.fail_connects(2, refused());
    let ep = Arc::new(endpoint(
        &driver,
        RetryPolicy::with_backoff_unit(Duration::from_millis(10)),
        Arc::new(NoopLog),
    ));

    let (a, b) = tokio::join!(ep.connect(), ep.connect());
    a?;
    b?;

    assert_eq!(driver.connect_calls(), 3);
    assert_eq!(driver.max_live_handles(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn backoff_is_linear_in_attempts() -> Result<(), SqlFailoverError> {
    let driver = ScriptedDriver::new();
    driver.fail_connects(9, refused());
    let ep = endpoint(&driver, RetryPolicy::default(), Arc::new(NoopLog));

    let start = Instant::now();
    ep.connect().await?;

    // 10s x (2 + 3 + ... + 10)
    assert_eq!(start.elapsed(), Duration::from_secs(540));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn exhausted_cycle_waits_worst_case() {
    let driver = ScriptedDriver::new();
    driver.fail_connects(11, refused());
    let policy = RetryPolicy::with_backoff_unit(Duration::from_secs(1));
    let ep = endpoint(&driver, policy, Arc::new(NoopLog));

    let start = Instant::now();
    assert!(ep.connect().await.is_err());
    assert_eq!(
        start.elapsed(),
        policy.worst_case_connect_wait(Default::default())
    );
}

#[tokio::test]
async fn retries_and_success_are_logged() -> Result<(), SqlFailoverError> {
    let driver = ScriptedDriver::new();
    driver.fail_connects(2, refused());
    let log = Arc::new(RecordingLog::new());
    let ep = endpoint(&driver, instant_retries(), log.clone());

    ep.connect().await?;

    let errors = log.errors();
    assert_eq!(errors.len(), 2);
    assert!(errors[0].contains("retrying [1]"), "{}", errors[0]);
    assert!(errors[1].contains("retrying [2]"), "{}", errors[1]);
    assert!(errors[0].contains("connection refused"));

    let infos = log.infos();
    assert_eq!(infos.len(), 1);
    assert!(infos[0].starts_with("Connected to db/orders"), "{}", infos[0]);
    Ok(())
}

#[tokio::test]
async fn terminal_failure_is_logged_before_returning() {
    let driver = ScriptedDriver::new();
    driver.fail_connects(11, refused());
    let log = Arc::new(RecordingLog::new());
    let ep = endpoint(&driver, instant_retries(), log.clone());

    assert!(ep.connect().await.is_err());
    let errors = log.errors();
    assert_eq!(errors.len(), 11);
    assert!(errors[10].contains("failed after 10 retries"));
}

#[tokio::test]
async fn destroy_is_idempotent() -> Result<(), SqlFailoverError> {
    let driver = ScriptedDriver::new();
    let ep = endpoint(&driver, instant_retries(), Arc::new(NoopLog));

    ep.destroy().await;
    assert_eq!(driver.destroy_calls(), 0);

    ep.connect().await?;
    ep.destroy().await;
    ep.destroy().await;
    assert_eq!(driver.destroy_calls(), 1);
    assert_eq!(ep.status().state, EndpointState::Disconnected);
    Ok(())
}

#[tokio::test]
async fn dropping_endpoint_releases_handle() -> Result<(), SqlFailoverError> {
    let driver = ScriptedDriver::new();
    let ep = endpoint(&driver, instant_retries(), Arc::new(NoopLog));
    ep.connect().await?;
    drop(ep);
    assert_eq!(driver.destroy_calls(), 1);
    assert_eq!(driver.live_handles(), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn abandoned_connect_during_backoff_resets_state() -> Result<(), SqlFailoverError> {
    let driver = ScriptedDriver::new();
    driver.fail_connects(3, refused());
    let ep = endpoint(
        &driver,
        RetryPolicy::with_backoff_unit(Duration::from_secs(10)),
        Arc::new(NoopLog),
    );

    assert!(
        tokio::time::timeout(Duration::from_secs(1), ep.connect())
            .await
            .is_err()
    );
    let status = ep.status();
    assert_eq!(status.state, EndpointState::Disconnected);
    assert_eq!(status.connect_attempts, 0);

    ep.connect().await?;
    assert!(ep.is_connected());
    assert_eq!(driver.connect_calls(), 4);
    Ok(())
}
