//! Async Wait Integration Tests
//!
//! EcDoAsyncConnectEx followed by EcDoAsyncWaitEx polling, with tokio's
//! clock paused so the 1-second poll steps run instantly.

mod common;

use common::*;
use exrpc::{
    Op, RpcError, RuntimeFault, SessionState, ASYNC_POLL_INTERVAL, NOTIFICATION_PENDING,
};
use std::time::Duration;
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn test_zero_timeout_single_completion() {
    init_logging();
    let runtime = loopback();
    runtime.set_async_pending_polls(0);
    let mut session = connected_store(&runtime).await;
    let mut notifications = session.async_connect().await.unwrap();

    let start = Instant::now();
    let outcome = notifications.wait_with_timeout(0, 0).await.unwrap();

    assert_eq!(start.elapsed(), Duration::ZERO);
    assert_eq!(outcome.waited_secs, 0);
    assert_eq!(runtime.async_status_polls(), 0);
    assert_eq!(runtime.async_completions(), 1);
    assert_eq!(runtime.calls_of(Op::AsyncWaitEx), 1);

    session.disconnect().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_wait_returns_when_notifications_arrive() {
    init_logging();
    let runtime = loopback();
    runtime.set_async_pending_polls(2);
    runtime.set_async_flags_out(NOTIFICATION_PENDING);
    let mut session = connected_store(&runtime).await;
    let mut notifications = session.async_connect().await.unwrap();

    let start = Instant::now();
    let outcome = notifications.wait_with_timeout(0, 30).await.unwrap();

    assert_eq!(start.elapsed(), ASYNC_POLL_INTERVAL * 2);
    assert_eq!(outcome.waited_secs, 2);
    assert!(outcome.notifications_pending());
    assert_eq!(runtime.async_completions(), 1);

    session.disconnect().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_repeated_waits_on_one_handle() {
    init_logging();
    let runtime = loopback();
    runtime.set_async_pending_polls(1);
    let mut session = connected_store(&runtime).await;
    let mut notifications = session.async_connect().await.unwrap();

    for _ in 0..3 {
        let outcome = notifications.wait_with_timeout(0, 5).await.unwrap();
        assert_eq!(outcome.waited_secs, 1);
        assert!(!outcome.notifications_pending());
    }
    assert_eq!(runtime.async_completions(), 3);
    assert_eq!(runtime.calls_of(Op::AsyncInitialize), 3);

    session.disconnect().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_deadline_reached() {
    init_logging();
    let runtime = loopback();
    runtime.set_async_pending_polls(u32::MAX);
    let mut session = connected_store(&runtime).await;
    let mut notifications = session.async_connect().await.unwrap();

    let start = Instant::now();
    let err = notifications.wait_with_timeout(0, 3).await.unwrap_err();

    assert_eq!(start.elapsed(), Duration::from_secs(3));
    assert!(matches!(err, RpcError::AsyncComplete));
    assert_eq!(err.status(), 0x0000_ffff);
    assert_eq!(runtime.async_status_polls(), 3);
    assert_eq!(runtime.async_completions(), 1);

    // the session itself is unaffected
    assert_eq!(session.state(), SessionState::Connected);
    session.disconnect().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_server_error_in_completion() {
    init_logging();
    let runtime = loopback();
    runtime.set_async_return_value(exrpc::status::RPC_S_CALL_FAILED);
    let mut session = connected_store(&runtime).await;
    let mut notifications = session.async_connect().await.unwrap();

    let err = notifications.wait_with_timeout(0, 5).await.unwrap_err();
    assert!(matches!(err, RpcError::CallFailed(exrpc::status::RPC_S_CALL_FAILED)));
    assert_eq!(runtime.async_completions(), 1);

    session.disconnect().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_wait_call_start_failure_is_returned() {
    init_logging();
    let runtime = loopback();
    runtime.fail_next(Op::AsyncWaitEx, RuntimeFault::Exception(exrpc::status::RPC_S_SERVER_UNAVAILABLE));
    let mut session = connected_store(&runtime).await;
    let mut notifications = session.async_connect().await.unwrap();

    let start = Instant::now();
    let err = notifications.wait_with_timeout(0, 10).await.unwrap_err();

    // nothing to poll when the call never started, but it is still completed
    assert!(matches!(err, RpcError::Transport(exrpc::status::RPC_S_SERVER_UNAVAILABLE)));
    assert_eq!(start.elapsed(), Duration::ZERO);
    assert_eq!(runtime.async_status_polls(), 0);
    assert_eq!(runtime.async_completions(), 1);

    // the faulted ACXH is not reused
    let err = notifications.wait_with_timeout(0, 10).await.unwrap_err();
    assert!(matches!(err, RpcError::InvalidState { state: SessionState::Faulted, .. }));
    assert_eq!(runtime.calls_of(Op::AsyncWaitEx), 1);

    session.disconnect().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_wait_call_fatal_exception_propagates() {
    init_logging();
    let runtime = loopback();
    runtime.fail_next(Op::AsyncWaitEx, RuntimeFault::Exception(0xc000_0005));
    let mut session = connected_store(&runtime).await;
    let mut notifications = session.async_connect().await.unwrap();

    let err = notifications.wait_with_timeout(0, 10).await.unwrap_err();

    assert!(err.is_fatal());
    assert!(matches!(err, RpcError::Fatal(0xc000_0005)));
    assert_eq!(runtime.async_completions(), 1);

    session.disconnect().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_async_init_failure() {
    init_logging();
    let runtime = loopback();
    runtime.fail_next(Op::AsyncInitialize, RuntimeFault::Status(14));
    let mut session = connected_store(&runtime).await;
    let mut notifications = session.async_connect().await.unwrap();

    let err = notifications.wait_with_timeout(0, 10).await.unwrap_err();
    assert!(matches!(err, RpcError::AsyncInit));
    assert_eq!(err.status(), 0x000f_ffff);
    assert_eq!(runtime.calls_of(Op::AsyncWaitEx), 0);
    assert_eq!(runtime.async_completions(), 0);

    session.disconnect().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_caller_can_abandon_wait() {
    init_logging();
    let runtime = loopback();
    runtime.set_async_pending_polls(u32::MAX);
    let mut session = connected_store(&runtime).await;
    let mut notifications = session.async_connect().await.unwrap();

    let result = tokio::time::timeout(
        Duration::from_millis(2500),
        notifications.wait_with_timeout(0, 60),
    )
    .await;
    assert!(result.is_err());
    assert_eq!(runtime.async_status_polls(), 3);
    assert_eq!(runtime.async_completions(), 1);

    session.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_async_connect_requires_connected_session() {
    init_logging();
    let runtime = loopback();
    let mut session = session(&runtime, exrpc::Protocol::Store);
    session.bind(&tcp_request()).await.unwrap();

    let err = session.async_connect().await.unwrap_err();
    assert!(matches!(err, RpcError::InvalidState { .. }));
    assert_eq!(runtime.calls_of(Op::AsyncConnect), 0);
}

#[tokio::test(start_paused = true)]
async fn test_wait_after_disconnect_rejected() {
    init_logging();
    let runtime = loopback();
    let mut session = connected_store(&runtime).await;
    let mut notifications = session.async_connect().await.unwrap();

    session.disconnect().await.unwrap();

    let err = notifications.wait_with_timeout(0, 5).await.unwrap_err();
    assert!(matches!(
        err,
        RpcError::InvalidState {
            state: SessionState::Disconnected,
            ..
        }
    ));
    assert_eq!(runtime.calls_of(Op::AsyncInitialize), 0);
    assert_eq!(runtime.calls_of(Op::AsyncWaitEx), 0);
}

#[tokio::test(start_paused = true)]
async fn test_wait_after_session_fault_rejected() {
    init_logging();
    let runtime = loopback();
    let mut session = connected_store(&runtime).await;
    let mut notifications = session.async_connect().await.unwrap();

    runtime.fail_next(Op::RpcExt2, RuntimeFault::Exception(0xc000_0005));
    let err = session.do_rpc_ext2(bytes::Bytes::from_static(&[0x01]), 0x8000).await.unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(session.state(), SessionState::Faulted);

    let err = notifications.wait_with_timeout(0, 5).await.unwrap_err();
    assert!(matches!(
        err,
        RpcError::InvalidState {
            state: SessionState::Faulted,
            ..
        }
    ));
    assert_eq!(runtime.calls_of(Op::AsyncWaitEx), 0);
}
