//! Session Integration Tests
//!
//! Store and address book sessions over the loopback runtime:
//!
//! 1. **Connect**: connect parameters, connection modulus, returned details
//! 2. **Calls**: ROP transfer and push notification registration
//! 3. **State machine**: faults, disconnect, rebinding

mod common;

use bytes::Bytes;
use common::*;
use exrpc::emsmdb::{ADVISE_BITS_ALL, MAX_ROP_OUT};
use exrpc::loopback::LOOPBACK_SERVER_VERSION;
use exrpc::status;
use exrpc::{
    connection_modulus, Op, Protocol, RpcError, RuntimeFault, SessionConfig, SessionContext,
    SessionState, Stat, AF_INET, AF_INET6,
};

#[tokio::test]
async fn test_connect_returns_server_details() {
    init_logging();
    let runtime = loopback();
    runtime.set_display_name("Alice Example");
    let mut session = session(&runtime, Protocol::Store);
    session.bind(&tcp_request()).await.unwrap();

    let info = session.connect(USER_DN).await.unwrap().clone();

    assert_eq!(info.display_name, "Alice Example");
    assert_eq!(info.server_version, LOOPBACK_SERVER_VERSION);
    assert_eq!(
        info.dn_prefix,
        "/o=Contoso/ou=Exchange Administrative Group/cn=Recipients"
    );
    assert_eq!(session.state(), SessionState::Connected);
    assert!(!session.context_handle().unwrap().is_nil());
    assert_eq!(session.connect_info(), Some(&info));

    session.disconnect().await.unwrap();
}

#[test]
fn test_connection_modulus_determinism() {
    let alice = connection_modulus(USER_DN);
    assert_eq!(alice, connection_modulus(USER_DN));

    let names = [
        "/o=Contoso/cn=alice",
        "/o=Contoso/cn=bob",
        "/o=Contoso/cn=carol",
        "/o=Contoso/cn=Alice",
        "a",
        "b",
    ];
    for (i, a) in names.iter().enumerate() {
        for b in &names[i + 1..] {
            assert_ne!(connection_modulus(a), connection_modulus(b), "{} vs {}", a, b);
        }
    }
}

#[tokio::test]
async fn test_rop_transfer() {
    init_logging();
    let runtime = loopback();
    let mut session = connected_store(&runtime).await;

    // echo when nothing is scripted
    let request = Bytes::from_static(&[0x00, 0x00, 0xfe, 0x01]);
    let response = session.do_rpc_ext2(request.clone(), MAX_ROP_OUT).await.unwrap();
    assert_eq!(response.rop_out, request);

    runtime.push_rop_reply(Bytes::from_static(b"\x02\x00\x00\x00\x00\x00"));
    let response = session.do_rpc_ext2(request, 4).await.unwrap();
    assert_eq!(response.rop_out.len(), 4);
    assert_eq!(response.flags, 0x0000_0003);

    session.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_rop_transfer_exception_faults_session() {
    init_logging();
    let runtime = loopback();
    let mut session = connected_store(&runtime).await;

    runtime.fail_next(Op::RpcExt2, RuntimeFault::Exception(status::RPC_S_CALL_FAILED));
    let err = session
        .do_rpc_ext2(Bytes::from_static(b"\x01"), MAX_ROP_OUT)
        .await
        .unwrap_err();

    assert!(matches!(err, RpcError::Transport(status::RPC_S_CALL_FAILED)));
    assert!(!err.is_fatal());
    assert_eq!(session.state(), SessionState::Faulted);

    let err = session
        .do_rpc_ext2(Bytes::from_static(b"\x01"), MAX_ROP_OUT)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RpcError::InvalidState {
            state: SessionState::Faulted,
            ..
        }
    ));
    assert_eq!(runtime.calls_of(Op::RpcExt2), 1);
}

#[tokio::test]
async fn test_register_push_notification_ipv4() {
    init_logging();
    let runtime = loopback();
    let mut session = connected_store(&runtime).await;

    let handle = session
        .register_push_notification(AF_INET, "10.0.0.5", 6100, b"ctx")
        .await
        .unwrap();
    assert_ne!(handle, 0);

    let request = &runtime.push_requests()[0];
    assert_eq!(request.i_rpc, 0);
    assert_eq!(request.advise_bits, ADVISE_BITS_ALL);
    assert_eq!(request.context.as_ref(), b"ctx");
    assert_eq!(request.callback_address.len(), 16);
    assert_eq!(&request.callback_address[..4], &[2, 0, 0x17, 0xd4]);
    assert_eq!(&request.callback_address[4..8], &[10, 0, 0, 5]);
}

#[tokio::test]
async fn test_register_push_notification_ipv6() {
    init_logging();
    let runtime = loopback();
    let mut session = connected_store(&runtime).await;

    session
        .register_push_notification(AF_INET6, "2001:db8::5", 6100, &[])
        .await
        .unwrap();

    let request = &runtime.push_requests()[0];
    assert_eq!(request.callback_address.len(), 28);
    assert_eq!(&request.callback_address[..4], &[23, 0, 0x17, 0xd4]);
    assert_eq!(&request.callback_address[8..10], &[0x20, 0x01]);
}

#[tokio::test]
async fn test_register_push_notification_rejects_bad_address() {
    init_logging();
    let runtime = loopback();
    let mut session = connected_store(&runtime).await;

    let err = session
        .register_push_notification(AF_INET, "not-an-address", 6100, &[])
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::InvalidAddress(_)));
    assert!(err.is_validation());

    // validation failures do not fault the session
    assert_eq!(session.state(), SessionState::Connected);
    assert_eq!(runtime.calls_of(Op::RegisterPush), 0);
}

#[tokio::test]
async fn test_fatal_exception_propagates() {
    init_logging();
    let runtime = loopback();
    let mut session = session(&runtime, Protocol::Store);
    session.bind(&tcp_request()).await.unwrap();

    runtime.fail_next(Op::Connect, RuntimeFault::Exception(0xc000_0005));
    let err = session.connect(USER_DN).await.unwrap_err();

    assert!(matches!(err, RpcError::Fatal(0xc000_0005)));
    assert!(err.is_fatal());
    assert_eq!(session.state(), SessionState::Faulted);
}

#[tokio::test]
async fn test_exchange_error_status() {
    init_logging();
    let runtime = loopback();
    runtime.push_connect_status(status::EC_LOGIN_FAILURE);
    let mut session = session(&runtime, Protocol::Store);
    session.bind(&tcp_request()).await.unwrap();

    let err = session.connect(USER_DN).await.unwrap_err();
    assert_eq!(err.status(), status::EC_LOGIN_FAILURE);
    assert!(status::describe(err.status()).is_some());
    assert!(session.connect_info().is_none());
}

#[tokio::test]
async fn test_disconnect_releases_everything() {
    init_logging();
    let runtime = loopback();
    let config = SessionConfig::default().force_shutdown_association(true);
    let mut session = SessionContext::with_config(runtime.clone(), Protocol::Store, config);
    session.bind(&tcp_request()).await.unwrap();
    session.connect(USER_DN).await.unwrap();

    session.disconnect().await.unwrap();

    assert_eq!(session.state(), SessionState::Disconnected);
    assert_eq!(session.context_handle(), None);
    assert_eq!(runtime.live_bindings(), 0);
    let options = runtime.binding_options();
    assert_eq!(options.len(), 1);
    assert_eq!(options[0].1 as u32, 13);
    assert_eq!(options[0].2, 1);

    // Disconnected rejects calls but accepts a new bind
    assert!(session.connect(USER_DN).await.is_err());
    session.bind(&tcp_request()).await.unwrap();
    session.connect(USER_DN).await.unwrap();
    session.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_independent_sessions() {
    init_logging();
    let runtime = loopback();
    let mut first = connected_store(&runtime).await;
    let mut second = connected_store(&runtime).await;

    assert_ne!(first.context_handle(), second.context_handle());
    assert_eq!(runtime.live_bindings(), 2);

    first.disconnect().await.unwrap();
    assert_eq!(second.state(), SessionState::Connected);
    second.disconnect().await.unwrap();
    assert_eq!(runtime.live_bindings(), 0);
}

#[tokio::test]
async fn test_sessions_on_separate_tasks() {
    init_logging();
    let runtime = loopback();

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let runtime = runtime.clone();
            tokio::spawn(async move {
                let mut session = session(&runtime, Protocol::Store);
                session.bind(&tcp_request()).await?;
                session.connect(&format!("/o=Contoso/cn=user{}", i)).await?;
                session.disconnect().await
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap().unwrap();
    }
    assert_eq!(runtime.calls_of(Op::Connect), 8);
    assert_eq!(runtime.live_bindings(), 0);
}

#[tokio::test]
async fn test_nspi_session() {
    init_logging();
    let runtime = loopback();
    let mut session = session(&runtime, Protocol::NameService);
    session.bind(&http_request("NTLM", true)).await.unwrap();

    let guid = session.nspi_bind(0, Stat::default()).await.unwrap();
    assert!(guid.is_some());
    assert_eq!(session.server_guid(), guid);
    assert_eq!(session.state(), SessionState::Connected);

    // Store-only calls are rejected on an NSPI context
    let err = session
        .do_rpc_ext2(Bytes::new(), MAX_ROP_OUT)
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::WrongInterface { .. }));

    session.nspi_unbind().await.unwrap();
    assert_eq!(runtime.calls_of(Op::NspiUnbind), 1);
    assert_eq!(runtime.calls_of(Op::Disconnect), 0);
    assert_eq!(session.state(), SessionState::Disconnected);
}
