//! Client Integration Tests
//!
//! The client facade end to end: configuration, SPN expansion, identity,
//! bind, connect and retry on transient statuses.

mod common;

use common::*;
use exrpc::status;
use exrpc::{
    AuthLevel, AuthnService, ClientConfig, ExchangeClient, HttpAuthScheme, Op, RetryPolicy,
    RpcError, RuntimeFault, SessionConfig, SessionState, Stat, FLAG_ANONYMOUS_LOGIN,
};
use std::time::Duration;

fn http_config() -> ClientConfig {
    ClientConfig::new(SERVER)
        .with_credentials("CONTOSO", "alice", "P@ssw0rd")
        .with_transport("ncacn_http")
        .with_http("NTLM", true)
}

#[tokio::test]
async fn test_connect_store_over_http() {
    init_logging();
    let runtime = loopback();
    let client = ExchangeClient::new(runtime.clone(), http_config());

    let mut session = client.connect_store(USER_DN).await.unwrap();

    assert_eq!(session.state(), SessionState::Connected);
    assert_eq!(
        runtime.string_bindings(),
        vec![format!("ncacn_http:{}[6001]", SERVER)]
    );
    let auth = runtime.last_auth_info().unwrap();
    assert_eq!(auth.user.as_deref(), Some("alice"));
    assert_eq!(auth.qos.unwrap().scheme(), Some(HttpAuthScheme::Ntlm));

    session.disconnect().await.unwrap();
    assert_eq!(runtime.live_bindings(), 0);
}

#[tokio::test]
async fn test_transport_name_is_lowercased() {
    init_logging();
    let runtime = loopback();
    let config = ClientConfig::new(SERVER).with_transport("NCACN_IP_TCP");
    let client = ExchangeClient::new(runtime.clone(), config);

    let mut session = client.connect_store(USER_DN).await.unwrap();
    assert_eq!(
        runtime.string_bindings(),
        vec![format!("ncacn_ip_tcp:{}", SERVER)]
    );
    session.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_kerberos_spn_from_format() {
    init_logging();
    let runtime = loopback();
    let config = ClientConfig::new(SERVER)
        .with_auth(AuthLevel::PktPrivacy, AuthnService::GssKerberos)
        .with_spn_format("exchangeMDB/[SERVERNAME]");
    let client = ExchangeClient::new(runtime.clone(), config);

    let mut session = client.connect_store(USER_DN).await.unwrap();
    assert_eq!(
        runtime.last_auth_info().unwrap().spn.as_deref(),
        Some("exchangeMDB/mail.contoso.com")
    );
    session.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_kerberos_without_spn_format_fails_validation() {
    init_logging();
    let runtime = loopback();
    let config = ClientConfig::new(SERVER).with_auth(AuthLevel::PktPrivacy, AuthnService::GssKerberos);
    let client = ExchangeClient::new(runtime.clone(), config);

    let err = client.connect_store(USER_DN).await.unwrap_err();
    assert!(matches!(err, RpcError::MissingSpn));
    assert_eq!(runtime.calls_of(Op::BindingFromString), 0);
}

#[tokio::test]
async fn test_invalid_scheme_is_not_retried() {
    init_logging();
    let runtime = loopback();
    let config = ClientConfig::new(SERVER)
        .with_transport("ncacn_http")
        .with_http("Kerberos", false);
    let client = ExchangeClient::new(runtime.clone(), config);

    let err = client.connect_store(USER_DN).await.unwrap_err();
    assert_eq!(err.status(), status::UNSUPPORTED_AUTH_SCHEME);
    assert_eq!(runtime.calls_of(Op::BindingFromString), 0);
}

#[tokio::test(start_paused = true)]
async fn test_retry_after_endpoint_exception() {
    init_logging();
    let runtime = loopback();
    runtime.fail_next(Op::Connect, RuntimeFault::Exception(status::RPC_S_SERVER_TOO_BUSY));
    let config = http_config().with_retry(RetryPolicy::new(1, Duration::from_secs(10)));
    let client = ExchangeClient::new(runtime.clone(), config);

    let start = tokio::time::Instant::now();
    let mut session = client.connect_store(USER_DN).await.unwrap();

    assert_eq!(start.elapsed(), Duration::from_secs(10));
    assert_eq!(runtime.calls_of(Op::Connect), 2);
    assert_eq!(runtime.live_bindings(), 1);
    session.disconnect().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_no_retry_policy() {
    init_logging();
    let runtime = loopback();
    runtime.push_connect_status(status::RPC_S_SERVER_UNAVAILABLE);
    let config = http_config().with_retry(RetryPolicy::none());
    let client = ExchangeClient::new(runtime.clone(), config);

    let err = client.connect_store(USER_DN).await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(runtime.calls_of(Op::Connect), 1);
    assert_eq!(runtime.live_bindings(), 0);
}

#[tokio::test]
async fn test_fatal_exception_is_not_retried() {
    init_logging();
    let runtime = loopback();
    runtime.fail_next(Op::Connect, RuntimeFault::Exception(0xc000_0005));
    let client = ExchangeClient::new(runtime.clone(), http_config());

    let err = client.connect_store(USER_DN).await.unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(runtime.calls_of(Op::Connect), 1);
}

#[tokio::test]
async fn test_force_shutdown_from_config() {
    init_logging();
    let runtime = loopback();
    let config = http_config().with_session(SessionConfig::default().force_shutdown_association(true));
    let client = ExchangeClient::new(runtime.clone(), config);

    let mut session = client.connect_store(USER_DN).await.unwrap();
    session.disconnect().await.unwrap();
    assert_eq!(runtime.calls_of(Op::SetOption), 1);
}

#[tokio::test]
async fn test_anonymous_address_book() {
    init_logging();
    let runtime = loopback();
    let config = ClientConfig::new(SERVER)
        .with_transport("ncacn_http")
        .with_http("Basic", true)
        .with_object_uuid(true);
    let client = ExchangeClient::new(runtime.clone(), config);

    let mut session = client
        .bind_name_service(FLAG_ANONYMOUS_LOGIN, Stat::default())
        .await
        .unwrap();

    assert!(session.server_guid().is_some());
    assert!(runtime.string_bindings()[0].starts_with("F5CC5A18-4264-101A-8C59-08002B2F8426@ncacn_http:"));
    assert!(runtime.string_bindings()[0].ends_with("[6004]"));

    session.nspi_unbind().await.unwrap();
    assert_eq!(runtime.live_bindings(), 0);
}
