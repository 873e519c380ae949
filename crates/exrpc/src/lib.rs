//! Exchange RPC session binding and authentication
//!
//! This crate establishes authenticated bindings to an Exchange server for
//! the EMSMDB (MS-OXCRPC) and NSPI (MS-OXNSPI) interfaces and manages the
//! sessions carried over them.
//!
//! # Features
//!
//! - String binding composition for `ncacn_http`, `ncacn_ip_tcp` and any
//!   other protocol sequence
//! - RPC/HTTP quality of service (Basic or NTLM, optional SSL)
//! - Credential store with zeroed buffers
//! - Session lifecycle: connect, ROP transfer, push notification
//!   registration, async notification wait with timeout, disconnect
//! - NSPI bind and unbind
//! - Client facade with retry on transient RPC statuses
//!
//! The RPC runtime and the generated call stubs are external; they are
//! reached through [`RpcRuntime`], [`EmsmdbStub`] and [`NspiStub`].
//! [`LoopbackRuntime`] serves all three in-process.
//!
//! # Example
//!
//! ```no_run
//! use exrpc::{BindRequest, LoopbackRuntime, Protocol, SessionContext};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> exrpc::Result<()> {
//!     let runtime = Arc::new(LoopbackRuntime::new());
//!     let mut session = SessionContext::new(runtime, Protocol::Store);
//!
//!     session.set_identity("CONTOSO", "alice", "P@ssw0rd");
//!     session
//!         .bind(
//!             &BindRequest::new("mail.contoso.com", "ncacn_http")
//!                 .http_auth_scheme("NTLM")
//!                 .use_ssl(true),
//!         )
//!         .await?;
//!
//!     let info = session.connect("/o=Contoso/ou=First Administrative Group/cn=Recipients/cn=alice").await?;
//!     println!("connected as {}", info.display_name);
//!
//!     let mut notifications = session.async_connect().await?;
//!     let outcome = notifications.wait_with_timeout(0, 30).await?;
//!     println!("events pending: {}", outcome.notifications_pending());
//!
//!     session.disconnect().await
//! }
//! ```

pub mod error;
pub mod status;

// Identifiers and encodings
pub mod interface;
pub mod string_binding;
pub mod wide;

// Authentication
pub mod credentials;
pub mod security;

// Runtime seam
pub mod loopback;
pub mod runtime;

// Call parameters
pub mod emsmdb;
pub mod notification;
pub mod nspi;

// Sessions
pub mod async_wait;
pub mod binding;
pub mod client;
pub mod config;
pub mod session;

pub use error::{BindStep, Result, RpcError};

pub use interface::{InterfaceId, Protocol, Uuid};
pub use string_binding::{StringBinding, TransportDescriptor, TransportSequence, NCACN_HTTP, NCACN_IP_TCP};
pub use wide::WideString;

pub use credentials::{AuthIdentity, CredentialStore};
pub use security::{
    AuthLevel, AuthnService, HttpAuthScheme, HttpFlags, SecurityPolicy, SecurityQos,
};

pub use loopback::{LoopbackRuntime, Op};
pub use runtime::{
    AsyncHandle, AsyncReply, AuthInfo, BindingHandle, BindingOption, ContextHandle, EmsmdbStub,
    ExchangeRuntime, NspiStub, RpcRuntime, RuntimeFault, RuntimeResult, SharedRuntime,
};

pub use emsmdb::{connection_modulus, ConnectInfo, RopResponse, NOTIFICATION_PENDING};
pub use notification::{AddressFamily, CallbackAddress, AF_INET, AF_INET6};
pub use nspi::{Stat, FLAG_ANONYMOUS_LOGIN};

pub use async_wait::{AsyncSession, AsyncWaitOutcome, ASYNC_POLL_INTERVAL};
pub use binding::{BindPlan, BindRequest, BoundBinding};
pub use client::ExchangeClient;
pub use config::{ClientConfig, RetryPolicy, SessionConfig};
pub use session::{SessionContext, SessionState};
