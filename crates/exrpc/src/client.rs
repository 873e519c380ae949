//! Client facade
//!
//! Drives a [`SessionContext`] from a [`ClientConfig`]: expands the SPN,
//! installs the identity, binds and connects. Connect attempts that fail
//! with a transient RPC status (1700..=1799) are retried on a fresh
//! binding, since a faulted binding is never reused.

use crate::binding::BindRequest;
use crate::config::ClientConfig;
use crate::error::{Result, RpcError};
use crate::interface::Protocol;
use crate::nspi::Stat;
use crate::runtime::SharedRuntime;
use crate::session::SessionContext;
use crate::status;
use tracing::{debug, info, warn};

/// Session-establishing call retried by the client
#[derive(Clone, Copy)]
enum Establish<'a> {
    Store { user_dn: &'a str },
    NameService { flags: u32, stat: Stat },
}

pub struct ExchangeClient {
    runtime: SharedRuntime,
    config: ClientConfig,
}

impl ExchangeClient {
    pub fn new(runtime: SharedRuntime, config: ClientConfig) -> Self {
        Self { runtime, config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Bind request derived from the configuration
    pub fn bind_request(&self) -> BindRequest {
        let config = &self.config;
        let mut request = BindRequest::new(config.server.as_str(), config.transport.to_ascii_lowercase())
            .auth_level(config.auth_level)
            .authn_service(config.authn_service)
            .use_ssl(config.use_ssl)
            .set_object_uuid(config.set_object_uuid);
        if let Some(scheme) = &config.http_auth_scheme {
            request = request.http_auth_scheme(scheme.as_str());
        }
        if let Some(spn) = config.spn() {
            request = request.spn(spn);
        }
        if let Some(options) = &config.options {
            request = request.options(options.as_str());
        }
        request
    }

    /// Bind and connect a Store session for `user_dn`
    pub async fn connect_store(&self, user_dn: &str) -> Result<SessionContext> {
        let mut session = self.new_session(Protocol::Store);
        self.establish(&mut session, Establish::Store { user_dn }).await?;
        info!("Store session established on {}", self.config.server);
        Ok(session)
    }

    /// Bind an address book session
    pub async fn bind_name_service(&self, flags: u32, stat: Stat) -> Result<SessionContext> {
        let mut session = self.new_session(Protocol::NameService);
        self.establish(&mut session, Establish::NameService { flags, stat })
            .await?;
        info!("Address book session established on {}", self.config.server);
        Ok(session)
    }

    fn new_session(&self, protocol: Protocol) -> SessionContext {
        let mut session =
            SessionContext::with_config(self.runtime.clone(), protocol, self.config.session.clone());
        session.set_identity(&self.config.domain, &self.config.user, &self.config.password);
        session
    }

    async fn establish(&self, session: &mut SessionContext, step: Establish<'_>) -> Result<()> {
        let request = self.bind_request();
        let policy = self.config.retry;
        let mut attempt = 0u32;

        loop {
            session.bind(&request).await?;
            let outcome = match step {
                Establish::Store { user_dn } => session.connect(user_dn).await.map(|_| ()),
                Establish::NameService { flags, stat } => {
                    session.nspi_bind(flags, stat).await.map(|_| ())
                }
            };

            match outcome {
                Ok(()) => return Ok(()),
                Err(err) if err.is_retryable() && attempt < policy.max_retries => {
                    attempt += 1;
                    warn!(
                        "Cannot reach RPC server ({}), retry {} of {}",
                        err, attempt, policy.max_retries
                    );
                    tokio::time::sleep(policy.wait).await;
                }
                Err(err) => {
                    self.explain(&err);
                    return Err(err);
                }
            }
        }
    }

    fn explain(&self, err: &RpcError) {
        if let RpcError::CallFailed(code) = err {
            if *code == status::EC_NOT_ENCRYPTED && !self.config.auth_level.requires_encryption() {
                warn!(
                    "Server requires encryption but auth level is {:?}; use PktPrivacy",
                    self.config.auth_level
                );
            }
        }
        debug!("Giving up on {}: status 0x{:08x}", self.config.server, err.status());
    }
}

impl std::fmt::Debug for ExchangeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeClient")
            .field("server", &self.config.server)
            .field("transport", &self.config.transport)
            .finish()
    }
}
