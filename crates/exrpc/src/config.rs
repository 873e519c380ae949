//! Session and client configuration

use crate::security::{AuthLevel, AuthnService};
use regex::{NoExpand, Regex, RegexBuilder};
use std::sync::LazyLock;
use std::time::Duration;

/// Placeholder substituted with the server name in an SPN format
pub const SPN_SERVER_PLACEHOLDER: &str = "[ServerName]";

/// Per-session settings
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// Set `RPC_C_OPT_DONT_LINGER` before freeing the binding on disconnect
    pub force_shutdown_association: bool,
}

impl SessionConfig {
    pub fn force_shutdown_association(mut self, enabled: bool) -> Self {
        self.force_shutdown_association = enabled;
        self
    }
}

/// Connect retry policy for transient RPC statuses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one
    pub max_retries: u32,
    pub wait: Duration,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            wait: Duration::ZERO,
        }
    }

    pub fn new(max_retries: u32, wait: Duration) -> Self {
        Self { max_retries, wait }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            wait: Duration::from_secs(5),
        }
    }
}

/// Everything the client facade needs to reach one server
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server: String,
    pub domain: String,
    pub user: String,
    pub password: String,
    pub transport: String,
    pub auth_level: AuthLevel,
    pub authn_service: AuthnService,
    pub use_ssl: bool,
    pub http_auth_scheme: Option<String>,
    /// SPN template, e.g. `exchangeMDB/[ServerName]`
    pub spn_format: Option<String>,
    pub options: Option<String>,
    pub set_object_uuid: bool,
    pub retry: RetryPolicy,
    pub session: SessionConfig,
}

impl ClientConfig {
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            domain: String::new(),
            user: String::new(),
            password: String::new(),
            transport: crate::string_binding::NCACN_IP_TCP.to_string(),
            auth_level: AuthLevel::default(),
            authn_service: AuthnService::default(),
            use_ssl: false,
            http_auth_scheme: None,
            spn_format: None,
            options: None,
            set_object_uuid: false,
            retry: RetryPolicy::default(),
            session: SessionConfig::default(),
        }
    }

    pub fn with_credentials(
        mut self,
        domain: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.domain = domain.into();
        self.user = user.into();
        self.password = password.into();
        self
    }

    pub fn with_transport(mut self, transport: impl Into<String>) -> Self {
        self.transport = transport.into();
        self
    }

    pub fn with_auth(mut self, level: AuthLevel, service: AuthnService) -> Self {
        self.auth_level = level;
        self.authn_service = service;
        self
    }

    /// RPC over HTTP with the given scheme name
    pub fn with_http(mut self, scheme: impl Into<String>, use_ssl: bool) -> Self {
        self.http_auth_scheme = Some(scheme.into());
        self.use_ssl = use_ssl;
        self
    }

    pub fn with_spn_format(mut self, format: impl Into<String>) -> Self {
        self.spn_format = Some(format.into());
        self
    }

    pub fn with_options(mut self, options: impl Into<String>) -> Self {
        self.options = Some(options.into());
        self
    }

    pub fn with_object_uuid(mut self, set: bool) -> Self {
        self.set_object_uuid = set;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }

    /// SPN for this server, if an SPN format is configured
    pub fn spn(&self) -> Option<String> {
        self.spn_format
            .as_deref()
            .map(|format| expand_spn(format, &self.server))
    }
}

static SERVER_NAME: LazyLock<Regex> = LazyLock::new(|| {
    RegexBuilder::new(&regex::escape(SPN_SERVER_PLACEHOLDER))
        .case_insensitive(true)
        .build()
        .expect("SERVER_NAME regex should compile")
});

/// Replace every `[ServerName]` in `format`, ignoring case
pub fn expand_spn(format: &str, server: &str) -> String {
    SERVER_NAME.replace_all(format, NoExpand(server)).into_owned()
}
