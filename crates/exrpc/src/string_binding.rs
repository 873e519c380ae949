//! Protocol sequences and string bindings
//!
//! A string binding has the form
//! `[ObjectUuid@]ProtocolSequence:NetworkAddress[[Endpoint][,Options]]`,
//! the same text `RpcStringBindingCompose` produces.

use crate::interface::{Protocol, Uuid};
use std::fmt;

/// RPC over HTTP protocol sequence
pub const NCACN_HTTP: &str = "ncacn_http";
/// RPC over TCP/IP protocol sequence
pub const NCACN_IP_TCP: &str = "ncacn_ip_tcp";

/// Protocol sequence requested by the caller
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportSequence {
    /// `ncacn_http`, matched case-insensitively
    Http,
    /// Any other sequence, kept exactly as supplied
    Named(String),
}

impl TransportSequence {
    pub fn parse(token: &str) -> Self {
        if token.eq_ignore_ascii_case(NCACN_HTTP) {
            Self::Http
        } else {
            Self::Named(token.to_string())
        }
    }

    pub fn is_http(&self) -> bool {
        matches!(self, Self::Http)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Http => NCACN_HTTP,
            Self::Named(token) => token,
        }
    }
}

impl fmt::Display for TransportSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Protocol sequence and endpoint after transport resolution
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportDescriptor {
    pub protseq: String,
    /// `None` leaves the endpoint to the endpoint mapper
    pub endpoint: Option<String>,
}

impl TransportDescriptor {
    /// Resolve the descriptor for `protocol`
    ///
    /// `ncacn_http` always uses the protocol's well-known port and ignores
    /// `endpoint`; every other sequence passes through verbatim.
    pub fn resolve(protocol: Protocol, sequence: &TransportSequence, endpoint: Option<&str>) -> Self {
        match sequence {
            TransportSequence::Http => Self {
                protseq: NCACN_HTTP.to_string(),
                endpoint: Some(protocol.http_endpoint().to_string()),
            },
            TransportSequence::Named(token) => Self {
                protseq: token.clone(),
                endpoint: endpoint.filter(|e| !e.is_empty()).map(str::to_string),
            },
        }
    }
}

/// String binding
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StringBinding {
    pub object_uuid: Option<Uuid>,
    pub protseq: String,
    pub network_addr: String,
    pub endpoint: Option<String>,
    pub options: Option<String>,
}

impl StringBinding {
    pub fn new(transport: TransportDescriptor, network_addr: impl Into<String>) -> Self {
        Self {
            object_uuid: None,
            protseq: transport.protseq,
            network_addr: network_addr.into(),
            endpoint: transport.endpoint,
            options: None,
        }
    }

    pub fn with_object_uuid(mut self, uuid: Uuid) -> Self {
        self.object_uuid = Some(uuid);
        self
    }

    pub fn with_options(mut self, options: impl Into<String>) -> Self {
        let options = options.into();
        self.options = if options.is_empty() { None } else { Some(options) };
        self
    }
}

impl fmt::Display for StringBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(uuid) = &self.object_uuid {
            write!(f, "{}@", uuid)?;
        }
        write!(f, "{}:{}", self.protseq, self.network_addr)?;
        match (&self.endpoint, &self.options) {
            (None, None) => Ok(()),
            (Some(endpoint), None) => write!(f, "[{}]", endpoint),
            (endpoint, Some(options)) => {
                write!(f, "[{},{}]", endpoint.as_deref().unwrap_or(""), options)
            }
        }
    }
}
