//! Security policy selection
//!
//! Derives the authentication information attached to a binding handle:
//! - authentication level and service (RPC_C_AUTHN_*)
//! - target service principal name (Kerberos only)
//! - the RPC over HTTP quality-of-service block (Basic or NTLM, SSL on/off)

use crate::error::{Result, RpcError};
use crate::string_binding::TransportSequence;
use crate::wide::WideString;

/// Authentication levels (RPC_C_AUTHN_LEVEL_*)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u32)]
pub enum AuthLevel {
    /// Let the runtime pick
    Default = 0,
    /// No authentication
    None = 1,
    /// Connect-level authentication (authenticate at connection)
    Connect = 2,
    /// Call-level authentication (authenticate each call)
    Call = 3,
    /// Packet-level authentication (authenticate each packet)
    Pkt = 4,
    /// Packet integrity (sign each packet)
    PktIntegrity = 5,
    /// Packet privacy (encrypt each packet)
    PktPrivacy = 6,
}

impl AuthLevel {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Default),
            1 => Some(Self::None),
            2 => Some(Self::Connect),
            3 => Some(Self::Call),
            4 => Some(Self::Pkt),
            5 => Some(Self::PktIntegrity),
            6 => Some(Self::PktPrivacy),
            _ => None,
        }
    }

    /// Whether every packet is encrypted at this level
    pub fn requires_encryption(&self) -> bool {
        matches!(self, Self::PktPrivacy)
    }
}

impl Default for AuthLevel {
    fn default() -> Self {
        Self::PktPrivacy
    }
}

/// Authentication services (RPC_C_AUTHN_*)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum AuthnService {
    /// No authentication
    None = 0,
    /// OSF DCE private key authentication
    DcePrivate = 1,
    /// OSF DCE public key authentication
    DcePublic = 2,
    /// SPNEGO
    GssNegotiate = 9,
    /// NTLM
    WinNt = 10,
    /// Schannel
    GssSchannel = 14,
    /// Kerberos
    GssKerberos = 16,
    /// Let the runtime pick
    Default = 0xffff_ffff,
}

impl AuthnService {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::None),
            1 => Some(Self::DcePrivate),
            2 => Some(Self::DcePublic),
            9 => Some(Self::GssNegotiate),
            10 => Some(Self::WinNt),
            14 => Some(Self::GssSchannel),
            16 => Some(Self::GssKerberos),
            0xffff_ffff => Some(Self::Default),
            _ => None,
        }
    }

    /// Only Kerberos carries a target SPN in the auth info
    pub fn uses_spn(&self) -> bool {
        matches!(self, Self::GssKerberos)
    }
}

impl Default for AuthnService {
    fn default() -> Self {
        Self::WinNt
    }
}

/// RPC over HTTP authentication schemes (RPC_C_HTTP_AUTHN_SCHEME_*)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum HttpAuthScheme {
    Basic = 0x1,
    Ntlm = 0x2,
}

impl HttpAuthScheme {
    /// Case-insensitive match on "Basic" or "NTLM"
    pub fn parse(name: &str) -> Result<Self> {
        if name.eq_ignore_ascii_case("Basic") {
            Ok(Self::Basic)
        } else if name.eq_ignore_ascii_case("NTLM") {
            Ok(Self::Ntlm)
        } else {
            Err(RpcError::UnsupportedAuthScheme(name.to_string()))
        }
    }
}

/// RPC over HTTP credential flags (RPC_C_HTTP_FLAG_*)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HttpFlags(u32);

impl HttpFlags {
    /// Use SSL to reach the RPC proxy
    pub const USE_SSL: u32 = 0x1;
    /// Only try the first scheme in the list
    pub const USE_FIRST_AUTH_SCHEME: u32 = 0x2;

    pub fn new() -> Self {
        Self(0)
    }

    pub fn set(&mut self, flag: u32) -> &mut Self {
        self.0 |= flag;
        self
    }

    pub fn use_ssl(&self) -> bool {
        (self.0 & Self::USE_SSL) != 0
    }

    pub fn use_first_auth_scheme(&self) -> bool {
        (self.0 & Self::USE_FIRST_AUTH_SCHEME) != 0
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

/// `RPC_C_HTTP_AUTHN_TARGET_SERVER`
pub const HTTP_AUTHN_TARGET_SERVER: u32 = 1;
/// `RPC_C_SECURITY_QOS_VERSION_2`
pub const SECURITY_QOS_VERSION_2: u32 = 2;
/// `RPC_C_QOS_CAPABILITIES_DEFAULT`
pub const QOS_CAPABILITIES_DEFAULT: u32 = 0;
/// `RPC_C_QOS_IDENTITY_DYNAMIC`
pub const QOS_IDENTITY_DYNAMIC: u32 = 1;
/// `RPC_C_IMP_LEVEL_IMPERSONATE`
pub const IMP_LEVEL_IMPERSONATE: u32 = 3;
/// `RPC_C_AUTHN_INFO_TYPE_HTTP`
pub const AUTHN_INFO_TYPE_HTTP: u32 = 1;

/// HTTP transport credentials of the QoS block
///
/// The transport credentials themselves are the session's current identity,
/// passed alongside in [`crate::runtime::AuthInfo`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpCredentials {
    pub flags: HttpFlags,
    pub authn_target: u32,
    pub schemes: Vec<HttpAuthScheme>,
}

/// Quality-of-service block (`RPC_SECURITY_QOS_V2`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityQos {
    pub version: u32,
    pub capabilities: u32,
    pub identity_tracking: u32,
    pub impersonation_type: u32,
    pub additional_info_type: u32,
    pub http: HttpCredentials,
}

impl SecurityQos {
    /// QoS selecting a single HTTP scheme
    pub fn http(scheme: HttpAuthScheme, use_ssl: bool) -> Self {
        let mut flags = HttpFlags::new();
        flags.set(HttpFlags::USE_FIRST_AUTH_SCHEME);
        if use_ssl {
            flags.set(HttpFlags::USE_SSL);
        }

        Self {
            version: SECURITY_QOS_VERSION_2,
            capabilities: QOS_CAPABILITIES_DEFAULT,
            identity_tracking: QOS_IDENTITY_DYNAMIC,
            impersonation_type: IMP_LEVEL_IMPERSONATE,
            additional_info_type: AUTHN_INFO_TYPE_HTTP,
            http: HttpCredentials {
                flags,
                authn_target: HTTP_AUTHN_TARGET_SERVER,
                schemes: vec![scheme],
            },
        }
    }

    pub fn scheme(&self) -> Option<HttpAuthScheme> {
        self.http.schemes.first().copied()
    }
}

/// Select the QoS block for a transport
///
/// Only `ncacn_http` with a scheme name produces a QoS; the SSL flag is
/// ignored for every other transport.
pub fn select_qos(
    transport: &TransportSequence,
    scheme: Option<&str>,
    use_ssl: bool,
) -> Result<Option<SecurityQos>> {
    match (transport.is_http(), scheme) {
        (true, Some(name)) => {
            let scheme = HttpAuthScheme::parse(name)?;
            Ok(Some(SecurityQos::http(scheme, use_ssl)))
        }
        _ => Ok(None),
    }
}

/// Authentication settings for one binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityPolicy {
    pub auth_level: AuthLevel,
    pub authn_service: AuthnService,
    /// Target SPN, present only for Kerberos
    pub spn: Option<WideString>,
    pub qos: Option<SecurityQos>,
}

impl SecurityPolicy {
    /// Derive the policy from caller input
    pub fn negotiate(
        auth_level: AuthLevel,
        authn_service: AuthnService,
        spn: Option<&str>,
        transport: &TransportSequence,
        http_scheme: Option<&str>,
        use_ssl: bool,
    ) -> Result<Self> {
        let spn = if authn_service.uses_spn() {
            match spn {
                Some(spn) if !spn.is_empty() => Some(WideString::from(spn)),
                _ => return Err(RpcError::MissingSpn),
            }
        } else {
            None
        };

        let qos = select_qos(transport, http_scheme, use_ssl)?;

        Ok(Self {
            auth_level,
            authn_service,
            spn,
            qos,
        })
    }
}
