//! Credential store
//!
//! Holds the domain, user name and password used to authenticate a binding,
//! normalized to UTF-16 the way `SEC_WINNT_AUTH_IDENTITY_W` carries them.
//! Buffers are zeroed before they are replaced and when the store is dropped.

use crate::wide::WideString;
use std::fmt;

/// `SEC_WINNT_AUTH_IDENTITY_UNICODE`
pub const SEC_WINNT_AUTH_IDENTITY_UNICODE: u32 = 0x2;

/// Authentication identity handed to the runtime with the auth info
#[derive(Clone, Default)]
pub struct AuthIdentity {
    domain: WideString,
    user: WideString,
    password: WideString,
    flags: u32,
}

impl AuthIdentity {
    pub fn domain(&self) -> &WideString {
        &self.domain
    }

    pub fn user(&self) -> &WideString {
        &self.user
    }

    pub fn password(&self) -> &WideString {
        &self.password
    }

    pub fn flags(&self) -> u32 {
        self.flags
    }

    fn wipe(&mut self) {
        self.domain.wipe();
        self.user.wipe();
        self.password.wipe();
        self.flags = 0;
    }
}

impl Drop for AuthIdentity {
    fn drop(&mut self) {
        self.wipe();
    }
}

impl fmt::Debug for AuthIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthIdentity")
            .field("domain", &self.domain)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("flags", &self.flags)
            .finish()
    }
}

/// Holds at most one identity per session context
#[derive(Debug, Default)]
pub struct CredentialStore {
    identity: Option<AuthIdentity>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored identity
    ///
    /// Only non-empty fields are populated; the previous buffers are zeroed
    /// first so nothing of the old credential survives.
    pub fn set_identity(&mut self, domain: &str, user: &str, password: &str) {
        let identity = self.identity.get_or_insert_with(AuthIdentity::default);
        identity.wipe();

        if !domain.is_empty() {
            identity.domain = WideString::from(domain);
        }
        if !user.is_empty() {
            identity.user = WideString::from(user);
        }
        if !password.is_empty() {
            identity.password = WideString::from(password);
        }
        identity.flags = SEC_WINNT_AUTH_IDENTITY_UNICODE;
    }

    /// The current identity, if `set_identity` has been called
    pub fn identity(&self) -> Option<&AuthIdentity> {
        self.identity.as_ref()
    }
}
