//! Binding negotiation
//!
//! Turns a server address, transport and security settings into a resolved,
//! authenticated binding handle:
//!
//! 1. validate and plan (no runtime calls; failures leave no trace)
//! 2. compose the string binding
//! 3. bind from the string binding
//! 4. resolve the interface endpoint
//! 5. attach auth info and QoS
//!
//! The handle from step 3 lives in a [`BoundBinding`] guard, so a failure in
//! steps 4 or 5 frees it on the way out.

use crate::credentials::AuthIdentity;
use crate::error::{BindStep, Result, RpcError};
use crate::interface::Protocol;
use crate::runtime::{AuthInfo, BindingHandle, SharedRuntime};
use crate::security::{AuthLevel, AuthnService, SecurityPolicy};
use crate::string_binding::{StringBinding, TransportDescriptor, TransportSequence};
use crate::wide::WideString;
use tracing::{debug, trace, warn};

/// Caller input for one bind attempt
#[derive(Debug, Clone)]
pub struct BindRequest {
    server: String,
    auth_level: AuthLevel,
    authn_service: AuthnService,
    sequence: String,
    endpoint: Option<String>,
    use_ssl: bool,
    http_auth_scheme: Option<String>,
    spn: Option<String>,
    options: Option<String>,
    set_object_uuid: bool,
}

impl BindRequest {
    /// Bind to `server` over `sequence` with the default security settings
    pub fn new(server: impl Into<String>, sequence: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            auth_level: AuthLevel::default(),
            authn_service: AuthnService::default(),
            sequence: sequence.into(),
            endpoint: None,
            use_ssl: false,
            http_auth_scheme: None,
            spn: None,
            options: None,
            set_object_uuid: false,
        }
    }

    pub fn auth_level(mut self, level: AuthLevel) -> Self {
        self.auth_level = level;
        self
    }

    pub fn authn_service(mut self, service: AuthnService) -> Self {
        self.authn_service = service;
        self
    }

    /// Endpoint for non-HTTP sequences; `ncacn_http` always uses the
    /// protocol's well-known port
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn use_ssl(mut self, use_ssl: bool) -> Self {
        self.use_ssl = use_ssl;
        self
    }

    /// RPC/HTTP scheme name, "Basic" or "NTLM"
    pub fn http_auth_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.http_auth_scheme = Some(scheme.into());
        self
    }

    pub fn spn(mut self, spn: impl Into<String>) -> Self {
        self.spn = Some(spn.into());
        self
    }

    pub fn options(mut self, options: impl Into<String>) -> Self {
        self.options = Some(options.into());
        self
    }

    pub fn set_object_uuid(mut self, set: bool) -> Self {
        self.set_object_uuid = set;
        self
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn sequence(&self) -> &str {
        &self.sequence
    }

    /// Validate the request and derive everything the runtime steps need
    pub fn plan(&self, protocol: Protocol) -> Result<BindPlan> {
        let server = self.server.trim();
        if server.is_empty() {
            return Err(RpcError::EmptyServerAddress);
        }
        if self.sequence.is_empty() {
            return Err(RpcError::EmptyTransport);
        }

        let sequence = TransportSequence::parse(&self.sequence);
        let policy = SecurityPolicy::negotiate(
            self.auth_level,
            self.authn_service,
            self.spn.as_deref(),
            &sequence,
            self.http_auth_scheme.as_deref(),
            self.use_ssl,
        )?;

        let transport = TransportDescriptor::resolve(protocol, &sequence, self.endpoint.as_deref());
        let mut string_binding = StringBinding::new(transport, server);
        if let Some(options) = &self.options {
            string_binding = string_binding.with_options(options.as_str());
        }
        if self.set_object_uuid {
            string_binding = string_binding.with_object_uuid(protocol.object_uuid());
        }

        Ok(BindPlan {
            protocol,
            string_binding,
            policy,
        })
    }
}

/// Validated bind attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindPlan {
    pub protocol: Protocol,
    pub string_binding: StringBinding,
    pub policy: SecurityPolicy,
}

impl BindPlan {
    /// Run the runtime steps of the plan
    pub async fn execute(
        &self,
        runtime: &SharedRuntime,
        identity: Option<&AuthIdentity>,
    ) -> Result<BoundBinding> {
        let composed = WideString::from(self.string_binding.to_string().as_str());
        debug!(
            "Binding to {} over {} ({})",
            self.string_binding.network_addr, self.string_binding.protseq, self.protocol
        );

        let handle = runtime
            .binding_from_string_binding(&composed)
            .await
            .map_err(|f| f.into_bind_error(BindStep::FromStringBinding))?;
        let binding = BoundBinding::new(runtime.clone(), handle);

        let interface = self.protocol.interface();
        runtime
            .ep_resolve_binding(handle, &interface)
            .await
            .map_err(|f| f.into_bind_error(BindStep::ResolveEndpoint))?;
        trace!("Resolved endpoint for {}", interface);

        let info = AuthInfo {
            spn: self.policy.spn.as_ref(),
            auth_level: self.policy.auth_level,
            authn_service: self.policy.authn_service,
            identity,
            authz_service: 0,
            qos: self.policy.qos.as_ref(),
        };
        runtime
            .binding_set_auth_info(handle, info)
            .await
            .map_err(|f| f.into_bind_error(BindStep::SetAuthInfo))?;

        debug!(
            "Bind successful: auth_level={:?}, authn_service={:?}, http_qos={}",
            self.policy.auth_level,
            self.policy.authn_service,
            self.policy.qos.is_some()
        );

        Ok(binding)
    }
}

/// Binding handle that is freed when dropped
pub struct BoundBinding {
    runtime: SharedRuntime,
    handle: BindingHandle,
}

impl BoundBinding {
    pub fn new(runtime: SharedRuntime, handle: BindingHandle) -> Self {
        Self { runtime, handle }
    }

    pub fn handle(&self) -> BindingHandle {
        self.handle
    }
}

impl Drop for BoundBinding {
    fn drop(&mut self) {
        match self.runtime.binding_free(self.handle) {
            Ok(()) => trace!("Freed binding handle {}", self.handle.raw()),
            Err(fault) => warn!(
                "Failed to free binding handle {}: 0x{:08x}",
                self.handle.raw(),
                fault.code()
            ),
        }
    }
}

impl std::fmt::Debug for BoundBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundBinding")
            .field("handle", &self.handle)
            .finish()
    }
}
