//! Session lifecycle
//!
//! A [`SessionContext`] carries what would otherwise be process-wide state:
//! the credential store, the current binding handle and the session context
//! handle. Every operation borrows it mutably, so one context is driven by
//! one caller at a time; separate contexts are independent.
//!
//! ```text
//!            bind              connect / nspi_bind
//! Unbound ---------> Bound ------------------------> Connected
//!    ^                 |                                 |
//!    |  bind (again)   | any failure                     | disconnect
//!    +---- Faulted <---+---------------------------------+---> Disconnected
//! ```
//!
//! Faulted and Disconnected contexts accept nothing but a new `bind`.

use crate::async_wait::{AsyncSession, SessionLink};
use crate::binding::{BindRequest, BoundBinding};
use crate::config::SessionConfig;
use crate::credentials::CredentialStore;
use crate::emsmdb::{
    ConnectInfo, ConnectRequest, PushNotificationRequest, RopResponse, RpcExt2Request,
    ADVISE_BITS_ALL, I_RPC, MAX_AUX_OUT, RPC_EXT2_FLAGS,
};
use crate::error::{Result, RpcError};
use crate::interface::{Protocol, Uuid};
use crate::notification::CallbackAddress;
use crate::nspi::{NspiBindRequest, Stat, UNBIND_SUCCESS};
use crate::runtime::{BindingHandle, BindingOption, ContextHandle, SharedRuntime};
use crate::status::{self, RPC_S_OK};
use bytes::Bytes;
use tracing::{debug, info, trace, warn};

/// Lifecycle state of a session context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No binding handle
    Unbound,
    /// Binding handle resolved and authenticated
    Bound,
    /// Session context handle established
    Connected,
    /// Session released by an explicit disconnect
    Disconnected,
    /// A step returned a failure; the handle must not be reused
    Faulted,
}

/// One logical session with an Exchange interface
pub struct SessionContext {
    runtime: SharedRuntime,
    protocol: Protocol,
    config: SessionConfig,
    credentials: CredentialStore,
    binding: Option<BoundBinding>,
    context: ContextHandle,
    connect_info: Option<ConnectInfo>,
    server_guid: Option<Uuid>,
    state: SessionState,
    /// Lifecycle shared with every ACXH opened on this session
    async_links: Vec<SessionLink>,
}

impl SessionContext {
    pub fn new(runtime: SharedRuntime, protocol: Protocol) -> Self {
        Self::with_config(runtime, protocol, SessionConfig::default())
    }

    pub fn with_config(runtime: SharedRuntime, protocol: Protocol, config: SessionConfig) -> Self {
        Self {
            runtime,
            protocol,
            config,
            credentials: CredentialStore::new(),
            binding: None,
            context: ContextHandle::NIL,
            connect_info: None,
            server_guid: None,
            state: SessionState::Unbound,
            async_links: Vec::new(),
        }
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    /// Current binding handle, if bound
    pub fn binding_handle(&self) -> Option<BindingHandle> {
        self.binding.as_ref().map(BoundBinding::handle)
    }

    /// Session context handle, if connected
    pub fn context_handle(&self) -> Option<ContextHandle> {
        if self.state == SessionState::Connected {
            Some(self.context)
        } else {
            None
        }
    }

    /// Details returned by EcDoConnectEx
    pub fn connect_info(&self) -> Option<&ConnectInfo> {
        self.connect_info.as_ref()
    }

    /// Server GUID returned by NspiBind
    pub fn server_guid(&self) -> Option<Uuid> {
        self.server_guid
    }

    /// Set the identity used by the next `bind`
    pub fn set_identity(&mut self, domain: &str, user: &str, password: &str) {
        self.credentials.set_identity(domain, user, password);
        debug!("Identity set for {}\\{}", domain, user);
    }

    /// Resolve and authenticate a new binding handle
    ///
    /// Validation failures leave the context untouched. Past validation the
    /// previous binding is released first; on failure the context is left
    /// Faulted with no binding.
    pub async fn bind(&mut self, request: &BindRequest) -> Result<()> {
        if self.state == SessionState::Connected {
            return Err(self.invalid_state("bind"));
        }

        let plan = request.plan(self.protocol)?;

        if self.binding.take().is_some() {
            debug!("Releasing previous binding before rebinding");
        }
        self.reset_session();

        let result = plan.execute(&self.runtime, self.credentials.identity()).await;
        match result {
            Ok(binding) => {
                self.binding = Some(binding);
                self.state = SessionState::Bound;
                Ok(())
            }
            Err(err) => Err(self.fault("bind", err)),
        }
    }

    /// Establish a Store session (EcDoConnectEx)
    pub async fn connect(&mut self, user_dn: &str) -> Result<&ConnectInfo> {
        self.require_protocol("connect", Protocol::Store)?;
        let binding = self.require_bound("connect")?;

        let request = ConnectRequest::new(user_dn);
        debug!("Connecting as {} (con_mod=0x{:08x})", user_dn, request.con_mod);

        let result = self.runtime.ec_do_connect_ex(binding, &request).await;
        let reply = match result {
            Ok(reply) => reply,
            Err(fault) => return Err(self.fault("connect", fault.into())),
        };
        if reply.status != RPC_S_OK {
            return Err(self.fault("connect", RpcError::CallFailed(reply.status)));
        }

        info!(
            "Connected to {} as {:?}, server version {:?}",
            self.protocol, reply.display_name, reply.server_version
        );
        self.context = reply.cxh;
        self.state = SessionState::Connected;
        Ok(self.connect_info.insert(ConnectInfo::from(&reply)))
    }

    /// Establish an address book session (NspiBind)
    pub async fn nspi_bind(&mut self, flags: u32, stat: Stat) -> Result<Option<Uuid>> {
        self.require_protocol("nspi_bind", Protocol::NameService)?;
        let binding = self.require_bound("nspi_bind")?;

        let request = NspiBindRequest {
            flags,
            stat,
            want_server_guid: true,
        };
        let result = self.runtime.nspi_bind(binding, &request).await;
        let reply = match result {
            Ok(reply) => reply,
            Err(fault) => return Err(self.fault("nspi_bind", fault.into())),
        };
        if reply.status != RPC_S_OK {
            return Err(self.fault("nspi_bind", RpcError::CallFailed(reply.status)));
        }

        debug!("NspiBind successful, server guid {:?}", reply.server_guid);
        self.context = reply.context;
        self.server_guid = reply.server_guid;
        self.state = SessionState::Connected;
        Ok(reply.server_guid)
    }

    /// Send a ROP request buffer (EcDoRpcExt2)
    pub async fn do_rpc_ext2(&mut self, rop_in: Bytes, max_rop_out: u32) -> Result<RopResponse> {
        self.require_protocol("do_rpc_ext2", Protocol::Store)?;
        let cxh = self.require_connected("do_rpc_ext2")?;

        let request = RpcExt2Request {
            cxh,
            flags: RPC_EXT2_FLAGS,
            rop_in,
            max_rop_out,
            aux_in: Bytes::new(),
            max_aux_out: MAX_AUX_OUT,
        };
        trace!("EcDoRpcExt2: {} bytes in", request.rop_in.len());

        let result = self.runtime.ec_do_rpc_ext2(&request).await;
        let reply = match result {
            Ok(reply) => reply,
            Err(fault) => return Err(self.fault("do_rpc_ext2", fault.into())),
        };
        if reply.status != RPC_S_OK {
            return Err(self.fault("do_rpc_ext2", RpcError::CallFailed(reply.status)));
        }

        self.context = reply.cxh;
        Ok(RopResponse {
            flags: reply.flags,
            rop_out: reply.rop_out,
            aux_out: reply.aux_out,
            trans_time_ms: reply.trans_time_ms,
        })
    }

    /// Register a callback address for push notifications
    ///
    /// Returns the server's notification handle.
    pub async fn register_push_notification(
        &mut self,
        family: u16,
        ip: &str,
        port: u16,
        context: &[u8],
    ) -> Result<u32> {
        self.require_protocol("register_push_notification", Protocol::Store)?;
        let cxh = self.require_connected("register_push_notification")?;

        if context.len() > u16::MAX as usize {
            return Err(RpcError::InvalidAddress(format!(
                "notification context too large: {} bytes",
                context.len()
            )));
        }
        let address = CallbackAddress::new(family, ip, port)?;

        let request = PushNotificationRequest {
            cxh,
            i_rpc: I_RPC,
            context: Bytes::copy_from_slice(context),
            advise_bits: ADVISE_BITS_ALL,
            callback_address: address.into_bytes(),
        };
        debug!(
            "Registering push notification callback {}:{} ({} byte address)",
            ip,
            port,
            request.callback_address.len()
        );

        let result = self.runtime.ec_r_register_push_notification(&request).await;
        let reply = match result {
            Ok(reply) => reply,
            Err(fault) => return Err(self.fault("register_push_notification", fault.into())),
        };
        if reply.status != RPC_S_OK {
            return Err(self.fault(
                "register_push_notification",
                RpcError::CallFailed(reply.status),
            ));
        }
        Ok(reply.notification_handle)
    }

    /// Open the asynchronous context handle (EcDoAsyncConnectEx)
    pub async fn async_connect(&mut self) -> Result<AsyncSession> {
        self.require_protocol("async_connect", Protocol::Store)?;
        let cxh = self.require_connected("async_connect")?;

        let result = self.runtime.ec_do_async_connect_ex(cxh).await;
        let reply = match result {
            Ok(reply) => reply,
            Err(fault) => return Err(self.fault("async_connect", fault.into())),
        };
        if reply.status != RPC_S_OK {
            return Err(self.fault("async_connect", RpcError::CallFailed(reply.status)));
        }
        let link = SessionLink::connected();
        self.async_links.push(link.clone());
        Ok(AsyncSession::new(self.runtime.clone(), reply.acxh, link))
    }

    /// Close an address book session (NspiUnbind) and release the binding
    pub async fn nspi_unbind(&mut self) -> Result<()> {
        self.require_protocol("nspi_unbind", Protocol::NameService)?;
        self.disconnect().await
    }

    /// Close the session and release the binding
    ///
    /// Exceptions raised by the remote disconnect are logged and ignored,
    /// except fatal ones, which are returned once the binding is released.
    /// The context ends up Disconnected either way.
    pub async fn disconnect(&mut self) -> Result<()> {
        let remote = match self.state {
            SessionState::Unbound | SessionState::Disconnected => {
                return Err(self.invalid_state("disconnect"));
            }
            SessionState::Connected => self.close_remote_session().await,
            SessionState::Bound | SessionState::Faulted => Ok(()),
        };

        if let Some(binding) = self.binding.take() {
            if self.config.force_shutdown_association {
                if let Err(fault) = self
                    .runtime
                    .binding_set_option(binding.handle(), BindingOption::DontLinger, 1)
                    .await
                {
                    warn!("Failed to set don't-linger on binding: 0x{:08x}", fault.code());
                }
            }
        }

        self.release_async(SessionState::Disconnected);
        self.reset_session();
        self.state = SessionState::Disconnected;
        debug!("Session disconnected");
        remote
    }

    async fn close_remote_session(&self) -> Result<()> {
        let cxh = self.context;
        let result = match self.protocol {
            Protocol::Store => self
                .runtime
                .ec_do_disconnect(cxh)
                .await
                .map(|code| (code, RPC_S_OK)),
            Protocol::NameService => self
                .runtime
                .nspi_unbind(cxh, 0)
                .await
                .map(|code| (code, UNBIND_SUCCESS)),
        };
        match result {
            Ok((code, expected)) if code != expected => {
                warn!("Remote disconnect returned 0x{:08x}", code)
            }
            Ok(_) => trace!("Remote session closed"),
            Err(fault) => match RpcError::from(fault) {
                err @ RpcError::Fatal(_) => return Err(err),
                _ => warn!("Remote disconnect raised 0x{:08x}, ignoring", fault.code()),
            },
        }
        Ok(())
    }

    fn release_async(&mut self, state: SessionState) {
        for link in self.async_links.drain(..) {
            link.release(state);
        }
    }

    fn reset_session(&mut self) {
        self.context = ContextHandle::NIL;
        self.connect_info = None;
        self.server_guid = None;
        self.state = SessionState::Unbound;
    }

    fn require_protocol(&self, operation: &'static str, protocol: Protocol) -> Result<()> {
        if self.protocol == protocol {
            Ok(())
        } else {
            Err(RpcError::WrongInterface {
                operation,
                protocol: self.protocol,
            })
        }
    }

    fn require_bound(&self, operation: &'static str) -> Result<BindingHandle> {
        match (&self.binding, self.state) {
            (Some(binding), SessionState::Bound) => Ok(binding.handle()),
            _ => Err(self.invalid_state(operation)),
        }
    }

    fn require_connected(&self, operation: &'static str) -> Result<ContextHandle> {
        if self.state == SessionState::Connected && !self.context.is_nil() {
            Ok(self.context)
        } else {
            Err(self.invalid_state(operation))
        }
    }

    fn invalid_state(&self, operation: &'static str) -> RpcError {
        RpcError::InvalidState {
            operation,
            state: self.state,
        }
    }

    fn fault(&mut self, operation: &'static str, err: RpcError) -> RpcError {
        let code = err.status();
        match status::describe(code) {
            Some(meaning) => warn!("{} failed: {} ({})", operation, err, meaning),
            None => warn!("{} failed: {}", operation, err),
        }
        self.release_async(SessionState::Faulted);
        self.state = SessionState::Faulted;
        err
    }
}

impl Drop for SessionContext {
    fn drop(&mut self) {
        if self.state == SessionState::Connected {
            warn!("{} session dropped without disconnect", self.protocol);
        }
        self.release_async(SessionState::Disconnected);
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("protocol", &self.protocol)
            .field("state", &self.state)
            .field("binding", &self.binding)
            .field("context", &self.context)
            .finish()
    }
}
