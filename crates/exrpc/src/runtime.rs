//! RPC transport runtime seam
//!
//! The session layer never speaks the wire itself. Binding primitives, async
//! call bookkeeping and the generated EMSMDB/NSPI call stubs are reached
//! through the traits in this module; [`crate::loopback::LoopbackRuntime`]
//! is the in-process implementation.

use crate::credentials::AuthIdentity;
use crate::emsmdb::{
    AsyncConnectReply, ConnectReply, ConnectRequest, PushNotificationReply,
    PushNotificationRequest, RpcExt2Reply, RpcExt2Request,
};
use crate::error::{BindStep, RpcError};
use crate::interface::{InterfaceId, Uuid};
use crate::nspi::{NspiBindReply, NspiBindRequest};
use crate::security::{AuthLevel, AuthnService, SecurityQos};
use crate::status;
use crate::wide::WideString;
use async_trait::async_trait;
use std::sync::Arc;

/// Opaque binding handle issued by the runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingHandle(u64);

impl BindingHandle {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Opaque async call state issued by the runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AsyncHandle(u64);

impl AsyncHandle {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// NDR context handle (20 bytes on the wire)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct ContextHandle {
    pub attributes: u32,
    pub uuid: Uuid,
}

impl ContextHandle {
    pub const NIL: Self = Self {
        attributes: 0,
        uuid: Uuid::NIL,
    };

    pub fn new(uuid: Uuid) -> Self {
        Self {
            attributes: 0,
            uuid,
        }
    }

    pub fn is_nil(&self) -> bool {
        self.uuid.is_nil()
    }
}

/// Failure reported by the runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeFault {
    /// The primitive returned a non-zero status
    Status(u32),
    /// The call raised an exception
    Exception(u32),
}

impl RuntimeFault {
    pub fn code(&self) -> u32 {
        match self {
            Self::Status(code) | Self::Exception(code) => *code,
        }
    }

    /// Map a failure of one of the binding steps
    pub fn into_bind_error(self, step: BindStep) -> RpcError {
        match self {
            Self::Exception(code) if status::is_fatal_exception(code) => RpcError::Fatal(code),
            fault => RpcError::Binding {
                step,
                status: fault.code(),
            },
        }
    }
}

impl From<RuntimeFault> for RpcError {
    fn from(fault: RuntimeFault) -> Self {
        match fault {
            RuntimeFault::Exception(code) if status::is_fatal_exception(code) => {
                RpcError::Fatal(code)
            }
            fault => RpcError::Transport(fault.code()),
        }
    }
}

pub type RuntimeResult<T> = std::result::Result<T, RuntimeFault>;

/// Authentication information attached to a binding handle
#[derive(Debug, Clone, Copy)]
pub struct AuthInfo<'a> {
    pub spn: Option<&'a WideString>,
    pub auth_level: AuthLevel,
    pub authn_service: AuthnService,
    /// Also the HTTP transport credentials when `qos` is present
    pub identity: Option<&'a AuthIdentity>,
    pub authz_service: u32,
    pub qos: Option<&'a SecurityQos>,
}

/// Binding options the session layer sets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum BindingOption {
    /// `RPC_C_OPT_DONT_LINGER`: close the association when the handle is freed
    DontLinger = 13,
}

/// Result of completing an async call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AsyncReply {
    /// The remote procedure's return value
    pub return_value: u32,
    /// Output flags delivered with the completion
    pub flags_out: u32,
}

/// Binding and async primitives of the RPC runtime
#[async_trait]
pub trait RpcRuntime: Send + Sync {
    /// Create a binding handle from a composed string binding
    async fn binding_from_string_binding(&self, binding: &WideString) -> RuntimeResult<BindingHandle>;

    /// Fill in the endpoint for `interface` on a partially bound handle
    async fn ep_resolve_binding(
        &self,
        binding: BindingHandle,
        interface: &InterfaceId,
    ) -> RuntimeResult<()>;

    async fn binding_set_auth_info(
        &self,
        binding: BindingHandle,
        info: AuthInfo<'_>,
    ) -> RuntimeResult<()>;

    async fn binding_set_option(
        &self,
        binding: BindingHandle,
        option: BindingOption,
        value: usize,
    ) -> RuntimeResult<()>;

    /// Release a binding handle
    fn binding_free(&self, binding: BindingHandle) -> RuntimeResult<()>;

    /// Allocate and initialize async call state
    fn async_initialize(&self) -> RuntimeResult<AsyncHandle>;

    /// Non-blocking status poll; `RPC_S_ASYNC_CALL_PENDING` while outstanding
    fn async_call_status(&self, call: AsyncHandle) -> u32;

    /// Finish the call and release its state
    fn async_complete(&self, call: AsyncHandle) -> RuntimeResult<AsyncReply>;
}

/// EMSMDB and AsyncEMSMDB call stubs
#[async_trait]
pub trait EmsmdbStub: Send + Sync {
    async fn ec_do_connect_ex(
        &self,
        binding: BindingHandle,
        request: &ConnectRequest,
    ) -> RuntimeResult<ConnectReply>;

    async fn ec_do_disconnect(&self, cxh: ContextHandle) -> RuntimeResult<u32>;

    async fn ec_do_rpc_ext2(&self, request: &RpcExt2Request) -> RuntimeResult<RpcExt2Reply>;

    async fn ec_r_register_push_notification(
        &self,
        request: &PushNotificationRequest,
    ) -> RuntimeResult<PushNotificationReply>;

    async fn ec_do_async_connect_ex(&self, cxh: ContextHandle) -> RuntimeResult<AsyncConnectReply>;

    /// Start EcDoAsyncWaitEx on `call`; returns without waiting
    fn ec_do_async_wait_ex(
        &self,
        call: AsyncHandle,
        acxh: ContextHandle,
        flags_in: u32,
    ) -> RuntimeResult<()>;
}

/// NSPI call stubs
#[async_trait]
pub trait NspiStub: Send + Sync {
    async fn nspi_bind(
        &self,
        binding: BindingHandle,
        request: &NspiBindRequest,
    ) -> RuntimeResult<NspiBindReply>;

    async fn nspi_unbind(&self, context: ContextHandle, reserved: u32) -> RuntimeResult<u32>;
}

/// Everything a session context needs from the runtime
pub trait ExchangeRuntime: RpcRuntime + EmsmdbStub + NspiStub {}

impl<T: RpcRuntime + EmsmdbStub + NspiStub + ?Sized> ExchangeRuntime for T {}

pub type SharedRuntime = Arc<dyn ExchangeRuntime>;
