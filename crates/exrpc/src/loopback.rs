//! In-process runtime
//!
//! [`LoopbackRuntime`] answers every binding primitive and call stub locally.
//! Results can be scripted per operation, and every call is recorded so a
//! test (or the probe binary in offline mode) can inspect what the session
//! layer asked for.

use crate::emsmdb::{
    AsyncConnectReply, ConnectReply, ConnectRequest, PushNotificationReply,
    PushNotificationRequest, RpcExt2Reply, RpcExt2Request, CLIENT_VERSION,
};
use crate::interface::{InterfaceId, Uuid};
use crate::nspi::{NspiBindReply, NspiBindRequest, UNBIND_SUCCESS};
use crate::runtime::{
    AsyncHandle, AsyncReply, AuthInfo, BindingHandle, BindingOption, ContextHandle, EmsmdbStub,
    NspiStub, RpcRuntime, RuntimeFault, RuntimeResult,
};
use crate::security::{AuthLevel, AuthnService, SecurityQos};
use crate::status::{RPC_S_ASYNC_CALL_PENDING, RPC_S_INVALID_BINDING, RPC_S_OK};
use crate::wide::WideString;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::trace;

/// Server version the loopback reports from EcDoConnectEx
pub const LOOPBACK_SERVER_VERSION: [u16; 3] = [0x000f, 0x0000, 0x0847];

/// Runtime operation, for scripting faults and counting calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    BindingFromString,
    EpResolve,
    SetAuthInfo,
    SetOption,
    BindingFree,
    AsyncInitialize,
    AsyncWaitEx,
    AsyncComplete,
    Connect,
    Disconnect,
    RpcExt2,
    RegisterPush,
    AsyncConnect,
    NspiBind,
    NspiUnbind,
}

/// Owned copy of the auth info attached to a binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedAuthInfo {
    pub binding: BindingHandle,
    pub spn: Option<String>,
    pub auth_level: AuthLevel,
    pub authn_service: AuthnService,
    /// User name only; the password is never copied out
    pub user: Option<String>,
    pub authz_service: u32,
    pub qos: Option<SecurityQos>,
}

#[derive(Debug)]
struct PendingCall {
    polls_left: u32,
    started: bool,
}

#[derive(Debug, Default)]
struct LoopbackState {
    next_handle: u64,
    faults: HashMap<Op, VecDeque<RuntimeFault>>,
    calls: HashMap<Op, usize>,
    live: HashSet<u64>,
    string_bindings: Vec<String>,
    auth_infos: Vec<RecordedAuthInfo>,
    options: Vec<(BindingHandle, BindingOption, usize)>,
    connect_statuses: VecDeque<u32>,
    display_name: String,
    rop_replies: VecDeque<Bytes>,
    push_requests: Vec<PushNotificationRequest>,
    async_pending_polls: u32,
    async_flags_out: u32,
    async_return_value: u32,
    async_calls: HashMap<u64, PendingCall>,
    async_status_polls: usize,
    async_completions: usize,
}

impl LoopbackState {
    fn allocate(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    fn context(&mut self) -> ContextHandle {
        let n = u128::from(self.allocate()) & 0xffff_ffff_ffff;
        ContextHandle::new(Uuid::from_u128(0x6c6f6f70_6261_636b_0000_000000000000 | n))
    }

    /// Count the call, then pop a scripted fault if one is queued
    fn enter(&mut self, op: Op) -> RuntimeResult<()> {
        *self.calls.entry(op).or_default() += 1;
        match self.faults.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(fault) => {
                trace!("loopback: injecting {:?} into {:?}", fault, op);
                Err(fault)
            }
            None => Ok(()),
        }
    }

    fn require_live(&self, binding: BindingHandle) -> RuntimeResult<()> {
        if self.live.contains(&binding.raw()) {
            Ok(())
        } else {
            Err(RuntimeFault::Status(RPC_S_INVALID_BINDING))
        }
    }
}

/// Runtime that serves every call in-process
#[derive(Debug, Default)]
pub struct LoopbackRuntime {
    state: Mutex<LoopbackState>,
}

impl LoopbackRuntime {
    pub fn new() -> Self {
        let runtime = Self::default();
        runtime.state.lock().display_name = "Loopback User".to_string();
        runtime
    }

    /// Fail the next call of `op` with `fault`; repeated calls queue up
    pub fn fail_next(&self, op: Op, fault: RuntimeFault) {
        self.state.lock().faults.entry(op).or_default().push_back(fault);
    }

    /// Status returned by the next EcDoConnectEx
    pub fn push_connect_status(&self, status: u32) {
        self.state.lock().connect_statuses.push_back(status);
    }

    pub fn set_display_name(&self, name: impl Into<String>) {
        self.state.lock().display_name = name.into();
    }

    /// ROP response returned by the next EcDoRpcExt2; echoes the request
    /// buffer when nothing is queued
    pub fn push_rop_reply(&self, rop_out: Bytes) {
        self.state.lock().rop_replies.push_back(rop_out);
    }

    /// Number of status polls each async wait stays pending for
    pub fn set_async_pending_polls(&self, polls: u32) {
        self.state.lock().async_pending_polls = polls;
    }

    pub fn set_async_flags_out(&self, flags: u32) {
        self.state.lock().async_flags_out = flags;
    }

    /// Return value delivered when an async wait completes
    pub fn set_async_return_value(&self, value: u32) {
        self.state.lock().async_return_value = value;
    }

    pub fn calls_of(&self, op: Op) -> usize {
        self.state.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Binding handles allocated and not yet freed
    pub fn live_bindings(&self) -> usize {
        self.state.lock().live.len()
    }

    pub fn string_bindings(&self) -> Vec<String> {
        self.state.lock().string_bindings.clone()
    }

    pub fn auth_infos(&self) -> Vec<RecordedAuthInfo> {
        self.state.lock().auth_infos.clone()
    }

    pub fn last_auth_info(&self) -> Option<RecordedAuthInfo> {
        self.state.lock().auth_infos.last().cloned()
    }

    pub fn binding_options(&self) -> Vec<(BindingHandle, BindingOption, usize)> {
        self.state.lock().options.clone()
    }

    pub fn push_requests(&self) -> Vec<PushNotificationRequest> {
        self.state.lock().push_requests.clone()
    }

    pub fn async_status_polls(&self) -> usize {
        self.state.lock().async_status_polls
    }

    pub fn async_completions(&self) -> usize {
        self.state.lock().async_completions
    }
}

#[async_trait]
impl RpcRuntime for LoopbackRuntime {
    async fn binding_from_string_binding(&self, binding: &WideString) -> RuntimeResult<BindingHandle> {
        let mut state = self.state.lock();
        state.enter(Op::BindingFromString)?;
        let raw = state.allocate();
        state.live.insert(raw);
        state.string_bindings.push(binding.to_string_lossy());
        trace!("loopback: binding {} from {}", raw, binding);
        Ok(BindingHandle::new(raw))
    }

    async fn ep_resolve_binding(
        &self,
        binding: BindingHandle,
        interface: &InterfaceId,
    ) -> RuntimeResult<()> {
        let mut state = self.state.lock();
        state.enter(Op::EpResolve)?;
        state.require_live(binding)?;
        trace!("loopback: resolved {} on binding {}", interface, binding.raw());
        Ok(())
    }

    async fn binding_set_auth_info(
        &self,
        binding: BindingHandle,
        info: AuthInfo<'_>,
    ) -> RuntimeResult<()> {
        let mut state = self.state.lock();
        state.enter(Op::SetAuthInfo)?;
        state.require_live(binding)?;
        state.auth_infos.push(RecordedAuthInfo {
            binding,
            spn: info.spn.map(WideString::to_string_lossy),
            auth_level: info.auth_level,
            authn_service: info.authn_service,
            user: info.identity.map(|id| id.user().to_string_lossy()),
            authz_service: info.authz_service,
            qos: info.qos.cloned(),
        });
        Ok(())
    }

    async fn binding_set_option(
        &self,
        binding: BindingHandle,
        option: BindingOption,
        value: usize,
    ) -> RuntimeResult<()> {
        let mut state = self.state.lock();
        state.enter(Op::SetOption)?;
        state.require_live(binding)?;
        state.options.push((binding, option, value));
        Ok(())
    }

    fn binding_free(&self, binding: BindingHandle) -> RuntimeResult<()> {
        let mut state = self.state.lock();
        state.enter(Op::BindingFree)?;
        if state.live.remove(&binding.raw()) {
            Ok(())
        } else {
            Err(RuntimeFault::Status(RPC_S_INVALID_BINDING))
        }
    }

    fn async_initialize(&self) -> RuntimeResult<AsyncHandle> {
        let mut state = self.state.lock();
        state.enter(Op::AsyncInitialize)?;
        let raw = state.allocate();
        let polls_left = state.async_pending_polls;
        state.async_calls.insert(
            raw,
            PendingCall {
                polls_left,
                started: false,
            },
        );
        Ok(AsyncHandle::new(raw))
    }

    fn async_call_status(&self, call: AsyncHandle) -> u32 {
        let mut state = self.state.lock();
        state.async_status_polls += 1;
        match state.async_calls.get_mut(&call.raw()) {
            Some(pending) if pending.started && pending.polls_left > 0 => {
                pending.polls_left -= 1;
                RPC_S_ASYNC_CALL_PENDING
            }
            Some(_) => RPC_S_OK,
            None => RPC_S_INVALID_BINDING,
        }
    }

    fn async_complete(&self, call: AsyncHandle) -> RuntimeResult<AsyncReply> {
        let mut state = self.state.lock();
        state.async_completions += 1;
        let pending = state
            .async_calls
            .remove(&call.raw())
            .ok_or(RuntimeFault::Status(RPC_S_INVALID_BINDING))?;
        state.enter(Op::AsyncComplete)?;

        if pending.started && pending.polls_left > 0 {
            return Err(RuntimeFault::Status(RPC_S_ASYNC_CALL_PENDING));
        }
        Ok(AsyncReply {
            return_value: state.async_return_value,
            flags_out: if pending.started { state.async_flags_out } else { 0 },
        })
    }
}

#[async_trait]
impl EmsmdbStub for LoopbackRuntime {
    async fn ec_do_connect_ex(
        &self,
        binding: BindingHandle,
        request: &ConnectRequest,
    ) -> RuntimeResult<ConnectReply> {
        let mut state = self.state.lock();
        state.enter(Op::Connect)?;
        state.require_live(binding)?;

        let status = state.connect_statuses.pop_front().unwrap_or(RPC_S_OK);
        if status != RPC_S_OK {
            return Ok(ConnectReply {
                status,
                ..ConnectReply::default()
            });
        }

        let dn_prefix = request
            .user_dn
            .rfind("/cn=")
            .map(|idx| request.user_dn[..idx].to_string())
            .unwrap_or_default();
        Ok(ConnectReply {
            status,
            cxh: state.context(),
            polls_max_ms: 60_000,
            retry_count: 6,
            retry_delay_ms: 10_000,
            icxr: 1,
            dn_prefix,
            display_name: state.display_name.clone(),
            server_version: LOOPBACK_SERVER_VERSION,
            best_version: CLIENT_VERSION,
            timestamp: request.timestamp,
            aux_out: Bytes::new(),
        })
    }

    async fn ec_do_disconnect(&self, _cxh: ContextHandle) -> RuntimeResult<u32> {
        self.state.lock().enter(Op::Disconnect)?;
        Ok(RPC_S_OK)
    }

    async fn ec_do_rpc_ext2(&self, request: &RpcExt2Request) -> RuntimeResult<RpcExt2Reply> {
        let mut state = self.state.lock();
        state.enter(Op::RpcExt2)?;
        let mut rop_out = state
            .rop_replies
            .pop_front()
            .unwrap_or_else(|| request.rop_in.clone());
        rop_out.truncate(request.max_rop_out as usize);
        Ok(RpcExt2Reply {
            status: RPC_S_OK,
            cxh: request.cxh,
            flags: request.flags,
            rop_out,
            aux_out: Bytes::new(),
            trans_time_ms: 1,
        })
    }

    async fn ec_r_register_push_notification(
        &self,
        request: &PushNotificationRequest,
    ) -> RuntimeResult<PushNotificationReply> {
        let mut state = self.state.lock();
        state.enter(Op::RegisterPush)?;
        state.push_requests.push(request.clone());
        let notification_handle = state.allocate() as u32;
        Ok(PushNotificationReply {
            status: RPC_S_OK,
            notification_handle,
        })
    }

    async fn ec_do_async_connect_ex(&self, _cxh: ContextHandle) -> RuntimeResult<AsyncConnectReply> {
        let mut state = self.state.lock();
        state.enter(Op::AsyncConnect)?;
        Ok(AsyncConnectReply {
            status: RPC_S_OK,
            acxh: state.context(),
        })
    }

    fn ec_do_async_wait_ex(
        &self,
        call: AsyncHandle,
        _acxh: ContextHandle,
        _flags_in: u32,
    ) -> RuntimeResult<()> {
        let mut state = self.state.lock();
        state.enter(Op::AsyncWaitEx)?;
        match state.async_calls.get_mut(&call.raw()) {
            Some(pending) => {
                pending.started = true;
                Ok(())
            }
            None => Err(RuntimeFault::Status(RPC_S_INVALID_BINDING)),
        }
    }
}

#[async_trait]
impl NspiStub for LoopbackRuntime {
    async fn nspi_bind(
        &self,
        binding: BindingHandle,
        request: &NspiBindRequest,
    ) -> RuntimeResult<NspiBindReply> {
        let mut state = self.state.lock();
        state.enter(Op::NspiBind)?;
        state.require_live(binding)?;
        let context = state.context();
        Ok(NspiBindReply {
            status: RPC_S_OK,
            context,
            server_guid: request.want_server_guid.then_some(context.uuid),
        })
    }

    async fn nspi_unbind(&self, _context: ContextHandle, _reserved: u32) -> RuntimeResult<u32> {
        self.state.lock().enter(Op::NspiUnbind)?;
        Ok(UNBIND_SUCCESS)
    }
}
