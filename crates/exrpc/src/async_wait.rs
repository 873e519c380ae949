//! Asynchronous notification wait
//!
//! EcDoAsyncWaitEx does not complete until the server has pending events for
//! the session. The runtime only offers a status poll for async calls, so
//! the wait is bounded by polling once per second up to a caller-supplied
//! number of seconds, then completing the call exactly once.

use crate::emsmdb::NOTIFICATION_PENDING;
use crate::error::{Result, RpcError};
use crate::runtime::{AsyncHandle, AsyncReply, ContextHandle, RuntimeResult, SharedRuntime};
use crate::session::SessionState;
use crate::status::{RPC_S_ASYNC_CALL_PENDING, RPC_S_OK};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Poll granularity of the wait loop
pub const ASYNC_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Outcome of a completed wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AsyncWaitOutcome {
    pub flags_out: u32,
    /// Seconds spent sleeping between polls
    pub waited_secs: u32,
}

impl AsyncWaitOutcome {
    pub fn notifications_pending(&self) -> bool {
        (self.flags_out & NOTIFICATION_PENDING) != 0
    }
}

/// Lifecycle state an ACXH shares with the session that opened it
///
/// Reads `Connected` until the owning session leaves that state or the
/// async handle itself faults.
#[derive(Debug, Clone)]
pub(crate) struct SessionLink(Arc<Mutex<SessionState>>);

impl SessionLink {
    pub(crate) fn connected() -> Self {
        Self(Arc::new(Mutex::new(SessionState::Connected)))
    }

    pub(crate) fn release(&self, state: SessionState) {
        let mut current = self.0.lock();
        if *current == SessionState::Connected {
            *current = state;
        }
    }

    fn state(&self) -> SessionState {
        *self.0.lock()
    }
}

/// Async call state that is completed exactly once
///
/// Completion happens through [`PendingCall::complete`] or, if the wait is
/// abandoned, when the guard is dropped.
struct PendingCall {
    runtime: SharedRuntime,
    call: AsyncHandle,
    completed: bool,
}

impl PendingCall {
    fn new(runtime: SharedRuntime, call: AsyncHandle) -> Self {
        Self {
            runtime,
            call,
            completed: false,
        }
    }

    fn complete(mut self) -> RuntimeResult<AsyncReply> {
        self.completed = true;
        self.runtime.async_complete(self.call)
    }
}

impl Drop for PendingCall {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        debug!("Async wait abandoned, completing call {}", self.call.raw());
        if let Err(fault) = self.runtime.async_complete(self.call) {
            debug!("Completing abandoned async call failed: 0x{:08x}", fault.code());
        }
    }
}

/// Asynchronous context handle (ACXH) from EcDoAsyncConnectEx
///
/// Waits take `&mut self`, so one handle never has two waits in flight.
/// The handle is only usable while the session that opened it is
/// connected.
pub struct AsyncSession {
    runtime: SharedRuntime,
    acxh: ContextHandle,
    link: SessionLink,
}

impl AsyncSession {
    pub(crate) fn new(runtime: SharedRuntime, acxh: ContextHandle, link: SessionLink) -> Self {
        Self { runtime, acxh, link }
    }

    pub fn handle(&self) -> ContextHandle {
        self.acxh
    }

    /// State of the owning session as seen by this handle
    pub fn state(&self) -> SessionState {
        self.link.state()
    }

    /// Wait up to `timeout_secs` seconds for the server to signal events
    ///
    /// With `timeout_secs == 0` the call is completed immediately, without
    /// polling or sleeping. If the wait fails to start, the call is still
    /// completed and the start failure is returned.
    pub async fn wait_with_timeout(&mut self, flags_in: u32, timeout_secs: u32) -> Result<AsyncWaitOutcome> {
        let state = self.link.state();
        if state != SessionState::Connected {
            return Err(RpcError::InvalidState {
                operation: "async_wait",
                state,
            });
        }

        let call = self.runtime.async_initialize().map_err(|fault| {
            warn!("Async state initialization failed: 0x{:08x}", fault.code());
            RpcError::AsyncInit
        })?;
        let pending = PendingCall::new(self.runtime.clone(), call);

        if let Err(fault) = self.runtime.ec_do_async_wait_ex(call, self.acxh, flags_in) {
            let err = RpcError::from(fault);
            warn!("EcDoAsyncWaitEx failed to start: {}", err);
            if let Err(fault) = pending.complete() {
                debug!("Async completion after failed start: 0x{:08x}", fault.code());
            }
            self.link.release(SessionState::Faulted);
            return Err(err);
        }

        debug!("EcDoAsyncWaitEx issued, polling for up to {}s", timeout_secs);
        let mut waited_secs = 0u32;
        while waited_secs < timeout_secs {
            let call_status = self.runtime.async_call_status(call);
            if call_status != RPC_S_ASYNC_CALL_PENDING {
                trace!("Async call left pending state: {}", call_status);
                break;
            }
            tokio::time::sleep(ASYNC_POLL_INTERVAL).await;
            waited_secs += 1;
        }

        let reply = pending.complete().map_err(|fault| {
            debug!("Async completion failed: 0x{:08x}", fault.code());
            RpcError::AsyncComplete
        })?;

        if reply.return_value != RPC_S_OK {
            return Err(RpcError::CallFailed(reply.return_value));
        }

        Ok(AsyncWaitOutcome {
            flags_out: reply.flags_out,
            waited_secs,
        })
    }
}

impl std::fmt::Debug for AsyncSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncSession")
            .field("acxh", &self.acxh)
            .field("state", &self.link.state())
            .finish()
    }
}
