//! Error types for the Exchange RPC session layer

use crate::interface::Protocol;
use crate::session::SessionState;
use crate::status;
use std::fmt;
use thiserror::Error;

/// Step of the binding sequence that produced a failure status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindStep {
    /// Converting the string binding into a binding handle
    FromStringBinding,
    /// Resolving the interface endpoint against the binding
    ResolveEndpoint,
    /// Attaching authentication information and QoS
    SetAuthInfo,
}

impl fmt::Display for BindStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::FromStringBinding => "binding from string binding",
            Self::ResolveEndpoint => "endpoint resolution",
            Self::SetAuthInfo => "setting auth info",
        };
        f.write_str(name)
    }
}

/// RPC session error types
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("server address is empty")]
    EmptyServerAddress,

    #[error("protocol sequence is empty")]
    EmptyTransport,

    #[error("unsupported RPC/HTTP authentication scheme: {0:?}")]
    UnsupportedAuthScheme(String),

    #[error("Kerberos authentication requires a service principal name")]
    MissingSpn,

    #[error("invalid callback address: {0}")]
    InvalidAddress(String),

    #[error("{operation} not permitted in state {state:?}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    #[error("{operation} is not available on the {protocol} interface")]
    WrongInterface {
        operation: &'static str,
        protocol: Protocol,
    },

    #[error("{step} failed: status 0x{status:08x}")]
    Binding { step: BindStep, status: u32 },

    #[error("call failed: status 0x{0:08x}")]
    CallFailed(u32),

    #[error("RPC exception: 0x{0:08x}")]
    Transport(u32),

    #[error("fatal RPC exception: 0x{0:08x}")]
    Fatal(u32),

    #[error("could not initialize async call state")]
    AsyncInit,

    #[error("could not complete async call")]
    AsyncComplete,
}

impl RpcError {
    /// Numeric status equivalent of this error
    pub fn status(&self) -> u32 {
        match self {
            Self::UnsupportedAuthScheme(_) => status::UNSUPPORTED_AUTH_SCHEME,
            Self::EmptyServerAddress
            | Self::EmptyTransport
            | Self::MissingSpn
            | Self::InvalidAddress(_) => status::ERROR_INVALID_PARAMETER,
            Self::InvalidState { .. } | Self::WrongInterface { .. } => {
                status::ERROR_INVALID_HANDLE
            }
            Self::Binding { status, .. } => *status,
            Self::CallFailed(code) | Self::Transport(code) | Self::Fatal(code) => *code,
            Self::AsyncInit => status::ASYNC_INIT_FAILED,
            Self::AsyncComplete => status::ASYNC_COMPLETE_FAILED,
        }
    }

    /// True for faults that must propagate to the caller untouched
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }

    /// True for failures detected locally before any remote call
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::EmptyServerAddress
                | Self::EmptyTransport
                | Self::UnsupportedAuthScheme(_)
                | Self::MissingSpn
                | Self::InvalidAddress(_)
                | Self::InvalidState { .. }
                | Self::WrongInterface { .. }
        )
    }

    /// True when a reconnect attempt may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::CallFailed(code) | Self::Transport(code) => status::is_transient(*code),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, RpcError>;
