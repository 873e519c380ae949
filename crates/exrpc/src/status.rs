//! Status codes used by the session layer
//!
//! Covers the RPC runtime statuses the layer inspects, the sentinel codes it
//! synthesizes locally, and the EcDoConnectEx error codes of MS-OXCRPC
//! section 3.1.4.11.

/// Success
pub const RPC_S_OK: u32 = 0;
/// Returned by the async status poll while the call is still outstanding
pub const RPC_S_ASYNC_CALL_PENDING: u32 = 997;
/// Invalid binding handle
pub const RPC_S_INVALID_BINDING: u32 = 1702;
/// The RPC server is unavailable
pub const RPC_S_SERVER_UNAVAILABLE: u32 = 1722;
/// The RPC server is too busy to complete this operation
pub const RPC_S_SERVER_TOO_BUSY: u32 = 1723;
/// The remote procedure call failed
pub const RPC_S_CALL_FAILED: u32 = 1726;
/// There are no more endpoints available from the endpoint mapper
pub const EPT_S_NOT_REGISTERED: u32 = 1753;

/// Access denied
pub const ERROR_ACCESS_DENIED: u32 = 5;
/// Handle used in the wrong state
pub const ERROR_INVALID_HANDLE: u32 = 6;
/// Invalid parameter
pub const ERROR_INVALID_PARAMETER: u32 = 87;

/// Bind rejected an RPC/HTTP scheme other than Basic or NTLM
pub const UNSUPPORTED_AUTH_SCHEME: u32 = 1;
/// Async call state could not be initialized
pub const ASYNC_INIT_FAILED: u32 = 0x000f_ffff;
/// Async call could not be completed
pub const ASYNC_COMPLETE_FAILED: u32 = 0x0000_ffff;

/// ecAccessDenied
pub const EC_ACCESS_DENIED: u32 = 0x8007_0005;
/// ecNotEncrypted
pub const EC_NOT_ENCRYPTED: u32 = 0x0000_0970;
/// ecClientVerDisallowed
pub const EC_CLIENT_VER_DISALLOWED: u32 = 0x0000_04df;
/// ecLoginFailure
pub const EC_LOGIN_FAILURE: u32 = 0x8004_0111;
/// ecUnknownUser
pub const EC_UNKNOWN_USER: u32 = 0x0000_03eb;
/// ecLoginPerm
pub const EC_LOGIN_PERM: u32 = 0x0000_03f2;
/// ecVersionMismatch
pub const EC_VERSION_MISMATCH: u32 = 0x8004_0110;
/// ecCachedModeRequired
pub const EC_CACHED_MODE_REQUIRED: u32 = 0x0000_04e1;
/// ecRpcHttpDisallowed
pub const EC_RPC_HTTP_DISALLOWED: u32 = 0x0000_04e0;
/// ecProtocolDisabled
pub const EC_PROTOCOL_DISABLED: u32 = 0x0000_07d8;

/// Mask selecting the severity bits of an exception code
const SEVERITY_ERROR: u32 = 0xc000_0000;

/// Exception codes with both severity bits set (access violations and the
/// like) are not RPC failures and must not be handled as a call status.
pub fn is_fatal_exception(code: u32) -> bool {
    code & SEVERITY_ERROR == SEVERITY_ERROR
}

/// RPC runtime statuses in the 1700 range signal transport trouble that a
/// fresh binding may get past.
pub fn is_transient(code: u32) -> bool {
    (1700..=1799).contains(&code)
}

/// Short name and meaning of a known status code
pub fn describe(code: u32) -> Option<&'static str> {
    let text = match code {
        RPC_S_OK => "success",
        EC_ACCESS_DENIED => {
            "ecAccessDenied: the binding's authentication context lacks privilege or the user DN is empty"
        }
        EC_NOT_ENCRYPTED => {
            "ecNotEncrypted: the server requires RPC_C_AUTHN_LEVEL_PKT_PRIVACY on the binding"
        }
        EC_CLIENT_VER_DISALLOWED => {
            "ecClientVerDisallowed: the client version is blocked or cannot receive ecNotEncrypted"
        }
        EC_LOGIN_FAILURE => "ecLoginFailure: the server cannot log the user on to the database",
        EC_UNKNOWN_USER => "ecUnknownUser: the user DN is not a valid enabled mailbox",
        EC_LOGIN_PERM => "ecLoginPerm: administrative access requested without enough privilege",
        EC_VERSION_MISMATCH => "ecVersionMismatch: the client protocol version is too old",
        EC_CACHED_MODE_REQUIRED => "ecCachedModeRequired: the server requires cached mode",
        EC_RPC_HTTP_DISALLOWED => "ecRpcHttpDisallowed: the server refuses RPC over HTTP",
        EC_PROTOCOL_DISABLED => "ecProtocolDisabled: the user may not use this protocol interface",
        RPC_S_INVALID_BINDING => "RPC_S_INVALID_BINDING: the binding handle is invalid",
        RPC_S_SERVER_UNAVAILABLE => "RPC_S_SERVER_UNAVAILABLE: the RPC server is unavailable",
        RPC_S_SERVER_TOO_BUSY => "RPC_S_SERVER_TOO_BUSY: the RPC server is too busy",
        RPC_S_CALL_FAILED => "RPC_S_CALL_FAILED: the remote procedure call failed",
        EPT_S_NOT_REGISTERED => "EPT_S_NOT_REGISTERED: no endpoint registered for the interface",
        _ => return None,
    };
    Some(text)
}
