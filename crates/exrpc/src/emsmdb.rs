//! EMSMDB call parameters (MS-OXCRPC)
//!
//! Request and reply shapes for the calls the session layer issues, with the
//! fixed values the protocol requires of a client.

use crate::runtime::ContextHandle;
use bytes::Bytes;

/// Client version sent in `rgwClientVersion`
pub const CLIENT_VERSION: [u16; 3] = [0x000c, 0x183e, 0x03e8];
/// Code page (Windows-1252)
pub const CODE_PAGE: u32 = 0x0000_04e4;
/// Locale for string and sort comparisons (en-US)
pub const LOCALE_EN_US: u32 = 0x0000_0409;
/// `ulIcxrLink` value meaning "no linked session"
pub const NO_ICXR_LINK: u32 = 0xffff_ffff;
/// Maximum auxiliary output buffer size
pub const MAX_AUX_OUT: u32 = 0x1008;
/// Maximum ROP output buffer size
pub const MAX_ROP_OUT: u32 = 0x40000;
/// EcDoRpcExt2 flags: no compression, no XOR obfuscation
pub const RPC_EXT2_FLAGS: u32 = 0x0000_0003;
/// `grbitAdviseBits`, required to be all ones
pub const ADVISE_BITS_ALL: u32 = 0xffff_ffff;
/// `iRpc`, ignored by the server and required to be zero
pub const I_RPC: u32 = 0;
/// `pulFlagsOut` bit set when notifications are pending
pub const NOTIFICATION_PENDING: u32 = 0x0000_0001;

/// Connection modulus hint sent as `ulConMod`
///
/// A load-distribution hint derived from the user DN, not a secret. Bytes
/// are taken as signed, matching a `char`-based computation over the DN.
pub fn connection_modulus(user_dn: &str) -> u32 {
    let bytes = user_dn.as_bytes();
    let len = bytes.len() as u32;

    let mut value = 0x238f_13afu32.wrapping_mul(len);
    for (i, &byte) in bytes.iter().enumerate() {
        let shift = (i as u32).wrapping_mul(5) % 24;
        let folded = ((byte as i8) as i32).wrapping_shl(shift) as u32;
        value = value.wrapping_add(folded);
    }

    1_103_515_243u32.wrapping_mul(value).wrapping_add(12345)
}

/// EcDoConnectEx input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub user_dn: String,
    pub flags: u32,
    pub con_mod: u32,
    pub cb_limit: u32,
    pub code_page: u32,
    pub lcid_string: u32,
    pub lcid_sort: u32,
    pub icxr_link: u32,
    pub can_convert_code_pages: u16,
    pub client_version: [u16; 3],
    pub timestamp: u32,
    pub aux_in: Bytes,
    pub max_aux_out: u32,
}

impl ConnectRequest {
    pub fn new(user_dn: &str) -> Self {
        Self {
            user_dn: user_dn.to_string(),
            flags: 0,
            con_mod: connection_modulus(user_dn),
            cb_limit: 0,
            code_page: CODE_PAGE,
            lcid_string: LOCALE_EN_US,
            lcid_sort: LOCALE_EN_US,
            icxr_link: NO_ICXR_LINK,
            can_convert_code_pages: 0x01,
            client_version: CLIENT_VERSION,
            timestamp: 0,
            aux_in: Bytes::new(),
            max_aux_out: MAX_AUX_OUT,
        }
    }
}

/// EcDoConnectEx output
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectReply {
    pub status: u32,
    pub cxh: ContextHandle,
    pub polls_max_ms: u32,
    pub retry_count: u32,
    pub retry_delay_ms: u32,
    pub icxr: u16,
    pub dn_prefix: String,
    pub display_name: String,
    pub server_version: [u16; 3],
    pub best_version: [u16; 3],
    pub timestamp: u32,
    pub aux_out: Bytes,
}

/// Session details kept after a successful connect
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectInfo {
    pub polls_max_ms: u32,
    pub retry_count: u32,
    pub retry_delay_ms: u32,
    pub icxr: u16,
    pub dn_prefix: String,
    pub display_name: String,
    pub server_version: [u16; 3],
    pub best_version: [u16; 3],
}

impl From<&ConnectReply> for ConnectInfo {
    fn from(reply: &ConnectReply) -> Self {
        Self {
            polls_max_ms: reply.polls_max_ms,
            retry_count: reply.retry_count,
            retry_delay_ms: reply.retry_delay_ms,
            icxr: reply.icxr,
            dn_prefix: reply.dn_prefix.clone(),
            display_name: reply.display_name.clone(),
            server_version: reply.server_version,
            best_version: reply.best_version,
        }
    }
}

/// EcDoRpcExt2 input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcExt2Request {
    pub cxh: ContextHandle,
    pub flags: u32,
    pub rop_in: Bytes,
    pub max_rop_out: u32,
    pub aux_in: Bytes,
    pub max_aux_out: u32,
}

/// EcDoRpcExt2 output
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RpcExt2Reply {
    pub status: u32,
    pub cxh: ContextHandle,
    pub flags: u32,
    pub rop_out: Bytes,
    pub aux_out: Bytes,
    pub trans_time_ms: u32,
}

/// ROP transfer result handed back to the caller
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RopResponse {
    pub flags: u32,
    pub rop_out: Bytes,
    pub aux_out: Bytes,
    pub trans_time_ms: u32,
}

/// EcRRegisterPushNotification input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushNotificationRequest {
    pub cxh: ContextHandle,
    pub i_rpc: u32,
    pub context: Bytes,
    pub advise_bits: u32,
    pub callback_address: Bytes,
}

/// EcRRegisterPushNotification output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushNotificationReply {
    pub status: u32,
    pub notification_handle: u32,
}

/// EcDoAsyncConnectEx output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AsyncConnectReply {
    pub status: u32,
    pub acxh: ContextHandle,
}
