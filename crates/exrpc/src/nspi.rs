//! NSPI call parameters (MS-OXNSPI)

use crate::emsmdb::{CODE_PAGE, LOCALE_EN_US};
use crate::interface::Uuid;
use crate::runtime::ContextHandle;

/// NspiBind flag requesting anonymous access
pub const FLAG_ANONYMOUS_LOGIN: u32 = 0x0000_0020;
/// NspiUnbind return value on success
pub const UNBIND_SUCCESS: u32 = 0x0000_0001;

/// `SortTypeDisplayName`
pub const SORT_TYPE_DISPLAY_NAME: u32 = 0;
/// `MID_BEGINNING_OF_TABLE`
pub const MID_BEGINNING_OF_TABLE: u32 = 0;

/// STAT block: a logical position in an address book container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    pub sort_type: u32,
    pub container_id: u32,
    pub current_rec: u32,
    pub delta: i32,
    pub num_pos: u32,
    pub total_recs: u32,
    pub code_page: u32,
    pub template_locale: u32,
    pub sort_locale: u32,
}

impl Default for Stat {
    fn default() -> Self {
        Self {
            sort_type: SORT_TYPE_DISPLAY_NAME,
            container_id: 0,
            current_rec: MID_BEGINNING_OF_TABLE,
            delta: 0,
            num_pos: 0,
            total_recs: 0,
            code_page: CODE_PAGE,
            template_locale: LOCALE_EN_US,
            sort_locale: LOCALE_EN_US,
        }
    }
}

/// NspiBind input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NspiBindRequest {
    pub flags: u32,
    pub stat: Stat,
    /// Ask the server to return its GUID
    pub want_server_guid: bool,
}

/// NspiBind output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NspiBindReply {
    pub status: u32,
    pub context: ContextHandle,
    pub server_guid: Option<Uuid>,
}
