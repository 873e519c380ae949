//! Interface identifiers and per-protocol constants
//!
//! The session layer targets two Exchange interfaces:
//! - EMSMDB (MS-OXCRPC), the Store interface, reached on HTTP port 6001
//! - NSPI (MS-OXNSPI), the address book interface, reached on HTTP port 6004

use std::fmt;

/// 128-bit UUID, held in its canonical textual order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Uuid(u128);

impl Uuid {
    pub const NIL: Self = Self(0);

    pub const fn from_u128(value: u128) -> Self {
        Self(value)
    }

    /// Parse `xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx`
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let groups: Vec<&str> = s.split('-').collect();
        let lengths: Vec<usize> = groups.iter().map(|g| g.len()).collect();
        if lengths != [8, 4, 4, 4, 12] {
            return None;
        }
        let mut value = 0u128;
        for group in groups {
            if !group.bytes().all(|b| b.is_ascii_hexdigit()) {
                return None;
            }
            let part = u64::from_str_radix(group, 16).ok()?;
            value = (value << (group.len() * 4)) | u128::from(part);
        }
        Some(Self(value))
    }

    pub fn is_nil(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = self.0;
        write!(
            f,
            "{:08X}-{:04X}-{:04X}-{:04X}-{:012X}",
            v >> 96,
            (v >> 80) & 0xffff,
            (v >> 64) & 0xffff,
            (v >> 48) & 0xffff,
            v & 0xffff_ffff_ffff
        )
    }
}

/// Interface UUID with version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceId {
    pub uuid: Uuid,
    pub major: u16,
    pub minor: u16,
}

impl InterfaceId {
    /// EMSMDB v0.81
    pub fn emsmdb() -> Self {
        Self {
            uuid: Uuid::from_u128(0xa4f1db00_ca47_1067_b31f_00dd010662da),
            major: 0,
            minor: 81,
        }
    }

    /// NSPI v56.0
    pub fn nspi() -> Self {
        Self {
            uuid: Uuid::from_u128(0xf5cc5a18_4264_101a_8c59_08002b2f8426),
            major: 56,
            minor: 0,
        }
    }
}

impl fmt::Display for InterfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} v{}.{}", self.uuid, self.major, self.minor)
    }
}

/// Exchange interface a session context talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// MS-OXCRPC EMSMDB
    Store,
    /// MS-OXNSPI
    NameService,
}

impl Protocol {
    /// Interface resolved against the binding
    pub fn interface(&self) -> InterfaceId {
        match self {
            Self::Store => InterfaceId::emsmdb(),
            Self::NameService => InterfaceId::nspi(),
        }
    }

    /// Endpoint mandated for the ncacn_http protocol sequence
    pub fn http_endpoint(&self) -> &'static str {
        match self {
            Self::Store => "6001",
            Self::NameService => "6004",
        }
    }

    /// Object UUID embedded in the string binding when requested
    pub fn object_uuid(&self) -> Uuid {
        self.interface().uuid
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Store => f.write_str("EMSMDB"),
            Self::NameService => f.write_str("NSPI"),
        }
    }
}
