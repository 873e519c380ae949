//! Push notification callback addresses
//!
//! EcRRegisterPushNotification carries the client's callback address as a
//! raw `SOCKADDR` image. The server accepts AF_INET and AF_INET6 only.
//!
//! ```text
//! sockaddr_in (16 bytes)         sockaddr_in6 (28 bytes)
//! +--------+--------+            +--------+--------+
//! | family | port   |            | family | port   |
//! +--------+--------+            +--------+--------+
//! | addr (4)        |            | flowinfo (4)    |
//! +-----------------+            +-----------------+
//! | zero (8)        |            | addr (16)       |
//! +-----------------+            +-----------------+
//!                                | scope_id (4)    |
//!                                +-----------------+
//! ```
//!
//! The family is little-endian, the port is in network byte order.

use crate::error::{Result, RpcError};
use bytes::{BufMut, Bytes, BytesMut};
use std::net::{Ipv4Addr, Ipv6Addr};

/// `AF_INET`
pub const AF_INET: u16 = 2;
/// `AF_INET6` (Windows value)
pub const AF_INET6: u16 = 23;

/// Size of `sockaddr_in`
pub const SOCKADDR_IN_SIZE: usize = 16;
/// Size of `sockaddr_in6`
pub const SOCKADDR_IN6_SIZE: usize = 28;

/// Address families a callback address may use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFamily {
    Inet,
    Inet6,
}

impl AddressFamily {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            AF_INET => Some(Self::Inet),
            AF_INET6 => Some(Self::Inet6),
            _ => None,
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            Self::Inet => AF_INET,
            Self::Inet6 => AF_INET6,
        }
    }
}

/// Encoded callback address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackAddress {
    family: AddressFamily,
    bytes: Bytes,
}

impl CallbackAddress {
    /// Build the address image for `family`
    pub fn new(family: u16, ip: &str, port: u16) -> Result<Self> {
        let family = AddressFamily::from_u16(family)
            .ok_or_else(|| RpcError::InvalidAddress(format!("unsupported address family {}", family)))?;

        let bytes = match family {
            AddressFamily::Inet => {
                let addr: Ipv4Addr = ip
                    .parse()
                    .map_err(|_| RpcError::InvalidAddress(format!("not an IPv4 address: {}", ip)))?;
                let mut buf = BytesMut::with_capacity(SOCKADDR_IN_SIZE);
                buf.put_u16_le(family.as_u16());
                buf.put_u16(port);
                buf.put_slice(&addr.octets());
                buf.put_bytes(0, 8);
                buf.freeze()
            }
            AddressFamily::Inet6 => {
                let addr: Ipv6Addr = ip
                    .parse()
                    .map_err(|_| RpcError::InvalidAddress(format!("not an IPv6 address: {}", ip)))?;
                let mut buf = BytesMut::with_capacity(SOCKADDR_IN6_SIZE);
                buf.put_u16_le(family.as_u16());
                buf.put_u16(port);
                buf.put_u32(0);
                buf.put_slice(&addr.octets());
                buf.put_u32_le(0);
                buf.freeze()
            }
        };

        Ok(Self { family, bytes })
    }

    pub fn family(&self) -> AddressFamily {
        self.family
    }

    pub fn as_bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }
}
