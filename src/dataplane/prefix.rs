//! Address prefixes
//!
//! A prefix is stored as a left-aligned 128-bit key so that IPv4 and IPv6
//! share one bit-walking routine: bit 0 of the key is the most significant
//! bit of the address. Host bits beyond the prefix length are always zero.

use crate::error::RuleError;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// Address family of a prefix or packet address
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AddressFamily {
    V4,
    V6,
}

impl AddressFamily {
    /// Address width in bits
    pub const fn bits(self) -> u8 {
        match self {
            AddressFamily::V4 => 32,
            AddressFamily::V6 => 128,
        }
    }

    pub fn of(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => AddressFamily::V4,
            IpAddr::V6(_) => AddressFamily::V6,
        }
    }
}

/// Left-aligns an address into a 128-bit key.
pub fn address_key(addr: IpAddr) -> u128 {
    match addr {
        IpAddr::V4(v4) => (u32::from(v4) as u128) << 96,
        IpAddr::V6(v6) => u128::from(v6),
    }
}

/// Mask keeping the first `len` bits of a left-aligned key.
fn key_mask(len: u8) -> u128 {
    if len == 0 {
        0
    } else {
        !0u128 << (128 - len as u32)
    }
}

/// A normalized address prefix (CIDR block).
///
/// Field order gives the listing order: family, then address, then length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Prefix {
    family: AddressFamily,
    key: u128,
    len: u8,
}

impl Prefix {
    /// Builds a prefix, masking host bits to zero.
    pub fn new(addr: IpAddr, len: u8) -> Result<Self, RuleError> {
        let family = AddressFamily::of(&addr);
        if len > family.bits() {
            return Err(RuleError::InvalidPrefix {
                len: len as u32,
                max: family.bits(),
            });
        }
        Ok(Self {
            family,
            key: address_key(addr) & key_mask(len),
            len,
        })
    }

    /// Host prefix (/32 or /128) covering exactly `addr`.
    pub fn host(addr: IpAddr) -> Self {
        let family = AddressFamily::of(&addr);
        Self {
            family,
            key: address_key(addr),
            len: family.bits(),
        }
    }

    pub fn family(&self) -> AddressFamily {
        self.family
    }

    pub fn prefix_len(&self) -> u8 {
        self.len
    }

    /// True for the zero-length (default) prefix.
    pub fn is_default(&self) -> bool {
        self.len == 0
    }

    pub(crate) fn key(&self) -> u128 {
        self.key
    }

    /// Network address of the prefix
    pub fn network(&self) -> IpAddr {
        match self.family {
            AddressFamily::V4 => IpAddr::V4(Ipv4Addr::from((self.key >> 96) as u32)),
            AddressFamily::V6 => IpAddr::V6(Ipv6Addr::from(self.key)),
        }
    }

    /// Check if an address is within this prefix
    pub fn contains(&self, addr: IpAddr) -> bool {
        AddressFamily::of(&addr) == self.family
            && (address_key(addr) & key_mask(self.len)) == self.key
    }

    /// Parse CIDR notation, e.g. "10.0.0.0/8" or "2001:db8::/32".
    ///
    /// Unparseable text is `MalformedRequest`; a length wider than the
    /// address family is `InvalidPrefix`.
    pub fn parse(s: &str) -> Result<Self, RuleError> {
        let s = s.trim();
        let (addr, len) = s
            .split_once('/')
            .ok_or_else(|| RuleError::MalformedRequest(format!("missing prefix length: {s:?}")))?;

        let addr: IpAddr = addr
            .parse()
            .map_err(|_| RuleError::MalformedRequest(format!("invalid address: {addr:?}")))?;

        if len.is_empty() || !len.bytes().all(|b| b.is_ascii_digit()) {
            return Err(RuleError::MalformedRequest(format!(
                "invalid prefix length: {len:?}"
            )));
        }
        let max = AddressFamily::of(&addr).bits();
        let len: u32 = len
            .parse()
            .map_err(|_| RuleError::InvalidPrefix { len: u32::MAX, max })?;
        if len > max as u32 {
            return Err(RuleError::InvalidPrefix { len, max });
        }

        Self::new(addr, len as u8)
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network(), self.len)
    }
}

impl FromStr for Prefix {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Prefix {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Prefix {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Prefix::parse(&s).map_err(de::Error::custom)
    }
}
