//! IPv6 header - RFC 8200

use crate::{Error, Result};
use std::net::Ipv6Addr;

/// IPv6 header size (fixed, unlike IPv4)
pub const HEADER_SIZE: usize = 40;

/// Parsed IPv6 header (zero-copy reference)
#[derive(Debug)]
pub struct Ipv6Header<'a> {
    buffer: &'a [u8],
}

impl<'a> Ipv6Header<'a> {
    pub fn parse(buffer: &'a [u8]) -> Result<Self> {
        if buffer.len() < HEADER_SIZE {
            return Err(Error::Parse("IPv6 header too short".into()));
        }

        let version = buffer[0] >> 4;
        if version != 6 {
            return Err(Error::Parse("not an IPv6 packet".into()));
        }

        Ok(Self { buffer })
    }

    /// Next Header (protocol)
    pub fn next_header(&self) -> u8 {
        self.buffer[6]
    }

    pub fn src_addr(&self) -> Ipv6Addr {
        Ipv6Addr::from(addr_bytes(&self.buffer[8..24]))
    }

    pub fn dst_addr(&self) -> Ipv6Addr {
        Ipv6Addr::from(addr_bytes(&self.buffer[24..40]))
    }
}

fn addr_bytes(slice: &[u8]) -> [u8; 16] {
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(slice);
    bytes
}
