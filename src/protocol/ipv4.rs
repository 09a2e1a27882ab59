//! IPv4 header - RFC 791

use crate::{Error, Result};
use std::net::Ipv4Addr;

/// Minimum IPv4 header size (without options)
pub const MIN_HEADER_SIZE: usize = 20;

/// Parsed IPv4 header (zero-copy reference)
#[derive(Debug)]
pub struct Ipv4Header<'a> {
    buffer: &'a [u8],
}

impl<'a> Ipv4Header<'a> {
    pub fn parse(buffer: &'a [u8]) -> Result<Self> {
        if buffer.len() < MIN_HEADER_SIZE {
            return Err(Error::Parse("IPv4 header too short".into()));
        }

        let version = buffer[0] >> 4;
        if version != 4 {
            return Err(Error::Parse("not an IPv4 packet".into()));
        }

        let header_len = (buffer[0] & 0x0F) as usize * 4;
        if header_len < MIN_HEADER_SIZE {
            return Err(Error::Parse("IPv4 IHL below minimum".into()));
        }
        if buffer.len() < header_len {
            return Err(Error::Parse("IPv4 header truncated".into()));
        }

        Ok(Self { buffer })
    }

    pub fn protocol(&self) -> u8 {
        self.buffer[9]
    }

    pub fn src_addr(&self) -> Ipv4Addr {
        Ipv4Addr::new(
            self.buffer[12],
            self.buffer[13],
            self.buffer[14],
            self.buffer[15],
        )
    }

    pub fn dst_addr(&self) -> Ipv4Addr {
        Ipv4Addr::new(
            self.buffer[16],
            self.buffer[17],
            self.buffer[18],
            self.buffer[19],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_packet() -> Vec<u8> {
        vec![
            0x45, 0x00, 0x00, 0x1c, // Version=4, IHL=5, TOS, Total length
            0x00, 0x00, 0x40, 0x00, // Identification, DF
            0x40, 0x01, 0x00, 0x00, // TTL=64, ICMP, checksum
            192, 168, 1, 1, // Source
            10, 1, 2, 3, // Destination
            0x08, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x01,
        ]
    }

    #[test]
    fn test_parse_addresses() {
        let data = make_packet();
        let hdr = Ipv4Header::parse(&data).unwrap();
        assert_eq!(hdr.src_addr(), Ipv4Addr::new(192, 168, 1, 1));
        assert_eq!(hdr.dst_addr(), Ipv4Addr::new(10, 1, 2, 3));
        assert_eq!(hdr.protocol(), 1);
    }

    #[test]
    fn test_parse_too_short() {
        assert!(Ipv4Header::parse(&[0x45; 19]).is_err());
    }

    #[test]
    fn test_parse_wrong_version() {
        let mut data = make_packet();
        data[0] = 0x65;
        assert!(Ipv4Header::parse(&data).is_err());
    }

    #[test]
    fn test_parse_bad_ihl() {
        let mut data = make_packet();
        data[0] = 0x44; // IHL=4 (16 bytes)
        assert!(Ipv4Header::parse(&data).is_err());
        data[0] = 0x4F; // IHL=15 (60 bytes)
        assert!(Ipv4Header::parse(&data).is_err());
    }
}
