//! Ethernet frame parsing

use super::{EtherType, VlanTag};
use crate::{Error, Result};

/// Minimum Ethernet header size (without FCS)
pub const HEADER_SIZE: usize = 14;
/// Size of one 802.1Q / 802.1ad tag
const TAG_SIZE: usize = 4;
/// Tags accepted before giving up (outer S-tag + inner C-tag)
const MAX_TAGS: usize = 2;

/// Parsed Ethernet frame (zero-copy reference)
#[derive(Debug)]
pub struct Frame<'a> {
    buffer: &'a [u8],
    /// Innermost VLAN tag, if any
    vlan_tag: Option<VlanTag>,
    ethertype: u16,
    payload_offset: usize,
}

impl<'a> Frame<'a> {
    /// Parse an Ethernet frame, skipping up to two VLAN tags
    pub fn parse(buffer: &'a [u8]) -> Result<Self> {
        if buffer.len() < HEADER_SIZE {
            return Err(Error::Parse("frame too short".into()));
        }

        let mut offset = 12;
        let mut vlan_tag = None;
        let mut ethertype = u16::from_be_bytes([buffer[offset], buffer[offset + 1]]);

        for _ in 0..MAX_TAGS {
            if !EtherType::is_tag(ethertype) {
                break;
            }
            if buffer.len() < offset + TAG_SIZE + 2 {
                return Err(Error::Parse("VLAN frame too short".into()));
            }
            vlan_tag = Some(VlanTag::from_bytes([buffer[offset + 2], buffer[offset + 3]]));
            offset += TAG_SIZE;
            ethertype = u16::from_be_bytes([buffer[offset], buffer[offset + 1]]);
        }

        Ok(Self {
            buffer,
            vlan_tag,
            ethertype,
            payload_offset: offset + 2,
        })
    }

    /// EtherType of the payload (after any VLAN tags)
    pub fn ethertype(&self) -> u16 {
        self.ethertype
    }

    pub fn vlan_tag(&self) -> Option<VlanTag> {
        self.vlan_tag
    }

    pub fn payload(&self) -> &'a [u8] {
        &self.buffer[self.payload_offset..]
    }
}
