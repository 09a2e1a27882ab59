//! Packet classifier
//!
//! Extracts the match address from a frame and looks it up in the prefix
//! table. Runs once per packet and never blocks on a table update.

use super::action::Action;
use super::table::PrefixTable;
use crate::protocol::ethernet::Frame;
use crate::protocol::ipv4::Ipv4Header;
use crate::protocol::ipv6::Ipv6Header;
use crate::protocol::EtherType;
use serde::Deserialize;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::trace;

/// Which packet address is matched against the table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchField {
    /// Destination address (ingress filtering)
    #[default]
    Destination,
    /// Source address (blocking traffic from a range)
    Source,
}

pub struct PacketClassifier {
    table: Arc<PrefixTable>,
    field: MatchField,
}

impl PacketClassifier {
    pub fn new(table: Arc<PrefixTable>, field: MatchField) -> Self {
        Self { table, field }
    }

    pub fn match_field(&self) -> MatchField {
        self.field
    }

    pub fn table(&self) -> &Arc<PrefixTable> {
        &self.table
    }

    /// Action for a packet address
    pub fn classify(&self, addr: IpAddr) -> Action {
        self.table.lookup(addr)
    }

    /// Match address of an Ethernet frame, `None` for non-IP or truncated frames
    pub fn extract_address(&self, frame: &[u8]) -> Option<IpAddr> {
        let frame = Frame::parse(frame).ok()?;
        match EtherType::from_u16(frame.ethertype())? {
            EtherType::Ipv4 => {
                let ip = Ipv4Header::parse(frame.payload()).ok()?;
                Some(IpAddr::V4(match self.field {
                    MatchField::Destination => ip.dst_addr(),
                    MatchField::Source => ip.src_addr(),
                }))
            }
            EtherType::Ipv6 => {
                let ip = Ipv6Header::parse(frame.payload()).ok()?;
                Some(IpAddr::V6(match self.field {
                    MatchField::Destination => ip.dst_addr(),
                    MatchField::Source => ip.src_addr(),
                }))
            }
            _ => None,
        }
    }

    /// Action for a whole frame. Frames without a parseable IP header pass.
    pub fn classify_frame(&self, frame: &[u8]) -> Action {
        match self.extract_address(frame) {
            Some(addr) => self.classify(addr),
            None => {
                trace!(len = frame.len(), "Unclassifiable frame, passing");
                Action::Pass
            }
        }
    }
}
