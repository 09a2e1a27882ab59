//! Common protocol types

/// EtherType values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum EtherType {
    Ipv4 = 0x0800,
    Arp = 0x0806,
    Vlan = 0x8100,
    QinQ = 0x88A8,
    Ipv6 = 0x86DD,
}

impl EtherType {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0800 => Some(EtherType::Ipv4),
            0x0806 => Some(EtherType::Arp),
            0x8100 => Some(EtherType::Vlan),
            0x88A8 => Some(EtherType::QinQ),
            0x86DD => Some(EtherType::Ipv6),
            _ => None,
        }
    }

    /// True for tag protocol identifiers that are followed by a VLAN tag
    pub fn is_tag(value: u16) -> bool {
        value == EtherType::Vlan as u16 || value == EtherType::QinQ as u16
    }
}

/// VLAN tag (802.1Q)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VlanTag {
    /// Priority Code Point (3 bits)
    pub pcp: u8,
    /// Drop Eligible Indicator (1 bit)
    pub dei: bool,
    /// VLAN ID (12 bits, 0-4095)
    pub vid: u16,
}

impl VlanTag {
    pub fn from_bytes(bytes: [u8; 2]) -> Self {
        let value = u16::from_be_bytes(bytes);
        Self {
            pcp: ((value >> 13) & 0x07) as u8,
            dei: (value >> 12) & 0x01 != 0,
            vid: value & 0x0FFF,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ethertype_from_u16() {
        assert_eq!(EtherType::from_u16(0x0800), Some(EtherType::Ipv4));
        assert_eq!(EtherType::from_u16(0x86DD), Some(EtherType::Ipv6));
        assert_eq!(EtherType::from_u16(0x88A8), Some(EtherType::QinQ));
        assert_eq!(EtherType::from_u16(0x1234), None);
    }

    #[test]
    fn test_is_tag() {
        assert!(EtherType::is_tag(0x8100));
        assert!(EtherType::is_tag(0x88A8));
        assert!(!EtherType::is_tag(0x0800));
    }

    #[test]
    fn test_vlan_tag_from_bytes() {
        // PCP=5, DEI=1, VID=100
        let tag = VlanTag::from_bytes([0xB0, 0x64]);
        assert_eq!(tag.pcp, 5);
        assert!(tag.dei);
        assert_eq!(tag.vid, 100);
    }
}
