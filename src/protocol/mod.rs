//! Header parsing for the packet path
//!
//! Zero-copy views over received frames. Only what classification needs is
//! decoded: the L2 framing (with 802.1Q / 802.1ad tags) and the IPv4/IPv6
//! addresses.

pub mod ethernet;
pub mod ipv4;
pub mod ipv6;
pub mod types;

pub use types::*;
