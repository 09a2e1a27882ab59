//! Packet capture backends
//!
//! The data plane reads frames from and writes frames to a [`Capture`]
//! implementation. AF_PACKET raw sockets are the only backend.

mod af_packet;

pub use af_packet::AfPacketSocket;

use crate::Result;
use std::future::Future;
use std::io;

/// Information about a received packet
#[derive(Debug, Clone, Copy)]
pub struct RxInfo {
    /// Number of bytes received
    pub len: usize,
}

/// Packet capture backend trait
///
/// Methods take `&self` so one socket can be shared by several port tasks
/// (an egress interface may serve more than one ingress port).
pub trait Capture: Send + Sync {
    /// Receive the next frame that arrived on the interface.
    fn recv(&self, buf: &mut [u8]) -> impl Future<Output = Result<RxInfo>> + Send;

    /// Transmit a frame without waiting. A full queue is an error
    /// (`WouldBlock`), never a stall.
    fn try_send(&self, buf: &[u8]) -> io::Result<usize>;

    /// Kernel interface index
    fn ifindex(&self) -> u32;
}
