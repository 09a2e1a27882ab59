//! Action executor
//!
//! Turns a classification result into what happens to the frame. The
//! redirect target is resolved again for every packet and the handle is
//! only held for that one transmit.

use super::action::Action;
use super::registry::{InterfaceHandle, InterfaceRegistry};
use crate::telemetry::MetricsRegistry;
use std::io;
use std::sync::Arc;
use tracing::{trace, warn};

/// Why a frame was discarded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// A DROP rule (or default) matched
    Rule,
    /// The redirect target no longer resolves
    DegradedRedirect,
}

/// Final handling of one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Transmit unchanged on the default path
    Forward,
    Drop(DropReason),
    /// Transmit on the given interface
    Redirect(InterfaceHandle),
}

/// Packet sink used by the executor
pub trait Egress {
    /// Transmit on the default egress path.
    fn forward(&self, frame: &[u8]) -> io::Result<()>;

    /// Transmit on a specific interface.
    fn send_to(&self, handle: InterfaceHandle, frame: &[u8]) -> io::Result<()>;
}

/// True for errors meaning the device itself is gone.
fn is_device_gone(err: &io::Error) -> bool {
    matches!(err.raw_os_error(), Some(libc::ENODEV) | Some(libc::ENXIO))
}

pub struct ActionExecutor {
    registry: Arc<dyn InterfaceRegistry>,
    metrics: Arc<MetricsRegistry>,
}

impl ActionExecutor {
    pub fn new(registry: Arc<dyn InterfaceRegistry>, metrics: Arc<MetricsRegistry>) -> Self {
        Self { registry, metrics }
    }

    /// Disposition for `action` without touching any packet.
    pub fn decide(&self, action: &Action) -> Disposition {
        match action {
            Action::Pass => Disposition::Forward,
            Action::Drop => Disposition::Drop(DropReason::Rule),
            Action::Redirect { interface } => match self.registry.resolve(interface) {
                Some(handle) => Disposition::Redirect(handle),
                None => Disposition::Drop(DropReason::DegradedRedirect),
            },
        }
    }

    /// Apply `action` to `frame` and return what was done.
    ///
    /// Transmit failures only affect this frame: they are counted and the
    /// frame is considered dropped by the sink. A redirect whose device
    /// vanishes during the send is dropped as degraded and invalidated in
    /// the registry, so later packets degrade without attempting a send.
    pub fn execute<E: Egress + ?Sized>(&self, action: &Action, frame: &[u8], egress: &E) -> Disposition {
        match self.decide(action) {
            Disposition::Forward => {
                match egress.forward(frame) {
                    Ok(()) => self.metrics.packets_passed.inc(),
                    Err(e) => {
                        self.metrics.egress_errors.inc();
                        trace!(error = %e, "Forward failed");
                    }
                }
                Disposition::Forward
            }
            Disposition::Drop(DropReason::Rule) => {
                self.metrics.packets_dropped.inc();
                Disposition::Drop(DropReason::Rule)
            }
            Disposition::Drop(DropReason::DegradedRedirect) => {
                self.degrade();
                trace!(
                    interface = action.interface().unwrap_or_default(),
                    "Redirect target unavailable, dropping packet"
                );
                Disposition::Drop(DropReason::DegradedRedirect)
            }
            Disposition::Redirect(handle) => match egress.send_to(handle, frame) {
                Ok(()) => {
                    self.metrics.packets_redirected.inc();
                    Disposition::Redirect(handle)
                }
                Err(e) if is_device_gone(&e) => {
                    self.metrics.egress_errors.inc();
                    self.degrade();
                    self.registry.invalidate(handle);
                    // Logged once: later packets fail to resolve and log at trace
                    warn!(
                        interface = action.interface().unwrap_or_default(),
                        ifindex = handle.ifindex(),
                        error = %e,
                        "Redirect target disappeared, dropping redirects to it"
                    );
                    Disposition::Drop(DropReason::DegradedRedirect)
                }
                Err(e) => {
                    self.metrics.egress_errors.inc();
                    trace!(ifindex = handle.ifindex(), error = %e, "Redirect send failed");
                    Disposition::Redirect(handle)
                }
            },
        }
    }

    fn degrade(&self) {
        self.metrics.packets_dropped.inc();
        self.metrics.degraded_redirects.inc();
    }
}
