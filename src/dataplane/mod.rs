//! Data plane components
//!
//! The prefix table shared with the control plane, and the per-packet
//! classification and enforcement built on it.

pub mod action;
pub mod classifier;
pub mod executor;
pub mod prefix;
pub mod registry;
pub mod table;
mod trie;

pub use action::{Action, ActionKind};
pub use classifier::{MatchField, PacketClassifier};
pub use executor::{ActionExecutor, Disposition, DropReason, Egress};
pub use prefix::{AddressFamily, Prefix};
pub use registry::{InterfaceHandle, InterfaceRegistry, StaticRegistry};
pub use table::{PrefixTable, Rule, TableSnapshot, DEFAULT_MAX_ENTRIES};
