//! Interface registry
//!
//! Maps interface names (as used in redirect rules) to the handles the
//! egress side transmits on. The table consults it when a redirect rule is
//! installed; the executor consults it again for every redirected packet.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Resolved egress interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InterfaceHandle {
    ifindex: u32,
}

impl InterfaceHandle {
    pub fn new(ifindex: u32) -> Self {
        Self { ifindex }
    }

    /// Kernel interface index
    pub fn ifindex(&self) -> u32 {
        self.ifindex
    }
}

/// Name to handle resolution
pub trait InterfaceRegistry: Send + Sync {
    /// Resolve an interface name, `None` if it is unknown or gone.
    fn resolve(&self, name: &str) -> Option<InterfaceHandle>;

    /// Called when transmitting on `handle` failed because the device
    /// disappeared.
    fn invalidate(&self, _handle: InterfaceHandle) {}
}

/// Registry backed by an in-memory map, populated by whoever owns the
/// interfaces (the daemon binds sockets and registers them here).
#[derive(Debug, Default)]
pub struct StaticRegistry {
    interfaces: RwLock<HashMap<String, InterfaceHandle>>,
}

impl StaticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from `(name, ifindex)` pairs.
    pub fn with_interfaces<'a>(entries: impl IntoIterator<Item = (&'a str, u32)>) -> Self {
        let registry = Self::new();
        for (name, ifindex) in entries {
            registry.insert(name, InterfaceHandle::new(ifindex));
        }
        registry
    }

    pub fn insert(&self, name: &str, handle: InterfaceHandle) {
        self.interfaces
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), handle);
    }

    pub fn remove(&self, name: &str) -> Option<InterfaceHandle> {
        self.interfaces
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .interfaces
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.interfaces
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl InterfaceRegistry for StaticRegistry {
    fn resolve(&self, name: &str) -> Option<InterfaceHandle> {
        self.interfaces
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .copied()
    }

    fn invalidate(&self, handle: InterfaceHandle) {
        self.interfaces
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|_, h| *h != handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_registered() {
        let registry = StaticRegistry::with_interfaces([("eth1", 2), ("eth3", 4)]);
        assert_eq!(registry.resolve("eth3"), Some(InterfaceHandle::new(4)));
        assert_eq!(registry.resolve("ghost0"), None);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_remove_and_names() {
        let registry = StaticRegistry::with_interfaces([("eth3", 4), ("eth1", 2)]);
        assert_eq!(registry.names(), vec!["eth1", "eth3"]);
        assert_eq!(registry.remove("eth1"), Some(InterfaceHandle::new(2)));
        assert_eq!(registry.remove("eth1"), None);
        assert_eq!(registry.names(), vec!["eth3"]);
    }

    #[test]
    fn test_invalidate_drops_every_alias() {
        let registry = StaticRegistry::with_interfaces([("eth3", 4), ("uplink", 4), ("eth1", 2)]);
        registry.invalidate(InterfaceHandle::new(4));
        assert_eq!(registry.resolve("eth3"), None);
        assert_eq!(registry.resolve("uplink"), None);
        assert_eq!(registry.resolve("eth1"), Some(InterfaceHandle::new(2)));
    }
}
