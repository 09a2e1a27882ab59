//! Prefix table
//!
//! The table is the only state shared between the control plane and the
//! packet path. Readers never take a lock: they load the current
//! [`TableSnapshot`] through `ArcSwap` and walk an immutable trie. Writers
//! serialize on a mutex, build the next snapshot by path-copying the trie,
//! and publish it with a single atomic store. A lookup therefore sees either
//! the whole previous rule set or the whole new one.

use super::action::Action;
use super::prefix::{address_key, AddressFamily, Prefix};
use super::registry::InterfaceRegistry;
use super::trie::Trie;
use crate::error::RuleError;
use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use std::fmt;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};

/// Maximum number of rules, same bound as the kernel trie map this engine
/// replaces.
pub const DEFAULT_MAX_ENTRIES: usize = 200_000;

/// An installed rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub prefix: Prefix,
    pub action: Action,
    /// Last install time (observability only, never used for matching)
    pub updated_at: DateTime<Utc>,
}

/// Immutable view of the table at one point in time
#[derive(Debug, Clone)]
pub struct TableSnapshot {
    v4: Trie,
    v6: Trie,
    len: usize,
    version: u64,
    default_action: Action,
}

impl TableSnapshot {
    fn empty(default_action: Action) -> Self {
        Self {
            v4: Trie::new(),
            v6: Trie::new(),
            len: 0,
            version: 0,
            default_action,
        }
    }

    fn trie(&self, family: AddressFamily) -> &Trie {
        match family {
            AddressFamily::V4 => &self.v4,
            AddressFamily::V6 => &self.v6,
        }
    }

    fn with_trie(&self, family: AddressFamily, trie: Trie, len: usize) -> Self {
        let mut next = Self {
            v4: self.v4.clone(),
            v6: self.v6.clone(),
            len,
            version: self.version + 1,
            default_action: self.default_action.clone(),
        };
        match family {
            AddressFamily::V4 => next.v4 = trie,
            AddressFamily::V6 => next.v6 = trie,
        }
        next
    }

    /// Rule with the longest prefix containing `addr`
    pub fn matching_rule(&self, addr: IpAddr) -> Option<&Rule> {
        let family = AddressFamily::of(&addr);
        self.trie(family)
            .longest_match(address_key(addr), family.bits())
    }

    /// Longest-prefix-match lookup, falling back to the default action
    pub fn lookup(&self, addr: IpAddr) -> &Action {
        self.matching_rule(addr)
            .map(|rule| &rule.action)
            .unwrap_or(&self.default_action)
    }

    /// Exact-prefix lookup
    pub fn get(&self, prefix: &Prefix) -> Option<&Rule> {
        self.trie(prefix.family()).get(prefix).map(|r| &**r)
    }

    /// All rules sorted by family, address, length
    pub fn rules(&self) -> Vec<Rule> {
        let mut rules: Vec<Rule> = self
            .v4
            .rules()
            .into_iter()
            .chain(self.v6.rules())
            .map(|r| Rule::clone(&r))
            .collect();
        rules.sort_by(|a, b| a.prefix.cmp(&b.prefix));
        rules
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Incremented on every committed mutation
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn default_action(&self) -> &Action {
        &self.default_action
    }
}

/// Longest-prefix-match rule table
pub struct PrefixTable {
    current: ArcSwap<TableSnapshot>,
    writer: Mutex<()>,
    registry: Arc<dyn InterfaceRegistry>,
    max_entries: usize,
}

impl PrefixTable {
    /// Empty table with `PASS` as default action
    pub fn new(registry: Arc<dyn InterfaceRegistry>) -> Self {
        Self::with_options(registry, Action::Pass, DEFAULT_MAX_ENTRIES)
    }

    pub fn with_options(
        registry: Arc<dyn InterfaceRegistry>,
        default_action: Action,
        max_entries: usize,
    ) -> Self {
        Self {
            current: ArcSwap::from_pointee(TableSnapshot::empty(default_action)),
            writer: Mutex::new(()),
            registry,
            max_entries,
        }
    }

    /// Insert or replace the rule for `prefix`.
    ///
    /// Redirect targets must resolve at install time. Returns whether the
    /// table changed: re-installing the same action for the same prefix
    /// leaves it untouched and returns `false`.
    pub fn install(&self, prefix: Prefix, action: Action) -> Result<bool, RuleError> {
        if let Action::Redirect { interface } = &action {
            if self.registry.resolve(interface).is_none() {
                return Err(RuleError::UnresolvedInterface {
                    name: interface.to_string(),
                });
            }
        }

        let _guard = self
            .writer
            .lock()
            .map_err(|_| RuleError::InternalTableError("writer lock poisoned".into()))?;

        let snapshot = self.current.load_full();
        let family = prefix.family();
        let trie = snapshot.trie(family);

        let len = match trie.get(&prefix) {
            Some(existing) if existing.action == action => return Ok(false),
            Some(_) => snapshot.len,
            None if snapshot.len >= self.max_entries => {
                return Err(RuleError::CapacityExceeded {
                    limit: self.max_entries,
                })
            }
            None => snapshot.len + 1,
        };

        let rule = Arc::new(Rule {
            prefix,
            action,
            updated_at: Utc::now(),
        });
        let next = trie.insert(rule);
        self.current
            .store(Arc::new(snapshot.with_trie(family, next, len)));
        Ok(true)
    }

    /// Remove the rule for `prefix`. Returns whether a rule was removed;
    /// withdrawing an absent prefix is not an error.
    pub fn withdraw(&self, prefix: &Prefix) -> Result<bool, RuleError> {
        let _guard = self
            .writer
            .lock()
            .map_err(|_| RuleError::InternalTableError("writer lock poisoned".into()))?;

        let snapshot = self.current.load_full();
        let family = prefix.family();
        let Some(next) = snapshot.trie(family).remove(prefix) else {
            return Ok(false);
        };
        let len = snapshot.len.checked_sub(1).ok_or_else(|| {
            RuleError::InternalTableError(format!("rule count underflow removing {prefix}"))
        })?;

        self.current
            .store(Arc::new(snapshot.with_trie(family, next, len)));
        Ok(true)
    }

    /// Action for `addr`; never blocks and never fails.
    pub fn lookup(&self, addr: IpAddr) -> Action {
        self.current.load().lookup(addr).clone()
    }

    /// Current snapshot, for callers that need several consistent reads
    pub fn snapshot(&self) -> Arc<TableSnapshot> {
        self.current.load_full()
    }

    /// Exact-prefix lookup
    pub fn get(&self, prefix: &Prefix) -> Option<Action> {
        self.current.load().get(prefix).map(|r| r.action.clone())
    }

    /// All installed rules, sorted
    pub fn rules(&self) -> Vec<Rule> {
        self.current.load().rules()
    }

    pub fn len(&self) -> usize {
        self.current.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn version(&self) -> u64 {
        self.current.load().version()
    }

    pub fn default_action(&self) -> Action {
        self.current.load().default_action().clone()
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn registry(&self) -> &Arc<dyn InterfaceRegistry> {
        &self.registry
    }
}

impl fmt::Debug for PrefixTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.current.load();
        f.debug_struct("PrefixTable")
            .field("len", &snapshot.len())
            .field("version", &snapshot.version())
            .field("default_action", snapshot.default_action())
            .field("max_entries", &self.max_entries)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataplane::registry::StaticRegistry;

    fn table() -> PrefixTable {
        PrefixTable::new(Arc::new(StaticRegistry::with_interfaces([("eth3", 4)])))
    }

    fn p(s: &str) -> Prefix {
        Prefix::parse(s).unwrap()
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_empty_table_returns_default() {
        let table = table();
        assert!(table.is_empty());
        assert_eq!(table.lookup(ip("1.2.3.4")), Action::Pass);
        assert_eq!(table.lookup(ip("2001:db8::1")), Action::Pass);
    }

    #[test]
    fn test_configurable_default() {
        let table = PrefixTable::with_options(Arc::new(StaticRegistry::new()), Action::Drop, 10);
        assert_eq!(table.lookup(ip("1.2.3.4")), Action::Drop);
        table.install(p("1.2.3.0/24"), Action::Pass).unwrap();
        assert_eq!(table.lookup(ip("1.2.3.4")), Action::Pass);
        assert_eq!(table.lookup(ip("1.2.4.4")), Action::Drop);
    }

    #[test]
    fn test_longest_prefix_wins() {
        let table = table();
        table.install(p("10.0.0.0/8"), Action::Drop).unwrap();
        table.install(p("10.1.0.0/16"), Action::Pass).unwrap();

        assert_eq!(table.lookup(ip("10.1.2.3")), Action::Pass);
        assert_eq!(table.lookup(ip("10.2.0.0")), Action::Drop);
    }

    #[test]
    fn test_install_replaces_action() {
        let table = table();
        table.install(p("10.0.0.0/8"), Action::Drop).unwrap();
        table.install(p("10.0.0.0/8"), Action::Pass).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(&p("10.0.0.0/8")), Some(Action::Pass));
    }

    #[test]
    fn test_install_idempotent() {
        let table = table();
        assert_eq!(table.install(p("10.0.0.0/8"), Action::Drop), Ok(true));
        let before = table.snapshot();
        assert_eq!(table.install(p("10.0.0.0/8"), Action::Drop), Ok(false));
        let after = table.snapshot();

        assert_eq!(before.version(), after.version());
        assert_eq!(before.rules(), after.rules());
    }

    #[test]
    fn test_redirect_requires_resolvable_interface() {
        let table = table();
        table
            .install(p("8.8.8.8/32"), Action::redirect("eth3"))
            .unwrap();
        assert_eq!(table.lookup(ip("8.8.8.8")), Action::redirect("eth3"));

        let err = table
            .install(p("1.2.3.4/32"), Action::redirect("ghost0"))
            .unwrap_err();
        assert_eq!(
            err,
            RuleError::UnresolvedInterface {
                name: "ghost0".into()
            }
        );
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_withdraw() {
        let table = table();
        table.install(p("185.100.0.0/16"), Action::Drop).unwrap();
        assert_eq!(table.lookup(ip("185.100.5.5")), Action::Drop);

        assert_eq!(table.withdraw(&p("185.100.0.0/16")), Ok(true));
        assert_eq!(table.lookup(ip("185.100.5.5")), Action::Pass);
        assert!(table.is_empty());
    }

    #[test]
    fn test_withdraw_absent_is_noop() {
        let table = table();
        table.install(p("10.0.0.0/8"), Action::Drop).unwrap();
        let version = table.version();

        assert_eq!(table.withdraw(&p("10.0.0.0/16")), Ok(false));
        assert_eq!(table.withdraw(&p("2001:db8::/32")), Ok(false));
        assert_eq!(table.version(), version);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_capacity_limit_applies_to_new_prefixes_only() {
        let table = PrefixTable::with_options(Arc::new(StaticRegistry::new()), Action::Pass, 2);
        table.install(p("10.0.0.0/8"), Action::Drop).unwrap();
        table.install(p("11.0.0.0/8"), Action::Drop).unwrap();

        assert_eq!(
            table.install(p("12.0.0.0/8"), Action::Drop),
            Err(RuleError::CapacityExceeded { limit: 2 })
        );
        table.install(p("11.0.0.0/8"), Action::Pass).unwrap();
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_rules_are_sorted_and_normalized() {
        let table = table();
        table.install(p("2001:db8::/32"), Action::Drop).unwrap();
        table.install(p("10.1.2.3/16"), Action::Pass).unwrap();
        table.install(p("10.0.0.0/8"), Action::Drop).unwrap();

        let listed: Vec<String> = table
            .rules()
            .iter()
            .map(|r| format!("{} {}", r.prefix, r.action))
            .collect();
        assert_eq!(
            listed,
            ["10.0.0.0/8 DROP", "10.1.0.0/16 PASS", "2001:db8::/32 DROP"]
        );
    }

    #[test]
    fn test_snapshot_is_stable_across_updates() {
        let table = table();
        table.install(p("10.0.0.0/8"), Action::Drop).unwrap();
        let old = table.snapshot();

        table.install(p("10.1.0.0/16"), Action::Pass).unwrap();
        table.withdraw(&p("10.0.0.0/8")).unwrap();

        assert_eq!(old.lookup(ip("10.1.2.3")), &Action::Drop);
        assert_eq!(old.len(), 1);
        assert_eq!(table.lookup(ip("10.1.2.3")), Action::Pass);
        assert_eq!(table.lookup(ip("10.2.0.0")), Action::Pass);
    }

    #[test]
    fn test_families_are_independent() {
        let table = table();
        table.install(p("0.0.0.0/0"), Action::Drop).unwrap();
        assert_eq!(table.lookup(ip("2001:db8::1")), Action::Pass);
        assert_eq!(table.lookup(ip("::ffff:10.0.0.1")), Action::Pass);
    }
}
