//! Persistent binary trie for longest prefix match
//!
//! Nodes are immutable once published. An update copies only the nodes on
//! the path from the root to the changed prefix and shares every other
//! subtree with the previous version, so a new version costs at most
//! `prefix_len + 1` node allocations and old versions stay valid for
//! readers that still hold them.

use super::prefix::Prefix;
use super::table::Rule;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
struct Node {
    rule: Option<Arc<Rule>>,
    children: [Option<Arc<Node>>; 2],
}

impl Node {
    fn is_empty(&self) -> bool {
        self.rule.is_none() && self.children[0].is_none() && self.children[1].is_none()
    }

    /// Publish a node, pruning it if it carries nothing.
    fn into_shared(self) -> Option<Arc<Node>> {
        if self.is_empty() {
            None
        } else {
            Some(Arc::new(self))
        }
    }
}

/// Bit `depth` of a left-aligned key (0 = most significant).
#[inline]
fn bit(key: u128, depth: u8) -> usize {
    ((key >> (127 - depth as u32)) & 1) as usize
}

/// One version of the trie for a single address family.
#[derive(Debug, Clone, Default)]
pub(crate) struct Trie {
    root: Option<Arc<Node>>,
}

impl Trie {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Exact-match lookup
    pub(crate) fn get(&self, prefix: &Prefix) -> Option<&Arc<Rule>> {
        let key = prefix.key();
        let mut node = self.root.as_deref()?;
        for depth in 0..prefix.prefix_len() {
            node = node.children[bit(key, depth)].as_deref()?;
        }
        node.rule.as_ref()
    }

    /// Longest-prefix match for a left-aligned address key of `width` bits.
    ///
    /// Walks from the root along the address bits and remembers the deepest
    /// node holding a rule, so a shorter prefix seen earlier never shadows a
    /// longer one found later.
    pub(crate) fn longest_match(&self, key: u128, width: u8) -> Option<&Rule> {
        let mut node = self.root.as_deref();
        let mut best = None;
        let mut depth = 0u8;
        while let Some(n) = node {
            if let Some(rule) = n.rule.as_deref() {
                best = Some(rule);
            }
            if depth == width {
                break;
            }
            node = n.children[bit(key, depth)].as_deref();
            depth += 1;
        }
        best
    }

    /// New version with `rule` stored at its prefix (replacing any previous
    /// rule for the same prefix).
    pub(crate) fn insert(&self, rule: Arc<Rule>) -> Trie {
        let key = rule.prefix.key();
        let len = rule.prefix.prefix_len();
        Trie {
            root: Some(insert_at(self.root.as_ref(), key, len, 0, rule)),
        }
    }

    /// New version without `prefix`, or `None` if it was not present.
    pub(crate) fn remove(&self, prefix: &Prefix) -> Option<Trie> {
        let root = self.root.as_ref()?;
        let root = remove_at(root, prefix.key(), prefix.prefix_len(), 0)?;
        Some(Trie { root })
    }

    /// All stored rules in pre-order (shorter prefixes before the longer
    /// prefixes they contain).
    pub(crate) fn rules(&self) -> Vec<Arc<Rule>> {
        let mut out = Vec::new();
        if let Some(root) = &self.root {
            collect(root, &mut out);
        }
        out
    }
}

fn insert_at(node: Option<&Arc<Node>>, key: u128, len: u8, depth: u8, rule: Arc<Rule>) -> Arc<Node> {
    let mut copy = node.map(|n| Node::clone(n)).unwrap_or_default();
    if depth == len {
        copy.rule = Some(rule);
    } else {
        let b = bit(key, depth);
        let child = insert_at(copy.children[b].as_ref(), key, len, depth + 1, rule);
        copy.children[b] = Some(child);
    }
    Arc::new(copy)
}

/// Returns the replacement for `node`'s subtree, or `None` when the prefix
/// is absent and nothing changed.
fn remove_at(node: &Arc<Node>, key: u128, len: u8, depth: u8) -> Option<Option<Arc<Node>>> {
    let copy = if depth == len {
        node.rule.as_ref()?;
        let mut copy = Node::clone(node);
        copy.rule = None;
        copy
    } else {
        let b = bit(key, depth);
        let child = node.children[b].as_ref()?;
        let replacement = remove_at(child, key, len, depth + 1)?;
        let mut copy = Node::clone(node);
        copy.children[b] = replacement;
        copy
    };
    Some(copy.into_shared())
}

fn collect(node: &Arc<Node>, out: &mut Vec<Arc<Rule>>) {
    if let Some(rule) = &node.rule {
        out.push(Arc::clone(rule));
    }
    for child in node.children.iter().flatten() {
        collect(child, out);
    }
}
