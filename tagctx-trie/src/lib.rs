//! Per-dimension resource-value index.
//!
//! A [`ResourceTrie`] indexes matchers by the dot-separated (by default)
//! components of a resource's value for one dimension, so that a lookup for
//! an accessed value can recover every matcher whose indexed value is a
//! prefix match, a wildcard match, or — for [`LookupScope::SelfOrDescendants`]
//! lookups — anywhere in the subtree below it. The trie itself holds no
//! lock; callers own the copy-on-write or in-place update discipline around
//! it.

#![warn(missing_docs, clippy::pedantic)]

use std::collections::HashMap;
use std::collections::HashSet;
use std::hash::Hash;
use std::sync::Arc;

use tracing::trace;

/// Breadth requested from a trie lookup.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum LookupScope {
    /// Only matchers indexed at exactly the looked-up value.
    SelfOnly,
    /// Matchers at the looked-up value and anywhere in its subtree.
    SelfOrDescendants,
}

/// Structural parameters fixed when a trie is constructed: how a resource
/// value is split into path components, and which component denotes "any
/// value at this position".
#[derive(Clone, Debug)]
pub struct TrieResourceDef {
    separator: char,
    wildcard_token: String,
}

impl TrieResourceDef {
    /// Creates a resource definition with an explicit separator and
    /// wildcard token.
    #[must_use]
    pub fn new(separator: char, wildcard_token: impl Into<String>) -> Self {
        Self {
            separator,
            wildcard_token: wildcard_token.into(),
        }
    }

    fn split<'a>(&self, value: &'a str) -> Vec<&'a str> {
        if value.is_empty() {
            Vec::new()
        } else {
            value.split(self.separator).collect()
        }
    }
}

impl Default for TrieResourceDef {
    fn default() -> Self {
        Self::new('.', "*")
    }
}

#[derive(Debug)]
struct TrieNode<T> {
    children: HashMap<String, TrieNode<T>>,
    exact: HashSet<T>,
}

impl<T> Default for TrieNode<T> {
    fn default() -> Self {
        Self {
            children: HashMap::new(),
            exact: HashSet::new(),
        }
    }
}

impl<T: Clone + Eq + Hash> Clone for TrieNode<T> {
    fn clone(&self) -> Self {
        Self {
            children: self.children.clone(),
            exact: self.exact.clone(),
        }
    }
}

/// A prefix/wildcard index mapping one dimension's resource values to the
/// matchers indexed against them.
///
/// `T` is typically `Arc<ServiceResourceMatcher>`; this crate does not
/// depend on `tagctx-matcher` so the indexed type is left generic.
#[derive(Debug)]
pub struct ResourceTrie<T> {
    resource_def: TrieResourceDef,
    root: TrieNode<T>,
    opt_for_retrieval: bool,
    opt_for_space: bool,
    parent: Option<Arc<ResourceTrie<T>>>,
    revision: u64,
    dirty: bool,
}

impl<T: Clone + Eq + Hash> Clone for ResourceTrie<T> {
    fn clone(&self) -> Self {
        Self {
            resource_def: self.resource_def.clone(),
            root: self.root.clone(),
            opt_for_retrieval: self.opt_for_retrieval,
            opt_for_space: self.opt_for_space,
            parent: self.parent.clone(),
            revision: self.revision,
            dirty: self.dirty,
        }
    }
}

impl<T: Clone + Eq + Hash> ResourceTrie<T> {
    /// Builds a trie over the given `(value, matcher)` entries.
    ///
    /// `opt_for_retrieval` and `opt_for_space` are retained as hints for
    /// callers choosing between trie instances; `parent` lets a trie chain
    /// to a prior snapshot's trie for the dimensions that did not change in
    /// a delta update.
    #[must_use]
    pub fn new(
        resource_def: TrieResourceDef,
        entries: impl IntoIterator<Item = (String, T)>,
        opt_for_retrieval: bool,
        opt_for_space: bool,
        parent: Option<Arc<Self>>,
    ) -> Self {
        let mut trie = Self {
            resource_def,
            root: TrieNode::default(),
            opt_for_retrieval,
            opt_for_space,
            parent,
            revision: 0,
            dirty: false,
        };
        for (value, matcher) in entries {
            trie.add(&value, matcher);
        }
        trie.wrap_up_update();
        trie
    }

    /// Returns a structurally independent copy; mutating the copy never
    /// affects `self`.
    #[must_use]
    pub fn copy(&self) -> Self {
        self.clone()
    }

    /// Indexes `matcher` under `value`'s path.
    pub fn add(&mut self, value: &str, matcher: T) {
        let components = self.resource_def.split(value);
        let mut node = &mut self.root;
        for component in components {
            node = node.children.entry(component.to_string()).or_default();
        }
        node.exact.insert(matcher);
        self.dirty = true;
    }

    /// Removes `matcher` from the index under `value`'s path.
    ///
    /// A no-op when `value` was never indexed or `matcher` was not present.
    pub fn delete(&mut self, value: &str, matcher: &T) {
        let components = self.resource_def.split(value);
        let mut node = &mut self.root;
        for component in components {
            let Some(next) = node.children.get_mut(component) else {
                trace!(value, "delete targeted an unindexed resource value");
                return;
            };
            node = next;
        }
        node.exact.remove(matcher);
        self.dirty = true;
    }

    /// Finalizes a batch of [`add`](Self::add)/[`delete`](Self::delete)
    /// calls, bumping the trie's revision counter when anything changed.
    ///
    /// Cheap at the scale this trie targets: there is no deferred index to
    /// rebuild, so this only clears the dirty flag and advances `revision`.
    pub fn wrap_up_update(&mut self) {
        if self.dirty {
            self.revision += 1;
            self.dirty = false;
        }
    }

    /// Returns the number of completed update batches, for callers that
    /// need to detect whether a trie changed between two observations.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Returns the trie this one was chained from, if any.
    #[must_use]
    pub fn parent(&self) -> Option<&Arc<Self>> {
        self.parent.as_ref()
    }

    /// Returns every matcher reachable for `value` under `scope`: matchers
    /// indexed exactly at `value`, matchers indexed under a wildcard
    /// component anywhere along the path, and — for
    /// [`LookupScope::SelfOrDescendants`] — every matcher indexed anywhere
    /// in the subtree below `value`.
    #[must_use]
    pub fn get_evaluators_for_resource(&self, value: &str, scope: LookupScope) -> HashSet<T> {
        let components = self.resource_def.split(value);
        let mut out = HashSet::new();
        self.collect(&self.root, &components, scope, &mut out);
        out
    }

    fn collect(&self, node: &TrieNode<T>, remaining: &[&str], scope: LookupScope, out: &mut HashSet<T>) {
        if remaining.is_empty() {
            out.extend(node.exact.iter().cloned());
            if scope == LookupScope::SelfOrDescendants {
                collect_subtree(node, out);
            }
            return;
        }

        let (head, rest) = (remaining[0], &remaining[1..]);
        if let Some(child) = node.children.get(head) {
            self.collect(child, rest, scope, out);
        }
        if head != self.resource_def.wildcard_token {
            if let Some(child) = node.children.get(&self.resource_def.wildcard_token) {
                self.collect(child, rest, scope, out);
            }
        }
    }
}

fn collect_subtree<T: Clone + Eq + Hash>(node: &TrieNode<T>, out: &mut HashSet<T>) {
    out.extend(node.exact.iter().cloned());
    for child in node.children.values() {
        collect_subtree(child, out);
    }
}
