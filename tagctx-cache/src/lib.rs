//! Evaluator cache memoizing the candidate matcher set produced for a given
//! accessed resource and its per-dimension matching scopes.
//!
//! The cache sits in front of [`tagctx_snapshot::EnrichedSnapshot::candidates`],
//! which walks the per-dimension tries and intersects the hits. Lookups are
//! keyed on the resource's [`AccessResource::cache_key`] plus the
//! [`MatchingScopes`] used for the lookup, since the same resource can be
//! probed under different scopes (e.g. row-filter evaluation narrows some
//! dimensions to self-only). Reads and writes are brief, so a single
//! synchronous lock covers the whole structure; there is no scoped
//! invalidation, only a full [`EvaluatorCache::clear`] called whenever a new
//! snapshot is installed.

#![warn(missing_docs, clippy::pedantic)]

use std::collections::HashMap;
use std::sync::RwLock;

use tagctx_model::{AccessResource, MatchingScopes};
use tagctx_snapshot::{EnrichedSnapshot, MatcherRef};
use tracing::trace;

type ScopeTable = HashMap<MatchingScopes, Vec<MatcherRef>>;

#[derive(Default)]
struct CacheInner {
    entries: HashMap<String, ScopeTable>,
    hits: u64,
    misses: u64,
}

/// Memoized map from `(resource cache key, matching scopes)` to the matcher
/// set an uncached lookup against the current snapshot would have produced.
///
/// Always enabled: unlike the snapshot's own trie prefilter, the evaluator
/// cache has no opt-out, since the whole point is to amortize the cost of
/// per-dimension trie walks across repeated requests for the same resource.
pub struct EvaluatorCache {
    inner: RwLock<CacheInner>,
}

impl Default for EvaluatorCache {
    fn default() -> Self {
        Self::new()
    }
}

impl EvaluatorCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(CacheInner::default()),
        }
    }

    /// Returns the candidate matcher set for `resource` under `scopes`,
    /// consulting `snapshot` only on a miss and memoizing the result.
    #[must_use]
    pub fn candidates(
        &self,
        snapshot: &EnrichedSnapshot,
        resource: &AccessResource,
        scopes: &MatchingScopes,
    ) -> Vec<MatcherRef> {
        self.get_or_insert_with(resource, scopes, || snapshot.candidates(resource, scopes))
    }

    /// Returns the memoized candidate set for `(resource, scopes)`, invoking
    /// `compute` only on a miss. Lets callers cache an already
    /// predicate-filtered candidate set (step 2: "apply the
    /// predicate... cache if predicate was used") rather than the raw trie
    /// intersection.
    #[must_use]
    pub fn get_or_insert_with(
        &self,
        resource: &AccessResource,
        scopes: &MatchingScopes,
        compute: impl FnOnce() -> Vec<MatcherRef>,
    ) -> Vec<MatcherRef> {
        let key = resource.cache_key();

        if let Some(hit) = self
            .inner
            .read()
            .expect("evaluator cache lock poisoned")
            .entries
            .get(&key)
            .and_then(|scope_table| scope_table.get(scopes))
        {
            let mut inner = self.inner.write().expect("evaluator cache lock poisoned");
            inner.hits += 1;
            return hit.clone();
        }

        let computed = compute();

        let mut inner = self.inner.write().expect("evaluator cache lock poisoned");
        inner.misses += 1;
        inner
            .entries
            .entry(key)
            .or_default()
            .insert(scopes.clone(), computed.clone());
        computed
    }

    /// Drops every memoized entry. Called whenever a new snapshot is
    /// installed (full replacement or any delta extent), since a stale
    /// candidate set would silently hide or leak matchers.
    pub fn clear(&self) {
        let mut inner = self.inner.write().expect("evaluator cache lock poisoned");
        let dropped = inner.entries.len();
        inner.entries.clear();
        trace!(dropped, "evaluator cache cleared");
    }

    /// Returns `(hits, misses)` counters accumulated since the cache was
    /// created or last cleared statistics were not reset by `clear`; useful
    /// for diagnosing prefilter effectiveness.
    #[must_use]
    pub fn stats(&self) -> (u64, u64) {
        let inner = self.inner.read().expect("evaluator cache lock poisoned");
        (inner.hits, inner.misses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tagctx_model::{DimensionName, Hierarchy, PolicyType, ResourceValue, ServiceDef, ServiceResource, Tag};
    use tagctx_primitives::{ResourceId, TagId, TagVersion};
    use tagctx_snapshot::ServiceTagsSnapshot;
    use tagctx_trie::TrieResourceDef;

    fn service_def() -> ServiceDef {
        let mut def = ServiceDef::new();
        def.add_hierarchy(
            PolicyType::Access,
            Hierarchy::new(PolicyType::Access, vec!["db".into(), "tbl".into()]).unwrap(),
        );
        def
    }

    fn resource(id: i64, db: &str) -> ServiceResource {
        let mut elements = BTreeMap::new();
        elements.insert(DimensionName::new("db"), ResourceValue::Single(db.to_string()));
        ServiceResource::new(ResourceId::new(id), "sig", elements).unwrap()
    }

    fn snapshot() -> EnrichedSnapshot {
        let payload = ServiceTagsSnapshot::builder("svc", TagVersion::new(1))
            .with_service_resource(resource(1, "sales"))
            .with_tag(Tag::new(TagId::new(1), "PII").unwrap())
            .with_resource_tags(ResourceId::new(1), vec![TagId::new(1)])
            .build()
            .unwrap();
        EnrichedSnapshot::build_full(payload, &service_def(), &TrieResourceDef::default(), false)
    }

    #[test]
    fn repeated_lookup_hits_cache() {
        let cache = EvaluatorCache::new();
        let snapshot = snapshot();
        let accessed = AccessResource::empty().with_value(DimensionName::new("db"), "sales");
        let scopes = MatchingScopes::new();

        let first = cache.candidates(&snapshot, &accessed, &scopes);
        let second = cache.candidates(&snapshot, &accessed, &scopes);

        assert_eq!(first, second);
        let (hits, misses) = cache.stats();
        assert_eq!(hits, 1);
        assert_eq!(misses, 1);
    }

    #[test]
    fn distinct_scopes_are_cached_separately() {
        let cache = EvaluatorCache::new();
        let snapshot = snapshot();
        let accessed = AccessResource::empty().with_value(DimensionName::new("db"), "sales");

        let mut self_only = MatchingScopes::new();
        self_only.insert(DimensionName::new("db"), tagctx_model::LookupScope::SelfOnly);

        cache.candidates(&snapshot, &accessed, &MatchingScopes::new());
        cache.candidates(&snapshot, &accessed, &self_only);

        let (_, misses) = cache.stats();
        assert_eq!(misses, 2);
    }

    #[test]
    fn clear_drops_memoized_entries() {
        let cache = EvaluatorCache::new();
        let snapshot = snapshot();
        let accessed = AccessResource::empty().with_value(DimensionName::new("db"), "sales");
        let scopes = MatchingScopes::new();

        cache.candidates(&snapshot, &accessed, &scopes);
        cache.clear();
        cache.candidates(&snapshot, &accessed, &scopes);

        let (_, misses) = cache.stats();
        assert_eq!(misses, 2);
    }
}
