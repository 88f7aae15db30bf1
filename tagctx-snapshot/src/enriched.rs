//! The enriched (indexed) snapshot: matchers plus per-dimension tries built
//! from a service-tags payload.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::HashSet;
use std::sync::Arc;

use tagctx_matcher::ServiceResourceMatcher;
use tagctx_model::{
    AccessResource, DimensionName, HierarchyValidityCache, LookupScope as ModelLookupScope,
    MatchType, MatchingScopes, ServiceDef, TagForEval,
};
use tagctx_primitives::TagVersion;
use tagctx_trie::{LookupScope as TrieLookupScope, ResourceTrie, TrieResourceDef};
use tracing::trace;

fn to_trie_scope(scope: ModelLookupScope) -> TrieLookupScope {
    match scope {
        ModelLookupScope::SelfOnly => TrieLookupScope::SelfOnly,
        ModelLookupScope::SelfOrDescendants => TrieLookupScope::SelfOrDescendants,
    }
}

use crate::payload::ServiceTagsSnapshot;

/// A matcher reference shared between a dimension's trie entries and the
/// snapshot's flat matcher list.
pub type MatcherRef = Arc<ServiceResourceMatcher>;

/// A per-dimension trie, `Arc`-wrapped so that extents which only reuse the
/// index can share it instead of copying it, and so in-place updates can go
/// through [`Arc::make_mut`] — mutating truly in place when nothing else
/// holds the trie, and falling back to a copy otherwise.
pub type TrieRef = Arc<ResourceTrie<MatcherRef>>;

/// Immutable bundle of a service-tags payload plus its indexed form.
///
/// Built fresh on every full replacement, and either rebuilt or mutated in
/// place (per the lock-enabled flag) on a structural delta; reused wholesale
/// when a delta only changes tag attributes.
#[derive(Clone)]
pub struct EnrichedSnapshot {
    payload: ServiceTagsSnapshot,
    matchers: Vec<MatcherRef>,
    tries: BTreeMap<DimensionName, TrieRef>,
    tags_for_empty_resource_and_any_access: Vec<TagForEval>,
    resource_trie_version: TagVersion,
}

impl EnrichedSnapshot {
    /// Builds a fresh enriched snapshot from a full (non-delta) payload.
    ///
    /// Resources whose dimensions admit no hierarchy are dropped, along with
    /// their tag-id associations. When `disable_trie_prefilter` is set, no
    /// per-dimension tries are built and lookups fall back to scanning
    /// every matcher.
    #[must_use]
    pub fn build_full(
        mut payload: ServiceTagsSnapshot,
        service_def: &ServiceDef,
        trie_def: &TrieResourceDef,
        disable_trie_prefilter: bool,
    ) -> Self {
        payload.dedup_tags();

        let mut validity_cache = HierarchyValidityCache::new();
        let mut matchers = Vec::with_capacity(payload.service_resources().len());
        let mut retained = BTreeSet::new();

        for resource in payload.service_resources() {
            if resource.is_delete_marker() {
                continue;
            }
            match ServiceResourceMatcher::build(resource, service_def, &mut validity_cache) {
                Some(matcher) => {
                    retained.insert(resource.id());
                    matchers.push(Arc::new(matcher));
                }
                None => trace!(resource_id = %resource.id(), "dropping resource with no admitted hierarchy"),
            }
        }
        payload.retain_resource_tag_ids(&retained);

        let tries = if disable_trie_prefilter {
            BTreeMap::new()
        } else {
            build_tries(service_def, &matchers, trie_def)
        };

        Self::assemble(payload, matchers, tries)
    }

    /// Assembles an enriched snapshot from already-computed parts. Used by
    /// the delta applicator when reusing, rebuilding, or mutating a prior
    /// snapshot's index rather than rebuilding it from scratch.
    #[must_use]
    pub(crate) fn assemble(
        payload: ServiceTagsSnapshot,
        matchers: Vec<MatcherRef>,
        tries: BTreeMap<DimensionName, TrieRef>,
    ) -> Self {
        let tags_for_empty_resource_and_any_access = payload
            .tags()
            .values()
            .map(|tag| TagForEval::new(tag.clone(), MatchType::Descendant))
            .collect();
        let resource_trie_version = payload.tag_version();

        Self {
            payload,
            matchers,
            tries,
            tags_for_empty_resource_and_any_access,
            resource_trie_version,
        }
    }

    /// Returns the underlying service-tags payload.
    #[must_use]
    pub fn payload(&self) -> &ServiceTagsSnapshot {
        &self.payload
    }

    /// Returns every retained matcher.
    #[must_use]
    pub fn matchers(&self) -> &[MatcherRef] {
        &self.matchers
    }

    /// Returns the per-dimension trie map. Empty when the trie prefilter was
    /// disabled for this snapshot.
    #[must_use]
    pub fn tries(&self) -> &BTreeMap<DimensionName, TrieRef> {
        &self.tries
    }

    /// Returns the trie for a single dimension, if built.
    #[must_use]
    pub fn trie_for(&self, dimension: &DimensionName) -> Option<&TrieRef> {
        self.tries.get(dimension)
    }

    /// Returns the precomputed tag set used when the accessed resource is
    /// empty and the access type is `ANY`.
    #[must_use]
    pub fn tags_for_empty_resource_and_any_access(&self) -> &[TagForEval] {
        &self.tags_for_empty_resource_and_any_access
    }

    /// Returns the tag version this snapshot's index was built against.
    #[must_use]
    pub fn resource_trie_version(&self) -> TagVersion {
        self.resource_trie_version
    }

    /// Returns candidate matchers for `resource`, intersecting per-dimension
    /// trie lookups restricted by `scopes`.
    ///
    /// Falls back to every retained matcher when the resource is empty, no
    /// tries were built (prefilter disabled), or the resource's populated
    /// dimensions carry no trie of their own.
    #[must_use]
    pub fn candidates(&self, resource: &AccessResource, scopes: &MatchingScopes) -> Vec<MatcherRef> {
        if resource.is_empty() || self.tries.is_empty() {
            return self.matchers.clone();
        }

        let mut intersection: Option<HashSet<MatcherRef>> = None;
        for (dim, value) in resource.as_map() {
            let Some(trie) = self.tries.get(dim) else {
                continue;
            };
            let scope = scopes
                .get(dim)
                .copied()
                .unwrap_or(ModelLookupScope::SelfOrDescendants);
            let mut hits = HashSet::new();
            for literal in value.values() {
                hits.extend(trie.get_evaluators_for_resource(literal, to_trie_scope(scope)));
            }
            intersection = Some(match intersection {
                None => hits,
                Some(prev) => prev.intersection(&hits).cloned().collect(),
            });
        }

        intersection
            .map(|hits| hits.into_iter().collect())
            .unwrap_or_else(|| self.matchers.clone())
    }

    /// Returns the matcher indexed under `resource_id`, if still retained.
    #[must_use]
    pub fn matcher_for_resource(&self, resource_id: tagctx_primitives::ResourceId) -> Option<&MatcherRef> {
        self.matchers.iter().find(|m| m.resource_id() == resource_id)
    }
}

fn build_tries(
    service_def: &ServiceDef,
    matchers: &[MatcherRef],
    trie_def: &TrieResourceDef,
) -> BTreeMap<DimensionName, TrieRef> {
    let mut entries: BTreeMap<DimensionName, Vec<(String, MatcherRef)>> = service_def
        .dimension_set()
        .into_iter()
        .map(|dim| (dim, Vec::new()))
        .collect();

    for matcher in matchers {
        for (dim, value) in matcher.values() {
            let bucket = entries.entry(dim.clone()).or_default();
            for literal in value.values() {
                bucket.push((literal.clone(), Arc::clone(matcher)));
            }
        }
    }

    entries
        .into_iter()
        .map(|(dim, dim_entries)| {
            let trie = ResourceTrie::new(trie_def.clone(), dim_entries, false, false, None);
            (dim, Arc::new(trie))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap as StdBTreeMap;
    use tagctx_model::{DimensionName as Dim, Hierarchy, PolicyType, ResourceValue, ServiceResource, Tag};
    use tagctx_primitives::{ResourceId, TagId};

    fn service_def() -> ServiceDef {
        let mut def = ServiceDef::new();
        def.add_hierarchy(
            PolicyType::Access,
            Hierarchy::new(PolicyType::Access, vec!["db".into(), "tbl".into()]).unwrap(),
        );
        def
    }

    fn resource(id: i64, db: &str) -> ServiceResource {
        let mut elements = StdBTreeMap::new();
        elements.insert(Dim::new("db"), ResourceValue::Single(db.to_string()));
        ServiceResource::new(ResourceId::new(id), "sig", elements).unwrap()
    }

    #[test]
    fn trie_key_set_equals_service_def_dimension_set() {
        let payload = ServiceTagsSnapshot::builder("svc", TagVersion::new(1))
            .with_service_resource(resource(1, "sales"))
            .with_tag(Tag::new(TagId::new(1), "PII").unwrap())
            .with_resource_tags(ResourceId::new(1), vec![TagId::new(1)])
            .build()
            .unwrap();

        let def = service_def();
        let snapshot = EnrichedSnapshot::build_full(payload, &def, &TrieResourceDef::default(), false);

        let trie_keys: BTreeSet<_> = snapshot.tries().keys().cloned().collect();
        assert_eq!(trie_keys, def.dimension_set());
    }

    #[test]
    fn unadmitted_resource_is_dropped_with_its_tag_refs() {
        let mut elements = StdBTreeMap::new();
        elements.insert(Dim::new("unknown"), ResourceValue::Single("x".into()));
        let orphan = ServiceResource::new(ResourceId::new(2), "sig", elements).unwrap();

        let payload = ServiceTagsSnapshot::builder("svc", TagVersion::new(1))
            .with_service_resource(orphan)
            .with_tag(Tag::new(TagId::new(9), "PII").unwrap())
            .with_resource_tags(ResourceId::new(2), vec![TagId::new(9)])
            .build()
            .unwrap();

        let def = service_def();
        let snapshot = EnrichedSnapshot::build_full(payload, &def, &TrieResourceDef::default(), false);

        assert!(snapshot.matchers().is_empty());
        assert!(snapshot.payload().resource_to_tag_ids().is_empty());
    }

    #[test]
    fn empty_resource_any_access_set_has_one_entry_per_tag() {
        let payload = ServiceTagsSnapshot::builder("svc", TagVersion::new(1))
            .with_service_resource(resource(1, "sales"))
            .with_tag(Tag::new(TagId::new(1), "PII").unwrap())
            .with_resource_tags(ResourceId::new(1), vec![TagId::new(1)])
            .build()
            .unwrap();

        let def = service_def();
        let snapshot = EnrichedSnapshot::build_full(payload, &def, &TrieResourceDef::default(), false);

        let tags = snapshot.tags_for_empty_resource_and_any_access();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].match_type(), MatchType::Descendant);
    }

    #[test]
    fn disabled_prefilter_leaves_tries_empty() {
        let payload = ServiceTagsSnapshot::builder("svc", TagVersion::new(1))
            .with_service_resource(resource(1, "sales"))
            .build()
            .unwrap();

        let def = service_def();
        let snapshot = EnrichedSnapshot::build_full(payload, &def, &TrieResourceDef::default(), true);
        assert!(snapshot.tries().is_empty());
        assert_eq!(snapshot.matchers().len(), 1);
    }
}
