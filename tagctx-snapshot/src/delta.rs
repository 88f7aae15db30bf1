//! Delta application: evolves an enriched snapshot by full replacement or
//! incremental add/update/delete of tagged resources.

use std::collections::BTreeMap;
use std::sync::Arc;

use tagctx_matcher::ServiceResourceMatcher;
use tagctx_model::{AccessResource, DimensionName, HierarchyValidityCache, MatchType, ResourceValue, ServiceDef};
use tagctx_primitives::{ResourceId, TagVersion};
use tagctx_trie::{ResourceTrie, TrieResourceDef};
use tracing::warn;

use crate::enriched::{EnrichedSnapshot, MatcherRef, TrieRef};
use crate::payload::{ServiceTagsSnapshot, TagsChangeExtent};

/// Outcome of applying a service-tags payload onto a prior enriched snapshot.
#[derive(Debug)]
pub enum DeltaOutcome {
    /// The new enriched snapshot to install.
    Installed(EnrichedSnapshot),
    /// The delta could not be applied; the prior snapshot must be kept
    /// installed, unmodified, and the next refresh cycle should request a
    /// full redownload at [`TagVersion::FORCE_REDOWNLOAD`].
    Aborted {
        /// The version the next retrieval should be requested at.
        forced_tag_version: TagVersion,
    },
}

/// Applies `incoming` onto `prior` (absent on the very first populate).
///
/// Dispatches to full replacement or incremental delta processing.
/// `lock_enabled` selects between in-place trie mutation and
/// copy-on-write; `rebuild_only_index` keeps the prior payload unmerged
/// while still mutating the index against the delta's changed resources
/// (documented in `DESIGN.md`).
#[must_use]
pub fn apply(
    prior: Option<&EnrichedSnapshot>,
    incoming: ServiceTagsSnapshot,
    service_def: &ServiceDef,
    trie_def: &TrieResourceDef,
    disable_trie_prefilter: bool,
    lock_enabled: bool,
    rebuild_only_index: bool,
) -> DeltaOutcome {
    if !incoming.is_delta() {
        return DeltaOutcome::Installed(EnrichedSnapshot::build_full(
            incoming,
            service_def,
            trie_def,
            disable_trie_prefilter,
        ));
    }

    let Some(prior) = prior else {
        warn!("delta received with no prior snapshot installed; treating as a full population");
        return DeltaOutcome::Installed(EnrichedSnapshot::build_full(
            incoming,
            service_def,
            trie_def,
            disable_trie_prefilter,
        ));
    };

    let merged_payload = if rebuild_only_index {
        prior.payload().clone()
    } else {
        prior.payload().merge_delta(&incoming)
    };

    match incoming.tags_change_extent() {
        TagsChangeExtent::None => {
            let mut payload = merged_payload;
            payload.set_tag_version(incoming.tag_version());
            DeltaOutcome::Installed(EnrichedSnapshot::assemble(
                payload,
                prior.matchers().to_vec(),
                prior.tries().clone(),
            ))
        }
        TagsChangeExtent::Tags => {
            let mut payload = merged_payload;
            payload.set_tag_version(incoming.tag_version());
            DeltaOutcome::Installed(EnrichedSnapshot::assemble(
                payload,
                prior.matchers().to_vec(),
                prior.tries().clone(),
            ))
        }
        TagsChangeExtent::ServiceResources | TagsChangeExtent::All => apply_structural_delta(
            prior,
            merged_payload,
            &incoming,
            service_def,
            trie_def,
            disable_trie_prefilter,
            lock_enabled,
        ),
    }
}

fn apply_structural_delta(
    prior: &EnrichedSnapshot,
    mut merged_payload: ServiceTagsSnapshot,
    delta: &ServiceTagsSnapshot,
    service_def: &ServiceDef,
    trie_def: &TrieResourceDef,
    disable_trie_prefilter: bool,
    lock_enabled: bool,
) -> DeltaOutcome {
    merged_payload.set_tag_version(delta.tag_version());

    let mut tries: BTreeMap<DimensionName, TrieRef> = if disable_trie_prefilter {
        BTreeMap::new()
    } else if lock_enabled {
        prior.tries().clone()
    } else {
        prior
            .tries()
            .iter()
            .map(|(dim, trie)| (dim.clone(), Arc::new((**trie).copy())))
            .collect()
    };

    let mut matchers: Vec<MatcherRef> = prior.matchers().to_vec();
    let mut validity_cache = HierarchyValidityCache::new();

    for resource in delta.service_resources() {
        if !resource.resource_elements().is_empty()
            && remove_old_matcher(&matchers, resource.resource_elements(), &mut tries, disable_trie_prefilter).is_err()
        {
            merged_payload.force_redownload();
            return DeltaOutcome::Aborted {
                forced_tag_version: merged_payload.tag_version(),
            };
        }
        matchers.retain(|m| m.resource_id() != resource.id());

        if resource.is_delete_marker() {
            continue;
        }

        let Some(matcher) = ServiceResourceMatcher::build(resource, service_def, &mut validity_cache)
        else {
            merged_payload.force_redownload();
            return DeltaOutcome::Aborted {
                forced_tag_version: merged_payload.tag_version(),
            };
        };
        let matcher: MatcherRef = Arc::new(matcher);

        if !disable_trie_prefilter {
            for (dim, value) in matcher.values() {
                let trie_ref = tries.entry(dim.clone()).or_insert_with(|| {
                    Arc::new(ResourceTrie::new(
                        trie_def.clone(),
                        std::iter::empty::<(String, MatcherRef)>(),
                        false,
                        false,
                        None,
                    ))
                });
                let trie = Arc::make_mut(trie_ref);
                for literal in value.values() {
                    trie.add(literal, Arc::clone(&matcher));
                }
                trie.wrap_up_update();
            }
        }

        matchers.push(matcher);
    }

    let retained: std::collections::BTreeSet<ResourceId> =
        matchers.iter().map(ServiceResourceMatcher::resource_id).collect();
    merged_payload.retain_resource_tag_ids(&retained);

    DeltaOutcome::Installed(EnrichedSnapshot::assemble(merged_payload, matchers, tries))
}

/// Removes the old indexed matcher standing at `old_values`, if one was
/// indexed there. Builds an access-resource probe from the values the
/// changed service resource used to carry, then narrows to matchers whose
/// relation to that probe is a self match — the one matcher, if any, that a
/// resource replacing the same spot in the hierarchy would displace. A
/// dimension set never indexed before is a trivial success.
///
/// Returns `Err(())` when a dimension the old matcher populated has no trie,
/// signalling that the delta must be aborted.
fn remove_old_matcher(
    matchers: &[MatcherRef],
    old_values: &BTreeMap<DimensionName, ResourceValue>,
    tries: &mut BTreeMap<DimensionName, TrieRef>,
    disable_trie_prefilter: bool,
) -> Result<(), ()> {
    if disable_trie_prefilter {
        return Ok(());
    }

    let probe = AccessResource::from_map(old_values.clone());
    let Some(old) = matchers
        .iter()
        .find(|m| matches!(m.match_type(&probe), MatchType::SelfMatch | MatchType::SelfAndAllDescendants))
    else {
        return Ok(());
    };

    for (dim, value) in old.values() {
        let Some(trie_ref) = tries.get_mut(dim) else {
            return Err(());
        };
        let trie = Arc::make_mut(trie_ref);
        for literal in value.values() {
            trie.delete(literal, old);
        }
        trie.wrap_up_update();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap as StdBTreeMap;
    use tagctx_model::{DimensionName as Dim, Hierarchy, MatchType, PolicyType, ResourceValue, ServiceResource, Tag};
    use tagctx_primitives::TagId;

    fn service_def() -> ServiceDef {
        let mut def = ServiceDef::new();
        def.add_hierarchy(
            PolicyType::Access,
            Hierarchy::new(PolicyType::Access, vec!["db".into(), "tbl".into(), "col".into()]).unwrap(),
        );
        def
    }

    fn resource(id: i64, sig: &str, dims: &[(&str, &str)]) -> ServiceResource {
        let mut elements = StdBTreeMap::new();
        for (k, v) in dims {
            elements.insert(Dim::new(*k), ResourceValue::Single((*v).to_string()));
        }
        ServiceResource::new(ResourceId::new(id), sig, elements).unwrap()
    }

    fn access(dims: &[(&str, &str)]) -> tagctx_model::AccessResource {
        let mut r = tagctx_model::AccessResource::empty();
        for (k, v) in dims {
            r = r.with_value(Dim::new(*k), *v);
        }
        r
    }

    #[test]
    fn full_replacement_ignores_prior() {
        let def = service_def();
        let payload = ServiceTagsSnapshot::builder("svc", TagVersion::new(1))
            .with_service_resource(resource(1, "sig", &[("db", "sales")]))
            .with_tag(Tag::new(TagId::new(1), "PII").unwrap())
            .with_resource_tags(ResourceId::new(1), vec![TagId::new(1)])
            .build()
            .unwrap();

        let outcome = apply(None, payload, &def, &TrieResourceDef::default(), false, true, false);
        let DeltaOutcome::Installed(snapshot) = outcome else {
            panic!("expected installed snapshot");
        };
        assert_eq!(snapshot.matchers().len(), 1);
    }

    #[test]
    fn tags_extent_reuses_prior_index_and_updates_attribute() {
        let def = service_def();
        let full = ServiceTagsSnapshot::builder("svc", TagVersion::new(1))
            .with_service_resource(resource(1, "sig", &[("db", "sales")]))
            .with_tag(Tag::new(TagId::new(1), "PII").unwrap())
            .with_resource_tags(ResourceId::new(1), vec![TagId::new(1)])
            .build()
            .unwrap();
        let prior = EnrichedSnapshot::build_full(full, &def, &TrieResourceDef::default(), false);

        let updated_tag = Tag::new(TagId::new(1), "PII").unwrap().with_attribute("level", "high");
        let delta = ServiceTagsSnapshot::builder("svc", TagVersion::new(2))
            .is_delta(true)
            .tags_change_extent(TagsChangeExtent::Tags)
            .with_tag(updated_tag)
            .build()
            .unwrap();

        let outcome = apply(
            Some(&prior),
            delta,
            &def,
            &TrieResourceDef::default(),
            false,
            true,
            false,
        );
        let DeltaOutcome::Installed(next) = outcome else {
            panic!("expected installed snapshot");
        };
        assert_eq!(next.matchers().len(), 1);
        let tag = next.payload().tags().get(&TagId::new(1)).unwrap();
        assert_eq!(tag.attributes().get("level"), Some(&"high".to_string()));
    }

    #[test]
    fn replacing_a_resource_removes_the_old_matcher() {
        let def = service_def();
        let full = ServiceTagsSnapshot::builder("svc", TagVersion::new(1))
            .with_service_resource(resource(1, "sig", &[("db", "sales")]))
            .with_tag(Tag::new(TagId::new(1), "PII").unwrap())
            .with_resource_tags(ResourceId::new(1), vec![TagId::new(1)])
            .build()
            .unwrap();
        let prior = EnrichedSnapshot::build_full(full, &def, &TrieResourceDef::default(), false);

        let delete_old = resource(1, "", &[("db", "sales")]);
        let new_resource = resource(2, "sig2", &[("db", "sales"), ("tbl", "orders")]);
        let delta = ServiceTagsSnapshot::builder("svc", TagVersion::new(2))
            .is_delta(true)
            .tags_change_extent(TagsChangeExtent::ServiceResources)
            .with_service_resource(delete_old)
            .with_service_resource(new_resource)
            .with_resource_tags(ResourceId::new(2), vec![TagId::new(1)])
            .build()
            .unwrap();

        let outcome = apply(
            Some(&prior),
            delta,
            &def,
            &TrieResourceDef::default(),
            false,
            true,
            false,
        );
        let DeltaOutcome::Installed(next) = outcome else {
            panic!("expected installed snapshot");
        };

        assert!(next.matcher_for_resource(ResourceId::new(1)).is_none());
        let new_matcher = next.matcher_for_resource(ResourceId::new(2)).unwrap();
        let probe = access(&[("db", "sales"), ("tbl", "orders"), ("col", "ssn")]);
        assert_eq!(new_matcher.match_type(&probe), MatchType::Ancestor);

        let candidates = next.candidates(&access(&[("db", "sales")]), &Default::default());
        assert!(candidates.iter().all(|m| m.resource_id() != ResourceId::new(1)));
    }

    #[test]
    fn matcher_build_failure_aborts_and_forces_redownload() {
        let def = service_def();
        let full = ServiceTagsSnapshot::builder("svc", TagVersion::new(1))
            .with_service_resource(resource(1, "sig", &[("db", "sales")]))
            .build()
            .unwrap();
        let prior = EnrichedSnapshot::build_full(full, &def, &TrieResourceDef::default(), false);

        let mut orphan_elements = StdBTreeMap::new();
        orphan_elements.insert(Dim::new("unknown"), ResourceValue::Single("x".into()));
        let orphan = ServiceResource::new(ResourceId::new(5), "sig5", orphan_elements).unwrap();

        let delta = ServiceTagsSnapshot::builder("svc", TagVersion::new(2))
            .is_delta(true)
            .tags_change_extent(TagsChangeExtent::ServiceResources)
            .with_service_resource(orphan)
            .build()
            .unwrap();

        let outcome = apply(
            Some(&prior),
            delta,
            &def,
            &TrieResourceDef::default(),
            false,
            true,
            false,
        );
        match outcome {
            DeltaOutcome::Aborted { forced_tag_version } => {
                assert!(forced_tag_version.is_force_redownload());
            }
            DeltaOutcome::Installed(_) => panic!("expected the delta to abort"),
        }

        // The prior snapshot must remain observably unchanged.
        assert_eq!(prior.matchers().len(), 1);
    }
}
