//! The read-path matching algorithm.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tagctx_model::{AccessResource, AccessType, DimensionName, LookupScope, MatchType, PolicyType, ServiceDef, TagForEval};
use tagctx_primitives::TagId;
use tagctx_snapshot::{EnrichedSnapshot, MatcherRef};

use crate::request::EnrichmentRequest;
use tagctx_cache::EvaluatorCache;

/// Returns `true` when the read path should narrow to self-or-ancestor
/// matches only, skipping descendants.
///
/// `false` for access-type `ANY`, for an empty leaf name, and whenever the
/// single hierarchy admitting the resource's dimensions agrees with the
/// resource's own derived leaf (the common case, since the leaf is derived
/// from that same hierarchy).
#[must_use]
pub fn exclude_descendant_matches(
    service_def: &ServiceDef,
    resource: &AccessResource,
    access_type: &AccessType,
) -> bool {
    if access_type.is_any() {
        return false;
    }
    let Some(leaf) = resource.leaf_name(service_def) else {
        return false;
    };
    let keys = resource.populated_dimensions();

    for policy_type in PolicyType::construction_order() {
        let count = service_def.applicable_hierarchy_count(policy_type, &keys);
        if count == 0 {
            continue;
        }
        if count > 1 {
            return true;
        }
        return service_def
            .find_hierarchy(policy_type, &keys)
            .is_some_and(|h| h.leaf() != &leaf);
    }
    false
}

fn leaf_scope(leaf: Option<&DimensionName>, request: &EnrichmentRequest) -> LookupScope {
    leaf.and_then(|l| request.matching_scopes().get(l).copied())
        .unwrap_or(LookupScope::SelfOrDescendants)
}

/// Computes the deduplicated, time-admissible tag set for `request` against
/// `snapshot`.
#[must_use]
pub fn compute_tags(
    service_def: &ServiceDef,
    evaluator_cache: &EvaluatorCache,
    snapshot: &EnrichedSnapshot,
    request: &EnrichmentRequest,
) -> Vec<TagForEval> {
    let resource = request.resource();
    let access_type = request.access_type();

    if resource.is_empty() && access_type.is_any() {
        return snapshot.tags_for_empty_resource_and_any_access().to_vec();
    }

    let leaf = resource.leaf_name(service_def);
    let exclude_descendants = exclude_descendant_matches(service_def, resource, access_type);

    let candidates: Vec<MatcherRef> = if exclude_descendants {
        evaluator_cache.get_or_insert_with(resource, request.matching_scopes(), || {
            let raw = snapshot.candidates(resource, request.matching_scopes());
            match &leaf {
                Some(leaf) => raw
                    .into_iter()
                    .filter(|m| m.is_ancestor_of(leaf) || m.is_leaf(leaf))
                    .collect(),
                None => raw,
            }
        })
    } else {
        snapshot.candidates(resource, request.matching_scopes())
    };

    let broad_match = access_type.is_any() || leaf_scope(leaf.as_ref(), request) == LookupScope::SelfOrDescendants;
    let access_time = request.access_time().unwrap_or_else(Utc::now);

    collect_tags(snapshot, &candidates, resource, broad_match, access_time)
}

fn collect_tags(
    snapshot: &EnrichedSnapshot,
    candidates: &[MatcherRef],
    resource: &AccessResource,
    broad_match: bool,
    access_time: DateTime<Utc>,
) -> Vec<TagForEval> {
    let mut seen = HashSet::new();
    let mut tags = Vec::new();

    for matcher in candidates {
        let match_type = matcher.match_type(resource);
        let matched = if broad_match {
            match_type.is_any_match()
        } else {
            match_type.is_self_or_ancestor_match()
        };
        if !matched {
            continue;
        }

        let Some(tag_ids) = snapshot.payload().resource_to_tag_ids().get(&matcher.resource_id()) else {
            continue;
        };
        for tag_id in tag_ids {
            push_tag(snapshot, &mut seen, &mut tags, *tag_id, match_type, access_time);
        }
    }

    tags
}

fn push_tag(
    snapshot: &EnrichedSnapshot,
    seen: &mut HashSet<TagId>,
    tags: &mut Vec<TagForEval>,
    tag_id: TagId,
    match_type: MatchType,
    access_time: DateTime<Utc>,
) {
    if !seen.insert(tag_id) {
        return;
    }
    let Some(tag) = snapshot.payload().tags().get(&tag_id) else {
        return;
    };
    if !tag.is_applicable(access_time) {
        return;
    }
    tags.push(TagForEval::new(tag.clone(), match_type));
}
