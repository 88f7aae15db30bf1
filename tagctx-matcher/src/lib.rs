//! Service-resource matcher construction and match-type classification.

#![warn(missing_docs, clippy::pedantic)]

use std::collections::BTreeMap;

use tagctx_model::{
    AccessResource, DimensionName, Hierarchy, HierarchyValidityCache, MatchType, PolicyType,
    ResourceValue, ServiceDef, ServiceResource,
};
use tagctx_primitives::ResourceId;
use tracing::trace;

/// Decides whether a given access resource matches a service resource, and
/// in what relation (self/ancestor/descendant/none).
///
/// Constructed from a [`ServiceResource`] by selecting the first policy type
/// (in the fixed order access, datamask, row-filter) whose hierarchy set
/// admits the resource's populated dimensions.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ServiceResourceMatcher {
    resource_id: ResourceId,
    policy_type: PolicyType,
    hierarchy: Hierarchy,
    values: BTreeMap<DimensionName, ResourceValue>,
}

impl ServiceResourceMatcher {
    /// Attempts to build a matcher for `resource`, trying each policy type in
    /// the fixed construction order and consulting `validity_cache` to avoid
    /// repeated hierarchy scans within one snapshot build.
    ///
    /// Returns `None` when no policy type admits the resource's dimensions;
    /// callers must drop the resource (and its tag associations) in that
    /// case.
    #[must_use]
    pub fn build(
        resource: &ServiceResource,
        service_def: &ServiceDef,
        validity_cache: &mut HierarchyValidityCache,
    ) -> Option<Self> {
        let keys = resource.populated_dimensions();
        for policy_type in PolicyType::construction_order() {
            if !validity_cache.is_admitted(service_def, policy_type, &keys) {
                continue;
            }
            if let Some(hierarchy) = service_def.find_hierarchy(policy_type, &keys) {
                return Some(Self {
                    resource_id: resource.id(),
                    policy_type,
                    hierarchy: hierarchy.clone(),
                    values: resource.resource_elements().clone(),
                });
            }
        }
        trace!(resource_id = %resource.id(), "no policy type admits resource dimensions");
        None
    }

    /// Returns the identifier of the service resource this matcher was built from.
    #[must_use]
    pub fn resource_id(&self) -> ResourceId {
        self.resource_id
    }

    /// Returns the policy type selected during construction.
    #[must_use]
    pub fn policy_type(&self) -> PolicyType {
        self.policy_type
    }

    /// Returns the hierarchy this matcher was constructed against.
    #[must_use]
    pub fn hierarchy(&self) -> &Hierarchy {
        &self.hierarchy
    }

    /// Returns the dimension→value map this matcher indexes.
    #[must_use]
    pub fn values(&self) -> &BTreeMap<DimensionName, ResourceValue> {
        &self.values
    }

    /// Returns `true` when `dimension` is the deepest dimension this matcher
    /// populates.
    #[must_use]
    pub fn is_leaf(&self, dimension: &DimensionName) -> bool {
        self.values
            .keys()
            .max_by_key(|d| self.hierarchy.depth_of(d).unwrap_or(0))
            .is_some_and(|leaf| leaf == dimension)
    }

    /// Returns `true` when this matcher's resource is strictly shallower than
    /// `leaf` on the hierarchy (used by the self-or-ancestor evaluator
    /// predicate).
    #[must_use]
    pub fn is_ancestor_of(&self, leaf: &DimensionName) -> bool {
        let Some(leaf_depth) = self.hierarchy.depth_of(leaf) else {
            return false;
        };
        self.own_depth() < leaf_depth
    }

    fn own_depth(&self) -> usize {
        self.values
            .keys()
            .filter_map(|d| self.hierarchy.depth_of(d))
            .max()
            .unwrap_or(0)
    }

    /// Classifies the relation between `access` and this matcher's resource.
    ///
    /// `NONE` is returned whenever any dimension common to both resources
    /// disagrees in value, or `access`'s populated dimensions do not share
    /// this matcher's hierarchy.
    #[must_use]
    pub fn match_type(&self, access: &AccessResource) -> MatchType {
        if self.values.is_empty() {
            return MatchType::None;
        }

        for (dim, svc_value) in &self.values {
            let Some(acc_value) = access.value_of(dim) else {
                // The service resource is deeper than the accessed resource on
                // this dimension only if it's beyond the accessed resource's
                // depth; missing a dimension the service resource populates
                // within the accessed resource's own depth is a mismatch.
                if self.hierarchy.depth_of(dim).unwrap_or(usize::MAX)
                    <= access_depth(&self.hierarchy, access)
                {
                    return MatchType::None;
                }
                continue;
            };
            if !values_intersect(svc_value, acc_value) {
                return MatchType::None;
            }
        }

        let svc_depth = self.own_depth();
        let acc_depth = access_depth(&self.hierarchy, access);

        match svc_depth.cmp(&acc_depth) {
            std::cmp::Ordering::Less => MatchType::Ancestor,
            std::cmp::Ordering::Greater => MatchType::Descendant,
            std::cmp::Ordering::Equal => {
                if svc_depth + 1 == self.hierarchy.dimensions().len() {
                    MatchType::SelfAndAllDescendants
                } else {
                    MatchType::SelfMatch
                }
            }
        }
    }
}

fn access_depth(hierarchy: &Hierarchy, access: &AccessResource) -> usize {
    access
        .populated_dimensions()
        .iter()
        .filter_map(|d| hierarchy.depth_of(d))
        .max()
        .unwrap_or(0)
}

fn values_intersect(a: &ResourceValue, b: &ResourceValue) -> bool {
    a.values().iter().any(|v| b.values().contains(v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tagctx_model::ServiceResource;

    fn service_def() -> ServiceDef {
        let mut def = ServiceDef::new();
        def.add_hierarchy(
            PolicyType::Access,
            Hierarchy::new(
                PolicyType::Access,
                vec!["db".into(), "tbl".into(), "col".into()],
            )
            .unwrap(),
        );
        def
    }

    fn resource(id: i64, dims: &[(&str, &str)]) -> ServiceResource {
        let mut elements = BTreeMap::new();
        for (k, v) in dims {
            elements.insert(
                DimensionName::new(*k),
                ResourceValue::Single((*v).to_string()),
            );
        }
        ServiceResource::new(ResourceId::new(id), "sig", elements).unwrap()
    }

    #[test]
    fn shallower_service_resource_is_ancestor() {
        let def = service_def();
        let mut cache = HierarchyValidityCache::new();
        let svc = resource(1, &[("db", "sales")]);
        let matcher = ServiceResourceMatcher::build(&svc, &def, &mut cache).unwrap();

        let access = AccessResource::empty()
            .with_value(DimensionName::new("db"), "sales")
            .with_value(DimensionName::new("tbl"), "orders");

        assert_eq!(matcher.match_type(&access), MatchType::Ancestor);
    }

    #[test]
    fn mismatched_value_is_none() {
        let def = service_def();
        let mut cache = HierarchyValidityCache::new();
        let svc = resource(1, &[("db", "sales")]);
        let matcher = ServiceResourceMatcher::build(&svc, &def, &mut cache).unwrap();

        let access = AccessResource::empty().with_value(DimensionName::new("db"), "hr");
        assert_eq!(matcher.match_type(&access), MatchType::None);
    }

    #[test]
    fn equal_depth_below_leaf_is_self_match() {
        let def = service_def();
        let mut cache = HierarchyValidityCache::new();
        let svc = resource(1, &[("db", "sales"), ("tbl", "orders")]);
        let matcher = ServiceResourceMatcher::build(&svc, &def, &mut cache).unwrap();

        let access = AccessResource::empty()
            .with_value(DimensionName::new("db"), "sales")
            .with_value(DimensionName::new("tbl"), "orders");
        assert_eq!(matcher.match_type(&access), MatchType::SelfMatch);
    }

    #[test]
    fn leaf_depth_match_is_self_and_all_descendants() {
        let def = service_def();
        let mut cache = HierarchyValidityCache::new();
        let svc = resource(1, &[("db", "sales"), ("tbl", "orders"), ("col", "ssn")]);
        let matcher = ServiceResourceMatcher::build(&svc, &def, &mut cache).unwrap();

        let access = AccessResource::empty()
            .with_value(DimensionName::new("db"), "sales")
            .with_value(DimensionName::new("tbl"), "orders")
            .with_value(DimensionName::new("col"), "ssn");
        assert_eq!(
            matcher.match_type(&access),
            MatchType::SelfAndAllDescendants
        );
    }

    #[test]
    fn resource_with_no_admitted_hierarchy_fails_construction() {
        let def = service_def();
        let mut cache = HierarchyValidityCache::new();
        let svc = resource(1, &[("tbl", "orders")]);
        assert!(ServiceResourceMatcher::build(&svc, &def, &mut cache).is_none());
    }
}
