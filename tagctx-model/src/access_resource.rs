//! Accessed-resource representation: the concrete resource named in an
//! authorization request.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::dimension::{DimensionName, PolicyType};
use crate::service_def::ServiceDef;

/// A single dimension's value(s) on an accessed resource.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResourceValue {
    /// A single concrete value.
    Single(String),
    /// Multiple values, any of which satisfies the dimension.
    Multiple(Vec<String>),
}

impl ResourceValue {
    /// Returns the values as a slice, regardless of single/multiple form.
    #[must_use]
    pub fn values(&self) -> &[String] {
        match self {
            Self::Single(v) => std::slice::from_ref(v),
            Self::Multiple(vs) => vs.as_slice(),
        }
    }
}

/// The access type requested against a resource. `Any` is the wildcard
/// access type used for tag-context-only enrichment.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessType {
    /// Matches regardless of the concrete operation requested.
    Any,
    /// A concrete, named access type (e.g. `select`, `update`).
    Named(String),
}

impl AccessType {
    /// Returns `true` for the `Any` wildcard access type.
    #[must_use]
    pub fn is_any(&self) -> bool {
        matches!(self, Self::Any)
    }
}

/// Per-dimension lookup scope used when querying a resource trie.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupScope {
    /// Only exact-value matches.
    SelfOnly,
    /// Exact-value matches plus descendant matches.
    SelfOrDescendants,
}

/// Per-dimension matching scopes consulted while narrowing trie candidates
/// and used as part of the evaluator-cache key.
pub type MatchingScopes = BTreeMap<DimensionName, LookupScope>;

/// A concrete resource named by an authorization request.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct AccessResource {
    values: BTreeMap<DimensionName, ResourceValue>,
}

impl AccessResource {
    /// Creates an empty access resource, used for the "request resource is
    /// empty" case.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates an access resource from an explicit dimension→value map.
    #[must_use]
    pub fn from_map(values: BTreeMap<DimensionName, ResourceValue>) -> Self {
        Self { values }
    }

    /// Sets a single-valued dimension and returns the updated resource.
    #[must_use]
    pub fn with_value(mut self, dimension: DimensionName, value: impl Into<String>) -> Self {
        self.values
            .insert(dimension, ResourceValue::Single(value.into()));
        self
    }

    /// Returns `true` when no dimension is populated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the dimension→value map.
    #[must_use]
    pub fn as_map(&self) -> &BTreeMap<DimensionName, ResourceValue> {
        &self.values
    }

    /// Returns the value for `dimension`, if populated.
    #[must_use]
    pub fn value_of(&self, dimension: &DimensionName) -> Option<&ResourceValue> {
        self.values.get(dimension)
    }

    /// Returns the set of populated dimension names.
    #[must_use]
    pub fn populated_dimensions(&self) -> std::collections::BTreeSet<DimensionName> {
        self.values.keys().cloned().collect()
    }

    /// Derives the leaf name: the deepest dimension *this resource itself*
    /// populates, according to the first hierarchy (in fixed policy-type
    /// order) that this resource's dimensions fully populate. This is the
    /// hierarchy's dimension at depth `keys.len() - 1`, not the hierarchy's
    /// own terminal dimension — a resource populating only a prefix of a
    /// hierarchy has a leaf shallower than that hierarchy's deepest
    /// dimension. Returns `None` for an empty resource or one whose
    /// dimensions admit no declared hierarchy.
    #[must_use]
    pub fn leaf_name(&self, service_def: &ServiceDef) -> Option<DimensionName> {
        if self.is_empty() {
            return None;
        }
        let keys = self.populated_dimensions();
        for policy_type in PolicyType::construction_order() {
            if let Some(hierarchy) = service_def.find_hierarchy(policy_type, &keys) {
                return Some(hierarchy.dimensions()[keys.len() - 1].clone());
            }
        }
        None
    }

    /// Derives a stable cache key for this resource, used by the evaluator
    /// cache.
    #[must_use]
    pub fn cache_key(&self) -> String {
        let mut key = String::new();
        for (dim, value) in &self.values {
            if !key.is_empty() {
                key.push(';');
            }
            let _ = write!(key, "{dim}=");
            key.push_str(&value.values().join(","));
        }
        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimension::PolicyType;
    use crate::service_def::Hierarchy;

    fn def() -> ServiceDef {
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

    #[test]
    fn leaf_name_is_deepest_populated_dimension() {
        let def = def();
        let resource = AccessResource::empty()
            .with_value(DimensionName::new("db"), "sales")
            .with_value(DimensionName::new("tbl"), "orders");
        assert_eq!(
            resource.leaf_name(&def),
            Some(DimensionName::new("tbl"))
        );
    }

    #[test]
    fn empty_resource_has_no_leaf() {
        let def = def();
        assert_eq!(AccessResource::empty().leaf_name(&def), None);
    }

    #[test]
    fn cache_key_is_stable_and_distinct() {
        let a = AccessResource::empty().with_value(DimensionName::new("db"), "sales");
        let b = AccessResource::empty().with_value(DimensionName::new("db"), "hr");
        assert_ne!(a.cache_key(), b.cache_key());
        assert_eq!(a.cache_key(), a.cache_key());
    }
}
