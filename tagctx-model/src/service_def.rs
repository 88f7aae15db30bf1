//! Service-definition helper: hierarchies per policy type, and hierarchy
//! validity queries used during matcher construction.

use std::collections::{BTreeSet, HashMap};

use crate::dimension::{DimensionName, PolicyType};
use crate::error::{ModelError, ModelResult};

/// An ordered subsequence of dimensions that forms a valid resource path for
/// one policy type.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct Hierarchy {
    dimensions: Vec<DimensionName>,
}

impl Hierarchy {
    /// Builds a hierarchy from an ordered list of dimension names.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::EmptyHierarchy`] if `dimensions` is empty.
    pub fn new(
        policy_type: PolicyType,
        dimensions: Vec<DimensionName>,
    ) -> ModelResult<Self> {
        if dimensions.is_empty() {
            return Err(ModelError::EmptyHierarchy { policy_type });
        }
        Ok(Self { dimensions })
    }

    /// Returns the ordered dimensions of this hierarchy.
    #[must_use]
    pub fn dimensions(&self) -> &[DimensionName] {
        &self.dimensions
    }

    /// Returns the deepest (leaf) dimension of this hierarchy.
    #[must_use]
    pub fn leaf(&self) -> &DimensionName {
        self.dimensions.last().expect("hierarchy is never empty")
    }

    /// Returns `true` when `keys` exactly equals the first `keys.len()`
    /// dimensions of this hierarchy (i.e. `keys` "fully populates" a prefix
    /// of the hierarchy).
    #[must_use]
    pub fn is_fully_populated_by(&self, keys: &BTreeSet<DimensionName>) -> bool {
        if keys.is_empty() || keys.len() > self.dimensions.len() {
            return false;
        }
        let prefix: BTreeSet<DimensionName> =
            self.dimensions[..keys.len()].iter().cloned().collect();
        &prefix == keys
    }

    /// Returns the index (0-based depth) of `dimension` within this
    /// hierarchy, if present.
    #[must_use]
    pub fn depth_of(&self, dimension: &DimensionName) -> Option<usize> {
        self.dimensions.iter().position(|d| d == dimension)
    }
}

/// Service-definition helper exposing hierarchies per policy type.
#[derive(Clone, Debug, Default)]
pub struct ServiceDef {
    hierarchies: HashMap<PolicyType, Vec<Hierarchy>>,
}

impl ServiceDef {
    /// Creates an empty service definition.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a hierarchy under the given policy type.
    pub fn add_hierarchy(&mut self, policy_type: PolicyType, hierarchy: Hierarchy) {
        self.hierarchies.entry(policy_type).or_default().push(hierarchy);
    }

    /// Returns the hierarchies declared for `policy_type`.
    #[must_use]
    pub fn hierarchies_for(&self, policy_type: PolicyType) -> &[Hierarchy] {
        self.hierarchies
            .get(&policy_type)
            .map_or(&[], Vec::as_slice)
    }

    /// Returns the full set of dimension names spanned by every declared
    /// hierarchy across all policy types.
    #[must_use]
    pub fn dimension_set(&self) -> BTreeSet<DimensionName> {
        self.hierarchies
            .values()
            .flatten()
            .flat_map(|h| h.dimensions().iter().cloned())
            .collect()
    }

    /// Returns `true` if `keys` fully populates some hierarchy declared for
    /// `policy_type`.
    #[must_use]
    pub fn admits(&self, policy_type: PolicyType, keys: &BTreeSet<DimensionName>) -> bool {
        self.find_hierarchy(policy_type, keys).is_some()
    }

    /// Returns the first hierarchy declared for `policy_type` that `keys`
    /// fully populates.
    #[must_use]
    pub fn find_hierarchy(
        &self,
        policy_type: PolicyType,
        keys: &BTreeSet<DimensionName>,
    ) -> Option<&Hierarchy> {
        self.hierarchies_for(policy_type)
            .iter()
            .find(|h| h.is_fully_populated_by(keys))
    }

    /// Returns the number of hierarchies declared for `policy_type` that
    /// admit `keys` (used by `excludeDescendantMatches`).
    #[must_use]
    pub fn applicable_hierarchy_count(
        &self,
        policy_type: PolicyType,
        keys: &BTreeSet<DimensionName>,
    ) -> usize {
        self.hierarchies_for(policy_type)
            .iter()
            .filter(|h| h.is_fully_populated_by(keys))
            .count()
    }
}

/// Per-build memo of `(policy_type, dimension_keys) -> is_admitted`, shared
/// across resources within one enriched-snapshot build and discarded
/// afterward.
#[derive(Debug, Default)]
pub struct HierarchyValidityCache {
    memo: HashMap<(PolicyType, Vec<DimensionName>), bool>,
}

impl HierarchyValidityCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether `keys` is admitted by `policy_type` in `service_def`,
    /// consulting (and populating) the memo.
    pub fn is_admitted(
        &mut self,
        service_def: &ServiceDef,
        policy_type: PolicyType,
        keys: &BTreeSet<DimensionName>,
    ) -> bool {
        let cache_key = (policy_type, keys.iter().cloned().collect::<Vec<_>>());
        if let Some(&admitted) = self.memo.get(&cache_key) {
            return admitted;
        }
        let admitted = service_def.admits(policy_type, keys);
        self.memo.insert(cache_key, admitted);
        admitted
    }
}
