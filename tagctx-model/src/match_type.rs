//! The relation between an accessed resource and a service resource in the
//! dimension hierarchy.

use serde::{Deserialize, Serialize};

/// Outcome of comparing an accessed resource against a service resource.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    /// No relation; the resources do not match.
    None,
    /// Keys and values agree exactly.
    SelfMatch,
    /// The service resource is shallower than the accessed resource on the
    /// hierarchy (the accessed resource is a descendant of the tagged one).
    Ancestor,
    /// The service resource is deeper than the accessed resource.
    Descendant,
    /// The service resource matches the accessed resource and implicitly
    /// covers all of its descendants.
    SelfAndAllDescendants,
}

impl MatchType {
    /// Returns `true` for any match outcome other than [`MatchType::None`].
    #[must_use]
    pub fn is_any_match(self) -> bool {
        !matches!(self, Self::None)
    }

    /// Returns `true` when this outcome counts as a match under the
    /// self-or-ancestor-only classification.
    #[must_use]
    pub fn is_self_or_ancestor_match(self) -> bool {
        matches!(self, Self::SelfMatch | Self::SelfAndAllDescendants | Self::Ancestor)
    }
}
