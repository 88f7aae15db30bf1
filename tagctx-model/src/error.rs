//! Errors raised while building or validating model types.

use thiserror::Error;

/// Errors emitted by `tagctx-model` builders and accessors.
#[derive(Debug, Error)]
pub enum ModelError {
    /// A dimension, hierarchy, or tag name was empty.
    #[error("{field} must not be empty")]
    EmptyField {
        /// Name of the offending field.
        field: &'static str,
    },
    /// A hierarchy was declared with no dimensions.
    #[error("hierarchy for policy type {policy_type:?} must declare at least one dimension")]
    EmptyHierarchy {
        /// Policy type the empty hierarchy was declared under.
        policy_type: crate::dimension::PolicyType,
    },
    /// An access resource's populated dimensions do not form a prefix of any
    /// declared hierarchy.
    #[error("resource dimensions {dimensions:?} do not fully populate any declared hierarchy")]
    NoMatchingHierarchy {
        /// The dimension names present on the resource.
        dimensions: Vec<String>,
    },
}

/// Result alias for `tagctx-model` operations.
pub type ModelResult<T> = Result<T, ModelError>;
