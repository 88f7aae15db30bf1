//! Errors surfaced while constructing a service-tags payload.

use thiserror::Error;

/// Validation failures for [`crate::ServiceTagsSnapshot`] construction.
///
/// Matcher-construction failures and missing-trie conditions encountered
/// while applying a delta are not represented here:
/// those abort the delta in place (forcing a full redownload) rather than
/// propagating as an error, and are reported through
/// [`crate::DeltaOutcome::Aborted`].
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// A required field was empty.
    #[error("{field} must not be empty")]
    EmptyField {
        /// Name of the offending field.
        field: &'static str,
    },
}

/// Result alias for snapshot-construction operations.
pub type SnapshotResult<T> = Result<T, SnapshotError>;
