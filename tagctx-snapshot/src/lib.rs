//! Service-tags payload, enriched snapshot, and delta application.

#![warn(missing_docs, clippy::pedantic)]

mod delta;
mod enriched;
mod error;
mod payload;

pub use delta::{apply as apply_delta, DeltaOutcome};
pub use enriched::{EnrichedSnapshot, MatcherRef, TrieRef};
pub use error::{SnapshotError, SnapshotResult};
pub use payload::{ServiceTagsSnapshot, ServiceTagsSnapshotBuilder, TagsChangeExtent};
