//! Shared identifiers and error plumbing for the tag-context enricher.

#![warn(missing_docs, clippy::pedantic)]

mod error;
mod ids;

/// Error type and result alias shared across the enricher crates.
pub use error::{PrimitiveError, PrimitiveResult};
/// Identifier newtypes for resources, tags, and snapshot versions.
pub use ids::{ResourceId, TagId, TagVersion};
