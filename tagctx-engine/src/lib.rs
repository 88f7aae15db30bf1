//! Enricher engine: the public entry point owning the current enriched
//! snapshot.

#![warn(missing_docs, clippy::pedantic)]

mod engine;
mod matching;
mod request;

pub use engine::{EngineCounters, EnricherEngine, SetServiceTagsOutcome};
pub use matching::exclude_descendant_matches;
pub use request::{EnrichmentRequest, ENRICHED_TAGS_CONTEXT_KEY};
