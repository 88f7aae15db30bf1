#![warn(missing_docs, clippy::pedantic)]
//! Background refresher that pulls service-tags snapshots from an upstream
//! retriever, persists them to a cache file, and installs them into an
//! [`tagctx_engine::EnricherEngine`].

mod cache;
mod error;
mod refresher;
mod retriever;
mod trigger;

pub use cache::{invalidate_cache, load_from_cache, save_to_cache};
pub use error::{RetrieverError, RetrieverResult};
pub use refresher::{Refresher, RefresherConfig, RefresherCounters};
pub use retriever::Retriever;
pub use trigger::TriggerHandle;

#[cfg(test)]
pub use retriever::StaticRetriever;
