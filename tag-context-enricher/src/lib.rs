//! Tag-context enricher facade.
//!
//! Depend on this crate to get resource-tag lookups for a policy-based
//! authorization plugin: attach, for each access request, the tags that
//! apply to the accessed resource so a downstream policy evaluator can run
//! tag-scoped rules. Internally this bundles the engine that serves lookups
//! (always present) with the background refresher that keeps it populated
//! (behind the `refresher` feature, enabled by default).

#![warn(missing_docs, clippy::pedantic)]

/// Resource, service-resource, and tag data model.
pub use tagctx_model as model;

/// Service-resource matcher and match-type classification.
pub use tagctx_matcher as matcher;

/// Per-dimension resource trie.
pub use tagctx_trie as trie;

/// Enriched snapshot and delta applicator.
pub use tagctx_snapshot as snapshot;

/// Evaluator cache.
pub use tagctx_cache as cache;

/// Plugin config keys and enricher options.
pub use tagctx_config as config;

/// Enricher engine: `enrich`/`setServiceTags` entry point.
pub use tagctx_engine as engine;

/// Background refresher, retriever contract, and cache file I/O.
#[cfg(feature = "refresher")]
pub use tagctx_refresher as refresher;

use std::sync::Arc;

use tagctx_config::{EnricherOptions, PluginConfig};
use tagctx_engine::{EnrichmentRequest, EnricherEngine};
use tagctx_model::ServiceDef;

#[cfg(feature = "refresher")]
use tagctx_refresher::{Refresher, RefresherConfig, Retriever};

/// The enricher bound to a running refresher: the composed object an
/// embedding plugin actually constructs and holds for the lifetime of one
/// service instance.
#[cfg(feature = "refresher")]
pub struct TagContextEnricher {
    engine: Arc<EnricherEngine>,
    refresher: Refresher,
}

#[cfg(feature = "refresher")]
impl TagContextEnricher {
    /// Builds the engine, performs the initial synchronous populate, and
    /// starts the refresher's background loop and periodic timer.
    pub async fn init(
        service_def: ServiceDef,
        retriever: Box<dyn Retriever>,
        plugin_config: PluginConfig,
        options: EnricherOptions,
        refresher_config: RefresherConfig,
    ) -> Self {
        let engine = Arc::new(EnricherEngine::new(service_def, &plugin_config, &options));
        let refresher = Refresher::start(
            engine.clone(),
            retriever,
            &plugin_config,
            &options,
            refresher_config,
        )
        .await;
        Self { engine, refresher }
    }

    /// Computes matched tags for `request` and attaches them to its context
    /// under [`tagctx_engine::ENRICHED_TAGS_CONTEXT_KEY`].
    pub fn enrich(&self, request: &mut EnrichmentRequest) {
        self.engine.enrich(request, None);
    }

    /// Forces an out-of-band refresh cycle and waits for it to complete.
    pub async fn sync_tags_with_admin(&self) -> bool {
        self.refresher.sync_tags_with_admin().await
    }

    /// Returns the engine backing this enricher, for direct access to the
    /// version/counter accessors.
    #[must_use]
    pub fn engine(&self) -> &EnricherEngine {
        &self.engine
    }

    /// Cancels the periodic timer and stops the refresh loop.
    pub async fn pre_cleanup(self) {
        self.refresher.shutdown().await;
    }
}
