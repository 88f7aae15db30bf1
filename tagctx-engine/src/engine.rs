//! The enricher engine itself: primary lock, evaluator cache, and the
//! `enrich`/`setServiceTags` operations.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use tagctx_cache::EvaluatorCache;
use tagctx_config::{EnricherOptions, PluginConfig};
use tagctx_model::ServiceDef;
use tagctx_primitives::TagVersion;
use tagctx_snapshot::{apply_delta, DeltaOutcome, EnrichedSnapshot, ServiceTagsSnapshot};
use tagctx_trie::TrieResourceDef;
use tracing::{debug, warn};

use crate::matching::compute_tags;
use crate::request::EnrichmentRequest;

/// Point-in-time snapshot of [`EnricherEngine`]'s call counters, returned by
/// [`EnricherEngine::snapshot_counters`].
#[derive(Debug, Clone, Copy)]
pub struct EngineCounters {
    /// Total `enrich` calls served.
    pub enrich_calls: u64,
    /// Total `setServiceTags` calls served.
    pub set_service_tags_calls: u64,
    /// Total deltas aborted.
    pub abort_count: u64,
}

/// Outcome of [`EnricherEngine::set_service_tags`].
#[derive(Debug)]
pub enum SetServiceTagsOutcome {
    /// A new enriched snapshot replaced (or updated) the prior one.
    Installed,
    /// The incoming snapshot was `None`; the enricher now holds no snapshot.
    Cleared,
    /// The delta could not be applied; the prior snapshot is unchanged and
    /// the next retrieval should request a full redownload.
    Aborted {
        /// The tag version the refresher should request next.
        forced_tag_version: TagVersion,
    },
}

/// Owns the current enriched snapshot and serves `enrich`/`setServiceTags`
/// under a primary lock.
///
/// Rust has no unsynchronized-but-safe way to degrade a lock to a true no-op
/// under concurrent writers, so this implementation always takes a real
/// [`std::sync::RwLock`] around the snapshot reference; what `lock_enabled`
/// actually gates here is only the in-place-vs-copy-on-write choice the
/// delta applicator makes, which is the part of that flag with observable
/// correctness consequences. Readers always see a torn-free snapshot either
/// way.
pub struct EnricherEngine {
    service_def: ServiceDef,
    trie_def: TrieResourceDef,
    disable_trie_prefilter: bool,
    lock_enabled: bool,
    snapshot: RwLock<Option<EnrichedSnapshot>>,
    evaluator_cache: EvaluatorCache,
    enrich_count: AtomicU64,
    set_service_tags_count: AtomicU64,
    abort_count: AtomicU64,
}

impl EnricherEngine {
    /// Builds an engine for `service_def`, with no snapshot installed yet.
    ///
    /// The locking-enabled flag is the conjunction of the delta-enabled and
    /// in-place-update-enabled plugin config keys, read from
    /// `plugin_config`.
    #[must_use]
    pub fn new(service_def: ServiceDef, plugin_config: &PluginConfig, options: &EnricherOptions) -> Self {
        Self {
            service_def,
            trie_def: TrieResourceDef::default(),
            disable_trie_prefilter: options.disable_trie_lookup_prefilter(),
            lock_enabled: plugin_config.tag_delta_enabled() && plugin_config.in_place_tag_update_enabled(),
            snapshot: RwLock::new(None),
            evaluator_cache: EvaluatorCache::new(),
            enrich_count: AtomicU64::new(0),
            set_service_tags_count: AtomicU64::new(0),
            abort_count: AtomicU64::new(0),
        }
    }

    /// Returns the service definition this engine was built with.
    #[must_use]
    pub fn service_def(&self) -> &ServiceDef {
        &self.service_def
    }

    /// Returns the tag version of the currently installed snapshot, or
    /// [`TagVersion::UNINITIALIZED`] if none has been installed.
    #[must_use]
    pub fn service_tags_version(&self) -> TagVersion {
        self.snapshot
            .read()
            .expect("enricher snapshot lock poisoned")
            .as_ref()
            .map_or(TagVersion::UNINITIALIZED, |s| s.payload().tag_version())
    }

    /// Returns the tag version the resource trie was built against, or
    /// [`TagVersion::UNINITIALIZED`] if none has been installed.
    #[must_use]
    pub fn resource_trie_version(&self) -> TagVersion {
        self.snapshot
            .read()
            .expect("enricher snapshot lock poisoned")
            .as_ref()
            .map_or(TagVersion::UNINITIALIZED, EnrichedSnapshot::resource_trie_version)
    }

    /// Returns a clone of the currently installed enriched snapshot, if any.
    #[must_use]
    pub fn enriched_service_tags(&self) -> Option<EnrichedSnapshot> {
        self.snapshot
            .read()
            .expect("enricher snapshot lock poisoned")
            .clone()
    }

    /// Total `enrich` calls served since construction.
    #[must_use]
    pub fn enrich_count(&self) -> u64 {
        self.enrich_count.load(Ordering::Relaxed)
    }

    /// Total `setServiceTags` calls served since construction.
    #[must_use]
    pub fn set_service_tags_count(&self) -> u64 {
        self.set_service_tags_count.load(Ordering::Relaxed)
    }

    /// Total deltas aborted (matcher build failure or missing trie) since
    /// construction.
    #[must_use]
    pub fn abort_count(&self) -> u64 {
        self.abort_count.load(Ordering::Relaxed)
    }

    /// Snapshots all three counters at once: not a metrics exporter, just a
    /// queryable observability surface matching its plain-counter idiom.
    #[must_use]
    pub fn snapshot_counters(&self) -> EngineCounters {
        EngineCounters {
            enrich_calls: self.enrich_count(),
            set_service_tags_calls: self.set_service_tags_count(),
            abort_count: self.abort_count(),
        }
    }

    /// Serves an enrichment request under the read lock. `data_store`, when
    /// supplied, overrides the engine's own snapshot for this single call
    /// without touching the lock.
    ///
    /// Never fails: an empty or unmatched request simply leaves
    /// [`EnrichmentRequest::tags`] at `None`.
    pub fn enrich(&self, request: &mut EnrichmentRequest, data_store: Option<&EnrichedSnapshot>) {
        self.enrich_count.fetch_add(1, Ordering::Relaxed);

        let owned_guard;
        let snapshot = if let Some(snapshot) = data_store {
            snapshot
        } else {
            owned_guard = self.snapshot.read().expect("enricher snapshot lock poisoned");
            match owned_guard.as_ref() {
                Some(snapshot) => snapshot,
                None => {
                    request.set_tags(Vec::new());
                    return;
                }
            }
        };

        let tags = compute_tags(&self.service_def, &self.evaluator_cache, snapshot, request);
        request.set_tags(tags);
    }

    /// Installs or updates the enriched snapshot from `snapshot` under the
    /// write lock, then clears the evaluator cache.
    ///
    /// `None` clears the installed snapshot entirely, mirroring the
    /// refresher's reaction to `ServiceNotFound`.
    pub fn set_service_tags(
        &self,
        snapshot: Option<ServiceTagsSnapshot>,
        rebuild_only_index: bool,
    ) -> SetServiceTagsOutcome {
        self.set_service_tags_count.fetch_add(1, Ordering::Relaxed);

        let Some(incoming) = snapshot else {
            let mut guard = self.snapshot.write().expect("enricher snapshot lock poisoned");
            *guard = None;
            drop(guard);
            self.evaluator_cache.clear();
            return SetServiceTagsOutcome::Cleared;
        };

        let mut guard = self.snapshot.write().expect("enricher snapshot lock poisoned");
        let outcome = apply_delta(
            guard.as_ref(),
            incoming,
            &self.service_def,
            &self.trie_def,
            self.disable_trie_prefilter,
            self.lock_enabled,
            rebuild_only_index,
        );

        let result = match outcome {
            DeltaOutcome::Installed(next) => {
                debug!(
                    tag_version = %next.payload().tag_version(),
                    matchers = next.matchers().len(),
                    "installed enriched snapshot"
                );
                *guard = Some(next);
                SetServiceTagsOutcome::Installed
            }
            DeltaOutcome::Aborted { forced_tag_version } => {
                warn!(%forced_tag_version, "delta application aborted; prior snapshot retained");
                self.abort_count.fetch_add(1, Ordering::Relaxed);
                SetServiceTagsOutcome::Aborted { forced_tag_version }
            }
        };
        drop(guard);

        self.evaluator_cache.clear();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, HashMap};
    use tagctx_model::{AccessResource, AccessType, DimensionName, Hierarchy, PolicyType, ResourceValue, ServiceResource, Tag};
    use tagctx_primitives::{ResourceId, TagId};

    fn service_def() -> ServiceDef {
        let mut def = ServiceDef::new();
        def.add_hierarchy(
            PolicyType::Access,
            Hierarchy::new(PolicyType::Access, vec!["db".into(), "tbl".into()]).unwrap(),
        );
        def
    }

    fn resource(id: i64, db: &str) -> ServiceResource {
        let mut elements = BTreeMap::new();
        elements.insert(DimensionName::new("db"), ResourceValue::Single(db.to_string()));
        ServiceResource::new(ResourceId::new(id), "sig", elements).unwrap()
    }

    fn plugin_config(tag_delta: bool, in_place: bool) -> PluginConfig {
        let mut values = HashMap::new();
        values.insert("ranger.plugin.hive.tag.delta.enabled".to_string(), tag_delta.to_string());
        values.insert(
            "ranger.plugin.hive.in.place.tag.update.enabled".to_string(),
            in_place.to_string(),
        );
        PluginConfig::new("ranger.plugin.hive", values)
    }

    #[test]
    fn enrich_before_any_install_returns_no_tags() {
        let engine = EnricherEngine::new(service_def(), &plugin_config(false, false), &EnricherOptions::new());
        let mut request = EnrichmentRequest::new(AccessResource::empty(), AccessType::Any);
        engine.enrich(&mut request, None);
        assert!(request.tags().is_none());
    }

    #[test]
    fn set_service_tags_then_enrich_round_trips() {
        let engine = EnricherEngine::new(service_def(), &plugin_config(false, false), &EnricherOptions::new());

        let payload = ServiceTagsSnapshot::builder("svc", TagVersion::new(1))
            .with_service_resource(resource(1, "sales"))
            .with_tag(Tag::new(TagId::new(1), "PII").unwrap())
            .with_resource_tags(ResourceId::new(1), vec![TagId::new(1)])
            .build()
            .unwrap();

        let outcome = engine.set_service_tags(Some(payload), false);
        assert!(matches!(outcome, SetServiceTagsOutcome::Installed));
        assert_eq!(engine.service_tags_version(), TagVersion::new(1));

        let mut request = EnrichmentRequest::new(
            AccessResource::empty().with_value(DimensionName::new("db"), "sales"),
            AccessType::Any,
        );
        engine.enrich(&mut request, None);
        assert_eq!(request.tags().map(<[_]>::len), Some(1));
    }

    #[test]
    fn clearing_resets_version_to_uninitialized() {
        let engine = EnricherEngine::new(service_def(), &plugin_config(false, false), &EnricherOptions::new());
        let payload = ServiceTagsSnapshot::builder("svc", TagVersion::new(1)).build().unwrap();
        engine.set_service_tags(Some(payload), false);

        let outcome = engine.set_service_tags(None, false);
        assert!(matches!(outcome, SetServiceTagsOutcome::Cleared));
        assert_eq!(engine.service_tags_version(), TagVersion::UNINITIALIZED);
    }

    #[test]
    fn lock_enabled_flag_is_conjunction_of_both_plugin_keys() {
        let engine = EnricherEngine::new(service_def(), &plugin_config(true, false), &EnricherOptions::new());
        assert!(!engine.lock_enabled);
        let engine = EnricherEngine::new(service_def(), &plugin_config(true, true), &EnricherOptions::new());
        assert!(engine.lock_enabled);
    }
}
