use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use tag_context_enricher::config::{EnricherOptions, PluginConfig};
use tag_context_enricher::engine::{EnrichmentRequest, ENRICHED_TAGS_CONTEXT_KEY};
use tag_context_enricher::model::{AccessResource, AccessType, DimensionName, Hierarchy, PolicyType, ResourceValue, ServiceDef, ServiceResource, Tag};
use tag_context_enricher::refresher::{RefresherConfig, RetrieverError, RetrieverResult};
use tag_context_enricher::snapshot::ServiceTagsSnapshot;
use tag_context_enricher::TagContextEnricher;
use tagctx_primitives::{ResourceId, TagId, TagVersion};

/// Serves a fixed, ordered sequence of responses; once exhausted, reports
/// "no change". A local stand-in for the crate-internal `StaticRetriever`,
/// which is `#[cfg(test)]`-gated inside `tagctx-refresher` and so is not
/// visible from here.
struct ScriptedRetriever {
    responses: Mutex<VecDeque<RetrieverResult<Option<ServiceTagsSnapshot>>>>,
}

impl ScriptedRetriever {
    fn new(responses: Vec<RetrieverResult<Option<ServiceTagsSnapshot>>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
        }
    }
}

#[async_trait]
impl tag_context_enricher::refresher::Retriever for ScriptedRetriever {
    async fn retrieve_tags(
        &mut self,
        _last_known_version: TagVersion,
        _last_activation_time_ms: i64,
    ) -> RetrieverResult<Option<ServiceTagsSnapshot>> {
        self.responses.get_mut().unwrap().pop_front().unwrap_or(Ok(None))
    }

    fn set_service_name(&mut self, _service_name: &str) {}
    fn set_app_id(&mut self, _app_id: &str) {}
    fn set_plugin_config(&mut self, _config: &PluginConfig) {}
}

fn service_def() -> ServiceDef {
    let mut def = ServiceDef::new();
    def.add_hierarchy(
        PolicyType::Access,
        Hierarchy::new(PolicyType::Access, vec!["db".into(), "tbl".into()]).unwrap(),
    );
    def
}

fn resource(id: i64, db: &str, tbl: &str) -> ServiceResource {
    let mut elements = BTreeMap::new();
    elements.insert(DimensionName::new("db"), ResourceValue::Single(db.to_string()));
    elements.insert(DimensionName::new("tbl"), ResourceValue::Single(tbl.to_string()));
    ServiceResource::new(ResourceId::new(id), "sig", elements).unwrap()
}

#[tokio::test]
async fn init_enrich_delta_and_service_not_found_end_to_end() {
    let full = ServiceTagsSnapshot::builder("sales", TagVersion::new(1))
        .with_service_resource(resource(1, "sales", "orders"))
        .with_tag(Tag::new(TagId::new(1), "PII").unwrap())
        .with_resource_tags(ResourceId::new(1), vec![TagId::new(1)])
        .build()
        .unwrap();

    let delta = ServiceTagsSnapshot::builder("sales", TagVersion::new(2))
        .is_delta(true)
        .tags_change_extent(tag_context_enricher::snapshot::TagsChangeExtent::ServiceResources)
        .with_service_resource(resource(2, "sales", "customers"))
        .with_tag(Tag::new(TagId::new(2), "SENSITIVE").unwrap())
        .with_resource_tags(ResourceId::new(2), vec![TagId::new(2)])
        .build()
        .unwrap();

    let retriever = ScriptedRetriever::new(vec![
        Ok(Some(full)),
        Ok(Some(delta)),
        Err(RetrieverError::ServiceNotFound {
            service_name: "sales".to_string(),
        }),
    ]);

    let enricher = TagContextEnricher::init(
        service_def(),
        Box::new(retriever),
        PluginConfig::new("ranger.plugin.hive", HashMap::new()),
        EnricherOptions::new(),
        RefresherConfig {
            service_name: "sales".to_string(),
            app_id: "app1".to_string(),
        },
    )
    .await;

    let mut request = EnrichmentRequest::new(
        AccessResource::empty().with_value(DimensionName::new("db"), "sales").with_value(DimensionName::new("tbl"), "orders"),
        AccessType::Any,
    );
    enricher.enrich(&mut request);
    assert_eq!(request.tags().map(<[_]>::len), Some(1));
    assert_eq!(ENRICHED_TAGS_CONTEXT_KEY, "RANGER_TAG_CONTEXT_ENRICHER_TAGS");

    let completed = enricher.sync_tags_with_admin().await;
    assert!(completed);
    assert_eq!(enricher.engine().service_tags_version(), TagVersion::new(2));

    let mut request = EnrichmentRequest::new(
        AccessResource::empty().with_value(DimensionName::new("db"), "sales").with_value(DimensionName::new("tbl"), "customers"),
        AccessType::Any,
    );
    enricher.enrich(&mut request);
    assert_eq!(request.tags().map(<[_]>::len), Some(1));

    let completed = enricher.sync_tags_with_admin().await;
    assert!(completed);
    assert_eq!(enricher.engine().service_tags_version(), TagVersion::UNINITIALIZED);

    let mut request = EnrichmentRequest::new(AccessResource::empty(), AccessType::Any);
    enricher.enrich(&mut request);
    assert!(request.tags().is_none());

    enricher.pre_cleanup().await;
}
