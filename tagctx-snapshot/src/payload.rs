//! The wire-shaped service-tags payload delivered by a retriever.

use std::collections::BTreeMap;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tagctx_model::{ServiceResource, Tag};
use tagctx_primitives::{ResourceId, TagId, TagVersion};

use crate::error::{SnapshotError, SnapshotResult};

/// The extent of change a service-tags snapshot represents relative to the
/// previously installed one.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TagsChangeExtent {
    /// Nothing changed; version bookkeeping only.
    None,
    /// Only tag attributes changed; resource-to-tag associations are stable.
    Tags,
    /// The set of tagged service resources changed.
    ServiceResources,
    /// Both tags and service resources changed.
    All,
}

/// Service-tags payload as delivered by a retriever or loaded from the cache
/// file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServiceTagsSnapshot {
    service_name: String,
    tag_version: TagVersion,
    #[serde(default)]
    is_delta: bool,
    tags_change_extent: TagsChangeExtent,
    service_resources: Vec<ServiceResource>,
    resource_to_tag_ids: BTreeMap<ResourceId, Vec<TagId>>,
    tags: BTreeMap<TagId, Tag>,
    #[serde(default)]
    is_deduped: bool,
    #[serde(default)]
    is_tags_deduped: bool,
}

impl ServiceTagsSnapshot {
    /// Starts a builder for a full (non-delta) snapshot.
    #[must_use]
    pub fn builder(service_name: impl Into<String>, tag_version: TagVersion) -> ServiceTagsSnapshotBuilder {
        ServiceTagsSnapshotBuilder::new(service_name, tag_version)
    }

    /// Returns the service name this payload applies to.
    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Overwrites the service name, used when a loaded cache file disagrees
    /// with the enricher's configured service name.
    pub fn set_service_name(&mut self, service_name: impl Into<String>) {
        self.service_name = service_name.into();
    }

    /// Returns the tag version carried by this payload.
    #[must_use]
    pub fn tag_version(&self) -> TagVersion {
        self.tag_version
    }

    /// Forces the tag version to [`TagVersion::FORCE_REDOWNLOAD`], used when
    /// a delta must be aborted.
    pub fn force_redownload(&mut self) {
        self.tag_version = TagVersion::FORCE_REDOWNLOAD;
    }

    /// Overwrites the tag version, used for version bookkeeping when a
    /// delta's extent doesn't otherwise touch the payload.
    pub(crate) fn set_tag_version(&mut self, version: TagVersion) {
        self.tag_version = version;
    }

    /// Merges an incremental delta onto `self` (the prior full payload),
    /// producing the new `allServiceTags` payload. Service
    /// resources carrying an empty signature are treated as deletions;
    /// everything else upserts by id.
    #[must_use]
    pub fn merge_delta(&self, delta: &Self) -> Self {
        let mut resources: BTreeMap<ResourceId, ServiceResource> = self
            .service_resources
            .iter()
            .map(|r| (r.id(), r.clone()))
            .collect();
        for resource in &delta.service_resources {
            if resource.is_delete_marker() {
                resources.remove(&resource.id());
            } else {
                resources.insert(resource.id(), resource.clone());
            }
        }

        let mut tags = self.tags.clone();
        for (id, tag) in &delta.tags {
            tags.insert(*id, tag.clone());
        }

        let mut resource_to_tag_ids = self.resource_to_tag_ids.clone();
        for resource in &delta.service_resources {
            if resource.is_delete_marker() {
                resource_to_tag_ids.remove(&resource.id());
            }
        }
        for (id, tag_ids) in &delta.resource_to_tag_ids {
            resource_to_tag_ids.insert(*id, tag_ids.clone());
        }

        Self {
            service_name: self.service_name.clone(),
            tag_version: delta.tag_version,
            is_delta: false,
            tags_change_extent: TagsChangeExtent::All,
            service_resources: resources.into_values().collect(),
            resource_to_tag_ids,
            tags,
            is_deduped: delta.is_deduped,
            is_tags_deduped: delta.is_tags_deduped,
        }
    }

    /// Returns `true` when this payload is an incremental delta.
    #[must_use]
    pub fn is_delta(&self) -> bool {
        self.is_delta
    }

    /// Returns the declared extent of change.
    #[must_use]
    pub fn tags_change_extent(&self) -> TagsChangeExtent {
        self.tags_change_extent
    }

    /// Returns the service resources carried by this payload. For a delta,
    /// these are the changed resources only.
    #[must_use]
    pub fn service_resources(&self) -> &[ServiceResource] {
        &self.service_resources
    }

    /// Returns the resource-id to tag-id associations.
    #[must_use]
    pub fn resource_to_tag_ids(&self) -> &BTreeMap<ResourceId, Vec<TagId>> {
        &self.resource_to_tag_ids
    }

    /// Returns the tag-id to tag map.
    #[must_use]
    pub fn tags(&self) -> &BTreeMap<TagId, Tag> {
        &self.tags
    }

    /// Returns `true` when service resources were already deduplicated
    /// upstream.
    #[must_use]
    pub fn is_deduped(&self) -> bool {
        self.is_deduped
    }

    /// Returns `true` when tags should be deduplicated on install.
    #[must_use]
    pub fn is_tags_deduped(&self) -> bool {
        self.is_tags_deduped
    }

    /// Drops the tag-id associations for resources no longer retained (e.g.
    /// because matcher construction failed for them).
    pub fn retain_resource_tag_ids(&mut self, retained: &std::collections::BTreeSet<ResourceId>) {
        self.resource_to_tag_ids.retain(|id, _| retained.contains(id));
    }

    /// Collapses tags that share the same name and attributes onto a single
    /// canonical id, rewriting `resource_to_tag_ids` accordingly. A no-op if
    /// [`is_tags_deduped`](Self::is_tags_deduped) was not requested.
    pub fn dedup_tags(&mut self) {
        if !self.is_tags_deduped {
            return;
        }

        let mut canonical: HashMap<(String, Vec<(String, String)>), TagId> = HashMap::new();
        let mut remap: HashMap<TagId, TagId> = HashMap::new();
        for (id, tag) in &self.tags {
            let key = (
                tag.name().to_string(),
                tag.attributes()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            );
            match canonical.get(&key) {
                Some(&existing) => {
                    remap.insert(*id, existing);
                }
                None => {
                    canonical.insert(key, *id);
                }
            }
        }

        if remap.is_empty() {
            return;
        }

        self.tags.retain(|id, _| !remap.contains_key(id));
        for tag_ids in self.resource_to_tag_ids.values_mut() {
            for tag_id in tag_ids.iter_mut() {
                if let Some(&canon) = remap.get(tag_id) {
                    *tag_id = canon;
                }
            }
            tag_ids.sort_unstable();
            tag_ids.dedup();
        }
    }
}

/// Builder for [`ServiceTagsSnapshot`].
#[derive(Debug)]
pub struct ServiceTagsSnapshotBuilder {
    service_name: String,
    tag_version: TagVersion,
    is_delta: bool,
    tags_change_extent: TagsChangeExtent,
    service_resources: Vec<ServiceResource>,
    resource_to_tag_ids: BTreeMap<ResourceId, Vec<TagId>>,
    tags: BTreeMap<TagId, Tag>,
    is_deduped: bool,
    is_tags_deduped: bool,
}

impl ServiceTagsSnapshotBuilder {
    fn new(service_name: impl Into<String>, tag_version: TagVersion) -> Self {
        Self {
            service_name: service_name.into(),
            tag_version,
            is_delta: false,
            tags_change_extent: TagsChangeExtent::All,
            service_resources: Vec::new(),
            resource_to_tag_ids: BTreeMap::new(),
            tags: BTreeMap::new(),
            is_deduped: false,
            is_tags_deduped: false,
        }
    }

    /// Marks this payload as an incremental delta.
    #[must_use]
    pub fn is_delta(mut self, is_delta: bool) -> Self {
        self.is_delta = is_delta;
        self
    }

    /// Sets the declared extent of change.
    #[must_use]
    pub fn tags_change_extent(mut self, extent: TagsChangeExtent) -> Self {
        self.tags_change_extent = extent;
        self
    }

    /// Appends a service resource.
    #[must_use]
    pub fn with_service_resource(mut self, resource: ServiceResource) -> Self {
        self.service_resources.push(resource);
        self
    }

    /// Associates a resource id with tag ids.
    #[must_use]
    pub fn with_resource_tags(mut self, resource_id: ResourceId, tag_ids: Vec<TagId>) -> Self {
        self.resource_to_tag_ids.insert(resource_id, tag_ids);
        self
    }

    /// Adds a tag definition.
    #[must_use]
    pub fn with_tag(mut self, tag: Tag) -> Self {
        self.tags.insert(tag.id(), tag);
        self
    }

    /// Sets the deduped-service-resources flag.
    #[must_use]
    pub fn deduped(mut self, deduped: bool) -> Self {
        self.is_deduped = deduped;
        self
    }

    /// Sets the deduped-tags flag.
    #[must_use]
    pub fn tags_deduped(mut self, deduped: bool) -> Self {
        self.is_tags_deduped = deduped;
        self
    }

    /// Finalizes the builder.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::EmptyField`] when the service name is empty
    /// or whitespace-only.
    pub fn build(self) -> SnapshotResult<ServiceTagsSnapshot> {
        if self.service_name.trim().is_empty() {
            return Err(SnapshotError::EmptyField { field: "service name" });
        }
        Ok(ServiceTagsSnapshot {
            service_name: self.service_name,
            tag_version: self.tag_version,
            is_delta: self.is_delta,
            tags_change_extent: self.tags_change_extent,
            service_resources: self.service_resources,
            resource_to_tag_ids: self.resource_to_tag_ids,
            tags: self.tags,
            is_deduped: self.is_deduped,
            is_tags_deduped: self.is_tags_deduped,
        })
    }
}
