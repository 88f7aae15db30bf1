//! Authorization-request view consumed by [`crate::EnricherEngine::enrich`].

use chrono::{DateTime, Utc};
use tagctx_model::{AccessResource, AccessType, MatchingScopes, TagForEval};

/// Context key the enriched tag set is attached under, conceptually
/// mirroring the well-known key an embedding authorization plugin uses for
/// its external request context map. Exposed for callers that bridge into
/// such a map themselves; [`EnrichmentRequest::tags`] is the typed
/// accessor.
pub const ENRICHED_TAGS_CONTEXT_KEY: &str = "RANGER_TAG_CONTEXT_ENRICHER_TAGS";

/// A single enrichment request: the resource being accessed, the kind of
/// access, and the per-dimension scopes to narrow matches by.
#[derive(Clone, Debug)]
pub struct EnrichmentRequest {
    resource: AccessResource,
    access_type: AccessType,
    matching_scopes: MatchingScopes,
    access_time: Option<DateTime<Utc>>,
    tags: Option<Vec<TagForEval>>,
}

impl EnrichmentRequest {
    /// Creates a request for `resource` under `access_type`, with empty
    /// matching scopes (every dimension defaults to self-or-descendants) and
    /// no explicit access time (evaluated as "now").
    #[must_use]
    pub fn new(resource: AccessResource, access_type: AccessType) -> Self {
        Self {
            resource,
            access_type,
            matching_scopes: MatchingScopes::new(),
            access_time: None,
            tags: None,
        }
    }

    /// Sets the per-dimension matching scopes and returns the updated request.
    #[must_use]
    pub fn with_matching_scopes(mut self, scopes: MatchingScopes) -> Self {
        self.matching_scopes = scopes;
        self
    }

    /// Sets an explicit access time and returns the updated request. Absent,
    /// `enrich` evaluates tag validity against the current time.
    #[must_use]
    pub fn with_access_time(mut self, at: DateTime<Utc>) -> Self {
        self.access_time = Some(at);
        self
    }

    /// Returns the accessed resource.
    #[must_use]
    pub fn resource(&self) -> &AccessResource {
        &self.resource
    }

    /// Returns the requested access type.
    #[must_use]
    pub fn access_type(&self) -> &AccessType {
        &self.access_type
    }

    /// Returns the per-dimension matching scopes.
    #[must_use]
    pub fn matching_scopes(&self) -> &MatchingScopes {
        &self.matching_scopes
    }

    /// Returns the explicit access time, if set.
    #[must_use]
    pub fn access_time(&self) -> Option<DateTime<Utc>> {
        self.access_time
    }

    /// Returns the tags attached by `enrich`, if any matched. `None` before
    /// `enrich` runs and when nothing matched.
    #[must_use]
    pub fn tags(&self) -> Option<&[TagForEval]> {
        self.tags.as_deref()
    }

    pub(crate) fn set_tags(&mut self, tags: Vec<TagForEval>) {
        self.tags = if tags.is_empty() { None } else { Some(tags) };
    }
}
