//! The retriever contract, and an in-memory test double.

use async_trait::async_trait;
use tagctx_config::PluginConfig;
use tagctx_primitives::TagVersion;
use tagctx_snapshot::ServiceTagsSnapshot;

use crate::error::RetrieverResult;

/// External collaborator that pulls service-tags snapshots from wherever the
/// embedding plugin's admin service publishes them (HTTP, file, etc.). Only
/// the refresher task calls these methods, so implementations need no
/// internal synchronization of their own beyond what `Send` requires.
#[async_trait]
pub trait Retriever: Send {
    /// Retrieves the snapshot for this service relative to
    /// `last_known_version`. Returns `Ok(None)` when nothing has changed
    /// since that version.
    async fn retrieve_tags(
        &mut self,
        last_known_version: TagVersion,
        last_activation_time_ms: i64,
    ) -> RetrieverResult<Option<ServiceTagsSnapshot>>;

    /// Sets the service name this retriever serves.
    fn set_service_name(&mut self, service_name: &str);

    /// Sets the application id used to namespace the cache file.
    fn set_app_id(&mut self, app_id: &str);

    /// Hands the retriever its plugin configuration.
    fn set_plugin_config(&mut self, config: &PluginConfig);
}

/// Test double serving a fixed, ordered sequence of responses. Each call to
/// [`Retriever::retrieve_tags`] pops the next entry; once exhausted, it keeps
/// returning `Ok(None)` ("no change").
#[cfg(test)]
pub struct StaticRetriever {
    responses: std::collections::VecDeque<RetrieverResult<Option<ServiceTagsSnapshot>>>,
    service_name: String,
    app_id: String,
}

#[cfg(test)]
impl StaticRetriever {
    /// Creates a retriever that serves `responses` in order.
    #[must_use]
    pub fn new(responses: Vec<RetrieverResult<Option<ServiceTagsSnapshot>>>) -> Self {
        Self {
            responses: responses.into(),
            service_name: String::new(),
            app_id: String::new(),
        }
    }
}

#[cfg(test)]
#[async_trait]
impl Retriever for StaticRetriever {
    async fn retrieve_tags(
        &mut self,
        _last_known_version: TagVersion,
        _last_activation_time_ms: i64,
    ) -> RetrieverResult<Option<ServiceTagsSnapshot>> {
        self.responses.pop_front().unwrap_or(Ok(None))
    }

    fn set_service_name(&mut self, service_name: &str) {
        self.service_name = service_name.to_string();
    }

    fn set_app_id(&mut self, app_id: &str) {
        self.app_id = app_id.to_string();
    }

    fn set_plugin_config(&mut self, _config: &PluginConfig) {}
}
