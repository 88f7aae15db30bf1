//! The refresher task itself.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tagctx_config::{cache_file_path, EnricherOptions, PluginConfig};
use tagctx_engine::{EnricherEngine, SetServiceTagsOutcome};
use tagctx_primitives::TagVersion;
use tagctx_snapshot::ServiceTagsSnapshot;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::cache::{invalidate_cache, load_from_cache, save_to_cache};
use crate::error::RetrieverError;
use crate::retriever::Retriever;
use crate::trigger::{Trigger, TriggerHandle};

const TRIGGER_QUEUE_CAPACITY: usize = 16;

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as i64)
}

/// Refresh-cycle counters read by [`Refresher::counters`]: not a metrics
/// exporter, just a queryable observability surface matching its
/// plain-counter idiom.
#[derive(Debug, Default)]
pub struct RefresherCounters {
    refresh_cycles: AtomicU64,
    refresh_failures: AtomicU64,
}

impl RefresherCounters {
    /// Total refresh cycles attempted (successful, `ServiceNotFound`, or
    /// otherwise failed) since the refresher started.
    #[must_use]
    pub fn refresh_cycles(&self) -> u64 {
        self.refresh_cycles.load(Ordering::Relaxed)
    }

    /// Total refresh cycles that ended in a retrieval error other than
    /// `ServiceNotFound`.
    #[must_use]
    pub fn refresh_failures(&self) -> u64 {
        self.refresh_failures.load(Ordering::Relaxed)
    }
}

struct RefresherState {
    engine: Arc<EnricherEngine>,
    retriever: Box<dyn Retriever>,
    service_name: String,
    cache_file: Option<PathBuf>,
    disable_cache_if_service_not_found: bool,
    last_known_version: TagVersion,
    last_activation_time_ms: i64,
    has_provided_tags_to_receiver: bool,
    counters: Arc<RefresherCounters>,
}

impl RefresherState {
    /// Runs one refresh cycle.
    async fn populate(&mut self) {
        self.counters.refresh_cycles.fetch_add(1, Ordering::Relaxed);

        let outcome = self
            .retriever
            .retrieve_tags(self.last_known_version, self.last_activation_time_ms)
            .await;

        match outcome {
            Ok(snapshot) => self.install(snapshot).await,
            Err(RetrieverError::ServiceNotFound { service_name }) => {
                warn!(service_name, "service not found upstream");
                if self.disable_cache_if_service_not_found {
                    if let Some(cache_file) = &self.cache_file {
                        invalidate_cache(cache_file).await;
                    }
                }
                self.engine.set_service_tags(None, false);
                self.last_known_version = TagVersion::UNINITIALIZED;
                self.last_activation_time_ms = now_millis();
            }
            Err(RetrieverError::Other { reason }) => {
                self.counters.refresh_failures.fetch_add(1, Ordering::Relaxed);
                error!(reason, "tag retrieval failed; will retry on next trigger");
            }
        }
    }

    async fn install(&mut self, retrieved: Option<ServiceTagsSnapshot>) {
        let (snapshot, from_cache) = match retrieved {
            Some(snapshot) => (Some(snapshot), false),
            None if !self.has_provided_tags_to_receiver => match &self.cache_file {
                Some(cache_file) => (load_from_cache(cache_file, &self.service_name).await, true),
                None => (None, false),
            },
            None => (None, false),
        };

        let Some(snapshot) = snapshot else {
            self.last_activation_time_ms = now_millis();
            return;
        };

        let version = snapshot.tag_version();
        let outcome = self.engine.set_service_tags(Some(snapshot), false);
        let next_version = match outcome {
            SetServiceTagsOutcome::Aborted { forced_tag_version } => forced_tag_version,
            SetServiceTagsOutcome::Installed | SetServiceTagsOutcome::Cleared => version,
        };

        // The cache file already holds whatever we just loaded from it; only
        // persist back when the retriever gave us something new, and only
        // once the delta (if any) actually merged into a valid snapshot.
        if !from_cache && next_version.value() >= 0 {
            if let Some(cache_file) = &self.cache_file {
                if let Some(installed) = self.engine.enriched_service_tags() {
                    if let Err(err) = save_to_cache(cache_file, installed.payload()).await {
                        warn!(%err, "failed to persist snapshot to cache file");
                    }
                }
            }
        }

        self.last_known_version = next_version;
        self.has_provided_tags_to_receiver = true;
        self.last_activation_time_ms = now_millis();
    }
}

/// Configuration needed to start a refresher.
pub struct RefresherConfig {
    /// The service this refresher pulls tags for.
    pub service_name: String,
    /// Application id used to namespace the cache file name.
    pub app_id: String,
}

/// Handle to a running refresher: the trigger sender plus both background
/// tasks (the refresh loop and the periodic timer), torn down together by
/// [`Refresher::shutdown`].
pub struct Refresher {
    trigger: TriggerHandle,
    worker: JoinHandle<()>,
    timer: JoinHandle<()>,
    counters: Arc<RefresherCounters>,
}

impl Refresher {
    /// Performs the initial synchronous populate, then starts the refresh
    /// loop and the periodic timer.
    pub async fn start(
        engine: Arc<EnricherEngine>,
        mut retriever: Box<dyn Retriever>,
        plugin_config: &PluginConfig,
        options: &EnricherOptions,
        config: RefresherConfig,
    ) -> Self {
        retriever.set_service_name(&config.service_name);
        retriever.set_app_id(&config.app_id);
        retriever.set_plugin_config(plugin_config);

        let cache_file = plugin_config
            .policy_cache_dir()
            .map(|dir| cache_file_path(dir, &config.app_id, &config.service_name));

        let counters = Arc::new(RefresherCounters::default());

        let mut state = RefresherState {
            engine,
            retriever,
            service_name: config.service_name,
            cache_file,
            disable_cache_if_service_not_found: plugin_config.disable_cache_if_service_not_found(),
            last_known_version: TagVersion::UNINITIALIZED,
            last_activation_time_ms: now_millis(),
            has_provided_tags_to_receiver: false,
            counters: counters.clone(),
        };

        state.populate().await;

        let (tx, rx) = mpsc::channel(TRIGGER_QUEUE_CAPACITY);
        let trigger = TriggerHandle::new(tx);

        let worker = tokio::spawn(run_loop(state, rx));
        let timer = tokio::spawn(run_timer(trigger.clone(), options.polling_interval()));

        info!("refresher started");
        Self {
            trigger,
            worker,
            timer,
            counters,
        }
    }

    /// Enqueues a trigger and waits for the refresh cycle it causes to
    /// complete.
    pub async fn sync_tags_with_admin(&self) -> bool {
        self.trigger.sync_tags_with_admin().await
    }

    /// Returns the refresh-cycle counters accumulated so far.
    #[must_use]
    pub fn counters(&self) -> &RefresherCounters {
        &self.counters
    }

    /// Cancels the periodic timer and stops the refresh loop. Any trigger
    /// still queued is abandoned; its caller's `sync_tags_with_admin`
    /// resolves to `false`.
    pub async fn shutdown(self) {
        self.timer.abort();
        self.worker.abort();
        let _ = self.worker.await;
        let _ = self.timer.await;
        info!("refresher stopped");
    }
}

async fn run_loop(mut state: RefresherState, mut triggers: mpsc::Receiver<Trigger>) {
    while let Some(trigger) = triggers.recv().await {
        state.populate().await;
        trigger.signal_completion();
    }
}

async fn run_timer(trigger: TriggerHandle, interval: std::time::Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        trigger.send_periodic().await;
    }
}
