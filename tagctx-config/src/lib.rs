//! Plugin configuration keys and enricher options.
//!
//! Both types assume the underlying key-value pairs have already been loaded
//! by whatever external configuration mechanism the embedding plugin uses;
//! this crate only defines the typed view over them, generalizing the
//! phase-0 scaffolding left for a configuration layer.

#![warn(missing_docs, clippy::pedantic)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default poll interval for the tag refresher when no enricher option
/// overrides it.
pub const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_secs(60);

/// Plugin-wide configuration keys consulted by the enricher and refresher.
/// Wraps a flat string map rather than a typed struct, matching how the
/// embedding plugin actually hands these values over: keys not present
/// fall back to their documented default.
#[derive(Debug, Clone, Default)]
pub struct PluginConfig {
    prefix: String,
    values: HashMap<String, String>,
}

impl PluginConfig {
    /// Creates a plugin config over already-loaded `values`, with keys
    /// looked up as `<prefix>.<suffix>`.
    #[must_use]
    pub fn new(prefix: impl Into<String>, values: HashMap<String, String>) -> Self {
        Self {
            prefix: prefix.into(),
            values,
        }
    }

    fn key(&self, suffix: &str) -> String {
        format!("{}.{suffix}", self.prefix)
    }

    fn bool_or(&self, suffix: &str, default: bool) -> bool {
        self.values
            .get(&self.key(suffix))
            .map_or(default, |raw| raw.eq_ignore_ascii_case("true"))
    }

    /// `<prefix>.dedup.strings`, default `true`.
    #[must_use]
    pub fn dedup_strings(&self) -> bool {
        self.bool_or("dedup.strings", true)
    }

    /// `<prefix>.disable.cache.if.servicenotfound`, default `true`.
    #[must_use]
    pub fn disable_cache_if_service_not_found(&self) -> bool {
        self.bool_or("disable.cache.if.servicenotfound", true)
    }

    /// `<prefix>.policy.cache.dir`, the directory the cache file is written
    /// to and read from. `None` when unset.
    #[must_use]
    pub fn policy_cache_dir(&self) -> Option<&Path> {
        self.values
            .get(&self.key("policy.cache.dir"))
            .map(Path::new)
    }

    /// `<prefix>.tag.delta.enabled`, default `false`. Gates whether the
    /// primary lock's locking-enabled flag can ever be true.
    #[must_use]
    pub fn tag_delta_enabled(&self) -> bool {
        self.bool_or("tag.delta.enabled", false)
    }

    /// `<prefix>.in.place.tag.update.enabled`, default `false`. The other
    /// half of the locking-enabled flag's conjunction.
    #[must_use]
    pub fn in_place_tag_update_enabled(&self) -> bool {
        self.bool_or("in.place.tag.update.enabled", false)
    }

    /// Returns the raw value for an arbitrary `<prefix>.<suffix>` key, for
    /// settings this type does not expose a typed getter for.
    #[must_use]
    pub fn raw(&self, suffix: &str) -> Option<&str> {
        self.values.get(&self.key(suffix)).map(String::as_str)
    }
}

/// Typed counterpart of the enricher options map. The retriever
/// class-name option has no Rust equivalent since there is no reflection-based
/// loading; callers construct a `Retriever` trait object directly and pass it
/// to `init` instead.
#[derive(Debug, Clone)]
pub struct EnricherOptions {
    polling_interval: Duration,
    disable_trie_lookup_prefilter: bool,
}

impl EnricherOptions {
    /// Creates options with the default 60 second polling interval and the
    /// trie lookup prefilter enabled.
    #[must_use]
    pub fn new() -> Self {
        Self {
            polling_interval: DEFAULT_POLLING_INTERVAL,
            disable_trie_lookup_prefilter: false,
        }
    }

    /// Overrides the refresher's poll interval (`tagRefresherPollingInterval`).
    #[must_use]
    pub fn with_polling_interval(mut self, interval: Duration) -> Self {
        self.polling_interval = interval;
        self
    }

    /// Sets `disableTrieLookupPrefilter`.
    #[must_use]
    pub fn with_disable_trie_lookup_prefilter(mut self, disabled: bool) -> Self {
        self.disable_trie_lookup_prefilter = disabled;
        self
    }

    /// Returns the configured polling interval.
    #[must_use]
    pub fn polling_interval(&self) -> Duration {
        self.polling_interval
    }

    /// Returns whether the trie lookup prefilter is disabled.
    #[must_use]
    pub fn disable_trie_lookup_prefilter(&self) -> bool {
        self.disable_trie_lookup_prefilter
    }
}

impl Default for EnricherOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Derives the cache file name for a service. Path separators in the
/// service name are replaced with underscores so the name cannot escape
/// the configured cache directory.
#[must_use]
pub fn cache_file_name(app_id: &str, service_name: &str) -> String {
    let sanitized = service_name.replace(['/', '\\'], "_");
    format!("{app_id}_{sanitized}_tag.json")
}

/// Joins a cache directory and service identity into the full cache file
/// path, when a cache directory is configured.
#[must_use]
pub fn cache_file_path(cache_dir: &Path, app_id: &str, service_name: &str) -> PathBuf {
    cache_dir.join(cache_file_name(app_id, service_name))
}
