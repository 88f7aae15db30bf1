//! Cache file load/save.

use std::path::Path;

use tagctx_snapshot::ServiceTagsSnapshot;
use tokio::fs;
use tracing::warn;

/// Loads a service-tags snapshot from the cache file at `path`.
///
/// Tolerant of a missing or partially written file: both are logged and
/// treated as "no cached snapshot" rather than a hard failure.
pub async fn load_from_cache(path: &Path, expected_service_name: &str) -> Option<ServiceTagsSnapshot> {
    let data = match fs::read(path).await {
        Ok(data) => data,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
        Err(err) => {
            warn!(path = %path.display(), %err, "failed to read cache file");
            return None;
        }
    };

    let mut snapshot: ServiceTagsSnapshot = match serde_json::from_slice(&data) {
        Ok(snapshot) => snapshot,
        Err(err) => {
            warn!(path = %path.display(), %err, "failed to parse cache file; proceeding as absent");
            return None;
        }
    };

    if snapshot.service_name() != expected_service_name {
        warn!(
            cached = snapshot.service_name(),
            expected = expected_service_name,
            "cache file service name disagrees with configured service name"
        );
        snapshot.set_service_name(expected_service_name);
    }

    Some(snapshot)
}

/// Persists `snapshot` to the cache file at `path`, creating parent
/// directories as needed. Atomicity is not required.
pub async fn save_to_cache(path: &Path, snapshot: &ServiceTagsSnapshot) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let bytes = serde_json::to_vec(snapshot).map_err(std::io::Error::other)?;
    fs::write(path, bytes).await
}

/// Renames the cache file out of the way so it is no longer considered on
/// the next load. A missing file
/// is not an error.
pub async fn invalidate_cache(path: &Path) {
    let Some(file_name) = path.file_name() else {
        return;
    };
    let mut invalidated_name = file_name.to_os_string();
    invalidated_name.push(".invalid");
    let invalidated_path = path.with_file_name(invalidated_name);

    match fs::rename(path, &invalidated_path).await {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => warn!(path = %path.display(), %err, "failed to invalidate cache file"),
    }
}
