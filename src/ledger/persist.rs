//! JSON snapshot persistence for the item ledger.
//!
//! The whole map is serialized to `<state_file>.tmp` and atomically
//! renamed over the canonical file, so the on-disk state is always either
//! the previous complete snapshot or the new one. A background saver task
//! rewrites the file on a fixed interval and whenever the store's dirty
//! signal fires; the signal coalesces, so at most one save is ever
//! pending.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::error::Result;
use super::records::MediaItem;
use super::store::StateStore;

/// Load the item map from the state file.
///
/// A missing file is an empty initial state. A corrupt or unreadable file
/// is logged and treated as empty: the server starts degraded rather than
/// refusing to start.
pub async fn load_items(path: &Path) -> HashMap<String, MediaItem> {
    let data = match tokio::fs::read(path).await {
        Ok(data) => data,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %path.display(), "State file does not exist, starting empty");
            return HashMap::new();
        }
        Err(err) => {
            error!(path = %path.display(), %err, "Failed to read state file, starting empty");
            return HashMap::new();
        }
    };

    match serde_json::from_slice::<HashMap<String, MediaItem>>(&data) {
        Ok(items) => {
            info!(count = items.len(), path = %path.display(), "Loaded item states");
            items
        }
        Err(err) => {
            error!(path = %path.display(), %err, "State file is corrupt, starting empty");
            HashMap::new()
        }
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(".tmp");
    PathBuf::from(os)
}

/// Write the full snapshot via write-temp-then-rename.
pub async fn save_items(path: &Path, items: &HashMap<String, MediaItem>) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let data = serde_json::to_vec_pretty(items)?;
    let tmp = tmp_path(path);

    let write_result = async {
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&data).await?;
        // The rename is only atomic for readers; the data must be on disk
        // before the canonical name points at it.
        file.sync_all().await?;
        Ok::<_, std::io::Error>(())
    }
    .await;

    if let Err(err) = write_result {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(err.into());
    }

    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// Background saver: periodic full saves plus debounced on-demand saves,
/// with one final save on shutdown.
pub async fn run_saver(
    store: StateStore,
    path: PathBuf,
    interval: Duration,
    shutdown: CancellationToken,
) {
    let dirty = store.dirty_signal();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick fires immediately; skip it so startup does not write
    // back what was just loaded.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
            _ = dirty.notified() => {}
        }

        let snapshot = store.snapshot().await;
        if let Err(err) = save_items(&path, &snapshot).await {
            error!(path = %path.display(), %err, "Failed to save item states");
        }
    }

    // Final save: last chance to capture in-flight transitions. Failures
    // here can only be logged.
    let snapshot = store.snapshot().await;
    match save_items(&path, &snapshot).await {
        Ok(()) => info!(count = snapshot.len(), "Final state save complete"),
        Err(err) => error!(%err, "Final state save failed"),
    }
}
