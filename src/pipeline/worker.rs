//! The conversion worker: single consumer of the conversion queue.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::ledger::records::MediaItem;
use crate::ledger::StateStore;
use crate::media::probe::is_video_file;
use crate::media::transcode::Transcoder;
use crate::observability::Metrics;

/// Locate the video files belonging to an item on disk.
///
/// The engine writes an item either as a single file named after it or as
/// a directory of files; both live directly under the media directory.
pub fn discover_video_files(media_dir: &Path, name: &str) -> std::io::Result<Vec<PathBuf>> {
    let root = media_dir.join(name);
    let meta = std::fs::metadata(&root)?;

    if meta.is_file() {
        return Ok(if is_video_file(&root) { vec![root] } else { Vec::new() });
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(&root).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::other)?;
        if entry.file_type().is_file() && is_video_file(entry.path()) {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Drain the conversion queue, one transcode at a time, until shutdown.
///
/// Shutdown is only observed between items: an in-flight transcode runs
/// to completion here, and the caller enforces the grace period by
/// aborting the task if the join takes too long.
pub async fn run_worker(
    store: StateStore,
    transcoder: Arc<dyn Transcoder>,
    media_dir: PathBuf,
    mut queue: mpsc::Receiver<MediaItem>,
    shutdown: CancellationToken,
    metrics: Arc<Metrics>,
) {
    loop {
        let item = tokio::select! {
            _ = shutdown.cancelled() => break,
            item = queue.recv() => match item {
                Some(item) => item,
                None => break,
            },
        };
        process_item(&store, transcoder.as_ref(), &media_dir, item, &metrics).await;
    }
    info!("Conversion worker stopped");
}

async fn process_item(
    store: &StateStore,
    transcoder: &dyn Transcoder,
    media_dir: &Path,
    item: MediaItem,
    metrics: &Metrics,
) {
    let id = item.id.clone();

    // The record may have been deleted or regressed while queued; the
    // state machine guard tells us, and the job is simply skipped.
    if let Err(err) = store.mark_converting(&id).await {
        warn!(id, %err, "Skipping conversion");
        return;
    }

    info!(id, name = %item.display_name, "Starting conversion");

    let files = match discover_video_files(media_dir, &item.display_name) {
        Ok(files) => files,
        Err(err) => {
            warn!(id, %err, "Cannot locate item files");
            fail(store, &id, metrics).await;
            return;
        }
    };

    for file in &files {
        if let Err(err) = transcoder.convert(file).await {
            // One bad file fails the whole job; nothing is reported as a
            // partial success.
            warn!(id, file = %file.display(), %err, "Transcode failed");
            fail(store, &id, metrics).await;
            return;
        }
    }

    match store.mark_converted(&id).await {
        Ok(_) => {
            metrics.conversion_completed();
            info!(id, files = files.len(), "Conversion complete");
        }
        Err(err) => warn!(id, %err, "Failed to mark item converted"),
    }
}

async fn fail(store: &StateStore, id: &str, metrics: &Metrics) {
    metrics.conversion_failed();
    if let Err(err) = store.mark_failed(id).await {
        warn!(id, %err, "Failed to mark item failed");
    }
}
