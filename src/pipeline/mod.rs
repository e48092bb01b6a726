//! Conversion-orchestration pipeline.
//!
//! The [`Orchestrator`] bridges the black-box acquisition engine and the
//! ledger, and turns lifecycle events into actions:
//!
//! - [`reconciler::run_reconciler`] polls the engine on a fixed interval
//!   and folds observations into the store
//! - [`run_event_loop`] consumes the event bus: `loaded` records are
//!   re-submitted to the engine, `download_completed` records are queued
//!   for conversion
//! - [`worker::run_worker`] drains the conversion queue one item at a
//!   time and drives ffmpeg
//!
//! Every public operation here is what the API layer calls into; all of
//! them are thin compositions of engine calls and store transitions.

pub mod reconciler;
pub mod worker;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::{AcquisitionEngine, EngineError};
use crate::events::{Event, EventKind};
use crate::ledger::{
    LedgerError, MediaFile, MediaItem, Observation, QueueOutcome, StateStore,
};
use crate::media::probe;
use crate::observability::Metrics;
use crate::queue::{ConversionQueue, QueueError};

#[derive(Debug, Error)]
pub enum OpError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
}

pub type Result<T> = std::result::Result<T, OpError>;

/// Public operations over the item lifecycle, shared by the API layer and
/// the event loop.
pub struct Orchestrator {
    store: StateStore,
    engine: Arc<dyn AcquisitionEngine>,
    queue: ConversionQueue,
    media_dir: PathBuf,
    probe_timeout: Duration,
    metrics: Arc<Metrics>,
}

impl Orchestrator {
    pub fn new(
        store: StateStore,
        engine: Arc<dyn AcquisitionEngine>,
        queue: ConversionQueue,
        media_dir: PathBuf,
        probe_timeout: Duration,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store,
            engine,
            queue,
            media_dir,
            probe_timeout,
            metrics,
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Submit a locator to the engine and record the new item.
    pub async fn add_item(&self, locator: &str) -> Result<MediaItem> {
        let id = self.engine.add_by_locator(locator).await?;

        // Record the item immediately rather than waiting for the next
        // reconcile pass, so the response and follow-up GETs see it.
        let observation = match self.engine.get_by_id(&id).await {
            Ok(Some(obs)) => obs,
            Ok(None) | Err(_) => Observation {
                id: id.clone(),
                display_name: id.clone(),
                locator: locator.to_string(),
                total_size: 0,
                bytes_completed: 0,
            },
        };

        let item = self.store.upsert_from_observation(observation).await;
        self.metrics.item_added();
        info!(id = %item.id, name = %item.display_name, "Item added");
        Ok(item)
    }

    /// List all tracked items, live and stale alike.
    pub async fn list_items(&self) -> Vec<MediaItem> {
        self.store.list().await
    }

    /// Get one item, lazily attaching probed media file info once the
    /// item is fully downloaded and converted.
    pub async fn get_item(&self, id: &str) -> Result<MediaItem> {
        let item = self.store.get(id).await?;
        self.ensure_media_files(item).await
    }

    /// Stop the download in the engine and mark the record Paused.
    pub async fn pause_item(&self, id: &str) -> Result<MediaItem> {
        // Surface NotFound before touching the engine.
        self.store.get(id).await?;
        self.engine.cancel(id).await?;
        Ok(self.store.mark_paused(id).await?)
    }

    /// Re-submit the stored locator to the engine and mark the record
    /// Resumed.
    pub async fn resume_item(&self, id: &str) -> Result<MediaItem> {
        let item = self.store.get(id).await?;
        self.engine.add_by_locator(&item.locator).await?;
        Ok(self.store.mark_resumed(id).await?)
    }

    /// Cancel in the engine and drop the record. Engine failures are
    /// logged but do not keep the record alive.
    pub async fn delete_item(&self, id: &str) -> Result<()> {
        if let Err(err) = self.engine.cancel(id).await {
            warn!(id, %err, "Engine cancel failed, removing record anyway");
        }
        self.store.remove(id).await?;
        Ok(())
    }

    /// Queue a completed item for conversion and hand it to the worker.
    ///
    /// Queuing an already scheduled item is an idempotent success and
    /// never duplicates the queue entry. If the queue rejects the handoff
    /// the Queued mark is rolled back so the call stays retryable.
    pub async fn convert_item(&self, id: &str) -> Result<MediaItem> {
        match self.store.mark_queued(id).await? {
            QueueOutcome::AlreadyScheduled(item) => {
                debug!(id, "Conversion already scheduled");
                Ok(item)
            }
            QueueOutcome::Newly { item, previous } => {
                if let Err(err) = self.queue.enqueue(item.clone()) {
                    if let Err(retract_err) = self.store.retract_queued(id, previous).await {
                        warn!(id, %retract_err, "Failed to roll back rejected queue mark");
                    }
                    return Err(err.into());
                }
                self.metrics.conversion_queued();
                info!(id, name = %item.display_name, "Queued for conversion");
                Ok(item)
            }
        }
    }

    /// Populate `media_files` once for a downloaded-and-converted item.
    async fn ensure_media_files(&self, item: MediaItem) -> Result<MediaItem> {
        use crate::ledger::records::{AcquisitionStatus, ConversionStatus};

        if item.media_files.is_some()
            || item.acquisition != AcquisitionStatus::Completed
            || item.conversion != ConversionStatus::Converted
        {
            return Ok(item);
        }

        let paths = match worker::discover_video_files(&self.media_dir, &item.display_name) {
            Ok(paths) => paths,
            Err(err) => {
                warn!(id = %item.id, %err, "Media file discovery failed");
                return Ok(item);
            }
        };

        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            let file = match probe::probe_media_file(&path, self.probe_timeout).await {
                Ok(metadata) => MediaFile {
                    path: path.to_string_lossy().into_owned(),
                    metadata: Some(metadata),
                    error: None,
                },
                Err(err) => {
                    warn!(path = %path.display(), %err, "Probe failed");
                    MediaFile {
                        path: path.to_string_lossy().into_owned(),
                        metadata: None,
                        error: Some(err.to_string()),
                    }
                }
            };
            files.push(file);
        }

        Ok(self.store.set_media_files(&item.id, files).await?)
    }
}

/// Consume lifecycle events until shutdown or the bus closes.
pub async fn run_event_loop(
    orchestrator: Arc<Orchestrator>,
    mut events: mpsc::Receiver<Event>,
    shutdown: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };
        handle_event(&orchestrator, event).await;
    }
    info!("Event loop stopped");
}

async fn handle_event(orchestrator: &Orchestrator, event: Event) {
    let id = event.item.id.clone();
    match event.kind {
        EventKind::Loaded => {
            // A restored record: hand the locator back to the engine so
            // the download resumes after restart.
            match orchestrator.engine.add_by_locator(&event.item.locator).await {
                Ok(_) => info!(id, name = %event.item.display_name, "Restored item re-added to engine"),
                Err(err) => warn!(id, %err, "Failed to re-add restored item"),
            }
        }
        EventKind::DownloadCompleted => {
            orchestrator.metrics.download_completed();
            if orchestrator.store.is_already_processed(&id).await {
                debug!(id, "Download completed but conversion already handled");
                return;
            }
            if let Err(err) = orchestrator.convert_item(&id).await {
                // Non-fatal: the item stays Completed and can be queued
                // manually or on a later pass.
                warn!(id, %err, "Failed to queue conversion");
            }
        }
        EventKind::QueuedForConversion
        | EventKind::ConversionCompleted
        | EventKind::Paused
        | EventKind::Resumed => {
            debug!(id, kind = event.kind.as_str(), "Lifecycle event");
        }
    }
}
