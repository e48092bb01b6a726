use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Notify, RwLock};
use tracing::debug;

use crate::events::{EventBus, EventKind};

use super::error::{LedgerError, Result};
use super::records::{
    AcquisitionStatus, ConversionStatus, MediaFile, MediaItem, Observation,
};

/// Result of [`StateStore::mark_queued`].
#[derive(Debug, Clone)]
pub enum QueueOutcome {
    /// The item just transitioned into Queued. `previous` is the
    /// conversion status it came from, kept so a rejected queue handoff
    /// can be rolled back.
    Newly {
        item: MediaItem,
        previous: ConversionStatus,
    },
    /// Conversion was already queued, running, or done; nothing changed
    /// and no event fired.
    AlreadyScheduled(MediaItem),
}

impl QueueOutcome {
    pub fn into_item(self) -> MediaItem {
        match self {
            QueueOutcome::Newly { item, .. } => item,
            QueueOutcome::AlreadyScheduled(item) => item,
        }
    }
}

/// Sole owner of the authoritative item map and its durable mirror.
///
/// All mutation goes through the transition methods below; callers only
/// ever receive copies. Each successful mutation schedules a debounced
/// save via the dirty signal consumed by [`super::persist::run_saver`].
#[derive(Clone)]
pub struct StateStore {
    items: Arc<RwLock<HashMap<String, MediaItem>>>,
    events: EventBus,
    dirty: Arc<Notify>,
}

impl StateStore {
    /// Create a store seeded with previously persisted records.
    pub fn with_items(items: HashMap<String, MediaItem>, events: EventBus) -> Self {
        Self {
            items: Arc::new(RwLock::new(items)),
            events,
            dirty: Arc::new(Notify::new()),
        }
    }

    pub fn new(events: EventBus) -> Self {
        Self::with_items(HashMap::new(), events)
    }

    /// Signal consumed by the background saver. `notify_one` keeps at most
    /// one permit, which is exactly the coalescing the save path needs.
    pub fn dirty_signal(&self) -> Arc<Notify> {
        Arc::clone(&self.dirty)
    }

    fn schedule_save(&self) {
        self.dirty.notify_one();
    }

    /// Get a copy of one record.
    pub async fn get(&self, id: &str) -> Result<MediaItem> {
        let items = self.items.read().await;
        items
            .get(id)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(id.to_string()))
    }

    /// Snapshot copy of all records, sorted by display name for stable
    /// API output.
    pub async fn list(&self) -> Vec<MediaItem> {
        let items = self.items.read().await;
        let mut all: Vec<MediaItem> = items.values().cloned().collect();
        all.sort_by(|a, b| a.display_name.cmp(&b.display_name).then(a.id.cmp(&b.id)));
        all
    }

    /// Snapshot of the raw map, used by the saver to serialize without
    /// holding the lock across I/O.
    pub async fn snapshot(&self) -> HashMap<String, MediaItem> {
        self.items.read().await.clone()
    }

    /// Emit a `loaded` event for every record currently in the store.
    ///
    /// Called once at startup so the orchestrator can re-submit locators
    /// to the acquisition engine.
    pub async fn emit_loaded(&self) {
        let items = self.items.read().await;
        for item in items.values() {
            self.events.emit(EventKind::Loaded, item.clone());
        }
    }

    /// Fold a live engine observation into the store.
    ///
    /// Applies the regression and completion rules: an unfinished
    /// observation resets the acquisition axis and clears the milestone
    /// timestamps; the first finished observation marks the item
    /// Completed and fires `download_completed` exactly once.
    pub async fn upsert_from_observation(&self, obs: Observation) -> MediaItem {
        let now = Utc::now();
        let done = obs.is_done();
        let percent = obs.downloaded_percent();

        let updated = {
            let mut items = self.items.write().await;
            match items.get_mut(&obs.id) {
                Some(existing) => {
                    if !obs.display_name.is_empty() {
                        existing.display_name = obs.display_name;
                    }
                    if !obs.locator.is_empty() {
                        existing.locator = obs.locator;
                    }
                    existing.total_size = obs.total_size;
                    existing.downloaded_percent = percent;
                    existing.last_observed_at = now;

                    if !done {
                        // Regression: the engine says bytes are missing, so
                        // the completion milestones no longer hold.
                        existing.acquisition = AcquisitionStatus::Acquiring;
                        existing.completed_at = None;
                        existing.conversion_queued_at = None;
                        existing.converted_at = None;
                    } else if !existing.was_completed() {
                        existing.acquisition = AcquisitionStatus::Completed;
                        existing.completed_at = Some(now);
                        let snapshot = existing.clone();
                        self.events.emit(EventKind::DownloadCompleted, snapshot);
                    }
                    existing.clone()
                }
                None => {
                    let item = obs.into_item(now);
                    items.insert(item.id.clone(), item.clone());
                    if done {
                        self.events.emit(EventKind::DownloadCompleted, item.clone());
                    }
                    item
                }
            }
        };

        self.schedule_save();
        updated
    }

    /// Mark a download as paused. Pausing an already paused item is a
    /// no-op.
    pub async fn mark_paused(&self, id: &str) -> Result<MediaItem> {
        let updated = {
            let mut items = self.items.write().await;
            let item = items
                .get_mut(id)
                .ok_or_else(|| LedgerError::NotFound(id.to_string()))?;

            if item.acquisition == AcquisitionStatus::Paused {
                return Ok(item.clone());
            }

            item.acquisition = AcquisitionStatus::Paused;
            item.last_observed_at = Utc::now();
            let snapshot = item.clone();
            self.events.emit(EventKind::Paused, snapshot.clone());
            snapshot
        };

        self.schedule_save();
        Ok(updated)
    }

    /// Mark a download as resumed: back to Completed if it had already
    /// finished, otherwise back to Acquiring.
    pub async fn mark_resumed(&self, id: &str) -> Result<MediaItem> {
        let updated = {
            let mut items = self.items.write().await;
            let item = items
                .get_mut(id)
                .ok_or_else(|| LedgerError::NotFound(id.to_string()))?;

            if item.acquisition == AcquisitionStatus::Acquiring {
                return Ok(item.clone());
            }

            item.acquisition = if item.was_completed() {
                AcquisitionStatus::Completed
            } else {
                AcquisitionStatus::Acquiring
            };
            item.last_observed_at = Utc::now();
            let snapshot = item.clone();
            self.events.emit(EventKind::Resumed, snapshot.clone());
            snapshot
        };

        self.schedule_save();
        Ok(updated)
    }

    /// Queue a completed item for conversion.
    ///
    /// Fails with `InvalidTransition` unless the download is Completed.
    /// If conversion is already queued, running, or done the call is an
    /// idempotent no-op reported as [`QueueOutcome::AlreadyScheduled`];
    /// a Failed item may be queued again.
    pub async fn mark_queued(&self, id: &str) -> Result<QueueOutcome> {
        let outcome = {
            let mut items = self.items.write().await;
            let item = items
                .get_mut(id)
                .ok_or_else(|| LedgerError::NotFound(id.to_string()))?;

            if item.acquisition != AcquisitionStatus::Completed {
                return Err(LedgerError::InvalidTransition {
                    id: id.to_string(),
                    reason: "download is not completed yet".to_string(),
                });
            }

            if item.conversion_scheduled() {
                return Ok(QueueOutcome::AlreadyScheduled(item.clone()));
            }

            let previous = item.conversion;
            let now = Utc::now();
            item.conversion = ConversionStatus::Queued;
            item.conversion_queued_at = Some(now);
            item.last_observed_at = now;
            let snapshot = item.clone();
            self.events.emit(EventKind::QueuedForConversion, snapshot.clone());
            QueueOutcome::Newly {
                item: snapshot,
                previous,
            }
        };

        self.schedule_save();
        Ok(outcome)
    }

    /// Undo a `mark_queued` whose queue handoff was rejected, restoring
    /// the conversion status the item had before. Only valid while the
    /// item is still Queued.
    pub async fn retract_queued(&self, id: &str, previous: ConversionStatus) -> Result<MediaItem> {
        let updated = {
            let mut items = self.items.write().await;
            let item = items
                .get_mut(id)
                .ok_or_else(|| LedgerError::NotFound(id.to_string()))?;

            if item.conversion != ConversionStatus::Queued {
                return Err(LedgerError::InvalidTransition {
                    id: id.to_string(),
                    reason: format!("conversion is {:?}, expected Queued", item.conversion),
                });
            }

            item.conversion = previous;
            item.conversion_queued_at = None;
            item.clone()
        };

        self.schedule_save();
        Ok(updated)
    }

    /// Move a queued item into InProgress. Only the conversion worker
    /// calls this, right after dequeueing.
    pub async fn mark_converting(&self, id: &str) -> Result<MediaItem> {
        let updated = {
            let mut items = self.items.write().await;
            let item = items
                .get_mut(id)
                .ok_or_else(|| LedgerError::NotFound(id.to_string()))?;

            if item.conversion != ConversionStatus::Queued {
                return Err(LedgerError::InvalidTransition {
                    id: id.to_string(),
                    reason: format!("conversion is {:?}, expected Queued", item.conversion),
                });
            }

            item.conversion = ConversionStatus::InProgress;
            item.last_observed_at = Utc::now();
            item.clone()
        };

        self.schedule_save();
        Ok(updated)
    }

    /// Record a fully successful conversion.
    pub async fn mark_converted(&self, id: &str) -> Result<MediaItem> {
        let updated = {
            let mut items = self.items.write().await;
            let item = items
                .get_mut(id)
                .ok_or_else(|| LedgerError::NotFound(id.to_string()))?;

            if item.conversion != ConversionStatus::InProgress {
                return Err(LedgerError::InvalidTransition {
                    id: id.to_string(),
                    reason: format!("conversion is {:?}, expected InProgress", item.conversion),
                });
            }

            let now = Utc::now();
            item.conversion = ConversionStatus::Converted;
            item.converted_at = Some(now);
            item.last_observed_at = now;
            let snapshot = item.clone();
            self.events.emit(EventKind::ConversionCompleted, snapshot.clone());
            snapshot
        };

        self.schedule_save();
        Ok(updated)
    }

    /// Record a failed conversion. The whole job fails as a unit;
    /// `converted_at` stays unset and the item may be re-queued later.
    pub async fn mark_failed(&self, id: &str) -> Result<MediaItem> {
        let updated = {
            let mut items = self.items.write().await;
            let item = items
                .get_mut(id)
                .ok_or_else(|| LedgerError::NotFound(id.to_string()))?;

            if item.conversion != ConversionStatus::InProgress {
                return Err(LedgerError::InvalidTransition {
                    id: id.to_string(),
                    reason: format!("conversion is {:?}, expected InProgress", item.conversion),
                });
            }

            item.conversion = ConversionStatus::Failed;
            item.last_observed_at = Utc::now();
            item.clone()
        };

        self.schedule_save();
        Ok(updated)
    }

    /// Attach probed media file info, once, to a fully converted item.
    pub async fn set_media_files(&self, id: &str, files: Vec<MediaFile>) -> Result<MediaItem> {
        let updated = {
            let mut items = self.items.write().await;
            let item = items
                .get_mut(id)
                .ok_or_else(|| LedgerError::NotFound(id.to_string()))?;

            if item.media_files.is_some() {
                return Ok(item.clone());
            }
            if item.acquisition != AcquisitionStatus::Completed
                || item.conversion != ConversionStatus::Converted
            {
                return Err(LedgerError::InvalidTransition {
                    id: id.to_string(),
                    reason: "media files are only recorded for converted items".to_string(),
                });
            }

            item.media_files = Some(files);
            item.clone()
        };

        self.schedule_save();
        Ok(updated)
    }

    /// Remove an item from the store.
    pub async fn remove(&self, id: &str) -> Result<()> {
        {
            let mut items = self.items.write().await;
            if items.remove(id).is_none() {
                return Err(LedgerError::NotFound(id.to_string()));
            }
        }
        debug!(id, "Item removed from ledger");
        self.schedule_save();
        Ok(())
    }

    /// Whether conversion for this item has already been queued, started,
    /// or finished. Unknown items count as unprocessed.
    pub async fn is_already_processed(&self, id: &str) -> bool {
        let items = self.items.read().await;
        items
            .get(id)
            .map(|item| item.conversion_scheduled())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Event, EventBus};
    use tokio::sync::mpsc;

    fn observation(id: &str, bytes: u64, total: u64) -> Observation {
        Observation {
            id: id.to_string(),
            display_name: format!("item-{id}"),
            locator: format!("magnet:?xt=urn:btih:{id}"),
            total_size: total,
            bytes_completed: bytes,
        }
    }

    fn test_store() -> (StateStore, mpsc::Receiver<Event>) {
        let (bus, rx) = EventBus::new(16);
        (StateStore::new(bus), rx)
    }

    fn drain(rx: &mut mpsc::Receiver<Event>) -> Vec<EventKind> {
        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(event.kind);
        }
        kinds
    }

    #[tokio::test]
    async fn test_get_unknown_is_not_found() {
        let (store, _rx) = test_store();
        assert!(matches!(
            store.get("nope").await,
            Err(LedgerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_first_done_observation_completes_once() {
        let (store, mut rx) = test_store();

        let item = store
            .upsert_from_observation(observation("a", 1000, 1000))
            .await;
        assert_eq!(item.acquisition, AcquisitionStatus::Completed);
        assert!(item.completed_at.is_some());
        assert_eq!(drain(&mut rx), vec![EventKind::DownloadCompleted]);

        // Re-observing an already completed item must not re-fire.
        store
            .upsert_from_observation(observation("a", 1000, 1000))
            .await;
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_progress_edge_fires_event() {
        let (store, mut rx) = test_store();

        store
            .upsert_from_observation(observation("a", 500, 1000))
            .await;
        assert!(drain(&mut rx).is_empty());

        let item = store
            .upsert_from_observation(observation("a", 1000, 1000))
            .await;
        assert_eq!(item.acquisition, AcquisitionStatus::Completed);
        assert_eq!(drain(&mut rx), vec![EventKind::DownloadCompleted]);
    }

    #[tokio::test]
    async fn test_regression_clears_milestones() {
        let (store, mut rx) = test_store();

        store
            .upsert_from_observation(observation("a", 1000, 1000))
            .await;
        store.mark_queued("a").await.unwrap();
        drain(&mut rx);

        // Resumed-but-incomplete item comes back from the engine.
        let item = store
            .upsert_from_observation(observation("a", 900, 1000))
            .await;
        assert_eq!(item.acquisition, AcquisitionStatus::Acquiring);
        assert!(item.completed_at.is_none());
        assert!(item.conversion_queued_at.is_none());
        assert!(item.converted_at.is_none());

        // Finishing again fires a fresh completion edge.
        store
            .upsert_from_observation(observation("a", 1000, 1000))
            .await;
        assert_eq!(drain(&mut rx), vec![EventKind::DownloadCompleted]);
    }

    #[tokio::test]
    async fn test_mark_queued_requires_completed_download() {
        let (store, _rx) = test_store();
        store
            .upsert_from_observation(observation("a", 500, 1000))
            .await;

        let err = store.mark_queued("a").await.unwrap_err();
        assert!(matches!(err, LedgerError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_mark_queued_is_idempotent() {
        let (store, mut rx) = test_store();
        store
            .upsert_from_observation(observation("a", 1000, 1000))
            .await;
        drain(&mut rx);

        let first = store.mark_queued("a").await.unwrap();
        let QueueOutcome::Newly { item, previous } = first else {
            panic!("expected a fresh queue transition");
        };
        assert_eq!(item.conversion, ConversionStatus::Queued);
        assert_eq!(previous, ConversionStatus::NotStarted);
        let queued_at = item.conversion_queued_at;
        assert!(queued_at.is_some());
        assert_eq!(drain(&mut rx), vec![EventKind::QueuedForConversion]);

        // Second call no-ops: same timestamp, no second event.
        let second = store.mark_queued("a").await.unwrap();
        let QueueOutcome::AlreadyScheduled(item) = second else {
            panic!("expected an idempotent no-op");
        };
        assert_eq!(item.conversion, ConversionStatus::Queued);
        assert_eq!(item.conversion_queued_at, queued_at);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_retract_queued_restores_previous_status() {
        let (store, _rx) = test_store();
        store
            .upsert_from_observation(observation("a", 1000, 1000))
            .await;

        store.mark_queued("a").await.unwrap();
        store.mark_converting("a").await.unwrap();
        store.mark_failed("a").await.unwrap();

        let QueueOutcome::Newly { previous, .. } = store.mark_queued("a").await.unwrap() else {
            panic!("expected a fresh queue transition");
        };
        assert_eq!(previous, ConversionStatus::Failed);

        let restored = store.retract_queued("a", previous).await.unwrap();
        assert_eq!(restored.conversion, ConversionStatus::Failed);
        assert!(restored.conversion_queued_at.is_none());

        // Retracting a non-queued item is rejected.
        assert!(store
            .retract_queued("a", ConversionStatus::NotStarted)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_requeue_after_failure() {
        let (store, _rx) = test_store();
        store
            .upsert_from_observation(observation("a", 1000, 1000))
            .await;

        store.mark_queued("a").await.unwrap();
        store.mark_converting("a").await.unwrap();
        let failed = store.mark_failed("a").await.unwrap();
        assert_eq!(failed.conversion, ConversionStatus::Failed);
        assert!(failed.converted_at.is_none());

        let requeued = store.mark_queued("a").await.unwrap().into_item();
        assert_eq!(requeued.conversion, ConversionStatus::Queued);
    }

    #[tokio::test]
    async fn test_conversion_happy_path_ordering() {
        let (store, mut rx) = test_store();
        store
            .upsert_from_observation(observation("a", 1000, 1000))
            .await;
        drain(&mut rx);

        // InProgress before Queued is rejected.
        assert!(store.mark_converting("a").await.is_err());
        assert!(store.mark_converted("a").await.is_err());

        store.mark_queued("a").await.unwrap();
        store.mark_converting("a").await.unwrap();
        let done = store.mark_converted("a").await.unwrap();
        assert_eq!(done.conversion, ConversionStatus::Converted);
        assert!(done.converted_at.is_some());
        assert_eq!(
            drain(&mut rx),
            vec![EventKind::QueuedForConversion, EventKind::ConversionCompleted]
        );
    }

    #[tokio::test]
    async fn test_queued_timestamp_implies_scheduled_state() {
        let (store, _rx) = test_store();
        store
            .upsert_from_observation(observation("a", 1000, 1000))
            .await;
        store.mark_queued("a").await.unwrap();
        store.mark_converting("a").await.unwrap();
        store.mark_failed("a").await.unwrap();

        for item in store.list().await {
            if item.conversion_queued_at.is_some() {
                assert!(matches!(
                    item.conversion,
                    ConversionStatus::Queued
                        | ConversionStatus::InProgress
                        | ConversionStatus::Converted
                        | ConversionStatus::Failed
                ));
            }
        }
    }

    #[tokio::test]
    async fn test_pause_and_resume() {
        let (store, mut rx) = test_store();
        store
            .upsert_from_observation(observation("a", 500, 1000))
            .await;
        drain(&mut rx);

        let paused = store.mark_paused("a").await.unwrap();
        assert_eq!(paused.acquisition, AcquisitionStatus::Paused);
        // Pausing again no-ops.
        store.mark_paused("a").await.unwrap();
        assert_eq!(drain(&mut rx), vec![EventKind::Paused]);

        let resumed = store.mark_resumed("a").await.unwrap();
        assert_eq!(resumed.acquisition, AcquisitionStatus::Acquiring);
        assert_eq!(drain(&mut rx), vec![EventKind::Resumed]);
    }

    #[tokio::test]
    async fn test_resume_of_finished_item_stays_completed() {
        let (store, _rx) = test_store();
        store
            .upsert_from_observation(observation("a", 1000, 1000))
            .await;
        store.mark_paused("a").await.unwrap();

        let resumed = store.mark_resumed("a").await.unwrap();
        assert_eq!(resumed.acquisition, AcquisitionStatus::Completed);
        assert!(resumed.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_pause_of_finished_item_does_not_refire_completion() {
        let (store, mut rx) = test_store();
        store
            .upsert_from_observation(observation("a", 1000, 1000))
            .await;
        store.mark_paused("a").await.unwrap();
        drain(&mut rx);

        // Engine still reports the item as fully downloaded.
        store
            .upsert_from_observation(observation("a", 1000, 1000))
            .await;
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_remove() {
        let (store, _rx) = test_store();
        store
            .upsert_from_observation(observation("a", 500, 1000))
            .await;

        store.remove("a").await.unwrap();
        assert!(store.get("a").await.is_err());
        assert!(matches!(
            store.remove("a").await,
            Err(LedgerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_is_already_processed() {
        let (store, _rx) = test_store();
        assert!(!store.is_already_processed("a").await);

        store
            .upsert_from_observation(observation("a", 1000, 1000))
            .await;
        assert!(!store.is_already_processed("a").await);

        store.mark_queued("a").await.unwrap();
        assert!(store.is_already_processed("a").await);

        store.mark_converting("a").await.unwrap();
        store.mark_failed("a").await.unwrap();
        // Failed items may be processed again.
        assert!(!store.is_already_processed("a").await);
    }

    #[tokio::test]
    async fn test_set_media_files_only_after_conversion() {
        let (store, _rx) = test_store();
        store
            .upsert_from_observation(observation("a", 1000, 1000))
            .await;

        let files = vec![MediaFile {
            path: "/media/item-a/movie.mkv".to_string(),
            metadata: None,
            error: None,
        }];

        assert!(store.set_media_files("a", files.clone()).await.is_err());

        store.mark_queued("a").await.unwrap();
        store.mark_converting("a").await.unwrap();
        store.mark_converted("a").await.unwrap();

        let item = store.set_media_files("a", files.clone()).await.unwrap();
        assert_eq!(item.media_files.as_ref().unwrap().len(), 1);

        // Populated once: a second call leaves the original in place.
        let again = store.set_media_files("a", Vec::new()).await.unwrap();
        assert_eq!(again.media_files.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_is_sorted_snapshot() {
        let (store, _rx) = test_store();
        store
            .upsert_from_observation(observation("b", 0, 100))
            .await;
        store
            .upsert_from_observation(observation("a", 0, 100))
            .await;

        let listed = store.list().await;
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, "a");
        assert_eq!(listed[1].id, "b");

        // Mutating the snapshot must not touch the store.
        let mut copy = listed;
        copy[0].display_name = "changed".to_string();
        assert_eq!(store.get("a").await.unwrap().display_name, "item-a");
    }
}
