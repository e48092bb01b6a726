//! Item records and status enums persisted by the ledger.
//!
//! Every media item is tracked on two independent axes:
//!
//! - [`AcquisitionStatus`]: where the download stands (`Acquiring`,
//!   `Paused`, `Completed`)
//! - [`ConversionStatus`]: where the HLS conversion stands (`NotStarted`,
//!   `Queued`, `InProgress`, `Converted`, `Failed`)
//!
//! Keeping the axes separate avoids illegal combined states; the store in
//! [`crate::ledger::store`] is the only place either axis is mutated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::media::probe::MediaMetadata;

/// Download-side lifecycle of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionStatus {
    Acquiring,
    Paused,
    Completed,
}

/// Conversion-side lifecycle of an item.
///
/// Progression is NotStarted -> Queued -> InProgress -> Converted | Failed.
/// Failed is a legal re-entry point for Queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionStatus {
    NotStarted,
    Queued,
    InProgress,
    Converted,
    Failed,
}

/// One media file belonging to a converted item, with the probe result
/// (or the probe failure) attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaFile {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MediaMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Durable lifecycle record for one downloadable media item.
///
/// Keyed by the engine-assigned content identifier; serialized as-is into
/// the JSON state file and over the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaItem {
    pub id: String,
    pub display_name: String,
    /// Opaque locator sufficient to re-acquire the content (magnet-style
    /// URI or descriptor file path).
    pub locator: String,
    pub total_size: u64,
    pub downloaded_percent: f32,
    pub acquisition: AcquisitionStatus,
    pub conversion: ConversionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversion_queued_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub converted_at: Option<DateTime<Utc>>,
    pub last_observed_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_files: Option<Vec<MediaFile>>,
}

impl MediaItem {
    /// Whether this item has ever finished downloading.
    ///
    /// Pausing a finished item keeps `completed_at`, so this survives
    /// Paused and is only reset when the download regresses.
    pub fn was_completed(&self) -> bool {
        self.completed_at.is_some() || self.acquisition == AcquisitionStatus::Completed
    }

    /// Whether conversion work is already queued, running, or done.
    ///
    /// Failed intentionally returns false: a failed item may be queued
    /// again.
    pub fn conversion_scheduled(&self) -> bool {
        matches!(
            self.conversion,
            ConversionStatus::Queued | ConversionStatus::InProgress | ConversionStatus::Converted
        )
    }
}

/// A point-in-time view of one item as reported by the acquisition engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub id: String,
    pub display_name: String,
    pub locator: String,
    pub total_size: u64,
    pub bytes_completed: u64,
}

impl Observation {
    /// Downloaded fraction in percent, truncated to two decimals the way
    /// the progress is displayed.
    pub fn downloaded_percent(&self) -> f32 {
        if self.total_size == 0 {
            return 0.0;
        }
        let raw = 10_000.0 * (self.bytes_completed as f64 / self.total_size as f64);
        (raw.trunc() as i64) as f32 / 100.0
    }

    /// Download finished: every byte accounted for.
    pub fn is_done(&self) -> bool {
        self.total_size > 0 && self.bytes_completed >= self.total_size
    }

    /// Build a fresh record from this observation.
    pub fn into_item(self, now: DateTime<Utc>) -> MediaItem {
        let done = self.is_done();
        let percent = self.downloaded_percent();
        MediaItem {
            id: self.id,
            display_name: self.display_name,
            locator: self.locator,
            total_size: self.total_size,
            downloaded_percent: percent,
            acquisition: if done {
                AcquisitionStatus::Completed
            } else {
                AcquisitionStatus::Acquiring
            },
            conversion: ConversionStatus::NotStarted,
            completed_at: if done { Some(now) } else { None },
            conversion_queued_at: None,
            converted_at: None,
            last_observed_at: now,
            media_files: None,
        }
    }
}
