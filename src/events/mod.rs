//! Lifecycle event bus.
//!
//! A bounded, best-effort channel decoupling state transitions from the
//! reactions they trigger. Delivery is at-most-once: when the channel is
//! full the event is dropped with a warning. That is safe because every
//! event is re-derivable from the ledger — a dropped event delays a
//! reaction, it never loses state.

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::ledger::records::MediaItem;

/// What happened to an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Record restored from the state file at startup.
    Loaded,
    /// Download crossed the not-done -> done edge.
    DownloadCompleted,
    QueuedForConversion,
    ConversionCompleted,
    Paused,
    Resumed,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Loaded => "loaded",
            EventKind::DownloadCompleted => "download_completed",
            EventKind::QueuedForConversion => "queued_for_conversion",
            EventKind::ConversionCompleted => "conversion_completed",
            EventKind::Paused => "paused",
            EventKind::Resumed => "resumed",
        }
    }
}

/// One event, carrying the post-transition record by value so consumers
/// cannot race with later mutation.
#[derive(Debug, Clone)]
pub struct Event {
    pub kind: EventKind,
    pub item: MediaItem,
    pub timestamp: DateTime<Utc>,
}

/// Sending half of the event bus. Cheap to clone.
#[derive(Clone)]
pub struct EventBus {
    tx: mpsc::Sender<Event>,
}

impl EventBus {
    /// Create a bus with the given capacity, returning the single
    /// consumer's receiver.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Emit an event, dropping it if the channel is full or closed.
    pub fn emit(&self, kind: EventKind, item: MediaItem) {
        let event = Event {
            kind,
            item,
            timestamp: Utc::now(),
        };
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(
                    kind = event.kind.as_str(),
                    id = %event.item.id,
                    "Event channel full, dropping event"
                );
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                // Consumer already shut down
                debug!(
                    kind = event.kind.as_str(),
                    id = %event.item.id,
                    "Event channel closed, dropping event"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::records::Observation;

    fn test_item(id: &str) -> MediaItem {
        Observation {
            id: id.to_string(),
            display_name: "item".to_string(),
            locator: format!("magnet:?xt=urn:btih:{id}"),
            total_size: 100,
            bytes_completed: 100,
        }
        .into_item(Utc::now())
    }

    #[tokio::test]
    async fn test_emit_and_receive() {
        let (bus, mut rx) = EventBus::new(4);
        bus.emit(EventKind::DownloadCompleted, test_item("a"));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, EventKind::DownloadCompleted);
        assert_eq!(event.item.id, "a");
    }

    #[tokio::test]
    async fn test_full_channel_drops_without_blocking() {
        let (bus, mut rx) = EventBus::new(2);
        bus.emit(EventKind::Paused, test_item("a"));
        bus.emit(EventKind::Paused, test_item("b"));
        // Channel is full; this must return immediately and drop.
        bus.emit(EventKind::Paused, test_item("c"));

        assert_eq!(rx.recv().await.unwrap().item.id, "a");
        assert_eq!(rx.recv().await.unwrap().item.id, "b");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_closed_channel_is_not_an_error() {
        let (bus, rx) = EventBus::new(2);
        drop(rx);
        // Must not panic or block.
        bus.emit(EventKind::Resumed, test_item("a"));
    }
}
