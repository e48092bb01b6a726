//! Bounded conversion work queue.
//!
//! A FIFO of item snapshots awaiting the transcoding worker. Enqueueing
//! never blocks: a full queue rejects with [`QueueError::Full`], which
//! callers surface as a retryable error. Duplicate prevention is not this
//! queue's job — the state machine guard in the ledger refuses to queue an
//! item that is already scheduled, so anything handed here was just
//! transitioned into Queued.

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

use crate::ledger::records::MediaItem;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("conversion queue is full")]
    Full,

    #[error("conversion queue is closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, QueueError>;

/// Producer half of the conversion queue. Cheap to clone; the single
/// consumer owns the receiver returned by [`ConversionQueue::new`].
#[derive(Clone)]
pub struct ConversionQueue {
    tx: mpsc::Sender<MediaItem>,
}

impl ConversionQueue {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<MediaItem>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Hand an item to the worker, failing fast under backpressure.
    pub fn enqueue(&self, item: MediaItem) -> Result<()> {
        match self.tx.try_send(item) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(item)) => {
                debug!(id = %item.id, "Conversion queue is full");
                Err(QueueError::Full)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(QueueError::Closed),
        }
    }
}
