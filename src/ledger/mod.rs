//! Durable item ledger.
//!
//! The ledger is the sole owner of the authoritative content-id -> record
//! map and its on-disk mirror. It persists:
//!
//! - Lifecycle records (acquisition progress, conversion progress,
//!   milestone timestamps)
//! - Probed media file info for converted items
//!
//! ## Architecture
//!
//! The [`StateStore`] holds the map behind a readers-many/writer-one lock
//! and exposes transition-style methods only; no caller ever sees the map
//! itself. Successful transitions emit events on the
//! [`crate::events::EventBus`] and nudge the background saver in
//! [`persist`], which rewrites a single JSON snapshot file via
//! write-temp-then-rename.
//!
//! ## Crash consistency
//!
//! The snapshot file is always either the previous complete state or the
//! new complete state. A missing file means an empty ledger; a corrupt
//! file is logged and ignored (degraded start, not fatal).

pub mod error;
pub mod persist;
pub mod records;
pub mod store;

pub use error::{LedgerError, Result};
pub use records::{
    AcquisitionStatus, ConversionStatus, MediaFile, MediaItem, Observation,
};
pub use store::{QueueOutcome, StateStore};
