//! Observability stubs (metrics, tracing)

use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics handle for recording pipeline counters
#[derive(Debug, Default)]
pub struct Metrics {
    items_added: AtomicU64,
    downloads_completed: AtomicU64,
    conversions_queued: AtomicU64,
    conversions_completed: AtomicU64,
    conversions_failed: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn item_added(&self) {
        self.items_added.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "items_added", "Metric incremented");
    }

    pub fn download_completed(&self) {
        self.downloads_completed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "downloads_completed", "Metric incremented");
    }

    pub fn conversion_queued(&self) {
        self.conversions_queued.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "conversions_queued", "Metric incremented");
    }

    pub fn conversion_completed(&self) {
        self.conversions_completed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "conversions_completed", "Metric incremented");
    }

    pub fn conversion_failed(&self) {
        self.conversions_failed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "conversions_failed", "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            items_added: self.items_added.load(Ordering::Relaxed),
            downloads_completed: self.downloads_completed.load(Ordering::Relaxed),
            conversions_queued: self.conversions_queued.load(Ordering::Relaxed),
            conversions_completed: self.conversions_completed.load(Ordering::Relaxed),
            conversions_failed: self.conversions_failed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub items_added: u64,
    pub downloads_completed: u64,
    pub conversions_queued: u64,
    pub conversions_completed: u64,
    pub conversions_failed: u64,
}
