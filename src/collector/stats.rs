//! Collector pool counters
//!
//! Workers bump these concurrently; the status reporter reads them. Nothing
//! resets them except an explicit [`CollectionStats::reset`].

use crate::cluster::resources::CollectorStatus;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct CollectionStats {
    registered_discoveries: AtomicU64,
    in_flight_resources: AtomicU64,
    total_sent: AtomicU64,
    total_errors: AtomicU64,
    total_filtered: AtomicU64,
    metrics_collected: AtomicU64,
}

impl CollectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_sent(&self) {
        self.total_sent.fetch_add(1, Ordering::Relaxed);
        self.metrics_collected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.total_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_filtered(&self) {
        self.total_filtered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_registered_discoveries(&self, n: u64) {
        self.registered_discoveries.store(n, Ordering::Relaxed);
    }

    pub fn set_in_flight_resources(&self, n: u64) {
        self.in_flight_resources.store(n, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        for counter in [
            &self.total_sent,
            &self.total_errors,
            &self.total_filtered,
            &self.metrics_collected,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> CollectorStatus {
        CollectorStatus {
            registered_discoveries: self.registered_discoveries.load(Ordering::Relaxed),
            in_flight_resources: self.in_flight_resources.load(Ordering::Relaxed),
            total_sent: self.total_sent.load(Ordering::Relaxed),
            total_errors: self.total_errors.load(Ordering::Relaxed),
            total_filtered: self.total_filtered.load(Ordering::Relaxed),
            metrics_collected: self.metrics_collected.load(Ordering::Relaxed),
        }
    }
}
