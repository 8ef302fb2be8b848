//! Collector Pools
//!
//! A collector pool is a fixed number of workers draining one shared bounded
//! channel owned by the [`Registry`]. Targets go to whichever worker is free
//! first; there is no ordering across workers.
//!
//! # Lifecycle
//!
//! - [`Collector::start`] binds the workers to the channel's receive end.
//! - [`Collector::stop`] is used when the pool is replaced. Workers finish the
//!   target in hand and detach; anything still buffered stays in the channel
//!   for the replacement pool.
//! - [`Collector::close`] is used when the pool is deleted, after the Registry
//!   has closed the channel. Workers drain what is left, then the sink is
//!   closed.
//!
//! # Status
//!
//! With a status reporter attached, the pool periodically writes its
//! [`CollectorStatus`](crate::cluster::resources::CollectorStatus): the
//! accumulated counters plus the Registry's view of queue depth and
//! registered discoveries.

pub mod scrape;
pub mod stats;
pub mod worker;

use crate::cluster::client::StatusWriter;
use crate::cluster::resources::CollectorSpec;
use crate::cluster::types::Key;
use crate::encoder::encoder_for;
use crate::filter::FilterChain;
use crate::registry::Registry;
use crate::sink::Sink;
use crate::target::Target;
use async_trait::async_trait;
use futures_util::future::join_all;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub use scrape::Scraper;
pub use stats::CollectionStats;
pub use worker::Pipeline;

/// Shortest period between status reports. `tokio::time::interval` rejects zero.
pub const MIN_STATUS_INTERVAL: Duration = Duration::from_millis(10);

/// A running consumer of one Registry channel.
#[async_trait]
pub trait Collector: Send + Sync {
    fn start(&mut self, receiver: flume::Receiver<Target>);

    /// Detach from the channel without draining it.
    async fn stop(&mut self);

    /// Drain the (already closed) channel and release the sink.
    async fn close(&mut self);
}

struct StatusReporter {
    registry: Weak<Registry>,
    writer: Arc<dyn StatusWriter>,
    interval: Duration,
}

pub struct CollectorPool {
    key: Key,
    workers: usize,
    pipeline: Arc<Pipeline>,
    reporter: Option<StatusReporter>,
    stop_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
    reporter_handle: Option<JoinHandle<()>>,
}

impl CollectorPool {
    /// Builds an unstarted pool. The sink must already be connected.
    pub fn new(key: Key, spec: &CollectorSpec, scraper: Scraper, sink: Arc<dyn Sink>) -> Self {
        let pipeline = Pipeline {
            key: key.clone(),
            scraper,
            filters: FilterChain::from_config(&spec.filters),
            encoder: encoder_for(&spec.encoder),
            sink,
            stats: Arc::new(CollectionStats::new()),
            include_metadata: spec.include_metadata,
            include_labels: spec.include_labels.clone(),
            include_annotations: spec.include_annotations.clone(),
        };

        let (stop_tx, _) = watch::channel(false);

        Self {
            key,
            workers: spec.workers.max(1),
            pipeline: Arc::new(pipeline),
            reporter: None,
            stop_tx,
            handles: Vec::new(),
            reporter_handle: None,
        }
    }

    pub fn with_status_reporter(
        mut self,
        registry: Weak<Registry>,
        writer: Arc<dyn StatusWriter>,
        interval: Duration,
    ) -> Self {
        self.reporter = Some(StatusReporter {
            registry,
            writer,
            interval: interval.max(MIN_STATUS_INTERVAL),
        });
        self
    }

    pub fn stats(&self) -> Arc<CollectionStats> {
        self.pipeline.stats.clone()
    }

    pub fn running_workers(&self) -> usize {
        self.handles.iter().filter(|h| !h.is_finished()).count()
    }

    fn spawn_reporter(&self, reporter: &StatusReporter) -> JoinHandle<()> {
        let key = self.key.clone();
        let stats = self.pipeline.stats.clone();
        let registry = reporter.registry.clone();
        let writer = reporter.writer.clone();
        let period = reporter.interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;

                let Some(registry) = registry.upgrade() else {
                    break;
                };
                let registered = registry.registered_with_collector(&key).await;
                let in_flight = registry.in_flight_resources(&key).await.unwrap_or(0);
                drop(registry);

                stats.set_registered_discoveries(registered as u64);
                stats.set_in_flight_resources(in_flight as u64);

                let status = stats.snapshot();
                if let Err(e) = writer.update_collector_status(&key, &status).await {
                    warn!(collector = %key, "Failed to update collector status: {}", e);
                }
            }
        })
    }

    fn abort_reporter(&mut self) {
        if let Some(handle) = self.reporter_handle.take() {
            handle.abort();
        }
    }
}

#[async_trait]
impl Collector for CollectorPool {
    fn start(&mut self, receiver: flume::Receiver<Target>) {
        for id in 0..self.workers {
            let handle = tokio::spawn(worker::run(
                id,
                self.pipeline.clone(),
                receiver.clone(),
                self.stop_tx.subscribe(),
            ));
            self.handles.push(handle);
        }

        if let Some(reporter) = &self.reporter {
            self.reporter_handle = Some(self.spawn_reporter(reporter));
        }

        info!(
            collector = %self.key,
            workers = self.workers,
            sink = self.pipeline.sink.name(),
            "Collector pool started"
        );
    }

    async fn stop(&mut self) {
        if *self.stop_tx.borrow() {
            return;
        }
        self.stop_tx.send_replace(true);
        self.abort_reporter();

        // Workers leave at their next receive; release the sink once they have.
        let handles = std::mem::take(&mut self.handles);
        let sink = self.pipeline.sink.clone();
        let key = self.key.clone();
        tokio::spawn(async move {
            join_all(handles).await;
            if let Err(e) = sink.close().await {
                warn!(collector = %key, "Failed to close sink: {}", e);
            }
            debug!(collector = %key, "Replaced collector pool retired");
        });

        info!(collector = %self.key, "Collector pool stopped");
    }

    async fn close(&mut self) {
        self.abort_reporter();

        join_all(std::mem::take(&mut self.handles)).await;

        if let Err(e) = self.pipeline.sink.close().await {
            warn!(collector = %self.key, "Failed to close sink: {}", e);
        }

        let status = self.pipeline.stats.snapshot();
        info!(
            collector = %self.key,
            sent = status.total_sent,
            errors = status.total_errors,
            filtered = status.total_filtered,
            "Collector pool closed"
        );
    }
}
