//! Collector worker
//!
//! Each worker pulls targets from the pool's shared channel and runs them
//! through scrape, parse, filter, encode and send. Per-item failures are
//! counted and logged; they never end the worker.
//!
//! A worker exits when:
//! - the channel is disconnected and empty (the pool was deleted), or
//! - the pool's stop signal is raised (the pool was replaced); buffered
//!   targets are left in the channel for the successor.
//!
//! Neither condition interrupts a target that has already been received.

use super::scrape::Scraper;
use super::stats::CollectionStats;
use crate::cluster::types::Key;
use crate::encoder::Encoder;
use crate::filter::FilterChain;
use crate::metric::parse_exposition_with_tags;
use crate::sink::Sink;
use crate::target::Target;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, trace, warn};

/// Everything a worker needs to process a target, shared by the whole pool.
pub struct Pipeline {
    pub key: Key,
    pub scraper: Scraper,
    pub filters: FilterChain,
    pub encoder: Box<dyn Encoder>,
    pub sink: Arc<dyn Sink>,
    pub stats: Arc<CollectionStats>,
    pub include_metadata: bool,
    pub include_labels: Vec<String>,
    pub include_annotations: Vec<String>,
}

impl Pipeline {
    /// Scrapes one target and ships every surviving metric.
    pub async fn process(&self, worker: usize, target: &Target) {
        let url = target.url();

        let body = match self.scraper.fetch(&url).await {
            Ok(body) => body,
            Err(e) => {
                self.stats.record_error();
                warn!(collector = %self.key, worker, "Failed to scrape {}: {}", url, e);
                return;
            }
        };

        let tags = target.tags(
            self.include_metadata,
            &self.include_labels,
            &self.include_annotations,
        );

        let metrics = match parse_exposition_with_tags(Utc::now(), &body, &tags) {
            Ok(metrics) => metrics,
            Err(e) => {
                self.stats.record_error();
                warn!(collector = %self.key, worker, "Failed to parse {}: {}", url, e);
                return;
            }
        };

        let total = metrics.len();
        let mut shipped = 0usize;

        for metric in &metrics {
            if let Some(filter) = self.filters.first_match(metric) {
                self.stats.record_filtered();
                trace!(collector = %self.key, filter, metric = %metric.name, "Dropped metric");
                continue;
            }

            let data = match self.encoder.encode(metric) {
                Ok(data) => data,
                Err(e) => {
                    self.stats.record_error();
                    warn!(collector = %self.key, worker, "Failed to encode {}: {}", metric.name, e);
                    continue;
                }
            };

            match self.sink.send(&data).await {
                Ok(()) => {
                    self.stats.record_sent();
                    shipped += 1;
                }
                Err(e) => {
                    self.stats.record_error();
                    warn!(
                        collector = %self.key,
                        worker,
                        sink = self.sink.name(),
                        "Failed to send {}: {}",
                        metric.name,
                        e
                    );
                }
            }
        }

        debug!(collector = %self.key, worker, "Scraped {}: {}/{} metrics sent", url, shipped, total);
    }
}

/// Resolves once the stop flag is raised. A dropped sender never resolves.
async fn stopped(stop: &mut watch::Receiver<bool>) {
    loop {
        if *stop.borrow_and_update() {
            return;
        }
        if stop.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

pub async fn run(
    id: usize,
    pipeline: Arc<Pipeline>,
    receiver: flume::Receiver<Target>,
    mut stop: watch::Receiver<bool>,
) {
    debug!(collector = %pipeline.key, worker = id, "Worker started");

    loop {
        let target = tokio::select! {
            biased;
            _ = stopped(&mut stop) => break,
            received = receiver.recv_async() => match received {
                Ok(target) => target,
                Err(flume::RecvError::Disconnected) => break,
            },
        };

        pipeline.process(id, &target).await;
    }

    debug!(collector = %pipeline.key, worker = id, "Worker exited");
}
