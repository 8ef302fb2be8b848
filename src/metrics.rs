//! Prometheus Metrics Definitions
//!
//! Self-observability for the collector process. Every status object written
//! by a discovery or collector pool is mirrored here so the process itself
//! can be scraped.
//!
//! # Metric Categories
//!
//! ## Collector Pools
//! - Metrics sent, errors, filtered and collected (lifetime totals)
//! - Channel queue depth and registered discoveries
//!
//! ## Discoveries
//! - Active flag, targets found, ready vs total collectors
//! - Queue depth summed over fed collectors, last cycle timestamp
//!
//! All series carry `namespace` and `name` labels identifying the resource,
//! and use the `strata_` namespace prefix.

use crate::cluster::resources::{CollectorStatus, DiscoveryStatus};
use crate::cluster::types::Key;
use prometheus::{Encoder, Gauge, GaugeVec, Opts, Registry, TextEncoder};
use std::sync::Arc;

const NAMESPACE: &str = "strata";
const LABELS: &[&str] = &["namespace", "name"];

fn gauge_vec(name: &str, help: &str) -> prometheus::Result<GaugeVec> {
    GaugeVec::new(Opts::new(name, help).namespace(NAMESPACE), LABELS)
}

#[derive(Clone)]
pub struct MetricsCollector {
    registry: Arc<Registry>,

    // Collector pools
    pub collector_sent: Arc<GaugeVec>,
    pub collector_errors: Arc<GaugeVec>,
    pub collector_filtered: Arc<GaugeVec>,
    pub collector_metrics_collected: Arc<GaugeVec>,
    pub collector_in_flight: Arc<GaugeVec>,
    pub collector_registered_discoveries: Arc<GaugeVec>,

    // Discoveries
    pub discovery_active: Arc<GaugeVec>,
    pub discovery_resources: Arc<GaugeVec>,
    pub discovery_ready_collectors: Arc<GaugeVec>,
    pub discovery_total_collectors: Arc<GaugeVec>,
    pub discovery_in_flight: Arc<GaugeVec>,
    pub discovery_last_timestamp_seconds: Arc<GaugeVec>,

    pub up: Arc<Gauge>,
}

impl MetricsCollector {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let collector_sent = gauge_vec(
            "collector_sent",
            "Metrics successfully sent to the sink since the pool started",
        )?;
        let collector_errors = gauge_vec(
            "collector_errors",
            "Scrape, parse, encode and send failures since the pool started",
        )?;
        let collector_filtered = gauge_vec(
            "collector_filtered",
            "Metrics dropped by the filter chain since the pool started",
        )?;
        let collector_metrics_collected = gauge_vec(
            "collector_metrics_collected",
            "Metrics collected and shipped since the pool started",
        )?;
        let collector_in_flight = gauge_vec(
            "collector_in_flight_resources",
            "Targets waiting in the collector channel",
        )?;
        let collector_registered_discoveries = gauge_vec(
            "collector_registered_discoveries",
            "Discoveries referencing this collector",
        )?;

        let discovery_active = gauge_vec(
            "discovery_active",
            "Discovery status (1=active, 0=inactive)",
        )?;
        let discovery_resources = gauge_vec(
            "discovery_discovered_resources",
            "Targets found in the last discovery cycle",
        )?;
        let discovery_ready_collectors = gauge_vec(
            "discovery_ready_collectors",
            "Referenced collectors that exist and are enabled",
        )?;
        let discovery_total_collectors = gauge_vec(
            "discovery_total_collectors",
            "Collectors referenced by the discovery",
        )?;
        let discovery_in_flight = gauge_vec(
            "discovery_in_flight_resources",
            "Targets waiting across all collectors this discovery feeds",
        )?;
        let discovery_last_timestamp_seconds = gauge_vec(
            "discovery_last_discovered_timestamp_seconds",
            "Unix time of the last completed discovery cycle",
        )?;

        let up = Gauge::with_opts(
            Opts::new("up", "Collector service status (1=running)").namespace(NAMESPACE),
        )?;

        registry.register(Box::new(collector_sent.clone()))?;
        registry.register(Box::new(collector_errors.clone()))?;
        registry.register(Box::new(collector_filtered.clone()))?;
        registry.register(Box::new(collector_metrics_collected.clone()))?;
        registry.register(Box::new(collector_in_flight.clone()))?;
        registry.register(Box::new(collector_registered_discoveries.clone()))?;
        registry.register(Box::new(discovery_active.clone()))?;
        registry.register(Box::new(discovery_resources.clone()))?;
        registry.register(Box::new(discovery_ready_collectors.clone()))?;
        registry.register(Box::new(discovery_total_collectors.clone()))?;
        registry.register(Box::new(discovery_in_flight.clone()))?;
        registry.register(Box::new(discovery_last_timestamp_seconds.clone()))?;
        registry.register(Box::new(up.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            collector_sent: Arc::new(collector_sent),
            collector_errors: Arc::new(collector_errors),
            collector_filtered: Arc::new(collector_filtered),
            collector_metrics_collected: Arc::new(collector_metrics_collected),
            collector_in_flight: Arc::new(collector_in_flight),
            collector_registered_discoveries: Arc::new(collector_registered_discoveries),
            discovery_active: Arc::new(discovery_active),
            discovery_resources: Arc::new(discovery_resources),
            discovery_ready_collectors: Arc::new(discovery_ready_collectors),
            discovery_total_collectors: Arc::new(discovery_total_collectors),
            discovery_in_flight: Arc::new(discovery_in_flight),
            discovery_last_timestamp_seconds: Arc::new(discovery_last_timestamp_seconds),
            up: Arc::new(up),
        })
    }

    pub fn record_collector(&self, key: &Key, status: &CollectorStatus) {
        let labels = [key.namespace.as_str(), key.name.as_str()];
        self.collector_sent
            .with_label_values(&labels)
            .set(status.total_sent as f64);
        self.collector_errors
            .with_label_values(&labels)
            .set(status.total_errors as f64);
        self.collector_filtered
            .with_label_values(&labels)
            .set(status.total_filtered as f64);
        self.collector_metrics_collected
            .with_label_values(&labels)
            .set(status.metrics_collected as f64);
        self.collector_in_flight
            .with_label_values(&labels)
            .set(status.in_flight_resources as f64);
        self.collector_registered_discoveries
            .with_label_values(&labels)
            .set(status.registered_discoveries as f64);
    }

    pub fn record_discovery(&self, key: &Key, status: &DiscoveryStatus) {
        let labels = [key.namespace.as_str(), key.name.as_str()];
        self.discovery_active
            .with_label_values(&labels)
            .set(if status.active { 1.0 } else { 0.0 });
        self.discovery_resources
            .with_label_values(&labels)
            .set(status.discovered_resources_count as f64);
        self.discovery_ready_collectors
            .with_label_values(&labels)
            .set(status.ready_collectors as f64);
        self.discovery_total_collectors
            .with_label_values(&labels)
            .set(status.total_collectors as f64);
        self.discovery_in_flight
            .with_label_values(&labels)
            .set(status.in_flight_resources as f64);
        if let Some(ts) = status.last_discovered {
            self.discovery_last_timestamp_seconds
                .with_label_values(&labels)
                .set(ts.timestamp() as f64);
        }
    }

    /// Drops every series for a deleted collector.
    pub fn forget_collector(&self, key: &Key) {
        let labels = [key.namespace.as_str(), key.name.as_str()];
        for vec in [
            &self.collector_sent,
            &self.collector_errors,
            &self.collector_filtered,
            &self.collector_metrics_collected,
            &self.collector_in_flight,
            &self.collector_registered_discoveries,
        ] {
            let _ = vec.remove_label_values(&labels);
        }
    }

    /// Drops every series for a deleted discovery.
    pub fn forget_discovery(&self, key: &Key) {
        let labels = [key.namespace.as_str(), key.name.as_str()];
        for vec in [
            &self.discovery_active,
            &self.discovery_resources,
            &self.discovery_ready_collectors,
            &self.discovery_total_collectors,
            &self.discovery_in_flight,
            &self.discovery_last_timestamp_seconds,
        ] {
            let _ = vec.remove_label_values(&labels);
        }
    }

    /// Render metrics in Prometheus text format
    pub fn render(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
