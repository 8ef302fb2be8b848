//! In-process status sink
//!
//! [`MetricsStatusWriter`] is the [`StatusWriter`] used by the binary. With no
//! resource API to write back to, statuses are mirrored into the Prometheus
//! gauges and kept in memory for `GET /status`.

use crate::cluster::client::StatusWriter;
use crate::cluster::resources::{CollectorStatus, DiscoveryStatus};
use crate::cluster::types::Key;
use crate::error::Result;
use crate::metrics::MetricsCollector;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

#[derive(Debug, Clone, Serialize)]
pub struct KeyedStatus<T> {
    pub namespace: String,
    pub name: String,
    pub status: T,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusSnapshot {
    pub discoveries: Vec<KeyedStatus<DiscoveryStatus>>,
    pub collectors: Vec<KeyedStatus<CollectorStatus>>,
}

fn keyed<T: Clone>(map: &BTreeMap<Key, T>) -> Vec<KeyedStatus<T>> {
    map.iter()
        .map(|(k, v)| KeyedStatus {
            namespace: k.namespace.clone(),
            name: k.name.clone(),
            status: v.clone(),
        })
        .collect()
}

pub struct MetricsStatusWriter {
    metrics: MetricsCollector,
    discoveries: RwLock<BTreeMap<Key, DiscoveryStatus>>,
    collectors: RwLock<BTreeMap<Key, CollectorStatus>>,
}

impl MetricsStatusWriter {
    pub fn new(metrics: MetricsCollector) -> Self {
        Self {
            metrics,
            discoveries: RwLock::new(BTreeMap::new()),
            collectors: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn discovery_status(&self, key: &Key) -> Option<DiscoveryStatus> {
        self.discoveries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn collector_status(&self, key: &Key) -> Option<CollectorStatus> {
        self.collectors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            discoveries: keyed(&*self.discoveries.read().unwrap_or_else(PoisonError::into_inner)),
            collectors: keyed(&*self.collectors.read().unwrap_or_else(PoisonError::into_inner)),
        }
    }
}

#[async_trait]
impl StatusWriter for MetricsStatusWriter {
    async fn update_discovery_status(&self, key: &Key, status: &DiscoveryStatus) -> Result<()> {
        self.metrics.record_discovery(key, status);
        self.discoveries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), status.clone());
        Ok(())
    }

    async fn update_collector_status(&self, key: &Key, status: &CollectorStatus) -> Result<()> {
        self.metrics.record_collector(key, status);
        self.collectors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), status.clone());
        Ok(())
    }

    fn forget_discovery(&self, key: &Key) {
        self.metrics.forget_discovery(key);
        self.discoveries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    fn forget_collector(&self, key: &Key) {
        self.metrics.forget_collector(key);
        self.collectors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}
