//! Instance factory
//!
//! The [`Manager`] is what a reconciliation layer talks to. It validates a
//! resource spec, builds the matching discovery or collector instance and
//! installs it in the [`Registry`].

use crate::cluster::client::{ClusterClient, StatusWriter};
use crate::cluster::resources::{CollectorSpec, DiscoverySpec};
use crate::cluster::types::Key;
use crate::collector::scrape::DEFAULT_SCRAPE_TIMEOUT;
use crate::collector::{CollectorPool, Scraper, MIN_STATUS_INTERVAL};
use crate::discovery::DiscoveryInstance;
use crate::error::Result;
use crate::registry::Registry;
use crate::sink::{sink_for, Sink};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_STATUS_INTERVAL: Duration = Duration::from_secs(10);

pub struct Manager {
    registry: Arc<Registry>,
    cluster: Arc<dyn ClusterClient>,
    status: Option<Arc<dyn StatusWriter>>,
    scrape_timeout: Duration,
    status_interval: Duration,
}

impl Manager {
    pub fn new(cluster: Arc<dyn ClusterClient>) -> Self {
        Self {
            registry: Arc::new(Registry::new()),
            cluster,
            status: None,
            scrape_timeout: DEFAULT_SCRAPE_TIMEOUT,
            status_interval: DEFAULT_STATUS_INTERVAL,
        }
    }

    pub fn with_status_writer(mut self, writer: Arc<dyn StatusWriter>) -> Self {
        self.status = Some(writer);
        self
    }

    pub fn with_scrape_timeout(mut self, timeout: Duration) -> Self {
        self.scrape_timeout = timeout;
        self
    }

    /// Sets how often pools report their status. Clamped to
    /// [`MIN_STATUS_INTERVAL`].
    pub fn with_status_interval(mut self, interval: Duration) -> Self {
        self.status_interval = interval.max(MIN_STATUS_INTERVAL);
        self
    }

    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    pub async fn add_discovery_service(&self, key: Key, spec: DiscoverySpec) -> Result<()> {
        spec.validate()?;

        let mut instance = DiscoveryInstance::new(
            key.clone(),
            spec,
            self.cluster.clone(),
            Arc::downgrade(&self.registry),
        );
        if let Some(writer) = &self.status {
            instance = instance.with_status_writer(writer.clone());
        }

        self.registry
            .add_discovery_service(key, Box::new(instance))
            .await;
        Ok(())
    }

    /// Validates `spec`, connects its output and installs the pool.
    pub async fn add_collection_pool(&self, key: Key, spec: CollectorSpec) -> Result<()> {
        spec.validate()?;

        let mut sink = sink_for(spec.output.kind());
        sink.connect().await?;

        self.install_pool(key, spec, Arc::from(sink)).await
    }

    /// Installs a pool writing to an already connected `sink`.
    pub async fn add_collection_pool_with_sink(
        &self,
        key: Key,
        spec: CollectorSpec,
        sink: Arc<dyn Sink>,
    ) -> Result<()> {
        spec.validate()?;
        self.install_pool(key, spec, sink).await
    }

    async fn install_pool(&self, key: Key, spec: CollectorSpec, sink: Arc<dyn Sink>) -> Result<()> {
        let scraper = Scraper::new(self.scrape_timeout, spec.tls.as_ref())?;

        let mut pool = CollectorPool::new(key.clone(), &spec, scraper, sink);
        if let Some(writer) = &self.status {
            pool = pool.with_status_reporter(
                Arc::downgrade(&self.registry),
                writer.clone(),
                self.status_interval,
            );
        }

        self.registry
            .add_collection_pool(key, Box::new(pool), spec.buffer_size)
            .await;
        Ok(())
    }

    pub async fn delete_discovery_service(&self, key: &Key) -> Result<()> {
        self.registry.delete_discovery_service(key).await?;
        if let Some(writer) = &self.status {
            writer.forget_discovery(key);
        }
        Ok(())
    }

    pub async fn delete_collection_pool(&self, key: &Key) -> Result<()> {
        self.registry.delete_collection_pool(key).await?;
        if let Some(writer) = &self.status {
            writer.forget_collector(key);
        }
        Ok(())
    }

    /// Stops every discovery, then drains and closes every collector pool.
    pub async fn shutdown(&self) {
        for key in self.registry.discovery_keys().await {
            if let Err(e) = self.delete_discovery_service(&key).await {
                warn!("Failed to delete discovery {}: {}", key, e);
            }
        }
        for key in self.registry.collector_keys().await {
            if let Err(e) = self.delete_collection_pool(&key).await {
                warn!("Failed to delete collector {}: {}", key, e);
            }
        }
        info!("All discoveries and collectors shut down");
    }
}
