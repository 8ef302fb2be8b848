//! Instance Registry
//!
//! The Registry owns every running discovery and collector instance, keyed by
//! [`Key`], and the bounded channel that connects discoveries to each
//! collector pool.
//!
//! # Invariants
//!
//! - At most one live instance per key and kind. Adding under an occupied key
//!   stops the old instance before the new one starts.
//! - A collector channel is created by the first pool added under its key and
//!   keeps its capacity until the pool is deleted. Replacing a pool rebinds the
//!   new workers to the same channel, so buffered targets survive updates.
//! - Deleting a pool closes its channel; the pool drains what was buffered.
//!
//! # Locking
//!
//! One `RwLock` covers all three maps. Sends clone the channel's sender under
//! a read lock and release it before enqueueing, so a full channel blocks only
//! the sender and never the Registry.

use crate::cluster::types::Key;
use crate::collector::Collector;
use crate::discovery::Discovery;
use crate::error::{CollectorError, Result};
use crate::target::Target;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

struct Channel {
    sender: flume::Sender<Target>,
    receiver: flume::Receiver<Target>,
}

#[derive(Default)]
struct Inner {
    discoveries: HashMap<Key, Box<dyn Discovery>>,
    collectors: HashMap<Key, Box<dyn Collector>>,
    channels: HashMap<Key, Channel>,
}

#[derive(Default)]
pub struct Registry {
    inner: RwLock<Inner>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_discovery_service(&self, key: Key, mut instance: Box<dyn Discovery>) {
        let mut inner = self.inner.write().await;

        if let Some(mut old) = inner.discoveries.remove(&key) {
            old.stop().await;
            debug!(discovery = %key, "Replaced discovery instance");
        }

        instance.start();
        inner.discoveries.insert(key.clone(), instance);
        info!(discovery = %key, "Registered discovery");
    }

    /// Installs `instance` under `key`, creating the channel with
    /// `buffer_size` slots if this is the first pool for the key.
    pub async fn add_collection_pool(
        &self,
        key: Key,
        mut instance: Box<dyn Collector>,
        buffer_size: usize,
    ) {
        let mut inner = self.inner.write().await;

        let receiver = inner
            .channels
            .entry(key.clone())
            .or_insert_with(|| {
                let (sender, receiver) = flume::bounded(buffer_size.max(1));
                debug!(collector = %key, capacity = buffer_size, "Created collector channel");
                Channel { sender, receiver }
            })
            .receiver
            .clone();

        if let Some(mut old) = inner.collectors.remove(&key) {
            old.stop().await;
            debug!(collector = %key, "Replaced collector pool");
        }

        instance.start(receiver);
        inner.collectors.insert(key.clone(), instance);
        info!(collector = %key, "Registered collector pool");
    }

    /// Stops the discovery and waits for its last cycle, outside the lock.
    pub async fn delete_discovery_service(&self, key: &Key) -> Result<()> {
        let mut instance = self
            .inner
            .write()
            .await
            .discoveries
            .remove(key)
            .ok_or_else(|| CollectorError::NotFound(format!("discovery {}", key)))?;

        instance.stop().await;
        instance.join().await;
        info!(discovery = %key, "Deleted discovery");
        Ok(())
    }

    /// Closes the channel and waits for the pool to drain it.
    pub async fn delete_collection_pool(&self, key: &Key) -> Result<()> {
        let mut instance = {
            let mut inner = self.inner.write().await;
            let instance = inner
                .collectors
                .remove(key)
                .ok_or_else(|| CollectorError::NotFound(format!("collector {}", key)))?;
            inner.channels.remove(key);
            instance
        };

        instance.close().await;
        info!(collector = %key, "Deleted collector pool");
        Ok(())
    }

    async fn sender(&self, key: &Key) -> Result<flume::Sender<Target>> {
        self.inner
            .read()
            .await
            .channels
            .get(key)
            .map(|c| c.sender.clone())
            .ok_or_else(|| CollectorError::NotFound(format!("channel for collector {}", key)))
    }

    /// Enqueues every target for the pool under `key`, waiting whenever the
    /// channel is full.
    pub async fn send_resources(&self, key: &Key, targets: Vec<Target>) -> Result<()> {
        let sender = self.sender(key).await?;
        for target in targets {
            sender
                .send_async(target)
                .await
                .map_err(|_| CollectorError::NotFound(format!("channel for collector {} closed", key)))?;
        }
        Ok(())
    }

    /// Like [`Registry::send_resources`], giving up after `timeout`. Targets
    /// enqueued before the deadline stay queued.
    pub async fn send_resources_timeout(
        &self,
        key: &Key,
        targets: Vec<Target>,
        timeout: Duration,
    ) -> Result<()> {
        match tokio::time::timeout(timeout, self.send_resources(key, targets)).await {
            Ok(result) => result,
            Err(_) => Err(CollectorError::Sink(format!(
                "collector {} did not accept targets within {:?}",
                key, timeout
            ))),
        }
    }

    /// Point-in-time queue depth for `key`.
    pub async fn in_flight_resources(&self, key: &Key) -> Result<usize> {
        Ok(self.sender(key).await?.len())
    }

    pub async fn channel_capacity(&self, key: &Key) -> Option<usize> {
        self.inner
            .read()
            .await
            .channels
            .get(key)
            .and_then(|c| c.sender.capacity())
    }

    /// Number of discoveries whose spec references the collector `key`.
    pub async fn registered_with_collector(&self, key: &Key) -> usize {
        self.inner
            .read()
            .await
            .discoveries
            .values()
            .filter(|d| d.collector_keys().contains(key))
            .count()
    }

    pub async fn has_discovery(&self, key: &Key) -> bool {
        self.inner.read().await.discoveries.contains_key(key)
    }

    pub async fn has_collector(&self, key: &Key) -> bool {
        self.inner.read().await.collectors.contains_key(key)
    }

    pub async fn discovery_keys(&self) -> Vec<Key> {
        let mut keys: Vec<Key> = self.inner.read().await.discoveries.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub async fn collector_keys(&self) -> Vec<Key> {
        let mut keys: Vec<Key> = self.inner.read().await.collectors.keys().cloned().collect();
        keys.sort();
        keys
    }
}
