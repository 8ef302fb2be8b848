//! Discovery Instances
//!
//! A discovery periodically scans the cluster for scrape targets and hands
//! them to every collector its spec references.
//!
//! # Cycle
//!
//! Each tick runs one serialized cycle:
//! 1. **Discover**: list pods and services matching the selector and keep the
//!    ones annotated `<prefix>/scrape: "true"`. Headless services expand to one
//!    target per ready endpoint address.
//! 2. **Send**: for each referenced collector that exists and is enabled, push
//!    the whole batch through the [`Registry`].
//! 3. **Status**: write a [`DiscoveryStatus`] back through the status writer.
//!
//! A failure to list one kind only empties that kind for the cycle. Missing or
//! disabled collectors are skipped and show up as `ready < total`.

use crate::cluster::client::{ClusterClient, StatusWriter};
use crate::cluster::resources::{DiscoverySpec, DiscoveryStatus};
use crate::cluster::types::{Key, Pod, Service, KIND_ENDPOINTS, KIND_POD, KIND_SERVICE};
use crate::registry::Registry;
use crate::target::{Metadata, Target};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// A running producer of targets.
#[async_trait]
pub trait Discovery: Send + Sync {
    fn start(&mut self);

    /// Idempotent. The loop exits after any cycle already under way.
    async fn stop(&mut self);

    /// Waits for tasks left running after [`Discovery::stop`]. Must not be
    /// awaited while holding the Registry lock.
    async fn join(&mut self) {}

    /// Collectors this discovery feeds.
    fn collector_keys(&self) -> &[Key];
}

struct Shared {
    key: Key,
    spec: DiscoverySpec,
    collectors: Vec<Key>,
    cluster: Arc<dyn ClusterClient>,
    registry: Weak<Registry>,
    status: Option<Arc<dyn StatusWriter>>,
    cycle: Mutex<()>,
    stop: watch::Receiver<bool>,
}

pub struct DiscoveryInstance {
    shared: Arc<Shared>,
    stopped: AtomicBool,
    stop_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
    status_handle: Option<JoinHandle<()>>,
}

impl DiscoveryInstance {
    pub fn new(
        key: Key,
        spec: DiscoverySpec,
        cluster: Arc<dyn ClusterClient>,
        registry: Weak<Registry>,
    ) -> Self {
        let collectors = spec
            .collectors
            .iter()
            .map(|r| r.key(&key.namespace))
            .collect();
        let (stop_tx, stop) = watch::channel(false);

        Self {
            shared: Arc::new(Shared {
                key,
                spec,
                collectors,
                cluster,
                registry,
                status: None,
                cycle: Mutex::new(()),
                stop,
            }),
            stopped: AtomicBool::new(false),
            stop_tx,
            handle: None,
            status_handle: None,
        }
    }

    /// Must be called before the instance is shared or started.
    pub fn with_status_writer(mut self, writer: Arc<dyn StatusWriter>) -> Self {
        if let Some(shared) = Arc::get_mut(&mut self.shared) {
            shared.status = Some(writer);
        }
        self
    }

    pub fn key(&self) -> &Key {
        &self.shared.key
    }

    /// Scans the cluster once and returns the targets found.
    pub async fn discover(&self) -> Vec<Target> {
        self.shared.discover().await
    }

    /// Runs one full discover / send / status cycle.
    pub async fn run_once(&self) -> DiscoveryStatus {
        self.shared.interval_run().await
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

#[async_trait]
impl Discovery for DiscoveryInstance {
    fn start(&mut self) {
        let shared = self.shared.clone();

        if !shared.spec.enabled {
            info!(discovery = %shared.key, "Discovery disabled, not starting");
            self.status_handle = Some(tokio::spawn(async move {
                shared.write_status(&DiscoveryStatus::default()).await;
            }));
            return;
        }

        let stop = self.stop_tx.subscribe();
        info!(
            discovery = %shared.key,
            interval_seconds = shared.spec.interval_seconds,
            collectors = shared.collectors.len(),
            "Discovery started"
        );
        self.handle = Some(tokio::spawn(run_loop(shared, stop)));
    }

    async fn stop(&mut self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.stop_tx.send_replace(true);
        info!(discovery = %self.shared.key, "Discovery stopped");
    }

    async fn join(&mut self) {
        for handle in [self.handle.take(), self.status_handle.take()]
            .into_iter()
            .flatten()
        {
            if let Err(e) = handle.await {
                warn!(discovery = %self.shared.key, "Discovery task failed: {}", e);
            }
        }
    }

    fn collector_keys(&self) -> &[Key] {
        &self.shared.collectors
    }
}

async fn run_loop(shared: Arc<Shared>, mut stop: watch::Receiver<bool>) {
    let period = Duration::from_secs(shared.spec.interval_seconds.max(1));
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = stop.changed() => break,
            _ = ticker.tick() => {}
        }
        if *stop.borrow() {
            break;
        }

        shared.interval_run().await;
    }

    debug!(discovery = %shared.key, "Discovery loop exited");
}

impl Shared {
    async fn interval_run(&self) -> DiscoveryStatus {
        let _cycle = self.cycle.lock().await;

        let targets = self.discover().await;
        let discovered = targets.len();
        let (ready, in_flight) = self.send(targets).await;

        let status = DiscoveryStatus {
            active: true,
            last_discovered: Some(Utc::now()),
            ready_collectors: ready as u64,
            total_collectors: self.collectors.len() as u64,
            discovered_resources_count: discovered as u64,
            in_flight_resources: in_flight as u64,
        };

        debug!(
            discovery = %self.key,
            discovered,
            ready,
            total = self.collectors.len(),
            in_flight,
            "Discovery cycle complete"
        );

        self.write_status(&status).await;
        status
    }

    async fn discover(&self) -> Vec<Target> {
        let mut targets = Vec::new();
        let selector = &self.spec.selector;

        if self.spec.resources.pods {
            match self.cluster.list_pods(selector).await {
                Ok(pods) => targets.extend(pods.iter().filter_map(|p| self.pod_target(p))),
                Err(e) => warn!(discovery = %self.key, "Failed to list pods: {}", e),
            }
        }

        if self.spec.resources.services {
            match self.cluster.list_services(selector).await {
                Ok(services) => {
                    for svc in &services {
                        targets.extend(self.service_targets(svc).await);
                    }
                }
                Err(e) => warn!(discovery = %self.key, "Failed to list services: {}", e),
            }
        }

        targets
    }

    fn pod_target(&self, pod: &Pod) -> Option<Target> {
        let target = Target::from_annotations(&pod.metadata.annotations, &self.spec.prefix);
        if !target.scrape {
            return None;
        }

        let Some(ip) = pod.pod_ip.as_deref().filter(|ip| !ip.is_empty()) else {
            debug!(discovery = %self.key, pod = %pod.metadata.key(), "Pod has no IP yet");
            return None;
        };

        Some(
            target
                .with_ip(ip)
                .with_metadata(Metadata::from_object(KIND_POD, &pod.metadata))
                .with_labels(pod.metadata.labels.clone())
                .with_annotations(pod.metadata.annotations.clone()),
        )
    }

    async fn service_targets(&self, svc: &Service) -> Vec<Target> {
        let base = Target::from_annotations(&svc.metadata.annotations, &self.spec.prefix)
            .with_labels(svc.metadata.labels.clone())
            .with_annotations(svc.metadata.annotations.clone());
        if !base.scrape {
            return Vec::new();
        }

        if !svc.is_headless() {
            if svc.cluster_ip.is_empty() {
                return Vec::new();
            }
            let ip = svc.cluster_ip.clone();
            return vec![base
                .with_ip(ip)
                .with_metadata(Metadata::from_object(KIND_SERVICE, &svc.metadata))];
        }

        if !self.spec.resources.endpoints {
            debug!(discovery = %self.key, service = %svc.metadata.key(), "Skipping headless service, endpoints disabled");
            return Vec::new();
        }

        let endpoints = match self.cluster.get_endpoints(&svc.metadata.key()).await {
            Ok(Some(endpoints)) => endpoints,
            Ok(None) => {
                debug!(discovery = %self.key, service = %svc.metadata.key(), "Headless service has no endpoints");
                return Vec::new();
            }
            Err(e) => {
                warn!(discovery = %self.key, "Failed to get endpoints for {}: {}", svc.metadata.key(), e);
                return Vec::new();
            }
        };

        endpoints
            .ready_addresses()
            .map(|addr| {
                let metadata = addr
                    .target_ref
                    .as_ref()
                    .map(Metadata::from_ref)
                    .unwrap_or_else(|| Metadata::from_object(KIND_ENDPOINTS, &endpoints.metadata));
                base.clone().with_ip(addr.ip.clone()).with_metadata(metadata)
            })
            .collect()
    }

    /// Returns (ready collectors, summed queue depth).
    async fn send(&self, targets: Vec<Target>) -> (usize, usize) {
        let Some(registry) = self.registry.upgrade() else {
            return (0, 0);
        };

        let mut ready = 0;
        let mut in_flight = 0;

        for key in &self.collectors {
            match self.cluster.get_collector(key).await {
                Ok(Some(spec)) if spec.enabled => {}
                Ok(Some(_)) => {
                    debug!(discovery = %self.key, collector = %key, "Collector disabled, skipping");
                    continue;
                }
                Ok(None) => {
                    debug!(discovery = %self.key, collector = %key, "Collector not found, skipping");
                    continue;
                }
                Err(e) => {
                    warn!(discovery = %self.key, collector = %key, "Failed to look up collector: {}", e);
                    continue;
                }
            }
            ready += 1;

            let batch = targets.clone();
            let sent = match self.spec.send_timeout_seconds {
                Some(secs) => {
                    registry
                        .send_resources_timeout(key, batch, Duration::from_secs(secs))
                        .await
                }
                None => registry.send_resources(key, batch).await,
            };
            if let Err(e) = sent {
                warn!(discovery = %self.key, collector = %key, "Failed to send targets: {}", e);
            }

            in_flight += registry.in_flight_resources(key).await.unwrap_or(0);
        }

        (ready, in_flight)
    }

    /// Skipped once stopped, so a deleted discovery's status stays deleted.
    async fn write_status(&self, status: &DiscoveryStatus) {
        let Some(writer) = &self.status else {
            return;
        };
        if *self.stop.borrow() {
            debug!(discovery = %self.key, "Discovery stopped, not writing status");
            return;
        }
        if let Err(e) = writer.update_discovery_status(&self.key, status).await {
            warn!(discovery = %self.key, "Failed to update discovery status: {}", e);
        }
    }
}
