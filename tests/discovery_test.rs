//! Discovery integration tests
//!
//! Discovery instances run against the in-memory cluster inventory.

mod common;

use async_trait::async_trait;
use common::{eventually, pod, scrape_annotations, service, spawn_exporter, RecordingSink, RecordingStatus};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use strata_collector::cluster::resources::{CollectorRef, CollectorSpec, DiscoveryResources, DiscoverySpec};
use strata_collector::cluster::types::{
    EndpointAddress, EndpointSubset, Endpoints, Key, LabelSelector, ObjectMeta, ObjectReference, Pod, Service,
};
use strata_collector::cluster::{ClusterClient, StaticCluster};
use strata_collector::discovery::{Discovery, DiscoveryInstance};
use strata_collector::error::{CollectorError, Result};
use strata_collector::manager::Manager;
use strata_collector::metrics::MetricsCollector;
use strata_collector::registry::Registry;
use strata_collector::status::MetricsStatusWriter;

fn spec_for(collectors: &[&str]) -> DiscoverySpec {
    DiscoverySpec {
        collectors: collectors
            .iter()
            .map(|name| CollectorRef {
                namespace: String::new(),
                name: name.to_string(),
            })
            .collect(),
        ..Default::default()
    }
}

fn instance(cluster: Arc<dyn ClusterClient>, registry: &Arc<Registry>, spec: DiscoverySpec) -> DiscoveryInstance {
    DiscoveryInstance::new(Key::new("monitoring", "scan"), spec, cluster, Arc::downgrade(registry))
}

fn headless_endpoints(ns: &str, name: &str, ready: &[&str], not_ready: &[&str]) -> Endpoints {
    let address = |ip: &&str| EndpointAddress {
        ip: ip.to_string(),
        target_ref: Some(ObjectReference {
            kind: "Pod".to_string(),
            namespace: ns.to_string(),
            name: format!("pod-{}", ip),
            resource_version: String::new(),
        }),
    };
    Endpoints {
        metadata: ObjectMeta {
            namespace: ns.to_string(),
            name: name.to_string(),
            ..Default::default()
        },
        subsets: vec![EndpointSubset {
            addresses: ready.iter().map(address).collect(),
            not_ready_addresses: not_ready.iter().map(address).collect(),
        }],
    }
}

#[tokio::test]
async fn test_unannotated_objects_never_forwarded() {
    // Given: One annotated pod and several that opt out
    let cluster = Arc::new(StaticCluster::new());
    cluster.upsert_pod(pod("web", "yes", "10.0.0.1", scrape_annotations(8080))).await;
    cluster.upsert_pod(pod("web", "no", "10.0.0.2", BTreeMap::new())).await;
    let mut falsy = scrape_annotations(8080);
    falsy.insert("prometheus.io/scrape".to_string(), "True".to_string());
    cluster.upsert_pod(pod("web", "falsy", "10.0.0.3", falsy)).await;
    cluster
        .upsert_service(service("web", "svc", "10.96.0.1", BTreeMap::new()))
        .await;

    // When: Discovering
    let registry = Arc::new(Registry::new());
    let targets = instance(cluster, &registry, spec_for(&[])).discover().await;

    // Then: Only the annotated pod is a target
    assert_eq!(targets.len(), 1);
    assert_eq!(targets[0].ip, "10.0.0.1");
    assert_eq!(targets[0].port, "8080");
    assert_eq!(targets[0].metadata.kind, "Pod");
    assert!(targets.iter().all(|t| t.scrape));
}

#[tokio::test]
async fn test_pod_without_ip_is_skipped() {
    // Given: An annotated pod not yet scheduled
    let cluster = Arc::new(StaticCluster::new());
    cluster
        .upsert_pod(Pod {
            pod_ip: None,
            ..pod("web", "pending", "", scrape_annotations(8080))
        })
        .await;

    // When / Then: No target is produced
    let registry = Arc::new(Registry::new());
    assert!(instance(cluster, &registry, spec_for(&[])).discover().await.is_empty());
}

#[tokio::test]
async fn test_headless_service_expands_to_ready_endpoints() {
    // Given: A headless service with two ready and one unready address,
    // plus a regular service
    let cluster = Arc::new(StaticCluster::new());
    cluster
        .upsert_service(service("db", "headless", "None", scrape_annotations(9187)))
        .await;
    cluster
        .upsert_endpoints(headless_endpoints("db", "headless", &["10.1.0.1", "10.1.0.2"], &["10.1.0.3"]))
        .await;
    cluster
        .upsert_service(service("db", "regular", "10.96.0.9", scrape_annotations(9187)))
        .await;

    // When: Discovering
    let registry = Arc::new(Registry::new());
    let targets = instance(cluster, &registry, spec_for(&[])).discover().await;

    // Then: One target per ready address plus the regular service, none for
    // the headless service itself
    let mut ips: Vec<_> = targets.iter().map(|t| t.ip.as_str()).collect();
    ips.sort();
    assert_eq!(ips, vec!["10.1.0.1", "10.1.0.2", "10.96.0.9"]);
    assert!(targets.iter().all(|t| t.ip != "None"));

    let endpoint = targets.iter().find(|t| t.ip == "10.1.0.1").unwrap();
    assert_eq!(endpoint.metadata.kind, "Pod");
    assert_eq!(endpoint.metadata.name, "pod-10.1.0.1");
    assert_eq!(endpoint.port, "9187");
}

#[tokio::test]
async fn test_every_headless_service_is_resolved() {
    // Given: Two headless services in one listing
    let cluster = Arc::new(StaticCluster::new());
    for (name, ip) in [("a", "10.2.0.1"), ("b", "10.2.0.2")] {
        cluster
            .upsert_service(service("db", name, "None", scrape_annotations(9000)))
            .await;
        cluster
            .upsert_endpoints(headless_endpoints("db", name, &[ip], &[]))
            .await;
    }

    // When: Discovering
    let registry = Arc::new(Registry::new());
    let targets = instance(cluster, &registry, spec_for(&[])).discover().await;

    // Then: Both services contribute
    assert_eq!(targets.len(), 2);
}

#[tokio::test]
async fn test_headless_service_ignored_when_endpoints_disabled() {
    // Given: A headless service but endpoint resolution turned off
    let cluster = Arc::new(StaticCluster::new());
    cluster
        .upsert_service(service("db", "headless", "None", scrape_annotations(9187)))
        .await;
    cluster
        .upsert_endpoints(headless_endpoints("db", "headless", &["10.1.0.1"], &[]))
        .await;
    let spec = DiscoverySpec {
        resources: DiscoveryResources {
            endpoints: false,
            ..Default::default()
        },
        ..spec_for(&[])
    };

    // When / Then: Nothing is discovered
    let registry = Arc::new(Registry::new());
    assert!(instance(cluster, &registry, spec).discover().await.is_empty());
}

#[tokio::test]
async fn test_discover_is_idempotent() {
    // Given: A fixed cluster state
    let cluster = Arc::new(StaticCluster::new());
    cluster.upsert_pod(pod("web", "a", "10.0.0.1", scrape_annotations(8080))).await;
    cluster.upsert_pod(pod("web", "b", "10.0.0.2", scrape_annotations(8081))).await;
    cluster
        .upsert_service(service("web", "svc", "10.96.0.1", scrape_annotations(80)))
        .await;
    let registry = Arc::new(Registry::new());
    let discovery = instance(cluster, &registry, spec_for(&[]));

    // When: Discovering twice
    let identity = |targets: Vec<strata_collector::target::Target>| {
        let mut ids: Vec<_> = targets
            .into_iter()
            .map(|t| (t.url(), t.metadata.clone(), t.labels.clone()))
            .collect();
        ids.sort_by(|a, b| a.0.cmp(&b.0));
        ids
    };
    let first = identity(discovery.discover().await);
    let second = identity(discovery.discover().await);

    // Then: Same targets modulo timestamp
    assert_eq!(first.len(), 3);
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_selector_limits_discovery() {
    // Given: Pods with different app labels
    let cluster = Arc::new(StaticCluster::new());
    cluster.upsert_pod(pod("web", "frontend", "10.0.0.1", scrape_annotations(80))).await;
    cluster.upsert_pod(pod("web", "backend", "10.0.0.2", scrape_annotations(80))).await;
    let spec = DiscoverySpec {
        selector: LabelSelector {
            match_labels: [("app".to_string(), "backend".to_string())].into(),
            ..Default::default()
        },
        ..spec_for(&[])
    };

    // When / Then: Only the matching pod is found
    let registry = Arc::new(Registry::new());
    let targets = instance(cluster, &registry, spec).discover().await;
    assert_eq!(targets.len(), 1);
    assert_eq!(targets[0].metadata.name, "backend");
}

/// Cluster whose pod listing always fails.
struct BrokenPods(StaticCluster);

#[async_trait]
impl ClusterClient for BrokenPods {
    async fn list_pods(&self, _selector: &LabelSelector) -> Result<Vec<Pod>> {
        Err(CollectorError::List("pods: connection refused".to_string()))
    }

    async fn list_services(&self, selector: &LabelSelector) -> Result<Vec<Service>> {
        self.0.list_services(selector).await
    }

    async fn get_endpoints(&self, key: &Key) -> Result<Option<Endpoints>> {
        self.0.get_endpoints(key).await
    }

    async fn get_collector(&self, key: &Key) -> Result<Option<CollectorSpec>> {
        self.0.get_collector(key).await
    }
}

#[tokio::test]
async fn test_list_failure_only_empties_that_kind() {
    // Given: Pod listing fails but services work
    let inner = StaticCluster::new();
    inner
        .upsert_service(service("web", "svc", "10.96.0.1", scrape_annotations(80)))
        .await;
    let cluster = Arc::new(BrokenPods(inner));

    // When: Discovering
    let registry = Arc::new(Registry::new());
    let targets = instance(cluster, &registry, spec_for(&[])).discover().await;

    // Then: The service target is still produced
    assert_eq!(targets.len(), 1);
    assert_eq!(targets[0].metadata.kind, "Service");
}

/// Cluster whose pod listing takes a while to answer.
struct SlowPods(StaticCluster, Duration);

#[async_trait]
impl ClusterClient for SlowPods {
    async fn list_pods(&self, selector: &LabelSelector) -> Result<Vec<Pod>> {
        tokio::time::sleep(self.1).await;
        self.0.list_pods(selector).await
    }

    async fn list_services(&self, selector: &LabelSelector) -> Result<Vec<Service>> {
        self.0.list_services(selector).await
    }

    async fn get_endpoints(&self, key: &Key) -> Result<Option<Endpoints>> {
        self.0.get_endpoints(key).await
    }

    async fn get_collector(&self, key: &Key) -> Result<Option<CollectorSpec>> {
        self.0.get_collector(key).await
    }
}

#[tokio::test]
async fn test_deleted_discovery_status_is_not_rewritten_by_last_cycle() {
    // Given: A discovery whose first cycle is stuck listing pods
    let inner = StaticCluster::new();
    inner.upsert_pod(pod("web", "a", "10.0.0.1", scrape_annotations(80))).await;
    let cluster = Arc::new(SlowPods(inner, Duration::from_millis(300)));
    let status = Arc::new(MetricsStatusWriter::new(MetricsCollector::new().unwrap()));
    let manager = Manager::new(cluster).with_status_writer(status.clone());
    let key = Key::new("monitoring", "scan");
    manager
        .add_discovery_service(key.clone(), spec_for(&[]))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    // When: It is deleted while that cycle is in flight
    manager.delete_discovery_service(&key).await.unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;

    // Then: The finished cycle did not bring the status back
    assert_eq!(status.discovery_status(&key), None);
    assert!(status.snapshot().discoveries.is_empty());
    assert!(!manager.registry().has_discovery(&key).await);
}

#[tokio::test]
async fn test_stopped_discovery_skips_status_write() {
    // Given: A discovery that has been stopped but not started
    let cluster = Arc::new(StaticCluster::new());
    let registry = Arc::new(Registry::new());
    let status = Arc::new(RecordingStatus::default());
    let mut discovery = instance(cluster, &registry, spec_for(&[])).with_status_writer(status.clone());
    discovery.stop().await;

    // When: A cycle is run by hand
    let result = discovery.run_once().await;
    discovery.join().await;

    // Then: The cycle ran but no status was written
    assert!(result.active);
    assert_eq!(status.discovery_writes(), 0);
}

#[tokio::test]
async fn test_cycle_counts_missing_and_disabled_collectors_as_not_ready() {
    // Given: Three referenced collectors: one ready, one disabled, one missing
    let cluster = Arc::new(StaticCluster::new());
    cluster.upsert_pod(pod("web", "a", "10.0.0.1", scrape_annotations(80))).await;
    cluster
        .upsert_collector(Key::new("monitoring", "ready"), CollectorSpec::default())
        .await;
    cluster
        .upsert_collector(
            Key::new("monitoring", "off"),
            CollectorSpec {
                enabled: false,
                ..Default::default()
            },
        )
        .await;

    let cluster: Arc<dyn ClusterClient> = cluster;
    let manager = Manager::new(cluster.clone()).with_scrape_timeout(Duration::from_millis(200));
    manager
        .add_collection_pool_with_sink(
            Key::new("monitoring", "ready"),
            CollectorSpec {
                buffer_size: 8,
                ..Default::default()
            },
            Arc::new(RecordingSink::default()),
        )
        .await
        .unwrap();

    let registry = manager.registry();
    let status = Arc::new(RecordingStatus::default());
    let discovery = instance(cluster, &registry, spec_for(&["ready", "off", "missing"]))
        .with_status_writer(status.clone());

    // When: Running one cycle
    let result = discovery.run_once().await;

    // Then: Status reflects one ready collector out of three
    assert!(result.active);
    assert!(result.last_discovered.is_some());
    assert_eq!(result.ready_collectors, 1);
    assert_eq!(result.total_collectors, 3);
    assert_eq!(result.discovered_resources_count, 1);
    assert_eq!(status.last_discovery(), Some(result));

    manager.shutdown().await;
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    // Given: A started discovery
    let cluster = Arc::new(StaticCluster::new());
    let registry = Arc::new(Registry::new());
    let mut discovery = instance(cluster, &registry, spec_for(&[]));
    discovery.start();

    // When: Stopping twice
    discovery.stop().await;
    discovery.stop().await;

    // Then: The loop exits
    assert!(eventually(Duration::from_secs(1), || !discovery.is_running()).await);
}

#[tokio::test(start_paused = true)]
async fn test_loop_runs_every_interval_until_stopped() {
    // Given: A discovery on a one second interval
    let cluster = Arc::new(StaticCluster::new());
    let registry = Arc::new(Registry::new());
    let status = Arc::new(RecordingStatus::default());
    let spec = DiscoverySpec {
        interval_seconds: 1,
        ..spec_for(&[])
    };
    let mut discovery = instance(cluster, &registry, spec).with_status_writer(status.clone());

    // When: Letting three and a half intervals pass
    discovery.start();
    tokio::time::sleep(Duration::from_millis(3500)).await;

    // Then: One cycle right away and one per tick
    assert_eq!(status.discovery_writes(), 4);

    // When: Stopped
    discovery.stop().await;
    tokio::time::sleep(Duration::from_secs(5)).await;

    // Then: No further cycles
    assert_eq!(status.discovery_writes(), 4);
}

#[tokio::test]
async fn test_disabled_discovery_reports_inactive() {
    // Given: A disabled discovery
    let cluster = Arc::new(StaticCluster::new());
    cluster.upsert_pod(pod("web", "a", "10.0.0.1", scrape_annotations(80))).await;
    let registry = Arc::new(Registry::new());
    let status = Arc::new(RecordingStatus::default());
    let spec = DiscoverySpec {
        enabled: false,
        ..spec_for(&[])
    };
    let mut discovery = instance(cluster, &registry, spec).with_status_writer(status.clone());

    // When: Started
    discovery.start();

    // Then: It reports inactive and never runs a cycle
    assert!(eventually(Duration::from_secs(1), || status.discovery_writes() == 1).await);
    assert!(!status.last_discovery().unwrap().active);
    assert!(!discovery.is_running());
}

#[tokio::test]
async fn test_end_to_end_discovery_to_sink() {
    // Given: An exporter pod, a collector and a discovery wired by the manager
    let addr = spawn_exporter("# TYPE up gauge\nup 1\n").await;
    let cluster = Arc::new(StaticCluster::new());
    cluster
        .upsert_pod(pod("web", "exporter", "127.0.0.1", scrape_annotations(addr.port())))
        .await;
    let collector = Key::new("monitoring", "pool");
    cluster.upsert_collector(collector.clone(), CollectorSpec::default()).await;

    let manager = Manager::new(cluster);
    let sink = Arc::new(RecordingSink::default());
    manager
        .add_collection_pool_with_sink(collector.clone(), CollectorSpec::default(), sink.clone())
        .await
        .unwrap();

    // When: A discovery referencing the collector starts
    manager
        .add_discovery_service(
            Key::new("monitoring", "scan"),
            DiscoverySpec {
                collectors: vec![CollectorRef {
                    namespace: "monitoring".to_string(),
                    name: "pool".to_string(),
                }],
                ..Default::default()
            },
        )
        .await
        .unwrap();

    // Then: The first cycle's scrape reaches the sink
    assert!(eventually(Duration::from_secs(5), || sink.len() >= 1).await);
    let message = &sink.messages()[0];
    assert_eq!(message["name"], "up");
    assert_eq!(message["values"]["gauge"], 1.0);
    assert_eq!(manager.registry().registered_with_collector(&collector).await, 1);

    manager.shutdown().await;
    assert!(manager.registry().collector_keys().await.is_empty());
    assert!(manager.registry().discovery_keys().await.is_empty());
}
