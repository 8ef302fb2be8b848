//! Static cluster inventory
//!
//! An in-memory [`ClusterClient`] holding pods, services, endpoints and
//! collector resources. The binary seeds it from the `cluster` section of the
//! configuration file; tests mutate it directly to simulate cluster changes.

use super::client::ClusterClient;
use super::resources::CollectorSpec;
use super::types::{Endpoints, Key, LabelSelector, Pod, Service};
use crate::error::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// Inventory contents as read from configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClusterInventory {
    #[serde(default)]
    pub pods: Vec<Pod>,
    #[serde(default)]
    pub services: Vec<Service>,
    #[serde(default)]
    pub endpoints: Vec<Endpoints>,
}

#[derive(Default)]
struct State {
    pods: BTreeMap<Key, Pod>,
    services: BTreeMap<Key, Service>,
    endpoints: BTreeMap<Key, Endpoints>,
    collectors: BTreeMap<Key, CollectorSpec>,
}

#[derive(Default)]
pub struct StaticCluster {
    state: RwLock<State>,
}

impl StaticCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_inventory(inventory: ClusterInventory) -> Self {
        let mut state = State::default();
        for pod in inventory.pods {
            state.pods.insert(pod.metadata.key(), pod);
        }
        for svc in inventory.services {
            state.services.insert(svc.metadata.key(), svc);
        }
        for ep in inventory.endpoints {
            state.endpoints.insert(ep.metadata.key(), ep);
        }
        Self {
            state: RwLock::new(state),
        }
    }

    pub async fn upsert_pod(&self, pod: Pod) {
        self.state.write().await.pods.insert(pod.metadata.key(), pod);
    }

    pub async fn remove_pod(&self, key: &Key) -> Option<Pod> {
        self.state.write().await.pods.remove(key)
    }

    pub async fn upsert_service(&self, svc: Service) {
        self.state
            .write()
            .await
            .services
            .insert(svc.metadata.key(), svc);
    }

    pub async fn upsert_endpoints(&self, ep: Endpoints) {
        self.state
            .write()
            .await
            .endpoints
            .insert(ep.metadata.key(), ep);
    }

    pub async fn upsert_collector(&self, key: Key, spec: CollectorSpec) {
        self.state.write().await.collectors.insert(key, spec);
    }

    pub async fn remove_collector(&self, key: &Key) -> Option<CollectorSpec> {
        self.state.write().await.collectors.remove(key)
    }
}

#[async_trait]
impl ClusterClient for StaticCluster {
    async fn list_pods(&self, selector: &LabelSelector) -> Result<Vec<Pod>> {
        let state = self.state.read().await;
        Ok(state
            .pods
            .values()
            .filter(|p| selector.matches(&p.metadata.labels))
            .cloned()
            .collect())
    }

    async fn list_services(&self, selector: &LabelSelector) -> Result<Vec<Service>> {
        let state = self.state.read().await;
        Ok(state
            .services
            .values()
            .filter(|s| selector.matches(&s.metadata.labels))
            .cloned()
            .collect())
    }

    async fn get_endpoints(&self, key: &Key) -> Result<Option<Endpoints>> {
        Ok(self.state.read().await.endpoints.get(key).cloned())
    }

    async fn get_collector(&self, key: &Key) -> Result<Option<CollectorSpec>> {
        Ok(self.state.read().await.collectors.get(key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::types::ObjectMeta;

    fn pod(ns: &str, name: &str, app: &str) -> Pod {
        Pod {
            metadata: ObjectMeta {
                namespace: ns.to_string(),
                name: name.to_string(),
                labels: [("app".to_string(), app.to_string())].into(),
                ..Default::default()
            },
            pod_ip: Some("10.0.0.1".to_string()),
        }
    }

    #[tokio::test]
    async fn test_list_pods_applies_selector() {
        let cluster = StaticCluster::from_inventory(ClusterInventory {
            pods: vec![pod("a", "web-1", "web"), pod("b", "db-1", "db")],
            ..Default::default()
        });

        let selector = LabelSelector {
            match_labels: [("app".to_string(), "web".to_string())].into(),
            ..Default::default()
        };

        let pods = cluster.list_pods(&selector).await.unwrap();
        assert_eq!(pods.len(), 1);
        assert_eq!(pods[0].metadata.name, "web-1");

        let all = cluster.list_pods(&LabelSelector::default()).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_collector_lookup() {
        let cluster = StaticCluster::new();
        let key = Key::new("monitoring", "pool");
        assert!(cluster.get_collector(&key).await.unwrap().is_none());

        cluster.upsert_collector(key.clone(), CollectorSpec::default()).await;
        assert!(cluster.get_collector(&key).await.unwrap().is_some());

        cluster.remove_collector(&key).await;
        assert!(cluster.get_collector(&key).await.unwrap().is_none());
    }
}
