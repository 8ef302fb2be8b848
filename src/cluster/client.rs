//! Cluster access seams
//!
//! Discovery reads the cluster through [`ClusterClient`] and reports back
//! through [`StatusWriter`]. The watch cache, the object API and the status
//! subresource live behind these traits; nothing in the service layer knows
//! how they are implemented.

use super::resources::{CollectorSpec, CollectorStatus, DiscoveryStatus};
use super::types::{Endpoints, Key, LabelSelector, Pod, Service};
use crate::error::Result;
use async_trait::async_trait;

/// Read access to the objects discovery scans.
///
/// List failures should be returned as [`crate::error::CollectorError::List`];
/// callers treat them as an empty result for that kind only.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Pods in any namespace whose labels match `selector`.
    async fn list_pods(&self, selector: &LabelSelector) -> Result<Vec<Pod>>;

    /// Services in any namespace whose labels match `selector`.
    async fn list_services(&self, selector: &LabelSelector) -> Result<Vec<Service>>;

    /// The endpoints object sharing a service's key, if any.
    async fn get_endpoints(&self, key: &Key) -> Result<Option<Endpoints>>;

    /// The collector resource under `key`, if one exists.
    async fn get_collector(&self, key: &Key) -> Result<Option<CollectorSpec>>;
}

/// Write-back of aggregate counters to the owning resource.
#[async_trait]
pub trait StatusWriter: Send + Sync {
    async fn update_discovery_status(&self, key: &Key, status: &DiscoveryStatus) -> Result<()>;

    async fn update_collector_status(&self, key: &Key, status: &CollectorStatus) -> Result<()>;

    /// Called once a discovery has been deleted.
    fn forget_discovery(&self, _key: &Key) {}

    /// Called once a collector pool has been deleted and drained.
    fn forget_collector(&self, _key: &Key) {}
}
