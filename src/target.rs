//! Discovered scrape targets
//!
//! A [`Target`] is built fresh every discovery cycle from an object's
//! annotations, passed by value through the collector channels and never
//! mutated afterwards.
//!
//! # Annotations
//!
//! All keys are `<prefix>/<name>`, with `prefix` defaulting to `prometheus.io`:
//!
//! - `scrape` - only the exact string `true` enables scraping
//! - `scheme` - `http` (default) or `https`
//! - `port` - defaults to `9090`
//! - `path` - defaults to `/metrics`
//! - `includeMetadata` - `true` adds kind/namespace/name/version tags
//! - `includeLabels` - comma separated object labels to add as tags
//! - `includeAnnotations` - comma separated object annotations to add as tags

use crate::cluster::types::{ObjectMeta, ObjectReference};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

pub const DEFAULT_SCRAPE: bool = false;
pub const DEFAULT_SCHEME: &str = "http";
pub const DEFAULT_PORT: &str = "9090";
pub const DEFAULT_PATH: &str = "/metrics";

/// Object identity carried along as optional tags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Metadata {
    pub kind: String,
    pub namespace: String,
    pub name: String,
    pub resource_version: String,
}

impl Metadata {
    pub fn from_object(kind: &str, meta: &ObjectMeta) -> Self {
        Self {
            kind: kind.to_string(),
            namespace: meta.namespace.clone(),
            name: meta.name.clone(),
            resource_version: meta.resource_version.clone(),
        }
    }

    pub fn from_ref(reference: &ObjectReference) -> Self {
        Self {
            kind: reference.kind.clone(),
            namespace: reference.namespace.clone(),
            name: reference.name.clone(),
            resource_version: reference.resource_version.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Target {
    pub ip: String,
    pub scheme: String,
    pub port: String,
    pub path: String,
    pub scrape: bool,
    pub include_metadata: bool,
    pub include_labels: Vec<String>,
    pub include_annotations: Vec<String>,
    pub metadata: Metadata,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub discovered_at: DateTime<Utc>,
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

impl Target {
    /// Builds a target from scrape annotations, falling back to the defaults
    /// for anything not set.
    pub fn from_annotations(annotations: &BTreeMap<String, String>, prefix: &str) -> Self {
        let get = |name: &str| annotations.get(&format!("{}/{}", prefix, name));

        Self {
            ip: String::new(),
            scheme: get("scheme").cloned().unwrap_or_else(|| DEFAULT_SCHEME.to_string()),
            port: get("port").cloned().unwrap_or_else(|| DEFAULT_PORT.to_string()),
            path: get("path").cloned().unwrap_or_else(|| DEFAULT_PATH.to_string()),
            scrape: get("scrape").map_or(DEFAULT_SCRAPE, |v| v == "true"),
            include_metadata: get("includeMetadata").is_some_and(|v| v == "true"),
            include_labels: get("includeLabels").map(|v| split_list(v)).unwrap_or_default(),
            include_annotations: get("includeAnnotations")
                .map(|v| split_list(v))
                .unwrap_or_default(),
            metadata: Metadata::default(),
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
            discovered_at: Utc::now(),
        }
    }

    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = ip.into();
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.labels = labels;
        self
    }

    pub fn with_annotations(mut self, annotations: BTreeMap<String, String>) -> Self {
        self.annotations = annotations;
        self
    }

    pub fn url(&self) -> String {
        format!("{}://{}:{}{}", self.scheme, self.ip, self.port, self.path)
    }

    /// Tags to attach to every metric scraped from this target. The collector
    /// side selections are unioned with the target's own.
    pub fn tags(
        &self,
        include_metadata: bool,
        include_labels: &[String],
        include_annotations: &[String],
    ) -> BTreeMap<String, String> {
        let mut tags = BTreeMap::new();

        if self.include_metadata || include_metadata {
            for (k, v) in [
                ("kind", &self.metadata.kind),
                ("namespace", &self.metadata.namespace),
                ("name", &self.metadata.name),
                ("resource_version", &self.metadata.resource_version),
            ] {
                if !v.is_empty() {
                    tags.insert(k.to_string(), v.clone());
                }
            }
        }

        for name in self.include_labels.iter().chain(include_labels) {
            if let Some(v) = self.labels.get(name) {
                tags.insert(name.clone(), v.clone());
            }
        }

        for name in self.include_annotations.iter().chain(include_annotations) {
            if let Some(v) = self.annotations.get(name) {
                tags.insert(name.clone(), v.clone());
            }
        }

        tags
    }
}
