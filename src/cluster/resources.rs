//! Discovery and Collector Resources
//!
//! Configuration objects handed to the service layer on every reconciliation,
//! and the status objects written back. All defaults are applied through serde
//! so a partially specified resource deserializes into a complete one.
//!
//! # Defaults
//!
//! | Field | Default |
//! |-------|---------|
//! | `enabled` | `true` |
//! | `interval_seconds` | `10` |
//! | `prefix` | `"prometheus.io"` |
//! | `resources` | pods, services, endpoints all `true` |
//! | `workers` | `1` |
//! | `buffer_size` | `10000` |
//! | `encoder` | `"json"` |
//! | `filters` | none |
//! | `output` | stdout |

use super::types::{Key, LabelSelector};
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

pub const DEFAULT_PREFIX: &str = "prometheus.io";
pub const DEFAULT_INTERVAL_SECONDS: u64 = 10;
pub const DEFAULT_WORKERS: usize = 1;
pub const DEFAULT_BUFFER_SIZE: usize = 10_000;
pub const DEFAULT_ENCODER: &str = "json";
pub const DEFAULT_NATS_URL: &str = "nats://127.0.0.1:4222";
pub const DEFAULT_NATS_SUBJECT: &str = "strata.metrics";

fn default_true() -> bool {
    true
}

fn default_interval_seconds() -> u64 {
    DEFAULT_INTERVAL_SECONDS
}

fn default_prefix() -> String {
    DEFAULT_PREFIX.to_string()
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

fn default_buffer_size() -> usize {
    DEFAULT_BUFFER_SIZE
}

fn default_encoder() -> String {
    DEFAULT_ENCODER.to_string()
}

fn default_nats_url() -> String {
    DEFAULT_NATS_URL.to_string()
}

fn default_nats_subject() -> String {
    DEFAULT_NATS_SUBJECT.to_string()
}

// Smallest positive subnormal double.
fn default_clip_min() -> f64 {
    f64::from_bits(1)
}

fn default_clip_max() -> f64 {
    f64::MAX
}

/// Reference from a discovery to a collector by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectorRef {
    /// Empty means "same namespace as the discovery".
    #[serde(default)]
    pub namespace: String,
    pub name: String,
}

impl CollectorRef {
    pub fn key(&self, fallback_namespace: &str) -> Key {
        let namespace = if self.namespace.is_empty() {
            fallback_namespace
        } else {
            &self.namespace
        };
        Key::new(namespace, &self.name)
    }
}

/// Which object kinds a discovery scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryResources {
    #[serde(default = "default_true")]
    pub pods: bool,
    #[serde(default = "default_true")]
    pub services: bool,
    /// Gates resolution of headless services into per-endpoint targets.
    #[serde(default = "default_true")]
    pub endpoints: bool,
}

impl Default for DiscoveryResources {
    fn default() -> Self {
        Self {
            pods: true,
            services: true,
            endpoints: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoverySpec {
    #[serde(default)]
    pub collectors: Vec<CollectorRef>,
    #[serde(default)]
    pub selector: LabelSelector,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default)]
    pub resources: DiscoveryResources,
    /// Upper bound on how long one collector may block a discovery cycle.
    /// `None` blocks until the collector accepts every target.
    #[serde(default)]
    pub send_timeout_seconds: Option<u64>,
}

impl Default for DiscoverySpec {
    fn default() -> Self {
        Self {
            collectors: Vec::new(),
            selector: LabelSelector::default(),
            enabled: true,
            interval_seconds: DEFAULT_INTERVAL_SECONDS,
            prefix: DEFAULT_PREFIX.to_string(),
            resources: DiscoveryResources::default(),
            send_timeout_seconds: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StdoutConfig {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NatsConfig {
    #[serde(default = "default_nats_url")]
    pub url: String,
    #[serde(default = "default_nats_subject")]
    pub subject: String,
    #[serde(default, skip_serializing)]
    pub token: Option<SecretString>,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: default_nats_url(),
            subject: default_nats_subject(),
            token: None,
        }
    }
}

/// Output block as written in a collector resource. Only one sub-config is
/// expected to be populated; see [`CollectorOutput::kind`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectorOutput {
    #[serde(default)]
    pub nats: Option<NatsConfig>,
    #[serde(default)]
    pub stdout: Option<StdoutConfig>,
}

/// Resolved output selection.
#[derive(Debug, Clone)]
pub enum OutputKind {
    Stdout,
    Nats(NatsConfig),
}

impl CollectorOutput {
    /// First populated sub-config in field order wins, stdout otherwise.
    pub fn kind(&self) -> OutputKind {
        if let Some(nats) = &self.nats {
            return OutputKind::Nats(nats.clone());
        }
        OutputKind::Stdout
    }

    pub fn configured_count(&self) -> usize {
        usize::from(self.nats.is_some()) + usize::from(self.stdout.is_some())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipFilterConfig {
    #[serde(default = "default_clip_min")]
    pub min: f64,
    #[serde(default = "default_clip_max")]
    pub max: f64,
    #[serde(default)]
    pub inclusive: bool,
}

impl Default for ClipFilterConfig {
    fn default() -> Self {
        Self {
            min: default_clip_min(),
            max: default_clip_max(),
            inclusive: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExcludeFilterConfig {
    #[serde(default)]
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectorFilters {
    #[serde(default)]
    pub clip: Option<ClipFilterConfig>,
    #[serde(default)]
    pub exclude: Option<ExcludeFilterConfig>,
}

/// TLS settings for scraping `https` targets. Paths point at PEM files.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TlsConfig {
    #[serde(default)]
    pub ca: Option<String>,
    #[serde(default)]
    pub cert: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub insecure_skip_verify: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorSpec {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    #[serde(default = "default_encoder")]
    pub encoder: String,
    #[serde(default)]
    pub include_metadata: bool,
    #[serde(default)]
    pub include_labels: Vec<String>,
    #[serde(default)]
    pub include_annotations: Vec<String>,
    #[serde(default)]
    pub output: CollectorOutput,
    #[serde(default)]
    pub filters: CollectorFilters,
    #[serde(default)]
    pub tls: Option<TlsConfig>,
}

impl Default for CollectorSpec {
    fn default() -> Self {
        Self {
            enabled: true,
            workers: DEFAULT_WORKERS,
            buffer_size: DEFAULT_BUFFER_SIZE,
            encoder: DEFAULT_ENCODER.to_string(),
            include_metadata: false,
            include_labels: Vec::new(),
            include_annotations: Vec::new(),
            output: CollectorOutput::default(),
            filters: CollectorFilters::default(),
            tls: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryStatus {
    pub active: bool,
    pub last_discovered: Option<DateTime<Utc>>,
    pub ready_collectors: u64,
    pub total_collectors: u64,
    pub discovered_resources_count: u64,
    pub in_flight_resources: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectorStatus {
    pub registered_discoveries: u64,
    pub in_flight_resources: u64,
    pub total_sent: u64,
    pub total_errors: u64,
    pub total_filtered: u64,
    pub metrics_collected: u64,
}
