//! Strata Metrics Collector
//!
//! Discovers Prometheus scrape targets in a cluster and fans them out to
//! independently scaled collector pools that scrape, parse, filter, encode
//! and ship the resulting metrics.
//!
//! # Architecture
//!
//! ```text
//!  ┌───────────┐  targets   ┌──────────┐  bounded channel  ┌────────────────┐
//!  │ Discovery │ ─────────► │ Registry │ ────────────────► │ Collector pool │
//!  └───────────┘            └──────────┘   (one per key)   │  N workers     │
//!        │ list                                            └────────────────┘
//!        ▼                                                   │ scrape → parse
//!  ┌───────────┐                                             │ filter → encode
//!  │  Cluster  │                                             ▼
//!  └───────────┘                                        ┌──────────┐
//!                                                       │   Sink   │
//!                                                       └──────────┘
//! ```
//!
//! # Modules
//!
//! - [`cluster`] - resource types, specs and the cluster access traits
//! - [`target`] - discovered endpoints and annotation parsing
//! - [`metric`] - metric records and the text exposition parser
//! - [`filter`] - exclude and clip filters
//! - [`encoder`] / [`sink`] - serialization and output transports
//! - [`collector`] - worker pools
//! - [`discovery`] - periodic target scanning
//! - [`registry`] - instance lifecycle and channels
//! - [`manager`] - builds instances from specs
//! - [`metrics`], [`status`], [`server`] - self-observability and HTTP
//! - [`config`] - Configuration management
//! - [`error`] - Error types
//!
//! # Quick Start
//!
//! ```no_run
//! use strata_collector::{config::Config, server};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config/Default.toml")?;
//!     server::start(config).await?;
//!     Ok(())
//! }
//! ```

pub mod cluster;
pub mod collector;
pub mod config;
pub mod discovery;
pub mod encoder;
pub mod error;
pub mod filter;
pub mod manager;
pub mod metric;
pub mod metrics;
pub mod registry;
pub mod server;
pub mod sink;
pub mod status;
pub mod target;
