use crate::cluster::inventory::ClusterInventory;
use crate::cluster::resources::{CollectorSpec, DiscoverySpec};
use crate::cluster::types::Key;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub scrape: ScrapeConfig,
    #[serde(default)]
    pub status: StatusConfig,
    #[serde(default)]
    pub cluster: ClusterInventory,
    #[serde(default)]
    pub discoveries: Vec<DiscoveryDeclaration>,
    #[serde(default)]
    pub collectors: Vec<CollectorDeclaration>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_addr")]
    pub addr: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScrapeConfig {
    #[serde(default = "default_scrape_timeout")]
    pub timeout_seconds: u64,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_scrape_timeout(),
        }
    }
}

impl ScrapeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StatusConfig {
    #[serde(default = "default_status_interval")]
    pub interval_seconds: u64,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_status_interval(),
        }
    }
}

impl StatusConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }
}

/// A discovery resource declared in the configuration file.
#[derive(Debug, Deserialize, Clone)]
pub struct DiscoveryDeclaration {
    #[serde(default = "default_namespace")]
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub spec: DiscoverySpec,
}

impl DiscoveryDeclaration {
    pub fn key(&self) -> Key {
        Key::new(&self.namespace, &self.name)
    }
}

/// A collector resource declared in the configuration file.
#[derive(Debug, Deserialize, Clone)]
pub struct CollectorDeclaration {
    #[serde(default = "default_namespace")]
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub spec: CollectorSpec,
}

impl CollectorDeclaration {
    pub fn key(&self) -> Key {
        Key::new(&self.namespace, &self.name)
    }
}

fn default_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    9464
}

fn default_scrape_timeout() -> u64 {
    2
}

fn default_status_interval() -> u64 {
    10
}

fn default_namespace() -> String {
    "default".to_string()
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        // Load environment variables from .env if present
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("STRATA_COLLECTOR").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let config: Self = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Checks settings the service cannot run with. Resource specs are
    /// validated individually when they are installed.
    pub fn validate(&self) -> Result<()> {
        if self.scrape.timeout_seconds == 0 {
            anyhow::bail!("scrape.timeout_seconds must be at least 1");
        }
        if self.status.interval_seconds == 0 {
            anyhow::bail!("status.interval_seconds must be at least 1");
        }

        let mut seen = std::collections::HashSet::new();
        for key in self.collectors.iter().map(CollectorDeclaration::key) {
            if !seen.insert(key.clone()) {
                anyhow::bail!("collector {} declared more than once", key);
            }
        }

        let mut seen = std::collections::HashSet::new();
        for key in self.discoveries.iter().map(DiscoveryDeclaration::key) {
            if !seen.insert(key.clone()) {
                anyhow::bail!("discovery {} declared more than once", key);
            }
        }

        Ok(())
    }
}
