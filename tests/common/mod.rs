//! Shared fixtures for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use axum::{routing::get, Router};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use strata_collector::cluster::resources::{CollectorStatus, DiscoveryStatus};
use strata_collector::cluster::types::{Key, ObjectMeta, Pod, Service};
use strata_collector::cluster::StatusWriter;
use strata_collector::error::{CollectorError, Result};
use strata_collector::sink::Sink;

/// Sink keeping every payload in memory.
#[derive(Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<Vec<u8>>>,
    fail: AtomicBool,
    pub closed: AtomicUsize,
}

impl RecordingSink {
    pub fn failing() -> Self {
        let sink = Self::default();
        sink.fail.store(true, Ordering::SeqCst);
        sink
    }

    pub fn messages(&self) -> Vec<serde_json::Value> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .map(|m| serde_json::from_slice(m).unwrap())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().unwrap().len()
    }
}

#[async_trait]
impl Sink for RecordingSink {
    async fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    async fn send(&self, data: &[u8]) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CollectorError::Sink("broken pipe".to_string()));
        }
        self.messages.lock().unwrap().push(data.to_vec());
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// Status writer keeping every write in memory.
#[derive(Default)]
pub struct RecordingStatus {
    pub discoveries: Mutex<Vec<(Key, DiscoveryStatus)>>,
    pub collectors: Mutex<Vec<(Key, CollectorStatus)>>,
}

impl RecordingStatus {
    pub fn last_discovery(&self) -> Option<DiscoveryStatus> {
        self.discoveries.lock().unwrap().last().map(|(_, s)| s.clone())
    }

    pub fn discovery_writes(&self) -> usize {
        self.discoveries.lock().unwrap().len()
    }

    pub fn last_collector(&self) -> Option<CollectorStatus> {
        self.collectors.lock().unwrap().last().map(|(_, s)| s.clone())
    }
}

#[async_trait]
impl StatusWriter for RecordingStatus {
    async fn update_discovery_status(&self, key: &Key, status: &DiscoveryStatus) -> Result<()> {
        self.discoveries
            .lock()
            .unwrap()
            .push((key.clone(), status.clone()));
        Ok(())
    }

    async fn update_collector_status(&self, key: &Key, status: &CollectorStatus) -> Result<()> {
        self.collectors
            .lock()
            .unwrap()
            .push((key.clone(), status.clone()));
        Ok(())
    }
}

/// Serves `body` at `/metrics` on an ephemeral loopback port.
pub async fn spawn_exporter(body: &'static str) -> SocketAddr {
    let app = Router::new()
        .route("/metrics", get(move || async move { body }))
        .route(
            "/broken",
            get(|| async { (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Serves `body` at `/metrics` after holding every request for `delay`.
pub async fn spawn_slow_exporter(body: &'static str, delay: Duration) -> SocketAddr {
    let app = Router::new().route(
        "/metrics",
        get(move || async move {
            tokio::time::sleep(delay).await;
            body
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

pub fn scrape_annotations(port: u16) -> BTreeMap<String, String> {
    [
        ("prometheus.io/scrape".to_string(), "true".to_string()),
        ("prometheus.io/port".to_string(), port.to_string()),
    ]
    .into()
}

pub fn pod(namespace: &str, name: &str, ip: &str, annotations: BTreeMap<String, String>) -> Pod {
    Pod {
        metadata: ObjectMeta {
            namespace: namespace.to_string(),
            name: name.to_string(),
            labels: [("app".to_string(), name.to_string())].into(),
            annotations,
            ..Default::default()
        },
        pod_ip: Some(ip.to_string()),
    }
}

pub fn service(
    namespace: &str,
    name: &str,
    cluster_ip: &str,
    annotations: BTreeMap<String, String>,
) -> Service {
    Service {
        metadata: ObjectMeta {
            namespace: namespace.to_string(),
            name: name.to_string(),
            annotations,
            ..Default::default()
        },
        cluster_ip: cluster_ip.to_string(),
    }
}

/// Polls `check` until it holds or `timeout` elapses.
pub async fn eventually(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}
