//! NATS publisher
//!
//! Publishes each encoded metric as one message on the configured subject.
//! The connection is established in [`Sink::connect`]; publishing before that
//! is an error rather than a lazy connect.

use super::Sink;
use crate::cluster::resources::NatsConfig;
use crate::error::{CollectorError, Result};
use async_nats::{Client, ConnectOptions};
use async_trait::async_trait;
use bytes::Bytes;
use secrecy::ExposeSecret;
use tracing::{debug, info};

pub struct NatsSink {
    config: NatsConfig,
    client: Option<Client>,
}

impl NatsSink {
    pub fn new(config: NatsConfig) -> Self {
        Self {
            config,
            client: None,
        }
    }

    pub fn subject(&self) -> &str {
        &self.config.subject
    }

    fn client(&self) -> Result<&Client> {
        self.client
            .as_ref()
            .ok_or_else(|| CollectorError::Sink(format!("not connected to {}", self.config.url)))
    }
}

#[async_trait]
impl Sink for NatsSink {
    async fn connect(&mut self) -> Result<()> {
        let options = match &self.config.token {
            Some(token) => ConnectOptions::with_token(token.expose_secret().to_string()),
            None => ConnectOptions::new(),
        };

        let client = options
            .connect(self.config.url.as_str())
            .await
            .map_err(|e| CollectorError::Sink(format!("connect {}: {}", self.config.url, e)))?;

        info!(url = %self.config.url, subject = %self.config.subject, "Connected to NATS");
        self.client = Some(client);
        Ok(())
    }

    async fn send(&self, data: &[u8]) -> Result<()> {
        self.client()?
            .publish(self.config.subject.clone(), Bytes::copy_from_slice(data))
            .await
            .map_err(|e| CollectorError::Sink(format!("publish {}: {}", self.config.subject, e)))
    }

    async fn close(&self) -> Result<()> {
        if let Some(client) = &self.client {
            client
                .flush()
                .await
                .map_err(|e| CollectorError::Sink(format!("flush: {}", e)))?;
            debug!(subject = %self.config.subject, "Flushed NATS publisher");
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "nats"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_before_connect_fails() {
        let sink = NatsSink::new(NatsConfig::default());
        let err = sink.send(b"{}").await.unwrap_err();
        assert!(matches!(err, CollectorError::Sink(_)));
        assert!(err.to_string().contains("not connected"));
    }

    #[tokio::test]
    async fn test_close_without_connection_is_noop() {
        let sink = NatsSink::new(NatsConfig::default());
        assert!(sink.close().await.is_ok());
        assert_eq!(sink.subject(), "strata.metrics");
    }
}
