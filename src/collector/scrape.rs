//! HTTP scraping
//!
//! One [`Scraper`] per collector pool, shared by its workers. Every request is
//! bounded by the client timeout; there are no retries.

use crate::cluster::resources::TlsConfig;
use crate::error::{CollectorError, Result};
use reqwest::{Certificate, Client, Identity};
use std::time::Duration;

pub const DEFAULT_SCRAPE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct Scraper {
    client: Client,
}

impl Scraper {
    pub fn new(timeout: Duration, tls: Option<&TlsConfig>) -> Result<Self> {
        let mut builder = Client::builder().timeout(timeout);

        if let Some(tls) = tls {
            if let Some(ca) = &tls.ca {
                let pem = std::fs::read(ca)?;
                builder = builder.add_root_certificate(Certificate::from_pem(&pem)?);
            }

            match (&tls.cert, &tls.key) {
                (Some(cert), Some(key)) => {
                    let cert = std::fs::read(cert)?;
                    let key = std::fs::read(key)?;
                    builder = builder.identity(Identity::from_pkcs8_pem(&cert, &key)?);
                }
                (None, None) => {}
                _ => {
                    return Err(CollectorError::Config(
                        "tls.cert and tls.key must be set together".to_string(),
                    ))
                }
            }

            builder = builder.danger_accept_invalid_certs(tls.insecure_skip_verify);
        }

        Ok(Self {
            client: builder.build()?,
        })
    }

    /// GETs `url` and returns the body. Non-2xx responses are errors.
    pub async fn fetch(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(CollectorError::ScrapeStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(response.text().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cert_without_key_rejected() {
        let tls = TlsConfig {
            cert: Some("/nonexistent/cert.pem".to_string()),
            ..Default::default()
        };
        let err = Scraper::new(DEFAULT_SCRAPE_TIMEOUT, Some(&tls)).unwrap_err();
        assert!(matches!(err, CollectorError::Config(_)));
    }

    #[test]
    fn test_missing_ca_file_is_io_error() {
        let tls = TlsConfig {
            ca: Some("/nonexistent/ca.pem".to_string()),
            ..Default::default()
        };
        let err = Scraper::new(DEFAULT_SCRAPE_TIMEOUT, Some(&tls)).unwrap_err();
        assert!(matches!(err, CollectorError::Io(_)));
    }

    #[tokio::test]
    async fn test_unreachable_target_is_scrape_error() {
        let scraper = Scraper::new(Duration::from_millis(200), None).unwrap();
        // Port 9 on loopback is assumed closed.
        let err = scraper.fetch("http://127.0.0.1:9/metrics").await.unwrap_err();
        assert!(matches!(err, CollectorError::Scrape(_)));
    }
}
