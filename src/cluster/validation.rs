//! Resource validation
//!
//! Checks run before an instance is built. Every problem found is reported,
//! not just the first one.

use super::resources::{CollectorSpec, DiscoverySpec};
use crate::encoder::EncoderKind;
use crate::error::{CollectorError, Result};

fn finish(warnings: Vec<String>) -> Result<()> {
    if warnings.is_empty() {
        Ok(())
    } else {
        Err(CollectorError::Validation(warnings))
    }
}

impl DiscoverySpec {
    pub fn validate(&self) -> Result<()> {
        let mut warnings = Vec::new();

        if self.interval_seconds < 1 {
            warnings.push("interval_seconds must be greater than 0".to_string());
        }

        if self.collectors.iter().any(|c| c.name.is_empty()) {
            warnings.push("collector name must be set".to_string());
        }

        if self.send_timeout_seconds == Some(0) {
            warnings.push("send_timeout_seconds must be greater than 0 when set".to_string());
        }

        finish(warnings)
    }
}

impl CollectorSpec {
    pub fn validate(&self) -> Result<()> {
        let mut warnings = Vec::new();

        if self.workers < 1 {
            warnings.push("workers must be greater than 0".to_string());
        }

        if self.buffer_size < 1 {
            warnings.push("buffer_size must be greater than 0".to_string());
        }

        if EncoderKind::from_name(&self.encoder).is_none() {
            warnings.push(format!("unknown encoder: {}", self.encoder));
        }

        if self.output.configured_count() > 1 {
            warnings.push("only one output may be configured".to_string());
        }

        if let Some(clip) = &self.filters.clip {
            if clip.min > clip.max {
                warnings.push("clip filter min must not exceed max".to_string());
            }
        }

        finish(warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::resources::{
        ClipFilterConfig, CollectorRef, NatsConfig, StdoutConfig,
    };

    #[test]
    fn test_default_specs_are_valid() {
        assert!(DiscoverySpec::default().validate().is_ok());
        assert!(CollectorSpec::default().validate().is_ok());
    }

    #[test]
    fn test_discovery_reports_every_problem() {
        let spec = DiscoverySpec {
            interval_seconds: 0,
            collectors: vec![CollectorRef {
                namespace: String::new(),
                name: String::new(),
            }],
            ..Default::default()
        };

        match spec.validate() {
            Err(CollectorError::Validation(warnings)) => assert_eq!(warnings.len(), 2),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_collector_rejects_zero_workers_and_unknown_encoder() {
        let spec = CollectorSpec {
            workers: 0,
            encoder: "avro".to_string(),
            ..Default::default()
        };

        let err = spec.validate().unwrap_err().to_string();
        assert!(err.contains("workers"));
        assert!(err.contains("avro"));
    }

    #[test]
    fn test_collector_rejects_two_outputs() {
        let mut spec = CollectorSpec::default();
        spec.output.nats = Some(NatsConfig::default());
        spec.output.stdout = Some(StdoutConfig::default());
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_collector_rejects_inverted_clip() {
        let mut spec = CollectorSpec::default();
        spec.filters.clip = Some(ClipFilterConfig {
            min: 10.0,
            max: 1.0,
            inclusive: true,
        });
        assert!(spec.validate().is_err());
    }
}
