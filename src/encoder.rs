//! Metric serialization
//!
//! Encoders turn a [`Metric`] into the bytes handed to a sink. JSON is the only
//! built-in format and the fallback for unrecognized names.

use crate::error::{CollectorError, Result};
use crate::metric::Metric;

pub trait Encoder: Send + Sync {
    fn encode(&self, metric: &Metric) -> Result<Vec<u8>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderKind {
    Json,
}

impl EncoderKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    pub fn build(self) -> Box<dyn Encoder> {
        match self {
            Self::Json => Box::new(JsonEncoder),
        }
    }
}

/// Builds the encoder named in a collector spec. Unknown names are rejected
/// by validation; here they resolve to JSON.
pub fn encoder_for(name: &str) -> Box<dyn Encoder> {
    EncoderKind::from_name(name)
        .unwrap_or(EncoderKind::Json)
        .build()
}

/// `{name, values, tags, timestamp, vtype}` as a single JSON object.
///
/// JSON has no representation for NaN or infinities, so a metric carrying
/// one is rejected instead of being written with a `null` value.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEncoder;

impl Encoder for JsonEncoder {
    fn encode(&self, metric: &Metric) -> Result<Vec<u8>> {
        if let Some((key, value)) = metric.values.iter().find(|(_, v)| !v.is_finite()) {
            let err = <serde_json::Error as serde::ser::Error>::custom(format!(
                "{} value {:?} of {} is not representable in JSON",
                key, value, metric.name
            ));
            return Err(CollectorError::Encode(err));
        }
        Ok(serde_json::to_vec(metric)?)
    }
}
