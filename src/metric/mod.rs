//! Scraped metric records
//!
//! A [`Metric`] is one sample taken from a scrape, already flattened: summary
//! and histogram families become one record per quantile or bucket. The JSON
//! form `{name, values, tags, timestamp, vtype}` is the default wire format.

pub mod parse;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

pub use parse::{parse_exposition, parse_exposition_with_tags};

/// Value keys used for the scalar families.
pub const COUNTER_KEY: &str = "counter";
pub const GAUGE_KEY: &str = "gauge";
pub const UNTYPED_KEY: &str = "value";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Counter,
    Gauge,
    Untyped,
    Summary,
    Histogram,
    Unknown,
}

impl ValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Counter => "counter",
            Self::Gauge => "gauge",
            Self::Untyped => "untyped",
            Self::Summary => "summary",
            Self::Histogram => "histogram",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metric {
    pub name: String,
    pub values: BTreeMap<String, f64>,
    pub tags: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
    pub vtype: ValueType,
}

impl Metric {
    pub fn new(timestamp: DateTime<Utc>, name: impl Into<String>, tags: BTreeMap<String, String>) -> Self {
        Self {
            name: name.into(),
            values: BTreeMap::new(),
            tags,
            timestamp,
            vtype: ValueType::Unknown,
        }
    }

    pub fn with_type(mut self, vtype: ValueType) -> Self {
        self.vtype = vtype;
        self
    }

    pub fn with_value(mut self, key: impl Into<String>, value: f64) -> Self {
        self.values.insert(key.into(), value);
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// The scalar value of a counter, gauge or untyped sample. For flattened
    /// summary/histogram records this is the single quantile or bucket value.
    pub fn value(&self) -> Option<f64> {
        let key = match self.vtype {
            ValueType::Counter => COUNTER_KEY,
            ValueType::Gauge => GAUGE_KEY,
            ValueType::Untyped => UNTYPED_KEY,
            _ => return self.values.values().next().copied(),
        };
        self.values.get(key).copied()
    }
}
