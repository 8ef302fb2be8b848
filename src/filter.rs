//! Metric drop filters
//!
//! A [`FilterChain`] runs its filters in order and drops a metric as soon as
//! one of them matches. Both built-in filters only look at counters and
//! gauges; untyped, summary and histogram records always pass.

use crate::cluster::resources::{ClipFilterConfig, CollectorFilters, ExcludeFilterConfig};
use crate::metric::{Metric, ValueType};

/// A drop predicate. `true` means the metric is discarded.
pub trait Filter: Send + Sync {
    fn matches(&self, metric: &Metric) -> bool;

    fn name(&self) -> &'static str;
}

fn scalar_value(metric: &Metric) -> Option<f64> {
    match metric.vtype {
        ValueType::Counter | ValueType::Gauge => metric.value(),
        _ => None,
    }
}

/// Drops counters and gauges whose value equals one of `values` exactly.
#[derive(Debug, Clone)]
pub struct ExcludeFilter {
    values: Vec<f64>,
}

impl ExcludeFilter {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }
}

impl From<&ExcludeFilterConfig> for ExcludeFilter {
    fn from(config: &ExcludeFilterConfig) -> Self {
        Self::new(config.values.clone())
    }
}

impl Filter for ExcludeFilter {
    fn matches(&self, metric: &Metric) -> bool {
        scalar_value(metric).is_some_and(|v| self.values.contains(&v))
    }

    fn name(&self) -> &'static str {
        "exclude"
    }
}

/// Drops counters and gauges outside `[min, max]` when inclusive, or outside
/// `(min, max)` otherwise.
#[derive(Debug, Clone)]
pub struct ClipFilter {
    min: f64,
    max: f64,
    inclusive: bool,
}

impl ClipFilter {
    pub fn new(min: f64, max: f64, inclusive: bool) -> Self {
        Self {
            min,
            max,
            inclusive,
        }
    }
}

impl From<&ClipFilterConfig> for ClipFilter {
    fn from(config: &ClipFilterConfig) -> Self {
        Self::new(config.min, config.max, config.inclusive)
    }
}

impl Filter for ClipFilter {
    fn matches(&self, metric: &Metric) -> bool {
        let Some(v) = scalar_value(metric) else {
            return false;
        };
        if self.inclusive {
            !(self.min <= v && v <= self.max)
        } else {
            !(self.min < v && v < self.max)
        }
    }

    fn name(&self) -> &'static str {
        "clip"
    }
}

#[derive(Default)]
pub struct FilterChain {
    filters: Vec<Box<dyn Filter>>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exclude runs before clip.
    pub fn from_config(config: &CollectorFilters) -> Self {
        let mut chain = Self::new();
        if let Some(exclude) = &config.exclude {
            chain = chain.with(ExcludeFilter::from(exclude));
        }
        if let Some(clip) = &config.clip {
            chain = chain.with(ClipFilter::from(clip));
        }
        chain
    }

    pub fn with(mut self, filter: impl Filter + 'static) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Returns the name of the first filter that matches, if any.
    pub fn first_match(&self, metric: &Metric) -> Option<&'static str> {
        self.filters
            .iter()
            .find(|f| f.matches(metric))
            .map(|f| f.name())
    }

    pub fn should_drop(&self, metric: &Metric) -> bool {
        self.first_match(metric).is_some()
    }
}
