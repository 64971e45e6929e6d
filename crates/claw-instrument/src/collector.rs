//! Metric collectors.
//!
//! This module provides the [`Collect`] trait, implemented by anything that
//! can produce metric families on demand, and [`Collector`], the ownership
//! scope metrics register with at construction.

use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tracing::debug;

use crate::encoding::proto::MetricFamily;
use crate::error::Result;
use crate::metric::Metric;

static GLOBAL_COLLECTOR: Lazy<Arc<Collector>> = Lazy::new(|| Arc::new(Collector::new("default")));

/// Trait for sources of metric families.
///
/// Implement this trait to export metrics generated at scrape time, for
/// example from `/proc` or from another process.
pub trait Collect: Send + Sync {
    /// Produces a fresh snapshot. The caller owns the returned families.
    ///
    /// # Errors
    ///
    /// Return `InstrumentError::CollectionTransient` when data cannot be
    /// gathered this cycle; the registry counts it and moves on. Any other
    /// error aborts the whole collection.
    fn collect(&self) -> Result<Vec<MetricFamily>>;

    /// Returns the name of this collector for logging purposes.
    fn name(&self) -> &str;
}

/// A collector owning a list of registered metrics.
///
/// Metrics cannot be unregistered: they stay exported for the collector's lifetime.
pub struct Collector {
    name: String,
    metrics: RwLock<Vec<Arc<dyn Metric>>>,
}

impl Collector {
    /// Creates an empty collector.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            metrics: RwLock::new(Vec::new()),
        }
    }

    /// Returns the process-wide default collector.
    ///
    /// Metrics built without an explicit collector register here. It is
    /// created on first use and lives until the process exits.
    #[must_use]
    pub fn global() -> &'static Arc<Self> {
        &GLOBAL_COLLECTOR
    }

    /// Adds a metric to this collector.
    pub fn register_metric(&self, metric: Arc<dyn Metric>) {
        debug!(
            collector = %self.name,
            metric = %metric.descriptor(),
            "registered metric"
        );
        self.metrics.write().push(metric);
    }

    /// Returns the number of registered metrics.
    #[must_use]
    pub fn metric_count(&self) -> usize {
        self.metrics.read().len()
    }
}

impl Collect for Collector {
    fn collect(&self) -> Result<Vec<MetricFamily>> {
        let metrics = self.metrics.read();
        let families: Vec<MetricFamily> = metrics.iter().map(|metric| metric.collect()).collect();
        debug!(
            collector = %self.name,
            family_count = families.len(),
            "collected metrics"
        );
        Ok(families)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for Collector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collector")
            .field("name", &self.name)
            .field("metric_count", &self.metric_count())
            .finish()
    }
}
