//! Metric containers.
//!
//! A metric pairs a [`MetricDescriptor`] with the values of its series:
//! - [`LabeledMetric`] maps `N` label values to one value per series,
//!   creating series lazily on first access
//! - [`UnlabeledMetric`] holds exactly one value and forwards its methods
//!
//! Both register themselves with a [`Collector`] at construction. Use the
//! type aliases ([`Counter`], [`CounterVec`], [`Histogram`], ...) rather than
//! naming the containers directly.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::collector::Collector;
use crate::descriptor::MetricDescriptor;
use crate::encoding::proto::{self, LabelPair, MetricFamily};
use crate::error::Result;
use crate::value::{CounterValue, HistogramSnapshot, HistogramValue, IncDecGaugeValue, SetGaugeValue, Value};

/// Unlabeled monotonic counter.
pub type Counter = UnlabeledMetric<CounterValue>;
/// Counter with `N` labels.
pub type CounterVec<const N: usize> = LabeledMetric<CounterValue, N>;
/// Unlabeled set-only gauge.
pub type SetGauge = UnlabeledMetric<SetGaugeValue>;
/// Set-only gauge with `N` labels.
pub type SetGaugeVec<const N: usize> = LabeledMetric<SetGaugeValue, N>;
/// Unlabeled increment/decrement gauge.
pub type IncDecGauge = UnlabeledMetric<IncDecGaugeValue>;
/// Increment/decrement gauge with `N` labels.
pub type IncDecGaugeVec<const N: usize> = LabeledMetric<IncDecGaugeValue, N>;
/// Unlabeled histogram.
pub type Histogram = UnlabeledMetric<HistogramValue>;
/// Histogram with `N` labels.
pub type HistogramVec<const N: usize> = LabeledMetric<HistogramValue, N>;

/// Anything a [`Collector`] can snapshot into a [`MetricFamily`].
pub trait Metric: Send + Sync + 'static {
    /// Returns the metric identity.
    fn descriptor(&self) -> &MetricDescriptor;

    /// Snapshots every series into a new family.
    fn collect(&self) -> MetricFamily;
}

fn family_for<V: Value>(descriptor: &MetricDescriptor) -> MetricFamily {
    MetricFamily::with_type(descriptor.name(), descriptor.help(), V::METRIC_TYPE)
}

/// A metric with `N >= 1` labels.
///
/// Series handles returned by [`labels`](Self::labels) are `Arc`s: after
/// [`remove`](Self::remove) or [`clear`](Self::clear) an outstanding handle
/// still works but is no longer exported.
pub struct LabeledMetric<V: Value, const N: usize> {
    descriptor: MetricDescriptor,
    prototype: V,
    series: Mutex<HashMap<[String; N], Arc<V>>>,
}

impl<V: Value, const N: usize> LabeledMetric<V, N> {
    const ARITY_CHECK: () = assert!(N >= 1, "a labeled metric needs at least one label");

    /// Creates a metric registered with the process-wide default collector.
    ///
    /// # Errors
    ///
    /// Returns `InstrumentError::InvalidName` if the name or a label name is invalid.
    pub fn new(name: impl Into<String>, help: impl Into<String>, label_names: [&str; N]) -> Result<Arc<Self>>
    where
        V: Default,
    {
        Self::with_prototype(name, help, label_names, V::default(), Collector::global())
    }

    /// Creates a metric registered with `collector`.
    ///
    /// # Errors
    ///
    /// Returns `InstrumentError::InvalidName` if the name or a label name is invalid.
    pub fn with_collector(
        name: impl Into<String>,
        help: impl Into<String>,
        label_names: [&str; N],
        collector: &Collector,
    ) -> Result<Arc<Self>>
    where
        V: Default,
    {
        Self::with_prototype(name, help, label_names, V::default(), collector)
    }

    /// Creates a metric whose series are instantiated from `prototype`.
    ///
    /// # Errors
    ///
    /// Returns `InstrumentError::InvalidName` if the name or a label name is invalid.
    pub fn with_prototype(
        name: impl Into<String>,
        help: impl Into<String>,
        label_names: [&str; N],
        prototype: V,
        collector: &Collector,
    ) -> Result<Arc<Self>> {
        let () = Self::ARITY_CHECK;
        let descriptor = MetricDescriptor::new(name, help, &label_names)?;
        let metric = Arc::new(Self {
            descriptor,
            prototype,
            series: Mutex::new(HashMap::new()),
        });
        let handle: Arc<dyn Metric> = metric.clone();
        collector.register_metric(handle);
        Ok(metric)
    }

    /// Returns the series for `values`, creating it if needed.
    ///
    /// Values are matched positionally against the declared label names.
    pub fn labels(&self, values: [&str; N]) -> Arc<V> {
        let key = values.map(str::to_string);
        let mut series = self.series.lock();
        Arc::clone(
            series
                .entry(key)
                .or_insert_with(|| Arc::new(self.prototype.new_series())),
        )
    }

    /// Drops the series for `values`. Returns `true` if it existed.
    pub fn remove(&self, values: [&str; N]) -> bool {
        let key = values.map(str::to_string);
        self.series.lock().remove(&key).is_some()
    }

    /// Drops every series.
    pub fn clear(&self) {
        self.series.lock().clear();
    }

    /// Returns the number of live series.
    #[must_use]
    pub fn len(&self) -> usize {
        self.series.lock().len()
    }

    /// Returns `true` if no series has been created.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.series.lock().is_empty()
    }
}

impl<const N: usize> LabeledMetric<HistogramValue, N> {
    /// Creates a histogram with custom bucket bounds, registered with the
    /// process-wide default collector.
    ///
    /// # Errors
    ///
    /// Returns `InstrumentError::UnsortedLevels` for bad bounds and
    /// `InstrumentError::InvalidName` for bad names.
    pub fn with_levels(
        name: impl Into<String>,
        help: impl Into<String>,
        label_names: [&str; N],
        levels: &[f64],
    ) -> Result<Arc<Self>> {
        let prototype = HistogramValue::new(levels)?;
        Self::with_prototype(name, help, label_names, prototype, Collector::global())
    }
}

impl<V: Value, const N: usize> Metric for LabeledMetric<V, N> {
    fn descriptor(&self) -> &MetricDescriptor {
        &self.descriptor
    }

    fn collect(&self) -> MetricFamily {
        let mut family = family_for::<V>(&self.descriptor);

        // Snapshot the map shape, then read values without holding the lock.
        let mut entries: Vec<([String; N], Arc<V>)> = self
            .series
            .lock()
            .iter()
            .map(|(key, value)| (key.clone(), Arc::clone(value)))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let names = self.descriptor.label_names();
        for (key, value) in entries {
            let mut metric = proto::Metric {
                label: names.iter().zip(key).map(|(name, value)| LabelPair::new(name.as_str(), value)).collect(),
                ..proto::Metric::default()
            };
            value.collect_value(&mut metric);
            family.metric.push(metric);
        }

        debug!(
            metric = %self.descriptor.name(),
            series = family.metric.len(),
            "collected labeled metric"
        );
        family
    }
}

impl<V: Value, const N: usize> std::fmt::Debug for LabeledMetric<V, N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LabeledMetric")
            .field("descriptor", &self.descriptor)
            .field("series_count", &self.len())
            .finish()
    }
}

/// A metric with exactly one series and no labels.
#[derive(Debug)]
pub struct UnlabeledMetric<V: Value> {
    descriptor: MetricDescriptor,
    value: V,
}

impl<V: Value> UnlabeledMetric<V> {
    /// Creates a metric registered with the process-wide default collector.
    ///
    /// # Errors
    ///
    /// Returns `InstrumentError::InvalidName` if the name is invalid.
    pub fn new(name: impl Into<String>, help: impl Into<String>) -> Result<Arc<Self>>
    where
        V: Default,
    {
        Self::with_value(name, help, V::default(), Collector::global())
    }

    /// Creates a metric registered with `collector`.
    ///
    /// # Errors
    ///
    /// Returns `InstrumentError::InvalidName` if the name is invalid.
    pub fn with_collector(
        name: impl Into<String>,
        help: impl Into<String>,
        collector: &Collector,
    ) -> Result<Arc<Self>>
    where
        V: Default,
    {
        Self::with_value(name, help, V::default(), collector)
    }

    /// Creates a metric holding `value`, registered with `collector`.
    ///
    /// # Errors
    ///
    /// Returns `InstrumentError::InvalidName` if the name is invalid.
    pub fn with_value(
        name: impl Into<String>,
        help: impl Into<String>,
        value: V,
        collector: &Collector,
    ) -> Result<Arc<Self>> {
        let descriptor = MetricDescriptor::new(name, help, &[])?;
        let metric = Arc::new(Self { descriptor, value });
        let handle: Arc<dyn Metric> = metric.clone();
        collector.register_metric(handle);
        Ok(metric)
    }

    /// Returns the underlying value.
    #[must_use]
    pub fn get(&self) -> &V {
        &self.value
    }
}

impl<V: Value> Metric for UnlabeledMetric<V> {
    fn descriptor(&self) -> &MetricDescriptor {
        &self.descriptor
    }

    fn collect(&self) -> MetricFamily {
        let mut family = family_for::<V>(&self.descriptor);
        let mut metric = proto::Metric::default();
        self.value.collect_value(&mut metric);
        family.metric.push(metric);
        family
    }
}

impl UnlabeledMetric<CounterValue> {
    /// Increments the counter by one.
    pub fn inc(&self) {
        self.value.inc();
    }

    /// Increments the counter by `delta`.
    ///
    /// # Errors
    ///
    /// Returns `InstrumentError::NegativeIncrement` if `delta` is negative.
    pub fn inc_by(&self, delta: f64) -> Result<()> {
        self.value.inc_by(delta)
    }

    /// Returns the current value.
    #[must_use]
    pub fn value(&self) -> f64 {
        self.value.value()
    }
}

impl UnlabeledMetric<SetGaugeValue> {
    /// Sets the gauge.
    pub fn set(&self, value: f64) {
        self.value.set(value);
    }

    /// Returns the current value.
    #[must_use]
    pub fn value(&self) -> f64 {
        self.value.value()
    }
}

impl UnlabeledMetric<IncDecGaugeValue> {
    /// Increments the gauge by one.
    pub fn inc(&self) {
        self.value.inc();
    }

    /// Adds `delta`.
    pub fn inc_by(&self, delta: f64) {
        self.value.inc_by(delta);
    }

    /// Decrements the gauge by one.
    pub fn dec(&self) {
        self.value.dec();
    }

    /// Subtracts `delta`.
    pub fn dec_by(&self, delta: f64) {
        self.value.dec_by(delta);
    }

    /// Sets the gauge.
    pub fn set(&self, value: f64) {
        self.value.set(value);
    }

    /// Returns the current value.
    #[must_use]
    pub fn value(&self) -> f64 {
        self.value.value()
    }
}

impl UnlabeledMetric<HistogramValue> {
    /// Creates a histogram with custom bucket bounds, registered with the
    /// process-wide default collector.
    ///
    /// # Errors
    ///
    /// Returns `InstrumentError::UnsortedLevels` for bad bounds and
    /// `InstrumentError::InvalidName` for a bad name.
    pub fn with_levels(name: impl Into<String>, help: impl Into<String>, levels: &[f64]) -> Result<Arc<Self>> {
        let value = HistogramValue::new(levels)?;
        Self::with_value(name, help, value, Collector::global())
    }

    /// Records one observation.
    pub fn observe(&self, value: f64) {
        self.value.observe(value);
    }

    /// Returns the cumulative count of the first bucket bounded by at least `threshold`.
    #[must_use]
    pub fn value(&self, threshold: f64) -> u64 {
        self.value.value(threshold)
    }

    /// Returns the number of observations.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.value.count()
    }

    /// Returns the sum of observations.
    #[must_use]
    pub fn sum(&self) -> f64 {
        self.value.sum()
    }

    /// Returns the upper bound of the bucket `value` falls into.
    #[must_use]
    pub fn level_up(&self, value: f64) -> f64 {
        self.value.level_up(value)
    }

    /// Copies buckets and sum consistently.
    #[must_use]
    pub fn snapshot(&self) -> HistogramSnapshot {
        self.value.snapshot()
    }
}
