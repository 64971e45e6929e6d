//! Per-series value engines.
//!
//! Every series of a metric owns exactly one value:
//! - [`CounterValue`]: monotonic, lock-free
//! - [`SetGaugeValue`]: last write wins, lock-free
//! - [`IncDecGaugeValue`]: arbitrary increments, lock-free
//! - [`HistogramValue`]: cumulative buckets and a running sum behind one mutex
//!
//! Scalars accumulate through [`AtomicF64`], a compare-and-swap loop over the
//! bit pattern of an `f64` stored in an `AtomicU64`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::encoding::proto;
use crate::encoding::proto::MetricType;
use crate::error::{InstrumentError, Result};

/// Default histogram bucket bounds, in seconds.
pub const DEFAULT_HISTOGRAM_LEVELS: [f64; 15] = [
    0.005,
    0.01,
    0.025,
    0.05,
    0.075,
    0.1,
    0.25,
    0.5,
    0.75,
    1.0,
    2.5,
    5.0,
    7.5,
    10.0,
    f64::INFINITY,
];

/// Builds exponential bucket bounds: `0, base^0, base^1, ..., base^(count-1), +Inf`.
///
/// # Errors
///
/// Returns `InstrumentError::InvalidBucketLayout` if `count` is zero or `base`
/// is not a finite number greater than one.
pub fn levels_powers_of(base: f64, count: usize) -> Result<Vec<f64>> {
    if count == 0 {
        return Err(InstrumentError::InvalidBucketLayout {
            reason: "bucket count must be at least 1".to_string(),
        });
    }
    if !base.is_finite() || base <= 1.0 {
        return Err(InstrumentError::InvalidBucketLayout {
            reason: format!("exponential base must be finite and greater than 1, got {base}"),
        });
    }

    let mut levels = Vec::with_capacity(count + 2);
    levels.push(0.0);
    let mut exp = 0.0;
    for _ in 0..count {
        levels.push(base.powf(exp));
        exp += 1.0;
    }
    levels.push(f64::INFINITY);
    Ok(levels)
}

/// Builds `count` evenly spaced bucket bounds starting at `start`.
///
/// The `+Inf` bound is appended by [`HistogramValue::new`].
///
/// # Errors
///
/// Returns `InstrumentError::InvalidBucketLayout` if `count` is zero or the
/// parameters are not finite with a positive `width`.
pub fn levels_linear(start: f64, width: f64, count: usize) -> Result<Vec<f64>> {
    if count == 0 {
        return Err(InstrumentError::InvalidBucketLayout {
            reason: "bucket count must be at least 1".to_string(),
        });
    }
    if !start.is_finite() || !width.is_finite() || width <= 0.0 {
        return Err(InstrumentError::InvalidBucketLayout {
            reason: format!("linear buckets need finite start and positive width, got {start} and {width}"),
        });
    }
    Ok((0..count).map(|i| start + width * i as f64).collect())
}

/// An `f64` that can be updated atomically from many threads.
#[derive(Default)]
pub struct AtomicF64 {
    bits: AtomicU64,
}

impl AtomicF64 {
    /// Creates a new atomic holding `value`.
    #[must_use]
    pub fn new(value: f64) -> Self {
        Self {
            bits: AtomicU64::new(value.to_bits()),
        }
    }

    /// Loads the current value.
    #[must_use]
    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }

    /// Stores `value`, discarding the previous one.
    pub fn set(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }

    /// Adds `delta` without losing concurrent updates.
    pub fn add(&self, delta: f64) {
        let mut current = self.bits.load(Ordering::Relaxed);
        loop {
            let next = (f64::from_bits(current) + delta).to_bits();
            match self
                .bits
                .compare_exchange_weak(current, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }
}

impl std::fmt::Debug for AtomicF64 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("AtomicF64").field(&self.get()).finish()
    }
}

/// The numeric state of a single series.
pub trait Value: std::fmt::Debug + Send + Sync + 'static {
    /// The family type this value is exposed as.
    const METRIC_TYPE: MetricType;

    /// Creates a zeroed value sharing this value's configuration.
    ///
    /// Labeled metrics call this on their prototype for every new series.
    #[must_use]
    fn new_series(&self) -> Self;

    /// Writes this value's payload into a wire series.
    fn collect_value(&self, metric: &mut proto::Metric);
}

/// A monotonically increasing counter.
#[derive(Debug, Default)]
pub struct CounterValue {
    value: AtomicF64,
}

impl CounterValue {
    /// Increments the counter by one.
    pub fn inc(&self) {
        self.value.add(1.0);
    }

    /// Increments the counter by `delta`.
    ///
    /// # Errors
    ///
    /// Returns `InstrumentError::NegativeIncrement` if `delta` is negative or
    /// NaN; the counter is left unchanged.
    pub fn inc_by(&self, delta: f64) -> Result<()> {
        if delta.is_nan() || delta < 0.0 {
            return Err(InstrumentError::NegativeIncrement { delta });
        }
        self.value.add(delta);
        Ok(())
    }

    /// Returns the current value.
    #[must_use]
    pub fn value(&self) -> f64 {
        self.value.get()
    }
}

impl Value for CounterValue {
    const METRIC_TYPE: MetricType = MetricType::Counter;

    fn new_series(&self) -> Self {
        Self::default()
    }

    fn collect_value(&self, metric: &mut proto::Metric) {
        metric.counter = Some(proto::Counter {
            value: Some(self.value()),
        });
    }
}

/// A gauge that only supports setting its value.
#[derive(Debug, Default)]
pub struct SetGaugeValue {
    value: AtomicF64,
}

impl SetGaugeValue {
    /// Sets the gauge.
    pub fn set(&self, value: f64) {
        self.value.set(value);
    }

    /// Returns the current value.
    #[must_use]
    pub fn value(&self) -> f64 {
        self.value.get()
    }
}

impl Value for SetGaugeValue {
    const METRIC_TYPE: MetricType = MetricType::Gauge;

    fn new_series(&self) -> Self {
        Self::default()
    }

    fn collect_value(&self, metric: &mut proto::Metric) {
        metric.gauge = Some(proto::Gauge {
            value: Some(self.value()),
        });
    }
}

/// A gauge that moves up and down by arbitrary amounts.
#[derive(Debug, Default)]
pub struct IncDecGaugeValue {
    value: AtomicF64,
}

impl IncDecGaugeValue {
    /// Increments the gauge by one.
    pub fn inc(&self) {
        self.value.add(1.0);
    }

    /// Adds `delta`, which may be negative.
    pub fn inc_by(&self, delta: f64) {
        self.value.add(delta);
    }

    /// Decrements the gauge by one.
    pub fn dec(&self) {
        self.value.add(-1.0);
    }

    /// Subtracts `delta`, which may be negative.
    pub fn dec_by(&self, delta: f64) {
        self.value.add(-delta);
    }

    /// Sets the gauge.
    pub fn set(&self, value: f64) {
        self.value.set(value);
    }

    /// Returns the current value.
    #[must_use]
    pub fn value(&self) -> f64 {
        self.value.get()
    }
}

impl Value for IncDecGaugeValue {
    const METRIC_TYPE: MetricType = MetricType::Gauge;

    fn new_series(&self) -> Self {
        Self::default()
    }

    fn collect_value(&self, metric: &mut proto::Metric) {
        metric.gauge = Some(proto::Gauge {
            value: Some(self.value()),
        });
    }
}

#[derive(Debug)]
struct HistogramState {
    counts: Vec<u64>,
    sum: f64,
}

/// A consistent copy of a histogram's buckets and sum.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramSnapshot {
    /// Bucket upper bounds, the last one is `+Inf`.
    pub bounds: Vec<f64>,
    /// Cumulative count per bucket.
    pub counts: Vec<u64>,
    /// Sum of all observations.
    pub sum: f64,
}

impl HistogramSnapshot {
    /// Total number of observations.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.counts.last().copied().unwrap_or_default()
    }
}

/// A cumulative histogram.
///
/// Bucket counts and the sum are updated together under one mutex so a
/// reader never sees a non-monotonic set of buckets.
#[derive(Debug)]
pub struct HistogramValue {
    bounds: Arc<[f64]>,
    state: Mutex<HistogramState>,
}

impl HistogramValue {
    /// Creates a histogram with the given bucket upper bounds.
    ///
    /// A `+Inf` bound is appended when the last bound is finite.
    ///
    /// # Errors
    ///
    /// Returns `InstrumentError::UnsortedLevels` if the bounds are not strictly
    /// increasing or contain NaN.
    pub fn new(levels: &[f64]) -> Result<Self> {
        let mut previous: Option<f64> = None;
        for &level in levels {
            if level.is_nan() {
                return Err(InstrumentError::UnsortedLevels {
                    reason: "NaN is not a valid bucket bound".to_string(),
                });
            }
            if let Some(prev) = previous {
                if level <= prev {
                    return Err(InstrumentError::UnsortedLevels {
                        reason: format!("{level} follows {prev}"),
                    });
                }
            }
            previous = Some(level);
        }

        let mut bounds = levels.to_vec();
        if previous != Some(f64::INFINITY) {
            bounds.push(f64::INFINITY);
        }
        Ok(Self::from_bounds(bounds.into()))
    }

    fn from_bounds(bounds: Arc<[f64]>) -> Self {
        let state = HistogramState {
            counts: vec![0; bounds.len()],
            sum: 0.0,
        };
        Self {
            bounds,
            state: Mutex::new(state),
        }
    }

    /// Records one observation.
    pub fn observe(&self, value: f64) {
        let last = self.bounds.len() - 1;
        let mut state = self.state.lock();
        for (i, (bound, count)) in self.bounds.iter().zip(state.counts.iter_mut()).enumerate() {
            // The +Inf bucket counts every observation, NaN included.
            if value <= *bound || i == last {
                *count += 1;
            }
        }
        state.sum += value;
    }

    /// Returns the cumulative count of the first bucket whose bound is at
    /// least `threshold`.
    #[must_use]
    pub fn value(&self, threshold: f64) -> u64 {
        let state = self.state.lock();
        let index = self
            .bounds
            .iter()
            .position(|bound| threshold <= *bound)
            .unwrap_or(self.bounds.len() - 1);
        state.counts[index]
    }

    /// Returns the total number of observations.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.value(f64::INFINITY)
    }

    /// Returns the sum of all observations.
    #[must_use]
    pub fn sum(&self) -> f64 {
        self.state.lock().sum
    }

    /// Returns the upper bound of the bucket `value` falls into.
    #[must_use]
    pub fn level_up(&self, value: f64) -> f64 {
        self.bounds
            .iter()
            .copied()
            .find(|bound| value <= *bound)
            .unwrap_or(f64::INFINITY)
    }

    /// Returns the bucket upper bounds.
    #[must_use]
    pub fn bounds(&self) -> &[f64] {
        &self.bounds
    }

    /// Copies buckets and sum under a single lock acquisition.
    #[must_use]
    pub fn snapshot(&self) -> HistogramSnapshot {
        let state = self.state.lock();
        HistogramSnapshot {
            bounds: self.bounds.to_vec(),
            counts: state.counts.clone(),
            sum: state.sum,
        }
    }
}

impl Default for HistogramValue {
    fn default() -> Self {
        Self::from_bounds(Arc::from(DEFAULT_HISTOGRAM_LEVELS.as_slice()))
    }
}

impl Value for HistogramValue {
    const METRIC_TYPE: MetricType = MetricType::Histogram;

    fn new_series(&self) -> Self {
        Self::from_bounds(Arc::clone(&self.bounds))
    }

    fn collect_value(&self, metric: &mut proto::Metric) {
        let snapshot = self.snapshot();
        let sample_count = snapshot.count();
        let bucket = snapshot
            .bounds
            .iter()
            .zip(&snapshot.counts)
            .map(|(bound, count)| proto::Bucket {
                cumulative_count: Some(*count),
                upper_bound: Some(*bound),
            })
            .collect();
        metric.histogram = Some(proto::Histogram {
            sample_count: Some(sample_count),
            sample_sum: Some(snapshot.sum),
            bucket,
        });
    }
}
