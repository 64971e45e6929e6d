//! Wire snapshot messages.
//!
//! These mirror the proto2 `io.prometheus.client` schema so the binary
//! exposition is readable by any Prometheus-compatible scraper. Scalar fields
//! are optional, as in proto2, which lets the encoder detect snapshots with
//! missing required data.

use prost::Message;

/// The type of a metric family.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum MetricType {
    /// Monotonic counter.
    Counter = 0,
    /// Arbitrary value gauge.
    Gauge = 1,
    /// Quantile summary (not produced by this crate).
    Summary = 2,
    /// Value without type information.
    Untyped = 3,
    /// Cumulative bucket histogram.
    Histogram = 4,
}

impl MetricType {
    /// Returns the name used on `# TYPE` lines of the text format.
    #[must_use]
    pub const fn as_text(self) -> &'static str {
        match self {
            Self::Counter => "counter",
            Self::Gauge => "gauge",
            Self::Summary => "summary",
            Self::Untyped => "untyped",
            Self::Histogram => "histogram",
        }
    }
}

impl std::fmt::Display for MetricType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_text())
    }
}

/// A label name/value pair attached to one series.
#[derive(Clone, PartialEq, Message)]
pub struct LabelPair {
    /// Label name.
    #[prost(string, optional, tag = "1")]
    pub name: Option<String>,
    /// Label value.
    #[prost(string, optional, tag = "2")]
    pub value: Option<String>,
}

impl LabelPair {
    /// Creates a label pair.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            value: Some(value.into()),
        }
    }
}

/// Gauge payload.
#[derive(Clone, PartialEq, Message)]
pub struct Gauge {
    /// Current value.
    #[prost(double, optional, tag = "1")]
    pub value: Option<f64>,
}

/// Counter payload.
#[derive(Clone, PartialEq, Message)]
pub struct Counter {
    /// Current value.
    #[prost(double, optional, tag = "1")]
    pub value: Option<f64>,
}

/// One quantile of a summary.
#[derive(Clone, PartialEq, Message)]
pub struct Quantile {
    /// The quantile rank, in `[0, 1]`.
    #[prost(double, optional, tag = "1")]
    pub quantile: Option<f64>,
    /// The value at that rank.
    #[prost(double, optional, tag = "2")]
    pub value: Option<f64>,
}

/// Summary payload.
#[derive(Clone, PartialEq, Message)]
pub struct Summary {
    /// Number of observations.
    #[prost(uint64, optional, tag = "1")]
    pub sample_count: Option<u64>,
    /// Sum of observations.
    #[prost(double, optional, tag = "2")]
    pub sample_sum: Option<f64>,
    /// Quantiles.
    #[prost(message, repeated, tag = "3")]
    pub quantile: Vec<Quantile>,
}

/// Untyped payload.
#[derive(Clone, PartialEq, Message)]
pub struct Untyped {
    /// Current value.
    #[prost(double, optional, tag = "1")]
    pub value: Option<f64>,
}

/// Histogram payload.
#[derive(Clone, PartialEq, Message)]
pub struct Histogram {
    /// Number of observations.
    #[prost(uint64, optional, tag = "1")]
    pub sample_count: Option<u64>,
    /// Sum of observations.
    #[prost(double, optional, tag = "2")]
    pub sample_sum: Option<f64>,
    /// Cumulative buckets, ordered by increasing upper bound.
    #[prost(message, repeated, tag = "3")]
    pub bucket: Vec<Bucket>,
}

/// One cumulative histogram bucket.
#[derive(Clone, PartialEq, Message)]
pub struct Bucket {
    /// Number of observations less than or equal to `upper_bound`.
    #[prost(uint64, optional, tag = "1")]
    pub cumulative_count: Option<u64>,
    /// Inclusive upper bound.
    #[prost(double, optional, tag = "2")]
    pub upper_bound: Option<f64>,
}

/// One series of a family.
#[derive(Clone, PartialEq, Message)]
pub struct Metric {
    /// Label pairs in declaration order.
    #[prost(message, repeated, tag = "1")]
    pub label: Vec<LabelPair>,
    /// Set for gauge families.
    #[prost(message, optional, tag = "2")]
    pub gauge: Option<Gauge>,
    /// Set for counter families.
    #[prost(message, optional, tag = "3")]
    pub counter: Option<Counter>,
    /// Set for summary families.
    #[prost(message, optional, tag = "4")]
    pub summary: Option<Summary>,
    /// Set for untyped families.
    #[prost(message, optional, tag = "5")]
    pub untyped: Option<Untyped>,
    /// Set for histogram families.
    #[prost(message, optional, tag = "7")]
    pub histogram: Option<Histogram>,
    /// Optional sample timestamp, in milliseconds since the epoch.
    #[prost(int64, optional, tag = "6")]
    pub timestamp_ms: Option<i64>,
}

/// A snapshot of every series of one metric.
#[derive(Clone, PartialEq, Message)]
pub struct MetricFamily {
    /// Metric name.
    #[prost(string, optional, tag = "1")]
    pub name: Option<String>,
    /// Help text.
    #[prost(string, optional, tag = "2")]
    pub help: Option<String>,
    /// Family type, see [`MetricType`].
    #[prost(enumeration = "MetricType", optional, tag = "3")]
    pub r#type: Option<i32>,
    /// Series.
    #[prost(message, repeated, tag = "4")]
    pub metric: Vec<Metric>,
}

impl MetricFamily {
    /// Creates an empty family with name, help and type set.
    #[must_use]
    pub fn with_type(name: impl Into<String>, help: impl Into<String>, metric_type: MetricType) -> Self {
        Self {
            name: Some(name.into()),
            help: Some(help.into()),
            r#type: Some(metric_type as i32),
            metric: Vec::new(),
        }
    }

    /// Returns the family type, or `None` if unset or unknown.
    #[must_use]
    pub fn metric_type(&self) -> Option<MetricType> {
        self.r#type.and_then(|raw| MetricType::try_from(raw).ok())
    }

    /// Returns the family name, or an empty string if unset.
    #[must_use]
    pub fn name_str(&self) -> &str {
        self.name.as_deref().unwrap_or_default()
    }
}
