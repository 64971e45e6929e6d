//! Exposition encoding.
//!
//! [`render`] turns a collected snapshot into bytes in one of the supported
//! [`Format`]s. Every family is validated before anything is written, so a
//! malformed snapshot fails as a whole with `InstrumentError::OutputFormatter`
//! instead of producing partial output.
//!
//! # Example
//!
//! ```rust
//! use claw_instrument::encoding::{self, Format};
//! use claw_instrument::{Collector, CounterVec};
//!
//! let collector = Collector::new("example");
//! let requests = CounterVec::with_collector("requests_total", "Requests.", ["a"], &collector).unwrap();
//! requests.labels(["x"]).inc_by(4.2).unwrap();
//!
//! let families = vec![claw_instrument::Metric::collect(&*requests)];
//! let text = encoding::render(&families, Format::Text).unwrap();
//! assert_eq!(
//!     String::from_utf8(text).unwrap(),
//!     "# HELP requests_total Requests.\n# TYPE requests_total counter\nrequests_total{a=\"x\"} 4.2\n"
//! );
//! ```

pub mod proto;
pub mod protobuf;
pub mod text;

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::ExpositionConfig;
use crate::error::{InstrumentError, Result};
use proto::{Metric, MetricFamily, MetricType};

/// Content type of the text exposition format.
pub const TEXT_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Content type of the length-delimited protobuf exposition format.
pub const PROTOBUF_CONTENT_TYPE: &str =
    "application/vnd.google.protobuf; proto=io.prometheus.client.MetricFamily; encoding=delimited";

/// A wire format a scraper can read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Format {
    /// Line-oriented UTF-8 text.
    #[default]
    Text,
    /// Varint length-delimited `MetricFamily` messages.
    ProtobufDelimited,
}

impl Format {
    /// Returns the HTTP `Content-Type` for this format.
    #[must_use]
    pub const fn content_type(self) -> &'static str {
        match self {
            Self::Text => TEXT_CONTENT_TYPE,
            Self::ProtobufDelimited => PROTOBUF_CONTENT_TYPE,
        }
    }

    /// Picks a format from an HTTP `Accept` header, falling back to text.
    #[must_use]
    pub fn negotiate(accept: Option<&str>) -> Self {
        let Some(accept) = accept else {
            return Self::Text;
        };
        let wants_protobuf = accept.split(',').any(|media| {
            media.contains("application/vnd.google.protobuf")
                && media.contains("proto=io.prometheus.client.MetricFamily")
                && media.contains("encoding=delimited")
        });
        if wants_protobuf {
            Self::ProtobufDelimited
        } else {
            Self::Text
        }
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => f.write_str("text"),
            Self::ProtobufDelimited => f.write_str("protobuf-delimited"),
        }
    }
}

impl FromStr for Format {
    type Err = InstrumentError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "text" => Ok(Self::Text),
            "protobuf-delimited" | "protobuf" => Ok(Self::ProtobufDelimited),
            other => Err(InstrumentError::output_formatter(format!(
                "unknown exposition format '{other}'"
            ))),
        }
    }
}

/// Renders `families` in `format`.
///
/// # Errors
///
/// Returns `InstrumentError::OutputFormatter` if any family is malformed:
/// missing name or type, no series, a series whose payload does not match
/// the family type, a histogram without buckets, or any summary.
pub fn render(families: &[MetricFamily], format: Format) -> Result<Vec<u8>> {
    for family in families {
        validate_family(family)?;
    }
    match format {
        Format::Text => text::render(families).map(String::into_bytes),
        Format::ProtobufDelimited => protobuf::render(families),
    }
}

/// Renders `families` according to `config`.
///
/// With `skip_empty_families` set, families without series are dropped
/// before validation, so labeled metrics nobody has touched yet do not fail
/// the scrape.
///
/// # Errors
///
/// Same as [`render`].
pub fn render_with(families: &[MetricFamily], config: &ExpositionConfig) -> Result<Vec<u8>> {
    if config.skip_empty_families && families.iter().any(|family| family.metric.is_empty()) {
        let kept: Vec<MetricFamily> = families
            .iter()
            .filter(|family| !family.metric.is_empty())
            .cloned()
            .collect();
        return render(&kept, config.format);
    }
    render(families, config.format)
}

/// Checks that a family can be rendered and returns its type.
///
/// # Errors
///
/// Returns `InstrumentError::OutputFormatter` describing the first problem found.
pub fn validate_family(family: &MetricFamily) -> Result<MetricType> {
    let name = match family.name.as_deref() {
        Some(name) if !name.is_empty() => name,
        _ => return Err(InstrumentError::output_formatter("metric family has no name")),
    };
    let Some(raw_type) = family.r#type else {
        return Err(InstrumentError::output_formatter(format!(
            "metric family '{name}' has no type"
        )));
    };
    let Some(metric_type) = family.metric_type() else {
        return Err(InstrumentError::output_formatter(format!(
            "metric family '{name}' has invalid type {raw_type}"
        )));
    };
    if family.metric.is_empty() {
        return Err(InstrumentError::output_formatter(format!(
            "metric family '{name}' is empty"
        )));
    }
    if metric_type == MetricType::Summary {
        return Err(InstrumentError::output_formatter(format!(
            "metric family '{name}': summaries are not implemented"
        )));
    }
    for metric in &family.metric {
        validate_metric(name, metric_type, metric)?;
    }
    Ok(metric_type)
}

fn validate_metric(name: &str, metric_type: MetricType, metric: &Metric) -> Result<()> {
    if metric.label.iter().any(|pair| pair.name.is_none() || pair.value.is_none()) {
        return Err(InstrumentError::output_formatter(format!(
            "metric family '{name}' has a label pair without name or value"
        )));
    }

    let missing = |field: &str| {
        InstrumentError::output_formatter(format!(
            "metric family '{name}' of type {metric_type} is missing required field '{field}'"
        ))
    };

    match metric_type {
        MetricType::Counter => {
            metric.counter.as_ref().ok_or_else(|| missing("counter"))?.value.ok_or_else(|| missing("counter.value"))?;
        }
        MetricType::Gauge => {
            metric.gauge.as_ref().ok_or_else(|| missing("gauge"))?.value.ok_or_else(|| missing("gauge.value"))?;
        }
        MetricType::Untyped => {
            metric.untyped.as_ref().ok_or_else(|| missing("untyped"))?.value.ok_or_else(|| missing("untyped.value"))?;
        }
        MetricType::Histogram => {
            let histogram = metric.histogram.as_ref().ok_or_else(|| missing("histogram"))?;
            if histogram.bucket.is_empty() {
                return Err(missing("histogram.bucket"));
            }
            for bucket in &histogram.bucket {
                bucket.cumulative_count.ok_or_else(|| missing("bucket.cumulative_count"))?;
                bucket.upper_bound.ok_or_else(|| missing("bucket.upper_bound"))?;
            }
        }
        MetricType::Summary => {
            return Err(InstrumentError::output_formatter(format!(
                "metric family '{name}': summaries are not implemented"
            )));
        }
    }
    Ok(())
}

/// Decimal exponents rendered in positional notation.
const POSITIONAL_EXPONENTS: std::ops::RangeInclusive<i32> = -5..=16;

/// Renders a float the way the exposition formats expect.
///
/// Infinities become `+Inf`/`-Inf`. Finite values use the shortest digits
/// that parse back to the same `f64`, switching to exponent notation
/// (`1e300`, `5e-324`) outside `1e-5..1e17`.
#[must_use]
pub fn format_float(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "+Inf" } else { "-Inf" }.to_string();
    }

    let scientific = format!("{value:e}");
    let exponent = scientific
        .rsplit_once('e')
        .and_then(|(_, exponent)| exponent.parse::<i32>().ok())
        .unwrap_or_default();
    if POSITIONAL_EXPONENTS.contains(&exponent) {
        value.to_string()
    } else {
        scientific
    }
}
