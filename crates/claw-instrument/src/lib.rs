//! In-process metrics instrumentation with Prometheus exposition.
#![forbid(unsafe_code)]
//!
//! `claw-instrument` lets a service declare counters, gauges and histograms,
//! update them cheaply from any thread, and render a consistent snapshot in
//! the Prometheus text format or as length-delimited protobuf.
//!
//! # Features
//!
//! - **Typed values**: counters, set-only gauges, inc/dec gauges and histograms
//! - **Fixed label arity**: `CounterVec<2>` takes exactly two label values
//! - **Failure isolation**: a collector that cannot gather data this cycle is
//!   skipped and counted instead of failing the scrape
//! - **Two formats**: text 0.0.4 and delimited `MetricFamily` protobuf
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use claw_instrument::{Collector, CounterVec, Format, Histogram, Registry};
//!
//! // Metrics register with a collector when they are created.
//! let collector = Arc::new(Collector::new("api"));
//! let requests = CounterVec::with_collector("http_requests_total", "HTTP requests.", ["method", "code"], &collector).unwrap();
//! let latency = Histogram::with_collector("http_request_seconds", "Request latency.", &collector).unwrap();
//!
//! requests.labels(["GET", "200"]).inc();
//! latency.observe(0.042);
//!
//! // A registry renders every registered collector.
//! let registry = Registry::new();
//! registry.register_collector(collector).unwrap();
//!
//! let text = String::from_utf8(registry.encode(Format::Text).unwrap()).unwrap();
//! assert!(text.contains("http_requests_total{method=\"GET\",code=\"200\"} 1"));
//! assert!(text.contains("http_request_seconds_count 1"));
//! ```

#![doc(html_root_url = "https://docs.rs/claw-instrument/0.1.0")]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod collector;
pub mod config;
pub mod descriptor;
pub mod encoding;
pub mod error;
pub mod exposition;
pub mod guard;
pub mod metric;
pub mod registry;
pub mod value;

// Re-export main types at crate root
pub use collector::{Collect, Collector};
pub use config::{BucketLayout, ExpositionConfig};
pub use descriptor::{MetricDescriptor, make_metric_name};
pub use encoding::Format;
pub use error::{InstrumentError, Result};
pub use exposition::{ScrapeHandler, ScrapeResponse};
pub use guard::{InProgress, IntervalTimer};
pub use metric::{
    Counter, CounterVec, Histogram, HistogramVec, IncDecGauge, IncDecGaugeVec, LabeledMetric, Metric, SetGauge,
    SetGaugeVec, UnlabeledMetric,
};
pub use registry::Registry;
pub use value::{
    CounterValue, DEFAULT_HISTOGRAM_LEVELS, HistogramSnapshot, HistogramValue, IncDecGaugeValue, SetGaugeValue,
    Value, levels_linear, levels_powers_of,
};
