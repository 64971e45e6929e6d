//! Text exposition format, version 0.0.4.

use std::fmt::Write;

use super::format_float;
use super::proto::{LabelPair, Metric, MetricFamily, MetricType};
use crate::error::{InstrumentError, Result};

/// Renders already validated families as text.
///
/// # Errors
///
/// Returns `InstrumentError::OutputFormatter` if a family carries a type
/// without a text rendering.
pub fn render(families: &[MetricFamily]) -> Result<String> {
    let mut out = String::new();
    for family in families {
        write_family(&mut out, family)?;
    }
    Ok(out)
}

fn write_family(out: &mut String, family: &MetricFamily) -> Result<()> {
    let name = family.name_str();
    let Some(metric_type) = family.metric_type() else {
        return Err(InstrumentError::output_formatter(format!(
            "metric family '{name}' has no type"
        )));
    };

    let help = family.help.as_deref().unwrap_or_default();
    let _ = writeln!(out, "# HELP {name} {}", escape_help(help));
    let _ = writeln!(out, "# TYPE {name} {}", metric_type.as_text());

    for metric in &family.metric {
        match metric_type {
            MetricType::Counter => {
                let value = metric.counter.as_ref().and_then(|c| c.value);
                write_sample(out, name, &metric.label, None, value.unwrap_or_default(), metric.timestamp_ms);
            }
            MetricType::Gauge => {
                let value = metric.gauge.as_ref().and_then(|g| g.value);
                write_sample(out, name, &metric.label, None, value.unwrap_or_default(), metric.timestamp_ms);
            }
            MetricType::Untyped => {
                let value = metric.untyped.as_ref().and_then(|u| u.value);
                write_sample(out, name, &metric.label, None, value.unwrap_or_default(), metric.timestamp_ms);
            }
            MetricType::Histogram => write_histogram(out, name, metric),
            MetricType::Summary => {
                return Err(InstrumentError::output_formatter(format!(
                    "metric family '{name}': summaries are not implemented"
                )));
            }
        }
    }
    Ok(())
}

fn write_histogram(out: &mut String, name: &str, metric: &Metric) {
    let Some(histogram) = metric.histogram.as_ref() else {
        return;
    };
    let bucket_name = format!("{name}_bucket");
    for bucket in &histogram.bucket {
        let le = format_float(bucket.upper_bound.unwrap_or(f64::INFINITY));
        let count = bucket.cumulative_count.unwrap_or_default();
        write_sample(
            out,
            &bucket_name,
            &metric.label,
            Some(("le", &le)),
            count as f64,
            metric.timestamp_ms,
        );
    }

    let count = histogram
        .sample_count
        .or_else(|| histogram.bucket.last().and_then(|b| b.cumulative_count))
        .unwrap_or_default();
    write_sample(
        out,
        &format!("{name}_sum"),
        &metric.label,
        None,
        histogram.sample_sum.unwrap_or_default(),
        metric.timestamp_ms,
    );
    write_sample(
        out,
        &format!("{name}_count"),
        &metric.label,
        None,
        count as f64,
        metric.timestamp_ms,
    );
}

fn write_sample(
    out: &mut String,
    name: &str,
    labels: &[LabelPair],
    extra: Option<(&str, &str)>,
    value: f64,
    timestamp_ms: Option<i64>,
) {
    out.push_str(name);
    let pairs = labels
        .iter()
        .map(|pair| {
            (
                pair.name.as_deref().unwrap_or_default(),
                pair.value.as_deref().unwrap_or_default(),
            )
        })
        .chain(extra);

    let mut first = true;
    for (label, label_value) in pairs {
        out.push(if first { '{' } else { ',' });
        first = false;
        let _ = write!(out, "{label}=\"{}\"", escape_label_value(label_value));
    }
    if !first {
        out.push('}');
    }

    let _ = write!(out, " {}", format_float(value));
    if let Some(ts) = timestamp_ms {
        let _ = write!(out, " {ts}");
    }
    out.push('\n');
}

/// Escapes a `# HELP` docstring: backslash and line feed.
#[must_use]
pub fn escape_help(help: &str) -> String {
    escape(help, false)
}

/// Escapes a label value: backslash, double quote and line feed.
#[must_use]
pub fn escape_label_value(value: &str) -> String {
    escape(value, true)
}

fn escape(input: &str, quotes: bool) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '"' if quotes => out.push_str("\\\""),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::Collector;
    use crate::encoding::proto::{Bucket, Counter, Gauge, Histogram as HistogramProto, Untyped};
    use crate::metric::{CounterVec, Histogram, Metric as _, SetGauge};
    use proptest::prelude::*;
    use test_case::test_case;

    fn render_one(family: &MetricFamily) -> String {
        render(std::slice::from_ref(family)).unwrap()
    }

    #[test]
    fn labeled_counter() {
        let mut family = MetricFamily::with_type("n", "h", MetricType::Counter);
        family.metric.push(Metric {
            label: vec![LabelPair::new("a", "x")],
            counter: Some(Counter { value: Some(4.2) }),
            ..Metric::default()
        });
        assert_eq!(render_one(&family), "# HELP n h\n# TYPE n counter\nn{a=\"x\"} 4.2\n");
    }

    #[test]
    fn unlabeled_gauge_with_empty_help() {
        let mut family = MetricFamily::with_type("temp", "", MetricType::Gauge);
        family.metric.push(Metric {
            gauge: Some(Gauge { value: Some(-3.5) }),
            ..Metric::default()
        });
        assert_eq!(render_one(&family), "# HELP temp \n# TYPE temp gauge\ntemp -3.5\n");
    }

    #[test]
    fn unset_help_still_writes_help_line() {
        let mut family = MetricFamily::with_type("n", "", MetricType::Counter);
        family.help = None;
        family.metric.push(Metric {
            counter: Some(Counter { value: Some(1.0) }),
            ..Metric::default()
        });
        assert_eq!(render_one(&family), "# HELP n \n# TYPE n counter\nn 1\n");
    }

    #[test]
    fn untyped_with_timestamp() {
        let mut family = MetricFamily::with_type("u", "U.", MetricType::Untyped);
        family.metric.push(Metric {
            untyped: Some(Untyped { value: Some(1.0) }),
            timestamp_ms: Some(1_700_000_000_000),
            ..Metric::default()
        });
        assert_eq!(
            render_one(&family),
            "# HELP u U.\n# TYPE u untyped\nu 1 1700000000000\n"
        );
    }

    #[test]
    fn histogram_lines() {
        let mut family = MetricFamily::with_type("lat", "Latency.", MetricType::Histogram);
        family.metric.push(Metric {
            label: vec![LabelPair::new("op", "get")],
            histogram: Some(HistogramProto {
                sample_count: Some(3),
                sample_sum: Some(2.5),
                bucket: vec![
                    Bucket {
                        cumulative_count: Some(1),
                        upper_bound: Some(0.5),
                    },
                    Bucket {
                        cumulative_count: Some(3),
                        upper_bound: Some(f64::INFINITY),
                    },
                ],
            }),
            ..Metric::default()
        });
        assert_eq!(
            render_one(&family),
            "# HELP lat Latency.\n\
             # TYPE lat histogram\n\
             lat_bucket{op=\"get\",le=\"0.5\"} 1\n\
             lat_bucket{op=\"get\",le=\"+Inf\"} 3\n\
             lat_sum{op=\"get\"} 2.5\n\
             lat_count{op=\"get\"} 3\n"
        );
    }

    #[test]
    fn histogram_count_falls_back_to_last_bucket() {
        let mut family = MetricFamily::with_type("h", "", MetricType::Histogram);
        family.metric.push(Metric {
            histogram: Some(HistogramProto {
                bucket: vec![Bucket {
                    cumulative_count: Some(2),
                    upper_bound: Some(4.2),
                }],
                ..HistogramProto::default()
            }),
            ..Metric::default()
        });
        let text = render_one(&family);
        assert!(text.contains("h_bucket{le=\"4.2\"} 2\n"));
        assert!(text.contains("h_count 2\n"));
    }

    #[test]
    fn collected_metrics_render() {
        let collector = Collector::new("text");
        let requests = CounterVec::with_collector("requests_total", "Requests.", ["code", "method"], &collector).unwrap();
        requests.labels(["500", "get"]).inc();
        requests.labels(["200", "get"]).inc_by(2.0).unwrap();
        let temp = SetGauge::with_collector("temp", "Temperature.", &collector).unwrap();
        temp.set(f64::NEG_INFINITY);
        let latency = Histogram::with_collector("latency", "Latency.", &collector).unwrap();
        latency.observe(0.3);

        let text = render(&[requests.collect(), temp.collect(), latency.collect()]).unwrap();
        assert!(text.contains(
            "requests_total{code=\"200\",method=\"get\"} 2\nrequests_total{code=\"500\",method=\"get\"} 1\n"
        ));
        assert!(text.contains("temp -Inf\n"));
        assert!(text.contains("latency_bucket{le=\"+Inf\"} 1\n"));
        assert!(text.contains("latency_count 1\n"));
    }

    #[test_case("plain", "plain" ; "plain")]
    #[test_case("a\\b", "a\\\\b" ; "backslash")]
    #[test_case("a\nb", "a\\nb" ; "newline")]
    #[test_case("say \"hi\"", "say \"hi\"" ; "quotes kept")]
    #[test_case("über", "über" ; "non ascii")]
    fn help_escaping(input: &str, expected: &str) {
        assert_eq!(escape_help(input), expected);
    }

    #[test_case("plain", "plain" ; "plain")]
    #[test_case("a\\b", "a\\\\b" ; "backslash")]
    #[test_case("a\nb", "a\\nb" ; "newline")]
    #[test_case("say \"hi\"", "say \\\"hi\\\"" ; "quotes escaped")]
    #[test_case("na\u{ef}ve \"\u{fc}\"\n", "na\u{ef}ve \\\"\u{fc}\\\"\\n" ; "non ascii")]
    #[test_case("\u{1f4a1}\\", "\u{1f4a1}\\\\" ; "four byte char")]
    fn label_value_escaping(input: &str, expected: &str) {
        assert_eq!(escape_label_value(input), expected);
    }

    #[test]
    fn escaped_values_in_output() {
        let mut family = MetricFamily::with_type("n", "line one\nline \\two", MetricType::Gauge);
        family.metric.push(Metric {
            label: vec![LabelPair::new("path", "C:\\tmp\n\"x\"")],
            gauge: Some(Gauge { value: Some(1.0) }),
            ..Metric::default()
        });
        assert_eq!(
            render_one(&family),
            "# HELP n line one\\nline \\\\two\n# TYPE n gauge\nn{path=\"C:\\\\tmp\\n\\\"x\\\"\"} 1\n"
        );
    }

    proptest! {
        #[test]
        fn escaped_label_values_stay_on_one_line(value in any::<String>()) {
            let escaped = escape_label_value(&value);
            prop_assert!(!escaped.contains('\n'));
            // Every quote left in the output is preceded by a backslash.
            let bytes = escaped.as_bytes();
            for (i, b) in bytes.iter().enumerate() {
                if *b == b'"' {
                    prop_assert!(i > 0 && bytes[i - 1] == b'\\');
                }
            }
        }
    }
}
