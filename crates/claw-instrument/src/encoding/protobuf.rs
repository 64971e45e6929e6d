//! Length-delimited protobuf exposition.
//!
//! Each family is written as a varint length followed by the encoded
//! `io.prometheus.client.MetricFamily` message, back to back.

use prost::Message;
use prost::bytes::Buf;

use super::proto::MetricFamily;
use crate::error::{InstrumentError, Result};

/// Encodes already validated families as a delimited stream.
///
/// # Errors
///
/// Returns `InstrumentError::OutputFormatter` if prost fails to encode a message.
pub fn render(families: &[MetricFamily]) -> Result<Vec<u8>> {
    let capacity = families
        .iter()
        .map(|family| {
            let len = family.encoded_len();
            len + prost::length_delimiter_len(len)
        })
        .sum();
    let mut buf = Vec::with_capacity(capacity);
    for family in families {
        family
            .encode_length_delimited(&mut buf)
            .map_err(|e| InstrumentError::output_formatter(format!("protobuf encoding failed: {e}")))?;
    }
    Ok(buf)
}

/// Decodes a delimited stream back into families.
///
/// # Errors
///
/// Returns `InstrumentError::OutputFormatter` if the stream is truncated or
/// holds a malformed message.
pub fn decode(mut bytes: &[u8]) -> Result<Vec<MetricFamily>> {
    let mut families = Vec::new();
    while bytes.has_remaining() {
        let family = MetricFamily::decode_length_delimited(&mut bytes)
            .map_err(|e| InstrumentError::output_formatter(format!("malformed delimited stream: {e}")))?;
        families.push(family);
    }
    Ok(families)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::{Collect, Collector};
    use crate::encoding::proto::{Counter, Metric, MetricType};
    use crate::metric::{HistogramVec, IncDecGauge};
    use crate::value::HistogramValue;

    #[test]
    fn empty_input_is_empty_stream() {
        assert!(render(&[]).unwrap().is_empty());
        assert!(decode(&[]).unwrap().is_empty());
    }

    #[test]
    fn stream_starts_with_length_prefix() {
        let mut family = MetricFamily::with_type("c", "C.", MetricType::Counter);
        family.metric.push(Metric {
            counter: Some(Counter { value: Some(1.0) }),
            ..Metric::default()
        });
        let bytes = render(std::slice::from_ref(&family)).unwrap();
        let len = family.encoded_len();
        assert!(len < 128);
        assert_eq!(bytes[0] as usize, len);
        assert_eq!(bytes.len(), len + 1);
    }

    #[test]
    fn collected_metrics_decode() {
        let collector = Collector::new("proto");
        let levels = HistogramValue::new(&[1.0, 2.0]).unwrap();
        let latency = HistogramVec::with_prototype("latency", "Latency.", ["op"], levels, &collector).unwrap();
        latency.labels(["get"]).observe(1.5);
        let inflight = IncDecGauge::with_collector("inflight", "In flight.", &collector).unwrap();
        inflight.inc_by(3.0);

        let families = collector.collect().unwrap();
        let decoded = decode(&render(&families).unwrap()).unwrap();
        assert_eq!(decoded, families);

        let histogram = decoded[0].metric[0].histogram.as_ref().unwrap();
        let counts: Vec<u64> = histogram.bucket.iter().filter_map(|b| b.cumulative_count).collect();
        assert_eq!(counts, vec![0, 1, 1]);
        assert_eq!(decoded[1].metric[0].gauge.as_ref().and_then(|g| g.value), Some(3.0));
    }

    #[test]
    fn truncated_stream_rejected() {
        let family = MetricFamily::with_type("c", "C.", MetricType::Counter);
        let bytes = render(&[family]).unwrap();
        let err = decode(&bytes[..bytes.len() - 1]).unwrap_err();
        assert!(matches!(err, InstrumentError::OutputFormatter { .. }));
    }
}
