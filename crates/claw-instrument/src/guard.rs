//! Scope guards over metric values.

use std::time::Instant;

use crate::metric::{Histogram, IncDecGauge};
use crate::value::{HistogramValue, IncDecGaugeValue};

/// Counts a unit of work while it is alive.
///
/// Increments the gauge on creation and decrements it by the same amount
/// when dropped, so early returns and panics keep the gauge balanced.
#[derive(Debug)]
#[must_use = "the gauge is decremented as soon as the guard is dropped"]
pub struct InProgress<'a> {
    gauge: &'a IncDecGaugeValue,
    amount: f64,
}

impl<'a> InProgress<'a> {
    /// Increments `gauge` by one.
    pub fn new(gauge: &'a IncDecGaugeValue) -> Self {
        Self::with_amount(gauge, 1.0)
    }

    /// Increments `gauge` by `amount`.
    pub fn with_amount(gauge: &'a IncDecGaugeValue, amount: f64) -> Self {
        gauge.inc_by(amount);
        Self { gauge, amount }
    }
}

impl Drop for InProgress<'_> {
    fn drop(&mut self) {
        self.gauge.dec_by(self.amount);
    }
}

/// Records elapsed wall time, in seconds, into a histogram.
#[derive(Debug)]
#[must_use = "the interval is recorded as soon as the timer is dropped"]
pub struct IntervalTimer<'a> {
    histogram: Option<&'a HistogramValue>,
    start: Instant,
}

impl<'a> IntervalTimer<'a> {
    /// Starts timing now.
    pub fn new(histogram: &'a HistogramValue) -> Self {
        Self {
            histogram: Some(histogram),
            start: Instant::now(),
        }
    }

    /// Records the interval now and returns it in seconds.
    pub fn stop(mut self) -> f64 {
        self.record().unwrap_or_default()
    }

    /// Drops the timer without recording anything.
    pub fn discard(mut self) {
        self.histogram = None;
    }

    fn record(&mut self) -> Option<f64> {
        let histogram = self.histogram.take()?;
        let seconds = self.start.elapsed().as_secs_f64();
        histogram.observe(seconds);
        Some(seconds)
    }
}

impl Drop for IntervalTimer<'_> {
    fn drop(&mut self) {
        self.record();
    }
}

impl IncDecGaugeValue {
    /// Returns a guard counting one unit of work in this gauge.
    pub fn track_in_progress(&self) -> InProgress<'_> {
        InProgress::new(self)
    }
}

impl HistogramValue {
    /// Starts a timer observing into this histogram.
    pub fn start_timer(&self) -> IntervalTimer<'_> {
        IntervalTimer::new(self)
    }
}

impl IncDecGauge {
    /// Returns a guard counting one unit of work in this gauge.
    pub fn track_in_progress(&self) -> InProgress<'_> {
        InProgress::new(self.get())
    }
}

impl Histogram {
    /// Starts a timer observing into this histogram.
    pub fn start_timer(&self) -> IntervalTimer<'_> {
        IntervalTimer::new(self.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::Collector;
    use std::time::Duration;

    #[test]
    fn in_progress_balances() {
        let gauge = IncDecGaugeValue::default();
        {
            let _outer = gauge.track_in_progress();
            assert!((gauge.value() - 1.0).abs() < f64::EPSILON);
            {
                let _inner = InProgress::with_amount(&gauge, 2.5);
                assert!((gauge.value() - 3.5).abs() < f64::EPSILON);
            }
            assert!((gauge.value() - 1.0).abs() < f64::EPSILON);
        }
        assert!(gauge.value().abs() < f64::EPSILON);
    }

    #[test]
    fn in_progress_survives_panic() {
        let gauge = IncDecGaugeValue::default();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = gauge.track_in_progress();
            std::panic::resume_unwind(Box::new("work failed"));
        }));
        assert!(result.is_err());
        assert!(gauge.value().abs() < f64::EPSILON);
    }

    #[test]
    fn timer_records_on_drop() {
        let histogram = HistogramValue::new(&[0.001, 60.0]).unwrap();
        {
            let _timer = histogram.start_timer();
            std::thread::sleep(Duration::from_millis(2));
        }
        assert_eq!(histogram.count(), 1);
        assert_eq!(histogram.value(0.001), 0);
        assert!(histogram.sum() >= 0.002);
    }

    #[test]
    fn stop_records_once() {
        let histogram = HistogramValue::default();
        let timer = histogram.start_timer();
        let seconds = timer.stop();
        assert!(seconds >= 0.0);
        assert_eq!(histogram.count(), 1);
        assert!((histogram.sum() - seconds).abs() < f64::EPSILON);
    }

    #[test]
    fn discard_records_nothing() {
        let histogram = HistogramValue::default();
        histogram.start_timer().discard();
        assert_eq!(histogram.count(), 0);
    }

    #[test]
    fn unlabeled_metric_helpers() {
        let collector = Collector::new("guard");
        let inflight = IncDecGauge::with_collector("inflight", "In flight.", &collector).unwrap();
        let latency = Histogram::with_collector("latency_seconds", "Latency.", &collector).unwrap();
        {
            let _busy = inflight.track_in_progress();
            let _timer = latency.start_timer();
            assert!((inflight.value() - 1.0).abs() < f64::EPSILON);
        }
        assert!(inflight.value().abs() < f64::EPSILON);
        assert_eq!(latency.count(), 1);
    }
}
