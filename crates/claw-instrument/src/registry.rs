//! The collector registry.
//!
//! A [`Registry`] is the entry point of a scrape: it asks every registered
//! [`Collect`] implementation for a snapshot and concatenates the results.
//! A collector that reports [`InstrumentError::CollectionTransient`] is
//! skipped and counted in `claw_instrument_collection_errors_total`; any
//! other error aborts the scrape.

use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::collector::{Collect, Collector};
use crate::config::ExpositionConfig;
use crate::encoding::proto::MetricFamily;
use crate::encoding::{self, Format};
use crate::error::{InstrumentError, Result};
use crate::metric::Counter;

/// Name of the counter tracking recovered collector failures.
pub const COLLECTION_ERRORS_METRIC: &str = "claw_instrument_collection_errors_total";

const COLLECTION_ERRORS_HELP: &str =
    "Count of transient errors raised by collectors during the metric collection process.";

static GLOBAL_REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let default: Arc<dyn Collect> = Collector::global().clone();
    Registry::with_collectors(vec![default])
});

/// An ordered set of collectors.
pub struct Registry {
    collectors: RwLock<Vec<Arc<dyn Collect>>>,
    /// Owns the registry's own metrics; always collected last.
    internal: Collector,
    collection_errors: Arc<Counter>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Creates an empty registry.
    ///
    /// Use this for isolated scopes such as tests; application code usually
    /// goes through [`Registry::global`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_collectors(Vec::new())
    }

    fn with_collectors(collectors: Vec<Arc<dyn Collect>>) -> Self {
        let internal = Collector::new("registry");
        let collection_errors = Counter::with_collector(COLLECTION_ERRORS_METRIC, COLLECTION_ERRORS_HELP, &internal)
            .unwrap_or_else(|_| unreachable!());
        Self {
            collectors: RwLock::new(collectors),
            internal,
            collection_errors,
        }
    }

    /// Returns the process-wide registry.
    ///
    /// The default [`Collector`] is registered with it on first use.
    #[must_use]
    pub fn global() -> &'static Self {
        &GLOBAL_REGISTRY
    }

    /// Adds a collector.
    ///
    /// # Errors
    ///
    /// Returns `InstrumentError::CollectorManagement` if this exact collector
    /// is already registered.
    pub fn register_collector(&self, collector: Arc<dyn Collect>) -> Result<()> {
        let mut collectors = self.collectors.write();
        if collectors.iter().any(|existing| Arc::ptr_eq(existing, &collector)) {
            return Err(InstrumentError::CollectorManagement {
                reason: format!("collector '{}' is already registered", collector.name()),
            });
        }
        debug!(collector = collector.name(), "registered collector");
        collectors.push(collector);
        Ok(())
    }

    /// Removes a collector.
    ///
    /// # Errors
    ///
    /// Returns `InstrumentError::CollectorManagement` if the collector is not registered.
    pub fn unregister_collector(&self, collector: &Arc<dyn Collect>) -> Result<()> {
        let mut collectors = self.collectors.write();
        let Some(index) = collectors.iter().position(|existing| Arc::ptr_eq(existing, collector)) else {
            return Err(InstrumentError::CollectorManagement {
                reason: format!("collector '{}' is not registered", collector.name()),
            });
        };
        collectors.remove(index);
        debug!(collector = collector.name(), "unregistered collector");
        Ok(())
    }

    /// Returns the number of registered collectors.
    #[must_use]
    pub fn collector_count(&self) -> usize {
        self.collectors.read().len()
    }

    /// Collects every registered collector, in registration order, followed
    /// by the registry's own metrics.
    ///
    /// # Errors
    ///
    /// Propagates the first non-transient collector error.
    pub fn collect(&self) -> Result<Vec<MetricFamily>> {
        // Collectors run without the lock held so they may call back into the registry.
        let collectors: Vec<Arc<dyn Collect>> = self.collectors.read().clone();
        let mut families = Vec::new();

        for collector in collectors.iter() {
            match collector.collect() {
                Ok(collected) => families.extend(collected),
                Err(err) if err.is_transient() => {
                    self.collection_errors.inc();
                    warn!(
                        collector = collector.name(),
                        error = %err,
                        "collector failed, skipping"
                    );
                }
                Err(err) => return Err(err),
            }
        }

        families.extend(self.internal.collect()?);
        debug!(family_count = families.len(), "registry collection complete");
        Ok(families)
    }

    /// Collects and renders all metrics in `format`.
    ///
    /// Labeled metrics without any series are left out.
    ///
    /// # Errors
    ///
    /// Returns collection errors, or `InstrumentError::OutputFormatter` if a
    /// collector produced a malformed family.
    pub fn encode(&self, format: Format) -> Result<Vec<u8>> {
        self.encode_with(&ExpositionConfig::with_format(format))
    }

    /// Collects and renders all metrics according to `config`.
    ///
    /// # Errors
    ///
    /// Same as [`encode`](Self::encode).
    pub fn encode_with(&self, config: &ExpositionConfig) -> Result<Vec<u8>> {
        let families = self.collect()?;
        encoding::render_with(&families, config)
    }

    /// Returns how many transient collector failures have been recovered.
    #[must_use]
    pub fn collection_errors(&self) -> f64 {
        self.collection_errors.value()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("collector_count", &self.collector_count())
            .field("collection_errors", &self.collection_errors())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::proto::{Gauge, Metric, MetricType};
    use crate::metric::CounterVec;

    #[derive(Debug)]
    struct StaticCollector {
        name: &'static str,
        value: f64,
    }

    impl Collect for StaticCollector {
        fn collect(&self) -> Result<Vec<MetricFamily>> {
            let mut family = MetricFamily::with_type(self.name, "Static.", MetricType::Gauge);
            family.metric.push(Metric {
                gauge: Some(Gauge { value: Some(self.value) }),
                ..Metric::default()
            });
            Ok(vec![family])
        }

        fn name(&self) -> &str {
            self.name
        }
    }

    #[derive(Debug)]
    struct BusyCollector;

    impl Collect for BusyCollector {
        fn collect(&self) -> Result<Vec<MetricFamily>> {
            Err(InstrumentError::collection_transient("busy", "source locked"))
        }

        fn name(&self) -> &str {
            "busy"
        }
    }

    #[derive(Debug)]
    struct BrokenCollector;

    impl Collect for BrokenCollector {
        fn collect(&self) -> Result<Vec<MetricFamily>> {
            Err(InstrumentError::output_formatter("bug in collector"))
        }

        fn name(&self) -> &str {
            "broken"
        }
    }

    fn names(families: &[MetricFamily]) -> Vec<&str> {
        families.iter().map(MetricFamily::name_str).collect()
    }

    mod management_tests {
        use super::*;

        #[test]
        fn register_and_unregister() {
            let registry = Registry::new();
            let collector: Arc<dyn Collect> = Arc::new(StaticCollector { name: "a", value: 1.0 });

            registry.register_collector(Arc::clone(&collector)).unwrap();
            assert_eq!(registry.collector_count(), 1);

            registry.unregister_collector(&collector).unwrap();
            assert_eq!(registry.collector_count(), 0);
        }

        #[test]
        fn duplicate_registration_fails_and_keeps_state() {
            let registry = Registry::new();
            let collector: Arc<dyn Collect> = Arc::new(StaticCollector { name: "a", value: 1.0 });
            registry.register_collector(Arc::clone(&collector)).unwrap();

            let err = registry.register_collector(Arc::clone(&collector)).unwrap_err();
            assert!(matches!(err, InstrumentError::CollectorManagement { .. }));

            let families = registry.collect().unwrap();
            assert_eq!(names(&families), vec!["a", COLLECTION_ERRORS_METRIC]);
        }

        #[test]
        fn unregister_unknown_fails() {
            let registry = Registry::new();
            let collector: Arc<dyn Collect> = Arc::new(StaticCollector { name: "a", value: 1.0 });
            let err = registry.unregister_collector(&collector).unwrap_err();
            assert!(matches!(err, InstrumentError::CollectorManagement { .. }));
        }

        #[test]
        fn equal_but_distinct_collectors_both_register() {
            let registry = Registry::new();
            registry
                .register_collector(Arc::new(StaticCollector { name: "a", value: 1.0 }))
                .unwrap();
            registry
                .register_collector(Arc::new(StaticCollector { name: "a", value: 1.0 }))
                .unwrap();
            assert_eq!(registry.collector_count(), 2);
        }
    }

    mod collection_tests {
        use super::*;

        #[test]
        fn empty_registry_exports_error_counter() {
            let registry = Registry::new();
            let families = registry.collect().unwrap();
            assert_eq!(names(&families), vec![COLLECTION_ERRORS_METRIC]);
            assert_eq!(families[0].metric[0].counter.as_ref().and_then(|c| c.value), Some(0.0));
        }

        #[test]
        fn collects_metric_collectors() {
            let registry = Registry::new();
            let collector = Arc::new(Collector::new("app"));
            let requests = CounterVec::with_collector("requests_total", "Requests.", ["code"], &collector).unwrap();
            requests.labels(["200"]).inc();
            registry.register_collector(collector).unwrap();

            let families = registry.collect().unwrap();
            assert_eq!(names(&families), vec!["requests_total", COLLECTION_ERRORS_METRIC]);
        }

        #[test]
        fn transient_failure_is_isolated_and_counted() {
            let registry = Registry::new();
            registry
                .register_collector(Arc::new(StaticCollector { name: "before", value: 1.0 }))
                .unwrap();
            registry.register_collector(Arc::new(BusyCollector)).unwrap();
            registry
                .register_collector(Arc::new(StaticCollector { name: "after", value: 2.0 }))
                .unwrap();

            let families = registry.collect().unwrap();
            assert_eq!(names(&families), vec!["before", "after", COLLECTION_ERRORS_METRIC]);
            assert!((registry.collection_errors() - 1.0).abs() < f64::EPSILON);

            let counter = families[2].metric[0].counter.as_ref().and_then(|c| c.value);
            assert_eq!(counter, Some(1.0));

            registry.collect().unwrap();
            assert!((registry.collection_errors() - 2.0).abs() < f64::EPSILON);
        }

        /// Registers another collector from inside its own `collect`.
        struct SelfExtendingCollector {
            registry: std::sync::Weak<Registry>,
            extended: std::sync::atomic::AtomicBool,
        }

        impl Collect for SelfExtendingCollector {
            fn collect(&self) -> Result<Vec<MetricFamily>> {
                if !self.extended.swap(true, std::sync::atomic::Ordering::SeqCst) {
                    if let Some(registry) = self.registry.upgrade() {
                        registry.register_collector(Arc::new(StaticCollector { name: "late", value: 1.0 }))?;
                    }
                }
                Ok(Vec::new())
            }

            fn name(&self) -> &str {
                "self_extending"
            }
        }

        #[test]
        fn collector_may_register_during_collection() {
            let registry = Arc::new(Registry::new());
            registry
                .register_collector(Arc::new(SelfExtendingCollector {
                    registry: Arc::downgrade(&registry),
                    extended: std::sync::atomic::AtomicBool::new(false),
                }))
                .unwrap();

            let first = registry.collect().unwrap();
            assert_eq!(names(&first), vec![COLLECTION_ERRORS_METRIC]);
            assert_eq!(registry.collector_count(), 2);

            let second = registry.collect().unwrap();
            assert_eq!(names(&second), vec!["late", COLLECTION_ERRORS_METRIC]);
        }

        #[test]
        fn other_failures_abort_collection() {
            let registry = Registry::new();
            registry
                .register_collector(Arc::new(StaticCollector { name: "a", value: 1.0 }))
                .unwrap();
            registry.register_collector(Arc::new(BrokenCollector)).unwrap();

            let err = registry.collect().unwrap_err();
            assert!(matches!(err, InstrumentError::OutputFormatter { .. }));
            assert!(registry.collection_errors().abs() < f64::EPSILON);
        }

        #[test]
        fn encode_renders_text() {
            let registry = Registry::new();
            registry
                .register_collector(Arc::new(StaticCollector { name: "temp", value: 21.5 }))
                .unwrap();
            let body = String::from_utf8(registry.encode(Format::Text).unwrap()).unwrap();
            assert!(body.contains("# TYPE temp gauge\ntemp 21.5\n"));
            assert!(body.contains(&format!("{COLLECTION_ERRORS_METRIC} 0\n")));
        }

        #[test]
        fn encode_skips_untouched_labeled_metrics() {
            let registry = Registry::new();
            let collector = Arc::new(Collector::new("app"));
            let _idle = CounterVec::with_collector("idle_total", "Idle.", ["code"], &collector).unwrap();
            registry.register_collector(collector).unwrap();

            let body = String::from_utf8(registry.encode(Format::Text).unwrap()).unwrap();
            assert!(!body.contains("idle_total"));

            let strict = ExpositionConfig {
                skip_empty_families: false,
                ..ExpositionConfig::default()
            };
            assert!(matches!(
                registry.encode_with(&strict),
                Err(InstrumentError::OutputFormatter { .. })
            ));
        }

        #[test]
        fn encode_protobuf_decodes_back() {
            let registry = Registry::new();
            registry
                .register_collector(Arc::new(StaticCollector { name: "temp", value: 21.5 }))
                .unwrap();
            let body = registry.encode(Format::ProtobufDelimited).unwrap();
            let families = encoding::protobuf::decode(&body).unwrap();
            assert_eq!(names(&families), vec!["temp", COLLECTION_ERRORS_METRIC]);
        }

        #[test]
        fn global_registry_holds_default_collector() {
            let default: Arc<dyn Collect> = Collector::global().clone();
            let err = Registry::global().register_collector(default).unwrap_err();
            assert!(matches!(err, InstrumentError::CollectorManagement { .. }));
        }
    }
}
