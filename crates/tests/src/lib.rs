//! # Integration Tests
//!
//! End-to-end scenarios for the dispatch layer:
//! - registration / dispatch phasing across crates
//! - fan-out ordering and metric attribution
//! - single-construction guarantee under concurrent first access
//! - execution-time export through short ids

#[cfg(test)]
mod e2e_tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::{Arc, Barrier, Mutex};
    use std::thread;

    use bytes::Bytes;
    use contracts::{
        ContractError, DeferredSize, ElementConsumer, ElementSizeCodec, RawBytesCodec,
        SizeObservation, Window, WindowedElement,
    };
    use dispatcher::{ConsumerRegistry, DispatchError};
    use observability::{
        names, ExecutionStateTracker, MetricsContainerRegistry, MetricsEnvironment, ShortIdMap,
    };

    struct LoggingConsumer {
        stage_id: String,
        invocations: AtomicU64,
        order_log: Arc<Mutex<Vec<String>>>,
    }

    impl LoggingConsumer {
        fn new(stage_id: &str, order_log: Arc<Mutex<Vec<String>>>) -> Arc<Self> {
            Arc::new(Self {
                stage_id: stage_id.to_string(),
                invocations: AtomicU64::new(0),
                order_log,
            })
        }
    }

    impl ElementConsumer for LoggingConsumer {
        fn process(&self, _element: &WindowedElement) -> Result<(), ContractError> {
            self.invocations.fetch_add(1, Ordering::Relaxed);
            self.order_log.lock().unwrap().push(self.stage_id.clone());
            Ok(())
        }
    }

    /// Codec deferring every observation, keeping the handle it issued last
    /// where the consuming stage can reach it.
    #[derive(Default)]
    struct StreamingSizeCodec {
        issued: Mutex<Option<Arc<DeferredSize>>>,
    }

    impl ElementSizeCodec for StreamingSizeCodec {
        fn observe_size(&self, _value: &Bytes) -> Result<SizeObservation, ContractError> {
            let handle = DeferredSize::new();
            *self.issued.lock().unwrap() = Some(Arc::clone(&handle));
            Ok(SizeObservation::Deferred(handle))
        }
    }

    /// Stage that streams bytes into the codec's deferred handle, then fails.
    struct StreamingFailingConsumer {
        codec: Arc<StreamingSizeCodec>,
        bytes: u64,
    }

    impl ElementConsumer for StreamingFailingConsumer {
        fn process(&self, _element: &WindowedElement) -> Result<(), ContractError> {
            if let Some(handle) = self.codec.issued.lock().unwrap().as_ref() {
                handle.record(self.bytes);
            }
            Err(ContractError::stage_failure(
                "streaming",
                "downstream rejected element",
            ))
        }
    }

    struct WorkerContext {
        metrics: Arc<MetricsContainerRegistry>,
        registry: ConsumerRegistry,
    }

    fn worker_context() -> WorkerContext {
        let metrics = Arc::new(MetricsContainerRegistry::new());
        let registry = ConsumerRegistry::new(
            Arc::clone(&metrics),
            Arc::new(MetricsEnvironment::new()),
            Arc::new(ExecutionStateTracker::new()),
        );
        WorkerContext { metrics, registry }
    }

    /// Scenario from the worker's hot path: two stages share one channel,
    /// one element in two windows flows through once.
    #[test]
    fn test_e2e_shared_channel_fanout() {
        let ctx = worker_context();
        let order_log = Arc::new(Mutex::new(Vec::new()));
        let stage_a = LoggingConsumer::new("A", Arc::clone(&order_log));
        let stage_b = LoggingConsumer::new("B", Arc::clone(&order_log));

        ctx.registry
            .register("c1", "A", stage_a.clone(), Some(Arc::new(RawBytesCodec)))
            .unwrap();
        ctx.registry
            .register("c1", "B", stage_b.clone(), Some(Arc::new(RawBytesCodec)))
            .unwrap();

        let element = WindowedElement::new(
            Bytes::from_static(b"element-payload"),
            250,
            vec![Window::new(0, 500), Window::new(250, 750)],
        );
        let combined = ctx.registry.get_dispatcher("c1").unwrap();
        combined.dispatch(&element).unwrap();

        // Element counted once per window, not per stage.
        let unbound = ctx.metrics.unbound_container();
        assert_eq!(unbound.counter(names::element_count("c1")).value(), 2);

        // Both stages invoked exactly once, in registration order.
        assert_eq!(stage_a.invocations.load(Ordering::Relaxed), 1);
        assert_eq!(stage_b.invocations.load(Ordering::Relaxed), 1);
        assert_eq!(*order_log.lock().unwrap(), vec!["A", "B"]);

        // Each stage's sampler measured its first element.
        let sizes = unbound
            .distribution(names::sampled_byte_size("c1"))
            .snapshot();
        assert_eq!(sizes.count, 2);
        assert_eq!(sizes.sum, 30);

        // One execution state per registration, both with time attributed.
        let records = ctx.registry.execution_time_records();
        assert_eq!(records.len(), 2);
        let stages: Vec<&str> = records
            .iter()
            .map(|r| r.metric.labels[names::STAGE_LABEL].as_str())
            .collect();
        assert!(stages.contains(&"A") && stages.contains(&"B"));
    }

    #[test]
    fn test_e2e_phasing_and_reset_between_units_of_work() {
        let ctx = worker_context();
        let order_log = Arc::new(Mutex::new(Vec::new()));
        ctx.registry
            .register(
                "c1",
                "A",
                LoggingConsumer::new("A", Arc::clone(&order_log)),
                None,
            )
            .unwrap();

        let combined = ctx.registry.get_dispatcher("c1").unwrap();
        assert!(ctx
            .registry
            .register(
                "c1",
                "B",
                LoggingConsumer::new("B", Arc::clone(&order_log)),
                None,
            )
            .is_err());

        // First unit of work.
        combined
            .dispatch(&WindowedElement::in_global_window(Bytes::from_static(b"a")))
            .unwrap();

        // Reset between units of work keeps registrations and identity.
        ctx.registry.reset_execution_states();
        assert_eq!(ctx.registry.execution_time_records()[0].total_millis, 0);
        assert_eq!(ctx.registry.channel_ids(), vec!["c1".to_string()]);
        assert!(Arc::ptr_eq(
            &combined,
            &ctx.registry.get_dispatcher("c1").unwrap()
        ));

        // Second unit of work flows through the same dispatcher.
        combined
            .dispatch(&WindowedElement::in_global_window(Bytes::from_static(b"b")))
            .unwrap();
        assert_eq!(
            ctx.metrics
                .unbound_container()
                .counter(names::element_count("c1"))
                .value(),
            2
        );
    }

    /// Many threads racing the first `get_dispatcher` call must all observe
    /// the same instance.
    #[test]
    fn test_concurrent_first_access_builds_once() {
        let ctx = worker_context();
        let order_log = Arc::new(Mutex::new(Vec::new()));
        ctx.registry
            .register(
                "c1",
                "A",
                LoggingConsumer::new("A", Arc::clone(&order_log)),
                None,
            )
            .unwrap();

        let registry = Arc::new(ctx.registry);
        let threads = 8;
        let barrier = Arc::new(Barrier::new(threads));

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    registry.get_dispatcher("c1").unwrap()
                })
            })
            .collect();

        let dispatchers: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for dispatcher in &dispatchers[1..] {
            assert!(Arc::ptr_eq(&dispatchers[0], dispatcher));
        }
    }

    /// Channels are independent: dispatching on two channels from two threads
    /// attributes counts and time without interference.
    #[test]
    fn test_parallel_channels_dispatch_independently() {
        let ctx = worker_context();
        let order_log = Arc::new(Mutex::new(Vec::new()));
        ctx.registry
            .register(
                "c1",
                "A",
                LoggingConsumer::new("A", Arc::clone(&order_log)),
                None,
            )
            .unwrap();
        ctx.registry
            .register(
                "c2",
                "B",
                LoggingConsumer::new("B", Arc::clone(&order_log)),
                None,
            )
            .unwrap();

        let d1 = ctx.registry.get_dispatcher("c1").unwrap();
        let d2 = ctx.registry.get_dispatcher("c2").unwrap();

        let per_channel = 100u64;
        let t1 = thread::spawn(move || {
            for _ in 0..per_channel {
                d1.dispatch(&WindowedElement::in_global_window(Bytes::from_static(b"x")))
                    .unwrap();
            }
        });
        let t2 = thread::spawn(move || {
            for _ in 0..per_channel {
                d2.dispatch(&WindowedElement::in_global_window(Bytes::from_static(b"y")))
                    .unwrap();
            }
        });
        t1.join().unwrap();
        t2.join().unwrap();

        let unbound = ctx.metrics.unbound_container();
        assert_eq!(
            unbound.counter(names::element_count("c1")).value(),
            per_channel
        );
        assert_eq!(
            unbound.counter(names::element_count("c2")).value(),
            per_channel
        );
    }

    /// A deferred size measurement is finalized even when the stage's
    /// processing call fails.
    #[test]
    fn test_deferred_size_recorded_after_failed_stage() {
        let ctx = worker_context();
        let codec = Arc::new(StreamingSizeCodec::default());
        ctx.registry
            .register(
                "c1",
                "A",
                Arc::new(StreamingFailingConsumer {
                    codec: Arc::clone(&codec),
                    bytes: 64,
                }),
                Some(codec),
            )
            .unwrap();

        let combined = ctx.registry.get_dispatcher("c1").unwrap();
        let err = combined
            .dispatch(&WindowedElement::in_global_window(Bytes::from_static(b"s")))
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Contract(ContractError::StageFailure { .. })
        ));

        let sizes = ctx
            .metrics
            .unbound_container()
            .distribution(names::sampled_byte_size("c1"))
            .snapshot();
        assert_eq!(sizes.count, 1);
        assert_eq!(sizes.sum, 64);
    }

    /// Same guarantee on the fan-out path: the failing stage's deferred
    /// measurement lands even though delivery to later stages is aborted.
    #[test]
    fn test_deferred_size_recorded_after_failed_fanout_stage() {
        let ctx = worker_context();
        let order_log = Arc::new(Mutex::new(Vec::new()));
        let codec = Arc::new(StreamingSizeCodec::default());
        ctx.registry
            .register(
                "c1",
                "A",
                Arc::new(StreamingFailingConsumer {
                    codec: Arc::clone(&codec),
                    bytes: 48,
                }),
                Some(codec),
            )
            .unwrap();
        let stage_b = LoggingConsumer::new("B", Arc::clone(&order_log));
        ctx.registry
            .register("c1", "B", stage_b.clone(), None)
            .unwrap();

        let combined = ctx.registry.get_dispatcher("c1").unwrap();
        assert!(combined
            .dispatch(&WindowedElement::in_global_window(Bytes::from_static(b"s")))
            .is_err());

        let sizes = ctx
            .metrics
            .unbound_container()
            .distribution(names::sampled_byte_size("c1"))
            .snapshot();
        assert_eq!(sizes.count, 1);
        assert_eq!(sizes.sum, 48);
        assert_eq!(stage_b.invocations.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_execution_time_export_uses_stable_short_ids() {
        let ctx = worker_context();
        let order_log = Arc::new(Mutex::new(Vec::new()));
        ctx.registry
            .register(
                "c1",
                "A",
                LoggingConsumer::new("A", Arc::clone(&order_log)),
                None,
            )
            .unwrap();
        ctx.registry
            .register(
                "c2",
                "B",
                LoggingConsumer::new("B", Arc::clone(&order_log)),
                None,
            )
            .unwrap();

        let short_ids = ShortIdMap::new();
        let first: HashMap<String, Bytes> =
            ctx.registry.execution_time_data(&short_ids).unwrap();
        let second: HashMap<String, Bytes> =
            ctx.registry.execution_time_data(&short_ids).unwrap();

        assert_eq!(first.len(), 2);
        let mut first_keys: Vec<_> = first.keys().cloned().collect();
        let mut second_keys: Vec<_> = second.keys().cloned().collect();
        first_keys.sort();
        second_keys.sort();
        assert_eq!(first_keys, second_keys);
        assert_eq!(short_ids.len(), 2);
    }
}
