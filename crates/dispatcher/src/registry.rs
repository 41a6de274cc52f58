//! ConsumerRegistry - binds channels to consuming stages
//!
//! Registration and dispatch are strictly phased: all stages for a channel
//! are registered first, then the worker requests the channel's combined
//! dispatcher and invokes it once per element. The first request freezes the
//! channel's registrations.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tracing::debug;

use contracts::{ContractError, ElementConsumer, ElementSizeCodec};
use observability::{
    names, ExecutionState, ExecutionStateRegistry, ExecutionStateTracker, MetricsContainer,
    MetricsContainerRegistry, MetricsEnvironment, MonitoringRecord, ShortIdMap,
};

use crate::dispatcher::{
    ChannelDispatcher, InstrumentedDispatcher, MultiplexingDispatcher, SplittingDispatcher,
};
use crate::error::DispatchError;

/// One registered (channel, stage) binding with its metrics handles.
pub(crate) struct Binding {
    pub(crate) stage_id: String,
    pub(crate) consumer: Arc<dyn ElementConsumer>,
    pub(crate) codec: Option<Arc<dyn ElementSizeCodec>>,
    pub(crate) state: Arc<ExecutionState>,
    pub(crate) container: Arc<MetricsContainer>,
}

#[derive(Default)]
struct RegistryInner {
    /// Registration order per channel determines multiplexing order.
    bindings: HashMap<String, Vec<Arc<Binding>>>,
    /// Memoized combined dispatchers, built lazily and exactly once.
    dispatchers: HashMap<String, Arc<ChannelDispatcher>>,
}

/// Maintains the consuming stages for each channel and wraps them with
/// element-count, byte-size, and execution-time instrumentation.
pub struct ConsumerRegistry {
    inner: Mutex<RegistryInner>,
    metrics: Arc<MetricsContainerRegistry>,
    environment: Arc<MetricsEnvironment>,
    tracker: Arc<ExecutionStateTracker>,
    execution_states: ExecutionStateRegistry,
}

impl ConsumerRegistry {
    /// Create a registry over the worker's shared metrics and timing context.
    pub fn new(
        metrics: Arc<MetricsContainerRegistry>,
        environment: Arc<MetricsEnvironment>,
        tracker: Arc<ExecutionStateTracker>,
    ) -> Self {
        Self {
            inner: Mutex::new(RegistryInner::default()),
            metrics,
            environment,
            tracker,
            execution_states: ExecutionStateRegistry::new(),
        }
    }

    /// Register `consumer` to handle elements on `channel_id`.
    ///
    /// All stages for a channel must be registered before the channel's
    /// combined dispatcher is first requested.
    ///
    /// # Errors
    /// Returns a usage-ordering error once [`get_dispatcher`](Self::get_dispatcher)
    /// has been called for `channel_id`.
    pub fn register(
        &self,
        channel_id: impl Into<String>,
        stage_id: impl Into<String>,
        consumer: Arc<dyn ElementConsumer>,
        codec: Option<Arc<dyn ElementSizeCodec>>,
    ) -> Result<(), DispatchError> {
        let channel_id = channel_id.into();
        let stage_id = stage_id.into();

        let mut inner = self.inner.lock().unwrap();
        if inner.dispatchers.contains_key(&channel_id) {
            return Err(DispatchError::registration_closed(channel_id, stage_id));
        }

        let state = Arc::new(ExecutionState::new(
            &stage_id,
            names::process_millis(&stage_id),
        ));
        self.execution_states.register(Arc::clone(&state));

        let binding = Arc::new(Binding {
            stage_id: stage_id.clone(),
            consumer,
            codec,
            state,
            container: self.metrics.container(&stage_id),
        });
        inner
            .bindings
            .entry(channel_id.clone())
            .or_default()
            .push(binding);

        debug!(channel = %channel_id, stage = %stage_id, "consumer registered");
        Ok(())
    }

    /// All distinct registered channel identifiers, in no particular order.
    pub fn channel_ids(&self) -> Vec<String> {
        self.inner.lock().unwrap().bindings.keys().cloned().collect()
    }

    /// The memoized combined dispatcher for `channel_id`, built on first call.
    ///
    /// Construction happens under the registry lock, so at most one
    /// dispatcher exists per channel even under concurrent first access.
    ///
    /// # Errors
    /// Returns an unknown-channel error when nothing is registered for
    /// `channel_id`.
    pub fn get_dispatcher(
        &self,
        channel_id: &str,
    ) -> Result<Arc<ChannelDispatcher>, DispatchError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(dispatcher) = inner.dispatchers.get(channel_id) {
            return Ok(Arc::clone(dispatcher));
        }

        let bindings = inner
            .bindings
            .get(channel_id)
            .ok_or_else(|| DispatchError::unknown_channel(channel_id))?
            .clone();
        let dispatcher = Arc::new(self.build_dispatcher(channel_id, bindings));
        inner
            .dispatchers
            .insert(channel_id.to_string(), Arc::clone(&dispatcher));
        Ok(dispatcher)
    }

    fn build_dispatcher(
        &self,
        channel_id: &str,
        bindings: Vec<Arc<Binding>>,
    ) -> ChannelDispatcher {
        let unbound = self.metrics.unbound_container();
        if bindings.len() > 1 {
            debug!(
                channel = %channel_id,
                stages = bindings.len(),
                "built multiplexing dispatcher"
            );
            return ChannelDispatcher::Multiplexing(MultiplexingDispatcher::new(
                channel_id,
                bindings,
                &unbound,
                Arc::clone(&self.environment),
                Arc::clone(&self.tracker),
            ));
        }

        let binding = Arc::clone(&bindings[0]);
        // Capability resolution happens once here, never per element.
        let handler = Arc::clone(&binding.consumer).split_handler();
        debug!(
            channel = %channel_id,
            stage = %binding.stage_id,
            splits = handler.is_some(),
            "built single-stage dispatcher"
        );
        let instrumented = InstrumentedDispatcher::new(
            channel_id,
            binding,
            &unbound,
            Arc::clone(&self.environment),
            Arc::clone(&self.tracker),
        );
        match handler {
            Some(handler) => {
                ChannelDispatcher::Splitting(SplittingDispatcher::new(instrumented, handler))
            }
            None => ChannelDispatcher::Instrumented(instrumented),
        }
    }

    /// Clear accumulated per-stage time between units of work.
    ///
    /// Registrations and dispatcher identity are unaffected.
    pub fn reset_execution_states(&self) {
        self.execution_states.reset();
    }

    /// Accumulated execution time projected into monitoring records.
    pub fn execution_time_records(&self) -> Vec<MonitoringRecord> {
        self.execution_states.execution_time_records()
    }

    /// Accumulated execution time encoded and keyed by short identifiers.
    ///
    /// # Errors
    /// Returns an export error when payload encoding fails
    pub fn execution_time_data(
        &self,
        short_ids: &ShortIdMap,
    ) -> Result<HashMap<String, Bytes>, ContractError> {
        self.execution_states.execution_time_data(short_ids)
    }

    /// The consumers bound to `channel_id`, in registration order.
    ///
    /// Diagnostic accessor, primarily for verification in tests.
    pub fn underlying_consumers(&self, channel_id: &str) -> Vec<Arc<dyn ElementConsumer>> {
        self.inner
            .lock()
            .unwrap()
            .bindings
            .get(channel_id)
            .map(|bindings| {
                bindings
                    .iter()
                    .map(|binding| Arc::clone(&binding.consumer))
                    .collect()
            })
            .unwrap_or_default()
    }
}
