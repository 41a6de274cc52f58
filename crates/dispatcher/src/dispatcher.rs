//! Channel dispatchers - instrumented per-element fan-out
//!
//! A combined dispatcher delivers one element to every stage bound to a
//! channel: it counts the element once per window, drives byte-size sampling,
//! scopes the active metrics container to the stage, attributes wall-clock
//! time to the stage's execution state, and finally invokes the stage.

use std::sync::Arc;

use contracts::{SplitHandler, SplitResult, WindowedElement};
use observability::{names, Counter, ExecutionStateTracker, MetricsContainer, MetricsEnvironment};

use crate::error::DispatchError;
use crate::registry::Binding;
use crate::sampler::SampleByteSizeDistribution;

/// Combined per-channel dispatcher, shaped at build time by the number of
/// bound stages and the sole stage's splitting capability.
pub enum ChannelDispatcher {
    /// Exactly one stage, no splitting support
    Instrumented(InstrumentedDispatcher),
    /// More than one stage, visited in registration order
    Multiplexing(MultiplexingDispatcher),
    /// Exactly one stage that additionally handles splits
    Splitting(SplittingDispatcher),
}

impl std::fmt::Debug for ChannelDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let variant = match self {
            Self::Instrumented(_) => "Instrumented",
            Self::Multiplexing(_) => "Multiplexing",
            Self::Splitting(_) => "Splitting",
        };
        f.debug_struct(variant).finish_non_exhaustive()
    }
}

impl ChannelDispatcher {
    /// Deliver one element to every bound stage with instrumentation.
    ///
    /// # Errors
    /// Propagates the first stage failure after instrumentation scopes are
    /// unwound; remaining stages are not attempted.
    pub fn dispatch(&self, element: &WindowedElement) -> Result<(), DispatchError> {
        match self {
            Self::Instrumented(dispatcher) => dispatcher.dispatch(element),
            Self::Multiplexing(dispatcher) => dispatcher.dispatch(element),
            Self::Splitting(dispatcher) => dispatcher.dispatch(element),
        }
    }

    /// Forward a split request to the underlying stage.
    ///
    /// `None` unless the channel's sole stage supports splitting, or when the
    /// stage declines the split.
    pub fn try_split(&self, fraction_of_remainder: f64) -> Option<SplitResult> {
        match self {
            Self::Splitting(dispatcher) => dispatcher.try_split(fraction_of_remainder),
            _ => None,
        }
    }

    /// Forward a progress request to the underlying stage.
    ///
    /// `None` unless the channel's sole stage supports splitting.
    pub fn progress(&self) -> Option<f64> {
        match self {
            Self::Splitting(dispatcher) => dispatcher.progress(),
            _ => None,
        }
    }
}

/// Dispatcher for a channel with exactly one bound stage.
pub struct InstrumentedDispatcher {
    binding: Arc<Binding>,
    element_count: Counter,
    sampled_byte_size: SampleByteSizeDistribution,
    environment: Arc<MetricsEnvironment>,
    tracker: Arc<ExecutionStateTracker>,
}

impl InstrumentedDispatcher {
    pub(crate) fn new(
        channel_id: &str,
        binding: Arc<Binding>,
        unbound: &MetricsContainer,
        environment: Arc<MetricsEnvironment>,
        tracker: Arc<ExecutionStateTracker>,
    ) -> Self {
        // Element count and sampled sizes land in the unbound container so
        // elements on channels with no upstream stage are still countable.
        let element_count = unbound.counter(names::element_count(channel_id));
        let sampled_byte_size = SampleByteSizeDistribution::new(
            unbound.distribution(names::sampled_byte_size(channel_id)),
        );
        Self {
            binding,
            element_count,
            sampled_byte_size,
            environment,
            tracker,
        }
    }

    pub(crate) fn dispatch(&self, element: &WindowedElement) -> Result<(), DispatchError> {
        // Count the element once per window it occurs in.
        self.element_count.inc(element.window_count() as u64);

        if let Some(codec) = &self.binding.codec {
            self.sampled_byte_size.try_update(&element.value, codec.as_ref());
        }

        // Metrics-container scope outside, execution-state scope nested
        // inside; both restore on every exit path.
        let result = {
            let _container = self.environment.scoped(Arc::clone(&self.binding.container));
            let _state = self.tracker.enter(Arc::clone(&self.binding.state));
            self.binding.consumer.process(element)
        };
        self.sampled_byte_size.finish_lazy_update();
        result.map_err(DispatchError::from)
    }
}

/// Dispatcher for a channel with more than one bound stage.
///
/// Stages are visited in registration order; delivery to stage k+1 is
/// sequenced after stage k completes. Each stage carries its own sampler
/// state, but all samplers feed the channel's one byte-size distribution.
pub struct MultiplexingDispatcher {
    stages: Vec<StageDelivery>,
    element_count: Counter,
    environment: Arc<MetricsEnvironment>,
    tracker: Arc<ExecutionStateTracker>,
}

struct StageDelivery {
    binding: Arc<Binding>,
    sampler: Option<SampleByteSizeDistribution>,
}

impl MultiplexingDispatcher {
    pub(crate) fn new(
        channel_id: &str,
        bindings: Vec<Arc<Binding>>,
        unbound: &MetricsContainer,
        environment: Arc<MetricsEnvironment>,
        tracker: Arc<ExecutionStateTracker>,
    ) -> Self {
        let element_count = unbound.counter(names::element_count(channel_id));
        let sampled_byte_size = unbound.distribution(names::sampled_byte_size(channel_id));
        let stages = bindings
            .into_iter()
            .map(|binding| {
                let sampler = binding
                    .codec
                    .is_some()
                    .then(|| SampleByteSizeDistribution::new(sampled_byte_size.clone()));
                StageDelivery { binding, sampler }
            })
            .collect();
        Self {
            stages,
            element_count,
            environment,
            tracker,
        }
    }

    pub(crate) fn dispatch(&self, element: &WindowedElement) -> Result<(), DispatchError> {
        self.element_count.inc(element.window_count() as u64);

        for stage in &self.stages {
            if let (Some(sampler), Some(codec)) = (&stage.sampler, &stage.binding.codec) {
                sampler.try_update(&element.value, codec.as_ref());
            }
            let result = {
                let _container = self
                    .environment
                    .scoped(Arc::clone(&stage.binding.container));
                let _state = self.tracker.enter(Arc::clone(&stage.binding.state));
                stage.binding.consumer.process(element)
            };
            if let Some(sampler) = &stage.sampler {
                sampler.finish_lazy_update();
            }
            // A failed stage aborts delivery to the remaining stages; metrics
            // already recorded for earlier stages are not rolled back.
            result?;
        }
        Ok(())
    }
}

/// Dispatcher decorating [`InstrumentedDispatcher`] for a stage that handles
/// splits. The capability handle is resolved once at construction; split and
/// progress requests go straight to it, bypassing the instrumentation path.
pub struct SplittingDispatcher {
    inner: InstrumentedDispatcher,
    handler: Arc<dyn SplitHandler>,
}

impl SplittingDispatcher {
    pub(crate) fn new(inner: InstrumentedDispatcher, handler: Arc<dyn SplitHandler>) -> Self {
        Self { inner, handler }
    }

    pub(crate) fn dispatch(&self, element: &WindowedElement) -> Result<(), DispatchError> {
        self.inner.dispatch(element)
    }

    pub(crate) fn try_split(&self, fraction_of_remainder: f64) -> Option<SplitResult> {
        self.handler.try_split(fraction_of_remainder)
    }

    pub(crate) fn progress(&self) -> Option<f64> {
        Some(self.handler.progress())
    }
}
