//! # Dispatcher
//!
//! Per-element data dispatch with metrics instrumentation.
//!
//! Responsibilities:
//! - Maintain the consuming stages registered for each channel
//! - Hand the worker one combined dispatcher per channel, fanning out to all
//!   bound stages in registration order
//! - Instrument every delivery: element count per window, sampled byte size,
//!   scoped metrics container, per-stage execution time
//! - Forward split/progress requests to stages that support them

pub mod dispatcher;
pub mod error;
pub mod registry;
pub mod sampler;

pub use contracts::{
    ElementConsumer, ElementSizeCodec, SplitHandler, SplitResult, WindowedElement,
};
pub use dispatcher::{
    ChannelDispatcher, InstrumentedDispatcher, MultiplexingDispatcher, SplittingDispatcher,
};
pub use error::DispatchError;
pub use registry::ConsumerRegistry;
pub use sampler::SampleByteSizeDistribution;
