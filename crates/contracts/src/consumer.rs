//! ElementConsumer trait - downstream stage interface
//!
//! Defines the abstract interface the dispatcher delivers elements through.

use std::sync::Arc;

use crate::{ContractError, WindowedElement};

/// A downstream processing stage bound to a channel.
///
/// All stage implementations must implement this trait. A single consumer is
/// only ever driven by dispatch calls for its one owning channel, but distinct
/// channels may be driven from different worker threads.
pub trait ElementConsumer: Send + Sync {
    /// Process one windowed element.
    ///
    /// # Errors
    /// Returns a stage processing failure (should include context)
    fn process(&self, element: &WindowedElement) -> Result<(), ContractError>;

    /// Splitting capability, if the stage supports dynamic work splitting.
    ///
    /// Resolved once when the channel dispatcher is built, never per element.
    /// Split-capable stages typically return a handle to themselves.
    fn split_handler(self: Arc<Self>) -> Option<Arc<dyn SplitHandler>> {
        None
    }
}

/// Dynamic work-splitting and progress-reporting capability.
pub trait SplitHandler: Send + Sync {
    /// Attempt to split off the given fraction of the remaining work.
    ///
    /// Returns `None` when no split is possible at this point.
    fn try_split(&self, fraction_of_remainder: f64) -> Option<SplitResult>;

    /// Fraction of the current work already completed, in `[0, 1]`.
    fn progress(&self) -> f64;
}

/// Outcome of a dynamic split.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitResult {
    /// Fraction of the work kept by the running stage
    pub primary: f64,

    /// Fraction of the work handed back to the runner
    pub residual: f64,
}
