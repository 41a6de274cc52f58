//! # Contracts
//!
//! Frozen interface contracts (ICD), defining inter-crate data structures and
//! traits for the per-element dispatch layer. All business crates can only
//! depend on this crate, reverse dependencies are prohibited.
//!
//! ## Data Model
//! - `WindowedElement` carries an encoded payload plus the event-time windows
//!   it occurs in; metrics count an element once per window
//! - `ElementConsumer` is the seam between the dispatch layer and stage logic
//! - `ElementSizeCodec` reports encoded sizes, eagerly or deferred

mod codec;
mod consumer;
mod element;
mod error;

pub use codec::{DeferredSize, ElementSizeCodec, RawBytesCodec, SizeObservation};
pub use consumer::{ElementConsumer, SplitHandler, SplitResult};
pub use element::{Window, WindowedElement};
pub use error::ContractError;
