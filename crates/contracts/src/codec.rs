//! Element size observation - eager and deferred measurement
//!
//! Codecs report the encoded size of element values for byte-size sampling.
//! Streamed encodings only know their size after the element has been
//! consumed, so an observation may be deferred behind a shared accumulator.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;

use crate::ContractError;

/// Observes the encoded size of element values.
pub trait ElementSizeCodec: Send + Sync {
    /// Observe the encoded size of `value`.
    ///
    /// # Errors
    /// Returns a size-measurement failure; callers treat measurement as a
    /// best-effort secondary observation.
    fn observe_size(&self, value: &Bytes) -> Result<SizeObservation, ContractError>;
}

/// Result of a size observation.
#[derive(Debug, Clone)]
pub enum SizeObservation {
    /// Size fully known at observation time
    Ready(u64),

    /// Size only known once the element has been consumed. The codec hands
    /// the same handle to whatever drives the streamed decoding; the sampler
    /// reads it after the stage's processing call returns.
    Deferred(Arc<DeferredSize>),
}

/// Accumulator for sizes that become known while an element is consumed.
#[derive(Debug, Default)]
pub struct DeferredSize {
    observed: AtomicU64,
}

impl DeferredSize {
    /// Create a fresh accumulator behind a shared handle.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Add observed bytes.
    pub fn record(&self, bytes: u64) {
        self.observed.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Total bytes observed so far.
    pub fn total(&self) -> u64 {
        self.observed.load(Ordering::Relaxed)
    }
}

/// Codec for values whose encoded form is the payload itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawBytesCodec;

impl ElementSizeCodec for RawBytesCodec {
    fn observe_size(&self, value: &Bytes) -> Result<SizeObservation, ContractError> {
        Ok(SizeObservation::Ready(value.len() as u64))
    }
}
