//! Sampled byte-size estimation (reservoir sampling)
//!
//! Measuring every element's encoded size is too expensive on high-volume
//! channels. The sampler measures the first `RESERVOIR_SIZE` elements
//! unconditionally, runs classic reservoir draws until `SAMPLING_THRESHOLD`,
//! and past that precomputes an exponential gap to the next forced sample so
//! no per-element random draw is needed.

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::warn;

use contracts::{DeferredSize, ElementSizeCodec, SizeObservation};
use observability::Distribution;

const RESERVOIR_SIZE: u64 = 10;
const SAMPLING_THRESHOLD: u64 = 30;

/// Records sampled encoded element sizes into a distribution metric.
///
/// One instance exists per (dispatcher, stage) pairing; its state is never
/// shared across stages.
pub struct SampleByteSizeDistribution {
    distribution: Distribution,
    state: Mutex<SamplerState>,
}

struct SamplerState {
    /// Elements seen since the last counter reset
    sampling_token: u64,
    /// Next token at which a sample is forced; 0 while below the threshold
    next_sampling_token: u64,
    rng: SmallRng,
    /// Deferred observation from the last sampled element, if any
    pending: Option<Arc<DeferredSize>>,
}

impl SampleByteSizeDistribution {
    /// Create a sampler recording into `distribution`.
    pub fn new(distribution: Distribution) -> Self {
        Self {
            distribution,
            state: Mutex::new(SamplerState {
                sampling_token: 0,
                next_sampling_token: 0,
                rng: SmallRng::from_os_rng(),
                pending: None,
            }),
        }
    }

    /// Distribution the sampled sizes are recorded into.
    pub fn distribution(&self) -> &Distribution {
        &self.distribution
    }

    /// Decide whether to measure `value`, and measure it if so.
    ///
    /// Eager observations are recorded immediately; deferred ones are held
    /// until [`finish_lazy_update`](Self::finish_lazy_update). A measurement
    /// failure is a best-effort secondary observation: it is logged and
    /// swallowed, and any pending observation is cleared so a stale
    /// measurement is never finalized.
    pub fn try_update(&self, value: &Bytes, codec: &dyn ElementSizeCodec) {
        let mut state = self.state.lock().unwrap();
        if !state.should_sample() {
            state.pending = None;
            return;
        }
        match codec.observe_size(value) {
            Ok(SizeObservation::Ready(size)) => {
                state.pending = None;
                self.distribution.update(size);
            }
            Ok(SizeObservation::Deferred(handle)) => {
                state.pending = Some(handle);
            }
            Err(e) => {
                state.pending = None;
                warn!(error = %e, "element size measurement failed");
            }
        }
    }

    /// Record the deferred observation from the last `try_update`, if any.
    ///
    /// No-op when the last element was unsampled or measured eagerly.
    pub fn finish_lazy_update(&self) {
        let pending = self.state.lock().unwrap().pending.take();
        if let Some(handle) = pending {
            self.distribution.update(handle.total());
        }
    }
}

impl SamplerState {
    fn should_sample(&mut self) -> bool {
        // Reset before the token overflows; dropping back to the reservoir
        // phase matches recomputing the gap from a zero token.
        if self.sampling_token + 1 == u64::MAX {
            self.sampling_token = 0;
            self.next_sampling_token = 0;
        }

        self.sampling_token += 1;
        if self.next_sampling_token == 0 {
            // Classic reservoir draw until the threshold.
            if self.sampling_token <= RESERVOIR_SIZE
                || self.rng.random_range(0..self.sampling_token) < RESERVOIR_SIZE
            {
                if self.sampling_token > SAMPLING_THRESHOLD {
                    self.next_sampling_token = self.next_token();
                }
                return true;
            }
        } else if self.sampling_token >= self.next_sampling_token {
            self.next_sampling_token = self.next_token();
            return true;
        }
        false
    }

    /// Exponential-gap approximation of the reservoir draw.
    fn next_token(&mut self) -> u64 {
        let u: f64 = self.rng.random();
        let gap = ((1.0 - u).ln()
            / (1.0 - RESERVOIR_SIZE as f64 / self.sampling_token as f64).ln())
            as u64;
        self.sampling_token + gap
    }
}
