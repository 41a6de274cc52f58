//! Per-stage execution timing
//!
//! An `ExecutionState` accumulates wall-clock time attributed to one stage.
//! The tracker hands out RAII guards so time is attributed on every exit
//! path, and the registry resets/exports the whole set between units of work.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};
use std::time::Instant;

use bytes::Bytes;
use contracts::ContractError;
use tracing::debug;

use crate::export::{MonitoringRecord, ShortIdMap};
use crate::metrics::MetricName;

/// Accumulated processing time for one stage.
#[derive(Debug)]
pub struct ExecutionState {
    stage_id: String,
    metric: MetricName,
    total_millis: AtomicU64,
}

impl ExecutionState {
    /// Create a state bound to a time-spent metric name.
    pub fn new(stage_id: impl Into<String>, metric: MetricName) -> Self {
        Self {
            stage_id: stage_id.into(),
            metric,
            total_millis: AtomicU64::new(0),
        }
    }

    /// Stage this state belongs to.
    pub fn stage_id(&self) -> &str {
        &self.stage_id
    }

    /// Metric name the accumulated time is exported under.
    pub fn metric(&self) -> &MetricName {
        &self.metric
    }

    /// Total milliseconds attributed so far.
    pub fn total_millis(&self) -> u64 {
        self.total_millis.load(Ordering::Relaxed)
    }

    /// Clear accumulated time without destroying the handle.
    pub fn reset(&self) {
        self.total_millis.store(0, Ordering::Relaxed);
    }

    fn add_millis(&self, millis: u64) {
        self.total_millis.fetch_add(millis, Ordering::Relaxed);
    }
}

/// Enters/exits execution states, attributing elapsed time on exit.
///
/// One tracker is constructed at worker startup and shared by all
/// dispatchers; the state entered on a thread is visible via `current()`.
#[derive(Debug, Default)]
pub struct ExecutionStateTracker {
    active: Mutex<HashMap<ThreadId, Arc<ExecutionState>>>,
}

impl ExecutionStateTracker {
    /// Create a tracker with no active state on any thread.
    pub fn new() -> Self {
        Self::default()
    }

    /// The state active on the calling thread, if any.
    pub fn current(&self) -> Option<Arc<ExecutionState>> {
        self.active
            .lock()
            .unwrap()
            .get(&thread::current().id())
            .cloned()
    }

    /// Enter `state` until the guard drops.
    ///
    /// Elapsed wall-clock time is added to the state on drop; the previously
    /// active state is restored on every exit path.
    pub fn enter(self: &Arc<Self>, state: Arc<ExecutionState>) -> StateGuard {
        let previous = self
            .active
            .lock()
            .unwrap()
            .insert(thread::current().id(), Arc::clone(&state));
        StateGuard {
            tracker: Arc::clone(self),
            state,
            previous,
            entered_at: Instant::now(),
        }
    }
}

/// RAII guard attributing elapsed time to an execution state on drop.
pub struct StateGuard {
    tracker: Arc<ExecutionStateTracker>,
    state: Arc<ExecutionState>,
    previous: Option<Arc<ExecutionState>>,
    entered_at: Instant,
}

impl Drop for StateGuard {
    fn drop(&mut self) {
        self.state
            .add_millis(self.entered_at.elapsed().as_millis() as u64);
        let mut active = self.tracker.active.lock().unwrap();
        match self.previous.take() {
            Some(previous) => {
                active.insert(thread::current().id(), previous);
            }
            None => {
                active.remove(&thread::current().id());
            }
        }
    }
}

/// All execution states created during registration.
#[derive(Debug, Default)]
pub struct ExecutionStateRegistry {
    states: Mutex<Vec<Arc<ExecutionState>>>,
}

impl ExecutionStateRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a newly created state.
    pub fn register(&self, state: Arc<ExecutionState>) {
        self.states.lock().unwrap().push(state);
    }

    /// Clear accumulated time for every registered state.
    pub fn reset(&self) {
        let states = self.states.lock().unwrap();
        for state in states.iter() {
            state.reset();
        }
        debug!(states = states.len(), "execution states reset");
    }

    /// Read-only projection into the external monitoring record format.
    pub fn execution_time_records(&self) -> Vec<MonitoringRecord> {
        self.states
            .lock()
            .unwrap()
            .iter()
            .map(|state| MonitoringRecord {
                metric: state.metric().clone(),
                total_millis: state.total_millis(),
            })
            .collect()
    }

    /// Encoded monitoring data keyed by short metric identifiers.
    ///
    /// # Errors
    /// Returns an export error when payload encoding fails
    pub fn execution_time_data(
        &self,
        short_ids: &ShortIdMap,
    ) -> Result<HashMap<String, Bytes>, ContractError> {
        let states = self.states.lock().unwrap();
        let mut data = HashMap::with_capacity(states.len());
        for state in states.iter() {
            let short_id = short_ids.get_or_create(state.metric());
            let payload = crate::export::encode_millis(state.total_millis())?;
            data.insert(short_id, payload);
        }
        Ok(data)
    }
}
