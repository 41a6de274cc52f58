//! In-process metric cells and containers
//!
//! Counters and distributions are plain atomics so independent dispatch call
//! sites can increment them concurrently. Containers group the cells created
//! for one stage; the registry additionally owns an *unbound* container for
//! metrics that must be recordable outside any stage context.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, ThreadId};

use serde::{Deserialize, Serialize};

/// Fully qualified metric identity: a well-known name plus labels.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetricName {
    /// Well-known metric name
    pub name: String,

    /// Labels qualifying the metric (channel, stage, ...)
    pub labels: BTreeMap<String, String>,
}

impl MetricName {
    /// Create a metric name with labels.
    pub fn named(
        name: impl Into<String>,
        labels: impl IntoIterator<Item = (String, String)>,
    ) -> Self {
        Self {
            name: name.into(),
            labels: labels.into_iter().collect(),
        }
    }
}

impl std::fmt::Display for MetricName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.labels.is_empty() {
            let labels: Vec<String> = self
                .labels
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            write!(f, "{{{}}}", labels.join(","))?;
        }
        Ok(())
    }
}

/// Monotonic counter cell, shared by all handles to the same metric.
#[derive(Debug, Clone, Default)]
pub struct Counter {
    cell: Arc<AtomicU64>,
}

impl Counter {
    /// Increment by `delta`.
    pub fn inc(&self, delta: u64) {
        self.cell.fetch_add(delta, Ordering::Relaxed);
    }

    /// Current accumulated value.
    pub fn value(&self) -> u64 {
        self.cell.load(Ordering::Relaxed)
    }
}

#[derive(Debug)]
struct DistributionCell {
    count: AtomicU64,
    sum: AtomicU64,
    min: AtomicU64,
    max: AtomicU64,
}

impl Default for DistributionCell {
    fn default() -> Self {
        Self {
            count: AtomicU64::new(0),
            sum: AtomicU64::new(0),
            min: AtomicU64::new(u64::MAX),
            max: AtomicU64::new(0),
        }
    }
}

/// Distribution cell tracking count/sum/min/max of recorded values.
#[derive(Debug, Clone, Default)]
pub struct Distribution {
    cell: Arc<DistributionCell>,
}

impl Distribution {
    /// Record one value.
    pub fn update(&self, value: u64) {
        self.cell.count.fetch_add(1, Ordering::Relaxed);
        self.cell.sum.fetch_add(value, Ordering::Relaxed);
        self.cell.min.fetch_min(value, Ordering::Relaxed);
        self.cell.max.fetch_max(value, Ordering::Relaxed);
    }

    /// Snapshot of the current state (min/max are 0 when empty).
    pub fn snapshot(&self) -> DistributionSnapshot {
        let count = self.cell.count.load(Ordering::Relaxed);
        DistributionSnapshot {
            count,
            sum: self.cell.sum.load(Ordering::Relaxed),
            min: if count == 0 {
                0
            } else {
                self.cell.min.load(Ordering::Relaxed)
            },
            max: self.cell.max.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of a distribution (for reporting)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DistributionSnapshot {
    pub count: u64,
    pub sum: u64,
    pub min: u64,
    pub max: u64,
}

/// Metric cells belonging to one stage (or the unbound context).
///
/// Handle acquisition locks briefly; the returned `Counter`/`Distribution`
/// handles are lock-free and meant to be held across dispatch calls.
#[derive(Debug, Default)]
pub struct MetricsContainer {
    counters: Mutex<HashMap<MetricName, Counter>>,
    distributions: Mutex<HashMap<MetricName, Distribution>>,
}

impl MetricsContainer {
    /// Create an empty container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get (or create) the counter for `name`.
    pub fn counter(&self, name: MetricName) -> Counter {
        self.counters
            .lock()
            .unwrap()
            .entry(name)
            .or_default()
            .clone()
    }

    /// Get (or create) the distribution for `name`.
    pub fn distribution(&self, name: MetricName) -> Distribution {
        self.distributions
            .lock()
            .unwrap()
            .entry(name)
            .or_default()
            .clone()
    }

    /// Snapshot all counters.
    pub fn counter_snapshots(&self) -> Vec<(MetricName, u64)> {
        self.counters
            .lock()
            .unwrap()
            .iter()
            .map(|(name, counter)| (name.clone(), counter.value()))
            .collect()
    }

    /// Snapshot all distributions.
    pub fn distribution_snapshots(&self) -> Vec<(MetricName, DistributionSnapshot)> {
        self.distributions
            .lock()
            .unwrap()
            .iter()
            .map(|(name, dist)| (name.clone(), dist.snapshot()))
            .collect()
    }
}

/// Per-stage metric containers plus the unbound container.
///
/// One instance is constructed at worker startup and shared by reference into
/// the registry and its dispatchers.
#[derive(Debug, Default)]
pub struct MetricsContainerRegistry {
    containers: Mutex<HashMap<String, Arc<MetricsContainer>>>,
    unbound: Arc<MetricsContainer>,
}

impl MetricsContainerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get (or create) the container for `stage_id`.
    pub fn container(&self, stage_id: &str) -> Arc<MetricsContainer> {
        Arc::clone(
            self.containers
                .lock()
                .unwrap()
                .entry(stage_id.to_string())
                .or_default(),
        )
    }

    /// The container not bound to any stage.
    ///
    /// Element counts land here so elements from channels with no upstream
    /// stage are still countable.
    pub fn unbound_container(&self) -> Arc<MetricsContainer> {
        Arc::clone(&self.unbound)
    }

    /// All stage ids with a container.
    pub fn stage_ids(&self) -> Vec<String> {
        self.containers.lock().unwrap().keys().cloned().collect()
    }
}

/// Tracks the active metrics container per worker thread.
///
/// Passed explicitly (shared via `Arc`) so tests can run isolated
/// environments side by side. Stage logic reads `current()` to attribute
/// user metrics to the stage whose dispatch is in flight on this thread.
#[derive(Debug, Default)]
pub struct MetricsEnvironment {
    active: Mutex<HashMap<ThreadId, Arc<MetricsContainer>>>,
}

impl MetricsEnvironment {
    /// Create an environment with no active container on any thread.
    pub fn new() -> Self {
        Self::default()
    }

    /// The container active on the calling thread, if any.
    pub fn current(&self) -> Option<Arc<MetricsContainer>> {
        self.active
            .lock()
            .unwrap()
            .get(&thread::current().id())
            .cloned()
    }

    /// Activate `container` on the calling thread until the guard drops.
    ///
    /// The previously active container is restored on every exit path,
    /// including panics and error returns.
    pub fn scoped(self: &Arc<Self>, container: Arc<MetricsContainer>) -> ScopedContainer {
        let previous = self
            .active
            .lock()
            .unwrap()
            .insert(thread::current().id(), container);
        ScopedContainer {
            environment: Arc::clone(self),
            previous,
        }
    }
}

/// RAII guard restoring the previously active container on drop.
pub struct ScopedContainer {
    environment: Arc<MetricsEnvironment>,
    previous: Option<Arc<MetricsContainer>>,
}

impl Drop for ScopedContainer {
    fn drop(&mut self) {
        let mut active = self.environment.active.lock().unwrap();
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
