//! Export projections for the metrics backend
//!
//! The dispatch layer never talks to the backend itself; it only projects
//! accumulated state into records keyed by stable short identifiers.

use std::collections::HashMap;
use std::sync::Mutex;

use bytes::Bytes;
use contracts::ContractError;
use serde::{Deserialize, Serialize};

use crate::metrics::MetricName;

/// One accumulated time-spent metric in the external record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoringRecord {
    /// Metric identity
    pub metric: MetricName,

    /// Accumulated milliseconds
    pub total_millis: u64,
}

/// Stable short identifiers for metric names.
///
/// The backend keys repeated payloads by short id so full metric names are
/// transmitted once. Ids are assigned on first use and never change.
#[derive(Debug, Default)]
pub struct ShortIdMap {
    inner: Mutex<ShortIdMapInner>,
}

#[derive(Debug, Default)]
struct ShortIdMapInner {
    ids: HashMap<MetricName, String>,
    next: u64,
}

impl ShortIdMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the short id for `metric`, assigning the next one if unseen.
    pub fn get_or_create(&self, metric: &MetricName) -> String {
        let mut inner = self.inner.lock().unwrap();
        if let Some(id) = inner.ids.get(metric) {
            return id.clone();
        }
        let id = format!("metric_{}", inner.next);
        inner.next += 1;
        inner.ids.insert(metric.clone(), id.clone());
        id
    }

    /// Get the short id for `metric` if one has been assigned.
    pub fn get(&self, metric: &MetricName) -> Option<String> {
        self.inner.lock().unwrap().ids.get(metric).cloned()
    }

    /// Number of assigned ids.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().ids.len()
    }

    /// Whether no ids have been assigned.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Encode an accumulated milliseconds payload.
pub fn encode_millis(millis: u64) -> Result<Bytes, ContractError> {
    let encoded = bincode::serialize(&millis)
        .map_err(|e| ContractError::export(format!("encode millis: {e}")))?;
    Ok(Bytes::from(encoded))
}

/// Decode an accumulated milliseconds payload.
pub fn decode_millis(payload: &Bytes) -> Result<u64, ContractError> {
    bincode::deserialize(payload).map_err(|e| ContractError::export(format!("decode millis: {e}")))
}
