//! WindowedElement - the unit of data flowing between stages
//!
//! An element carries an encoded value plus the set of logical event-time
//! windows it occurs in. Metrics count an element once per window.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// A logical event-time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Window {
    /// Inclusive window start (milliseconds since epoch)
    pub start_ms: i64,

    /// Exclusive window end (milliseconds since epoch)
    pub end_ms: i64,
}

impl Window {
    /// The single window spanning all of event time.
    pub const GLOBAL: Window = Window {
        start_ms: i64::MIN,
        end_ms: i64::MAX,
    };

    /// Create a window from its bounds.
    pub fn new(start_ms: i64, end_ms: i64) -> Self {
        Self { start_ms, end_ms }
    }
}

/// An element value annotated with the windows it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowedElement {
    /// Encoded element payload
    pub value: Bytes,

    /// Event timestamp (milliseconds since epoch)
    pub timestamp_ms: i64,

    /// Windows this element occurs in (never empty under well-formed use)
    pub windows: Vec<Window>,
}

impl WindowedElement {
    /// Create an element with explicit windows.
    pub fn new(value: Bytes, timestamp_ms: i64, windows: Vec<Window>) -> Self {
        Self {
            value,
            timestamp_ms,
            windows,
        }
    }

    /// Create an element assigned to the global window.
    pub fn in_global_window(value: Bytes) -> Self {
        Self {
            value,
            timestamp_ms: 0,
            windows: vec![Window::GLOBAL],
        }
    }

    /// Number of windows this element occurs in.
    pub fn window_count(&self) -> usize {
        self.windows.len()
    }
}
