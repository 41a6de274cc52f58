//! Layered error definitions
//!
//! Categorized by source: stage / codec / export

use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Stage Errors =====
    /// Stage processing failure
    #[error("stage '{stage_id}' failed to process element: {message}")]
    StageFailure { stage_id: String, message: String },

    // ===== Codec Errors =====
    /// Element size measurement failure
    #[error("size measurement failed: {message}")]
    SizeMeasurement { message: String },

    // ===== Export Errors =====
    /// Monitoring data encoding failure
    #[error("monitoring export error: {message}")]
    Export { message: String },
}

impl ContractError {
    /// Create a stage processing failure
    pub fn stage_failure(stage_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StageFailure {
            stage_id: stage_id.into(),
            message: message.into(),
        }
    }

    /// Create a size measurement failure
    pub fn size_measurement(message: impl Into<String>) -> Self {
        Self::SizeMeasurement {
            message: message.into(),
        }
    }

    /// Create a monitoring export error
    pub fn export(message: impl Into<String>) -> Self {
        Self::Export {
            message: message.into(),
        }
    }
}
