//! Dispatcher error types

use thiserror::Error;

/// Dispatcher-specific errors
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Registration attempted after the channel's dispatcher was built
    #[error("cannot register stage '{stage_id}' on channel '{channel_id}': dispatcher already built")]
    RegistrationClosed {
        channel_id: String,
        stage_id: String,
    },

    /// Dispatcher requested for a channel with no registrations
    #[error("unknown channel '{channel_id}'")]
    UnknownChannel { channel_id: String },

    /// Failure from a downstream stage (from contract)
    #[error("stage error: {0}")]
    Contract(#[from] contracts::ContractError),
}

impl DispatchError {
    /// Create a registration-phase ordering error
    pub fn registration_closed(
        channel_id: impl Into<String>,
        stage_id: impl Into<String>,
    ) -> Self {
        Self::RegistrationClosed {
            channel_id: channel_id.into(),
            stage_id: stage_id.into(),
        }
    }

    /// Create an unknown-channel error
    pub fn unknown_channel(channel_id: impl Into<String>) -> Self {
        Self::UnknownChannel {
            channel_id: channel_id.into(),
        }
    }
}
