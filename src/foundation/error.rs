use std::time::Duration;

use crate::foundation::core::Stage;

/// Result alias used throughout the crate.
pub type RenderResult<T> = Result<T, RenderError>;

/// Errors surfaced by a render run.
///
/// Every variant that originates inside the pipeline names the stage that failed.
#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    /// Invalid caller configuration or sample sequence.
    #[error("validation error: {0}")]
    Validation(String),

    /// Produced frames disagree with the requested output size.
    #[error("configuration mismatch: {0}")]
    ConfigMismatch(String),

    /// A downstream stage waited past its bound without work or an end marker.
    #[error("{stage} starved: no work arrived within {waited:?}")]
    StarvationTimeout {
        /// Stage that gave up waiting.
        stage: Stage,
        /// How long it waited.
        waited: Duration,
    },

    /// The upstream stage went away without sending its end marker.
    #[error("{stage} aborted: upstream stage disconnected before end of stream")]
    StageAborted {
        /// Stage that observed the disconnect.
        stage: Stage,
    },

    /// The downstream stage stopped accepting work.
    #[error("{stage} aborted: downstream stage is no longer accepting work")]
    StageClosed {
        /// Stage whose send failed.
        stage: Stage,
    },

    /// Tensor transfer or generator inference failure.
    #[error("accelerator error: {0}")]
    Accelerator(#[from] candle_core::Error),

    /// Encoder subprocess failure.
    #[error("encoder error: {0}")]
    Encoder(String),

    /// Anything else, with context.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RenderError {
    /// Build a [`RenderError::Validation`].
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`RenderError::ConfigMismatch`].
    pub fn config_mismatch(msg: impl Into<String>) -> Self {
        Self::ConfigMismatch(msg.into())
    }

    /// Build a [`RenderError::Encoder`].
    pub fn encoder(msg: impl Into<String>) -> Self {
        Self::Encoder(msg.into())
    }

    /// Return `true` for errors that only report a peer stage going away.
    ///
    /// The coordinator prefers any other error when picking the one to surface.
    pub fn is_secondary(&self) -> bool {
        matches!(self, Self::StageAborted { .. } | Self::StageClosed { .. })
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
