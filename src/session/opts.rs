use std::path::PathBuf;
use std::time::Duration;

use crate::encode::size::OutputSize;
use crate::foundation::error::{RenderError, RenderResult};

/// Options controlling a render run.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RenderOpts {
    /// Samples per generator call.
    pub batch_size: usize,
    /// Encoder resolution.
    pub output_size: OutputSize,
    /// Let the generator draw its own noise instead of the supplied noise scales.
    pub randomize_noise: bool,
    /// Capacity of each bounded hand-off channel.
    pub channel_capacity: usize,
    /// Longest a downstream stage waits for work before the run is declared starved.
    pub stage_timeout_ms: u64,
    /// Audio file muxed into the output, trimmed to the sequence's offset and duration.
    pub audio: Option<PathBuf>,
}

impl Default for RenderOpts {
    fn default() -> Self {
        Self {
            batch_size: 8,
            output_size: OutputSize::Square1024,
            randomize_noise: false,
            channel_capacity: 4,
            stage_timeout_ms: 10_000,
            audio: None,
        }
    }
}

impl RenderOpts {
    /// Parse options from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> RenderResult<Self> {
        let opts: Self = serde_json::from_str(json)
            .map_err(|e| RenderError::validation(format!("invalid render options: {e}")))?;
        opts.validate()?;
        Ok(opts)
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> RenderResult<()> {
        if self.batch_size == 0 {
            return Err(RenderError::validation("batch_size must be >= 1"));
        }
        if self.channel_capacity == 0 {
            return Err(RenderError::validation("channel_capacity must be >= 1"));
        }
        if self.stage_timeout_ms == 0 {
            return Err(RenderError::validation("stage_timeout_ms must be >= 1"));
        }
        Ok(())
    }

    /// Receive bound for the formatter and sink workers.
    pub fn stage_timeout(&self) -> Duration {
        Duration::from_millis(self.stage_timeout_ms)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/session/opts.rs"]
mod tests;
