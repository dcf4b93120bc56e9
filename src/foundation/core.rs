use std::fmt;

use crate::foundation::error::{RenderError, RenderResult};

/// Pipeline stage identity, used to attribute errors and log lines.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Batch scheduler (generator invocation).
    Scheduler,
    /// Frame formatter (tensor to RGB8 conversion).
    Formatter,
    /// Stream encoder sink (frame delivery to the encoder).
    Sink,
}

impl Stage {
    /// Stable human readable name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Scheduler => "batch scheduler",
            Self::Formatter => "frame formatter",
            Self::Sink => "stream encoder sink",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Half-open sample index range `[start, end)` covered by one batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchRange {
    /// Zero-based batch ordinal.
    pub index: usize,
    /// Inclusive first sample index.
    pub start: usize,
    /// Exclusive end sample index.
    pub end: usize,
}

impl BatchRange {
    /// Number of samples in the batch.
    pub fn len(self) -> usize {
        self.end.saturating_sub(self.start)
    }

    /// Return `true` when the batch has no samples.
    pub fn is_empty(self) -> bool {
        self.start >= self.end
    }
}

/// Partition `[0, total)` into consecutive batches of at most `batch_size` samples.
///
/// Only the last batch may be shorter than `batch_size`.
pub fn batch_ranges(total: usize, batch_size: usize) -> RenderResult<Vec<BatchRange>> {
    if batch_size == 0 {
        return Err(RenderError::validation("batch_size must be >= 1"));
    }

    Ok((0..total)
        .step_by(batch_size)
        .enumerate()
        .map(|(index, start)| BatchRange {
            index,
            start,
            end: (start + batch_size).min(total),
        })
        .collect())
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
