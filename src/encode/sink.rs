use std::path::PathBuf;

use crate::encode::size::OutputSize;
use crate::foundation::error::RenderResult;
use crate::render::frame::FrameRGB;

/// Configuration provided to a [`FrameSink`] before the first frame is produced.
#[derive(Debug, Clone, PartialEq)]
pub struct SinkConfig {
    /// Output resolution; every pushed frame already matches it.
    pub size: OutputSize,
    /// Frames per second (frame count / duration).
    pub fps: f64,
    /// Total frames that will be pushed.
    pub frame_count: usize,
    /// Optional audio track muxed into the output.
    pub audio: Option<AudioInputConfig>,
}

/// Audio file muxed alongside the video, trimmed to the rendered window.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioInputConfig {
    /// Any container/codec the encoder can read.
    pub path: PathBuf,
    /// Trim start in seconds.
    pub offset: f64,
    /// Trim length in seconds.
    pub duration: f64,
}

impl AudioInputConfig {
    /// Trim end in seconds.
    pub fn end(&self) -> f64 {
        self.offset + self.duration
    }
}

/// Sink contract for consuming formatted frames in sample order.
///
/// Ordering contract: `push_frame` is called with indices `0, 1, 2, ...` exactly
/// `frame_count` times. Exactly one of `end` or `abort` follows.
pub trait FrameSink: Send {
    /// Called once before any frame is produced.
    fn begin(&mut self, cfg: SinkConfig) -> RenderResult<()>;
    /// Push one frame in strictly increasing index order.
    fn push_frame(&mut self, idx: usize, frame: &FrameRGB) -> RenderResult<()>;
    /// Called once after the last frame is pushed; finalizes the output.
    fn end(&mut self) -> RenderResult<()>;
    /// Called instead of `end` when the run fails. Must release the output without blocking
    /// on frames that will never arrive.
    fn abort(&mut self) {}
}

/// In-memory sink for tests and debugging.
#[derive(Debug, Default)]
pub struct InMemorySink {
    cfg: Option<SinkConfig>,
    frames: Vec<(usize, FrameRGB)>,
    ended: bool,
    aborted: bool,
}

impl InMemorySink {
    /// Create a new in-memory sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the sink configuration captured in `begin`, if any.
    pub fn config(&self) -> Option<&SinkConfig> {
        self.cfg.as_ref()
    }

    /// Borrow the captured frames.
    pub fn frames(&self) -> &[(usize, FrameRGB)] {
        &self.frames
    }

    /// `end` was called.
    pub fn ended(&self) -> bool {
        self.ended
    }

    /// `abort` was called.
    pub fn aborted(&self) -> bool {
        self.aborted
    }
}

impl FrameSink for InMemorySink {
    fn begin(&mut self, cfg: SinkConfig) -> RenderResult<()> {
        self.cfg = Some(cfg);
        self.frames.clear();
        self.ended = false;
        self.aborted = false;
        Ok(())
    }

    fn push_frame(&mut self, idx: usize, frame: &FrameRGB) -> RenderResult<()> {
        self.frames.push((idx, frame.clone()));
        Ok(())
    }

    fn end(&mut self) -> RenderResult<()> {
        self.ended = true;
        Ok(())
    }

    fn abort(&mut self) {
        self.aborted = true;
    }
}
