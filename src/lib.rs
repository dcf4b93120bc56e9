//! Latent-render turns a sequence of latent samples into a video.
//!
//! A run has three stages joined by bounded hand-off channels:
//!
//! - the batch scheduler drives a [`Generator`] over consecutive batches, applying live
//!   [`ModelEdits`] on every call
//! - the frame formatter maps raw `[-1, 1]` images to RGB8 [`FrameRGB`]s
//! - the stream encoder sink conforms each frame to the [`OutputSize`] and feeds a [`FrameSink`]
//!
//! [`render`] and [`render_to_file`] coordinate the three and surface the first root-cause error.
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod foundation;

/// Encoding sinks.
pub mod encode;
/// Generator abstraction and model edits.
pub mod model;
/// Scheduling and frame formatting.
pub mod render;
/// Latent sample input.
pub mod samples;
/// Session-oriented rendering API.
pub mod session;

pub use crate::foundation::core::{BatchRange, Stage};
pub use crate::foundation::error::{RenderError, RenderResult};

pub use crate::encode::ffmpeg::{FfmpegSink, FfmpegSinkOpts};
pub use crate::encode::sink::{AudioInputConfig, FrameSink, InMemorySink, SinkConfig};
pub use crate::encode::size::OutputSize;
pub use crate::model::ModelEdits;
pub use crate::model::bend::{Bend, BendTransform, LayerTransform, PreparedBend, TransformBuilder};
pub use crate::model::generator::{Generator, GeneratorInputs, GeneratorOutput, TruncationBatch};
pub use crate::model::rewrite::{Rewrite, RewriteFn, RewriteStep, StateOverlay};
pub use crate::render::frame::FrameRGB;
pub use crate::samples::sequence::{NoiseScale, SampleSequence, Truncation};
pub use crate::session::opts::RenderOpts;
pub use crate::session::pipeline::{RenderStats, render, render_to_file};
