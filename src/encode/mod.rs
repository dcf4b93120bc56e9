//! Encoding sinks.
//!
//! Sinks consume conformed frames in sample order; the stream worker feeds them from the
//! formatter's hand-off channel.

/// `ffmpeg`-based sink (system `ffmpeg` binary, raw `rgb24` over stdin).
pub mod ffmpeg;
/// Generic frame sink trait and built-in sinks.
pub mod sink;
/// Supported output resolutions and the resolution policy.
pub mod size;
pub(crate) mod stream;
