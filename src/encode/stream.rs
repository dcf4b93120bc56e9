use crate::encode::sink::{FrameSink, SinkConfig};
use crate::foundation::core::Stage;
use crate::foundation::error::{RenderError, RenderResult};
use crate::foundation::queue::Subscriber;
use crate::render::formatter::IndexedFrame;

/// Sink worker: deliver exactly `cfg.frame_count` frames in order, then finalize.
///
/// The sink must already be started. On any failure the sink is aborted instead of ended, so
/// the encoder's input is closed either way.
#[tracing::instrument(level = "debug", skip_all, fields(frames = cfg.frame_count))]
pub(crate) fn run_sink(
    frames: Subscriber<IndexedFrame>,
    sink: &mut dyn FrameSink,
    cfg: &SinkConfig,
) -> RenderResult<usize> {
    match deliver(&frames, sink, cfg) {
        Ok(delivered) => {
            sink.end()?;
            tracing::debug!(stage = %Stage::Sink, delivered, "drained");
            Ok(delivered)
        }
        Err(e) => {
            sink.abort();
            Err(e)
        }
    }
}

fn deliver(
    frames: &Subscriber<IndexedFrame>,
    sink: &mut dyn FrameSink,
    cfg: &SinkConfig,
) -> RenderResult<usize> {
    let mut delivered = 0usize;
    while let Some(IndexedFrame { index, frame }) = frames.next()? {
        if index != delivered {
            return Err(RenderError::validation(format!(
                "sink received frame {index}, expected {delivered}"
            )));
        }
        if delivered == cfg.frame_count {
            return Err(RenderError::validation(format!(
                "sink received more than the {} expected frames",
                cfg.frame_count
            )));
        }
        let frame = cfg.size.conform(frame)?;
        sink.push_frame(index, &frame)?;
        delivered += 1;
    }
    if delivered != cfg.frame_count {
        return Err(RenderError::validation(format!(
            "stream ended after {delivered} of {} frames",
            cfg.frame_count
        )));
    }
    Ok(delivered)
}

#[cfg(test)]
#[path = "../../tests/unit/encode/stream.rs"]
mod tests;
