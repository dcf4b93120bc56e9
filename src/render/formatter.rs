use candle_core::{DType, Device, IndexOp, Tensor};

use crate::foundation::core::{BatchRange, Stage};
use crate::foundation::error::{RenderError, RenderResult};
use crate::foundation::queue::{Publisher, Subscriber};
use crate::render::frame::FrameRGB;

/// Raw generator output for one batch, moved downstream by the scheduler.
#[derive(Debug)]
pub(crate) struct RawBatch {
    pub(crate) range: BatchRange,
    pub(crate) images: Tensor,
}

/// One encoder-ready frame and its position in the sample sequence.
#[derive(Debug)]
pub(crate) struct IndexedFrame {
    pub(crate) index: usize,
    pub(crate) frame: FrameRGB,
}

/// Map generator images in `[-1, 1]` to channel-last `[0, 255]` values.
///
/// Input is `[B, 3, H, W]`, output is `[B, H, W, 3]` still on the input's device.
pub fn to_display_range(images: &Tensor) -> RenderResult<Tensor> {
    let (_, channels, _, _) = images.dims4()?;
    if channels != 3 {
        return Err(RenderError::config_mismatch(format!(
            "generator produced {channels} channels, expected 3 (RGB)"
        )));
    }
    Ok(images
        .clamp(-1f32, 1f32)?
        .affine(127.5, 127.5)?
        .permute((0, 2, 3, 1))?)
}

/// Copy image `i` of a display-range batch to the host as RGB8.
///
/// The cast to `u8` truncates.
pub fn frame_to_host(display: &Tensor, i: usize) -> RenderResult<FrameRGB> {
    let (_, height, width, _) = display.dims4()?;
    let data = display
        .i(i)?
        .to_device(&Device::Cpu)?
        .to_dtype(DType::U8)?
        .flatten_all()?
        .to_vec1::<u8>()?;
    Ok(FrameRGB {
        width: width as u32,
        height: height as u32,
        data,
    })
}

/// Convert a whole batch to frames.
pub fn format_batch(images: &Tensor) -> RenderResult<Vec<FrameRGB>> {
    let display = to_display_range(images)?;
    (0..display.dims()[0])
        .map(|i| frame_to_host(&display, i))
        .collect()
}

/// Formatter worker: turn every raw batch into individually enqueued frames.
///
/// Returns the number of frames emitted. Frames keep batch order and intra-batch order.
#[tracing::instrument(level = "debug", skip_all)]
pub(crate) fn run_formatter(
    batches: Subscriber<RawBatch>,
    frames: Publisher<IndexedFrame>,
) -> RenderResult<usize> {
    let mut emitted = 0usize;
    while let Some(batch) = batches.next()? {
        if batch.range.start != emitted {
            return Err(RenderError::validation(format!(
                "batch {} starts at sample {}, expected {emitted}",
                batch.range.index, batch.range.start
            )));
        }
        let display = to_display_range(&batch.images)?;
        let count = display.dims()[0];
        if count != batch.range.len() {
            return Err(RenderError::validation(format!(
                "batch {} holds {count} images for {} samples",
                batch.range.index,
                batch.range.len()
            )));
        }
        for i in 0..count {
            let frame = frame_to_host(&display, i)?;
            frames.publish(IndexedFrame {
                index: emitted,
                frame,
            })?;
            emitted += 1;
        }
        tracing::debug!(batch = batch.range.index, frames = count, "formatted batch");
    }
    frames.finish()?;
    tracing::debug!(stage = %Stage::Formatter, emitted, "drained");
    Ok(emitted)
}

#[cfg(test)]
#[path = "../../tests/unit/render/formatter.rs"]
mod tests;
