use std::thread::ScopedJoinHandle;

use crate::encode::ffmpeg::{FfmpegSink, FfmpegSinkOpts};
use crate::encode::sink::{AudioInputConfig, FrameSink, SinkConfig};
use crate::encode::stream::run_sink;
use crate::foundation::core::Stage;
use crate::foundation::error::{RenderError, RenderResult};
use crate::foundation::queue::hand_off;
use crate::model::ModelEdits;
use crate::model::generator::Generator;
use crate::render::formatter::{IndexedFrame, RawBatch, run_formatter};
use crate::render::scheduler::BatchScheduler;
use crate::samples::sequence::SampleSequence;
use crate::session::opts::RenderOpts;

/// Summary of a completed run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderStats {
    /// Generator calls made.
    pub batches: usize,
    /// Frames delivered to the sink.
    pub frames: usize,
}

/// Render `samples` through `generator` and stream every frame into `sink`, in order.
///
/// The generator runs on the calling thread. The formatter and the sink each get a scoped
/// worker, started once the first batch has been published. All three stages are joined before
/// this returns, and rewritten generator parameters are restored whether or not the run succeeds.
///
/// When several stages fail, the reported error is the first root cause in pipeline order;
/// errors that only say "my neighbour went away" are reported only if nothing else failed.
#[tracing::instrument(skip_all, fields(frames = samples.len(), batch_size = opts.batch_size))]
pub fn render(
    generator: &mut dyn Generator,
    samples: &SampleSequence,
    edits: &ModelEdits,
    opts: &RenderOpts,
    sink: &mut dyn FrameSink,
) -> RenderResult<RenderStats> {
    opts.validate()?;
    let mut scheduler = BatchScheduler::new(
        generator,
        samples,
        edits,
        opts.batch_size,
        opts.randomize_noise,
    )?;

    let cfg = SinkConfig {
        size: opts.output_size,
        fps: samples.fps(),
        frame_count: samples.len(),
        audio: opts.audio.as_ref().map(|path| AudioInputConfig {
            path: path.clone(),
            offset: samples.offset(),
            duration: samples.duration(),
        }),
    };
    sink.begin(cfg.clone())?;
    tracing::info!(
        batches = scheduler.batches().len(),
        fps = cfg.fps,
        size = %cfg.size,
        "render started"
    );

    let timeout = opts.stage_timeout();
    let (batch_tx, batch_rx) = hand_off::<RawBatch>(
        opts.channel_capacity,
        Stage::Scheduler,
        Stage::Formatter,
        timeout,
    );
    let (frame_tx, frame_rx) = hand_off::<IndexedFrame>(
        opts.channel_capacity,
        Stage::Formatter,
        Stage::Sink,
        timeout,
    );
    let sink_cfg = &cfg;
    let sink_ref: &mut dyn FrameSink = sink;

    let stats = std::thread::scope(|scope| -> RenderResult<RenderStats> {
        // Worker ends, moved out on the first publish.
        let mut idle = Some((batch_rx, frame_tx, frame_rx, sink_ref));
        let mut workers: Option<(
            ScopedJoinHandle<'_, RenderResult<usize>>,
            ScopedJoinHandle<'_, RenderResult<usize>>,
        )> = None;

        let scheduled = scheduler.run(|range, images| {
            batch_tx.publish(RawBatch { range, images })?;
            if let Some((batch_rx, frame_tx, frame_rx, sink)) = idle.take() {
                let formatter = scope.spawn(move || run_formatter(batch_rx, frame_tx));
                let encoder = scope.spawn(move || run_sink(frame_rx, sink, sink_cfg));
                workers = Some((formatter, encoder));
            }
            Ok(())
        });
        let scheduled = match scheduled {
            Ok(batches) => batch_tx.finish().map(|()| batches),
            Err(e) => {
                drop(batch_tx);
                Err(e)
            }
        };

        let (formatted, delivered) = match workers {
            Some((formatter, encoder)) => (
                join_worker(formatter, Stage::Formatter),
                join_worker(encoder, Stage::Sink),
            ),
            None => {
                if let Some((_, _, _, sink)) = idle.take() {
                    sink.abort();
                }
                let never = Err(RenderError::StageAborted {
                    stage: Stage::Formatter,
                });
                (never, Err(RenderError::StageAborted { stage: Stage::Sink }))
            }
        };

        settle(scheduled, formatted, delivered)
    })?;

    tracing::info!(batches = stats.batches, frames = stats.frames, "render finished");
    Ok(stats)
}

/// Render into a video file through the system `ffmpeg` binary.
pub fn render_to_file(
    generator: &mut dyn Generator,
    samples: &SampleSequence,
    edits: &ModelEdits,
    opts: &RenderOpts,
    sink_opts: FfmpegSinkOpts,
) -> RenderResult<RenderStats> {
    let mut sink = FfmpegSink::new(sink_opts);
    render(generator, samples, edits, opts, &mut sink)
}

fn join_worker(
    handle: ScopedJoinHandle<'_, RenderResult<usize>>,
    stage: Stage,
) -> RenderResult<usize> {
    handle
        .join()
        .map_err(|_| RenderError::Other(anyhow::anyhow!("{stage} thread panicked")))?
}

/// Pick the outcome of a run from the per-stage results.
fn settle(
    scheduled: RenderResult<usize>,
    formatted: RenderResult<usize>,
    delivered: RenderResult<usize>,
) -> RenderResult<RenderStats> {
    let (scheduled, formatted, delivered) = match (scheduled, formatted, delivered) {
        (Ok(batches), Ok(_), Ok(frames)) => return Ok(RenderStats { batches, frames }),
        results => results,
    };

    let mut reported: Option<RenderError> = None;
    for e in [scheduled, formatted, delivered]
        .into_iter()
        .filter_map(Result::err)
    {
        match &reported {
            Some(prev) if prev.is_secondary() && !e.is_secondary() => {
                tracing::debug!(error = %prev, "superseded by a root cause");
                reported = Some(e);
            }
            Some(_) => tracing::debug!(error = %e, "additional stage failure"),
            None => reported = Some(e),
        }
    }
    Err(reported.unwrap_or_else(|| RenderError::validation("render failed without an error")))
}

#[cfg(test)]
#[path = "../../tests/unit/session/pipeline.rs"]
mod tests;
