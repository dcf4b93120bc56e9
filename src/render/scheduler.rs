use candle_core::{DType, Device, Tensor};

use crate::foundation::core::{BatchRange, Stage, batch_ranges};
use crate::foundation::error::{RenderError, RenderResult};
use crate::model::ModelEdits;
use crate::model::bend::prepare_bends;
use crate::model::generator::{Generator, GeneratorInputs, TruncationBatch};
use crate::model::rewrite::{RewriteStep, StateOverlay};
use crate::samples::sequence::{NoiseScale, SampleSequence, Truncation};

/// Noise input after staging.
enum StagedNoise {
    Absent,
    // Host buffer, sliced and transferred per batch.
    PerFrame(Tensor),
    // Transferred once; the same device tensor goes to every batch.
    Shared(Tensor),
}

enum StagedTruncation {
    Scalar(f64),
    PerFrame(Tensor),
}

/// Contiguous `f32` host copy, ready for slicing and transfer.
fn stage(t: &Tensor) -> RenderResult<Tensor> {
    Ok(t.to_device(&Device::Cpu)?
        .to_dtype(DType::F32)?
        .contiguous()?)
}

fn slice(t: &Tensor, range: BatchRange) -> RenderResult<Tensor> {
    Ok(t.narrow(0, range.start, range.len())?)
}

/// Drives the generator batch by batch.
///
/// The scheduler is the only component that touches generator state. All inputs are staged and
/// every rewritten parameter is snapshotted in [`BatchScheduler::new`], before the first batch.
pub(crate) struct BatchScheduler<'a> {
    generator: &'a mut dyn Generator,
    edits: &'a ModelEdits,
    batches: Vec<BatchRange>,
    randomize_noise: bool,

    latents: Tensor,
    noise: Vec<StagedNoise>,
    truncation: StagedTruncation,
    bend_modulations: Vec<Option<Tensor>>,
    rewrite_modulations: Vec<Tensor>,
    overlay: StateOverlay,
}

impl<'a> BatchScheduler<'a> {
    pub(crate) fn new(
        generator: &'a mut dyn Generator,
        samples: &SampleSequence,
        edits: &'a ModelEdits,
        batch_size: usize,
        randomize_noise: bool,
    ) -> RenderResult<Self> {
        let batches = batch_ranges(samples.len(), batch_size)?;

        let latents = stage(samples.latents())?;
        let noise = samples
            .noise()
            .iter()
            .map(|scale| -> RenderResult<StagedNoise> {
                Ok(match scale {
                    NoiseScale::Absent => StagedNoise::Absent,
                    NoiseScale::PerFrame(t) => StagedNoise::PerFrame(stage(t)?),
                    NoiseScale::Shared(t) => StagedNoise::Shared(
                        t.to_dtype(DType::F32)?.to_device(generator.device())?,
                    ),
                })
            })
            .collect::<RenderResult<Vec<_>>>()?;
        let truncation = match samples.truncation() {
            Truncation::Scalar(v) => StagedTruncation::Scalar(*v),
            Truncation::PerFrame(t) => StagedTruncation::PerFrame(stage(t)?),
        };

        let bend_modulations = edits
            .bends
            .iter()
            .map(|bend| {
                bend.modulation()
                    .map(|m| {
                        let what = format!("modulation of bend '{}'", bend.layer);
                        samples.check_per_frame(m, &what)?;
                        stage(m)
                    })
                    .transpose()
            })
            .collect::<RenderResult<Vec<_>>>()?;
        let rewrite_modulations = edits
            .rewrites
            .iter()
            .map(|(name, rewrite)| {
                samples.check_per_frame(
                    &rewrite.modulation,
                    &format!("modulation of rewrite '{name}'"),
                )?;
                stage(&rewrite.modulation)
            })
            .collect::<RenderResult<Vec<_>>>()?;

        let overlay =
            StateOverlay::capture(&*generator, edits.rewrites.keys().map(String::as_str))?;

        Ok(Self {
            generator,
            edits,
            batches,
            randomize_noise,
            latents,
            noise,
            truncation,
            bend_modulations,
            rewrite_modulations,
            overlay,
        })
    }

    /// Batch ranges in publication order.
    pub(crate) fn batches(&self) -> &[BatchRange] {
        &self.batches
    }

    /// Render every batch in index order, handing each output to `publish`.
    ///
    /// Rewritten parameters are restored afterwards whether or not a batch failed.
    pub(crate) fn run(
        &mut self,
        mut publish: impl FnMut(BatchRange, Tensor) -> RenderResult<()>,
    ) -> RenderResult<usize> {
        let batches = self.batches.clone();
        let mut done = 0usize;
        let mut result = Ok(());
        for range in batches {
            result = self
                .render_batch(range)
                .and_then(|images| publish(range, images));
            if result.is_err() {
                break;
            }
            done += 1;
        }

        let restored = self.overlay.restore(self.generator);
        result?;
        restored?;
        tracing::debug!(stage = %Stage::Scheduler, batches = done, "all batches published");
        Ok(done)
    }

    fn render_batch(&mut self, range: BatchRange) -> RenderResult<Tensor> {
        let device = self.generator.device().clone();

        let latents = slice(&self.latents, range)?.to_device(&device)?;
        let noise = self
            .noise
            .iter()
            .map(|n| -> RenderResult<Option<Tensor>> {
                Ok(match n {
                    StagedNoise::Absent => None,
                    StagedNoise::PerFrame(t) => Some(slice(t, range)?.to_device(&device)?),
                    StagedNoise::Shared(t) => Some(t.clone()),
                })
            })
            .collect::<RenderResult<Vec<_>>>()?;
        let truncation = match &self.truncation {
            StagedTruncation::Scalar(v) => TruncationBatch::Scalar(*v),
            StagedTruncation::PerFrame(t) => {
                TruncationBatch::PerFrame(slice(t, range)?.to_device(&device)?)
            }
        };

        for ((name, rewrite), modulation) in
            self.edits.rewrites.iter().zip(&self.rewrite_modulations)
        {
            let modulation = slice(modulation, range)?;
            let step = RewriteStep {
                batch: range,
                modulation: &modulation,
            };
            let value = self.overlay.overlay(name, rewrite, &step)?;
            self.overlay.install(self.generator, name, value)?;
        }

        let bend_slices = self
            .bend_modulations
            .iter()
            .map(|m| {
                m.as_ref()
                    .map(|m| -> RenderResult<Tensor> { Ok(slice(m, range)?.to_device(&device)?) })
                    .transpose()
            })
            .collect::<RenderResult<Vec<_>>>()?;
        let bends = prepare_bends(&self.edits.bends, &bend_slices)?;

        let output = self.generator.forward(GeneratorInputs {
            latents: &latents,
            noise: &noise,
            truncation: &truncation,
            bends: &bends,
            randomize_noise: self.randomize_noise,
            input_is_latent: true,
        })?;

        let produced = output.images.dims().first().copied().unwrap_or(0);
        if produced != range.len() {
            return Err(RenderError::validation(format!(
                "generator returned {produced} images for batch {} of {} samples",
                range.index,
                range.len()
            )));
        }
        tracing::debug!(
            batch = range.index,
            start = range.start,
            len = range.len(),
            "generated batch"
        );
        Ok(output.images)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/scheduler.rs"]
mod tests;
