use candle_core::{Device, Tensor};

use crate::foundation::error::RenderResult;
use crate::model::bend::PreparedBend;

/// Truncation value handed to one generator call.
#[derive(Clone, Debug)]
pub enum TruncationBatch {
    /// Run-wide scalar.
    Scalar(f64),
    /// Device-resident slice covering exactly the batch range.
    PerFrame(Tensor),
}

/// Inputs for one batched generator call.
///
/// Every tensor is already resident on [`Generator::device`].
#[derive(Debug)]
pub struct GeneratorInputs<'a> {
    /// Latent batch, first dimension is the batch length.
    pub latents: &'a Tensor,
    /// One entry per noise scale; `None` where the caller supplied no noise.
    pub noise: &'a [Option<Tensor>],
    /// Truncation for this batch.
    pub truncation: &'a TruncationBatch,
    /// Layer edits in application order.
    pub bends: &'a [PreparedBend],
    /// Ask the generator to draw fresh noise instead of using `noise`.
    pub randomize_noise: bool,
    /// `latents` are already in the generator's latent space.
    pub input_is_latent: bool,
}

/// Result of one generator call.
#[derive(Clone, Debug)]
pub struct GeneratorOutput {
    /// Images `[B, C, H, W]` with values nominally in `[-1, 1]`.
    pub images: Tensor,
    /// Auxiliary data; ignored by the pipeline.
    pub aux: Option<Tensor>,
}

/// A generative image model driven by the batch scheduler.
///
/// Only the scheduler holds the generator during a run, so parameter reads and replacements
/// never race with inference.
pub trait Generator {
    /// Device the generator computes on; inputs are transferred here.
    fn device(&self) -> &Device;

    /// Read the current value of a named parameter.
    fn parameter(&self, name: &str) -> RenderResult<Tensor>;

    /// Install `value` as the named parameter, returning the value it replaced.
    fn replace_parameter(&mut self, name: &str, value: Tensor) -> RenderResult<Tensor>;

    /// Run one batch.
    fn forward(&mut self, inputs: GeneratorInputs<'_>) -> RenderResult<GeneratorOutput>;
}
