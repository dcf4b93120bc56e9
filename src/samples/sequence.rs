use candle_core::Tensor;

use crate::foundation::error::{RenderError, RenderResult};

/// Noise input for one generator noise scale.
#[derive(Clone, Debug)]
pub enum NoiseScale {
    /// No noise tensor at this scale; the generator receives `None`.
    Absent,
    /// One noise tensor per frame (first dimension equals the frame count).
    PerFrame(Tensor),
    /// One tensor shared by every frame, passed unchanged to every batch.
    Shared(Tensor),
}

impl NoiseScale {
    /// Return `true` for [`NoiseScale::Absent`].
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }
}

/// Truncation control: one scalar for the whole run or one value per frame.
#[derive(Clone, Debug)]
pub enum Truncation {
    /// Shared by all frames, never sliced.
    Scalar(f64),
    /// One value per frame (first dimension equals the frame count).
    PerFrame(Tensor),
}

impl Default for Truncation {
    fn default() -> Self {
        Self::Scalar(1.0)
    }
}

/// The ordered latent samples of one render, one per output frame.
///
/// Owned by the caller and read-only to the pipeline.
#[derive(Clone, Debug)]
pub struct SampleSequence {
    latents: Tensor,
    noise: Vec<NoiseScale>,
    truncation: Truncation,
    offset: f64,
    duration: f64,
}

impl SampleSequence {
    /// Create a sequence from per-frame latents.
    ///
    /// `offset` and `duration` are in seconds; they drive the frame rate and the audio trim.
    pub fn new(latents: Tensor, offset: f64, duration: f64) -> RenderResult<Self> {
        let frames = latents.dims().first().copied().unwrap_or(0);
        if frames == 0 {
            return Err(RenderError::validation(
                "sample sequence must contain at least one latent",
            ));
        }
        if !duration.is_finite() || duration <= 0.0 {
            return Err(RenderError::validation(
                "sample sequence duration must be finite and > 0",
            ));
        }
        if !offset.is_finite() || offset < 0.0 {
            return Err(RenderError::validation(
                "sample sequence offset must be finite and >= 0",
            ));
        }
        Ok(Self {
            latents,
            noise: Vec::new(),
            truncation: Truncation::default(),
            offset,
            duration,
        })
    }

    /// Attach the noise scales, in generator scale order.
    pub fn with_noise(mut self, noise: Vec<NoiseScale>) -> RenderResult<Self> {
        for (i, scale) in noise.iter().enumerate() {
            if let NoiseScale::PerFrame(t) = scale {
                self.check_per_frame(t, &format!("noise scale {i}"))?;
            }
        }
        self.noise = noise;
        Ok(self)
    }

    /// Attach the truncation control.
    pub fn with_truncation(mut self, truncation: Truncation) -> RenderResult<Self> {
        match &truncation {
            Truncation::Scalar(v) if !v.is_finite() => {
                return Err(RenderError::validation("truncation must be finite"));
            }
            Truncation::PerFrame(t) => self.check_per_frame(t, "truncation")?,
            Truncation::Scalar(_) => {}
        }
        self.truncation = truncation;
        Ok(self)
    }

    /// Number of frames to render.
    pub fn len(&self) -> usize {
        self.latents.dims()[0]
    }

    /// Always `false`; construction rejects empty sequences.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Per-frame latents.
    pub fn latents(&self) -> &Tensor {
        &self.latents
    }

    /// Noise scales in generator order.
    pub fn noise(&self) -> &[NoiseScale] {
        &self.noise
    }

    /// Truncation control.
    pub fn truncation(&self) -> &Truncation {
        &self.truncation
    }

    /// Start of the rendered window in seconds (audio trim start).
    pub fn offset(&self) -> f64 {
        self.offset
    }

    /// Length of the rendered window in seconds.
    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Output frame rate: frame count divided by duration.
    pub fn fps(&self) -> f64 {
        self.len() as f64 / self.duration
    }

    /// Validate that `t` has one entry per frame.
    pub(crate) fn check_per_frame(&self, t: &Tensor, what: &str) -> RenderResult<()> {
        let got = t.dims().first().copied().unwrap_or(0);
        if got != self.len() {
            return Err(RenderError::validation(format!(
                "{what} has {got} entries, expected one per frame ({})",
                self.len()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/samples/sequence.rs"]
mod tests;
