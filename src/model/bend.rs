use std::fmt;
use std::sync::Arc;

use candle_core::Tensor;

use crate::foundation::error::{RenderError, RenderResult};

/// Function applied by the generator to a layer's activations.
pub type LayerTransform = Arc<dyn Fn(&Tensor) -> candle_core::Result<Tensor> + Send + Sync>;

/// Builds a [`LayerTransform`] from one batch's modulation slice.
pub type TransformBuilder = Arc<dyn Fn(&Tensor) -> RenderResult<LayerTransform> + Send + Sync>;

/// How a bend obtains its transform for a batch.
#[derive(Clone)]
pub enum BendTransform {
    /// Same transform for every batch.
    Static(LayerTransform),
    /// Transform rebuilt every batch from the batch's slice of `modulation`.
    Modulated {
        /// One entry per frame.
        modulation: Tensor,
        /// Called with the device-resident modulation slice.
        build: TransformBuilder,
    },
}

/// A structural edit to one generator layer.
#[derive(Clone)]
pub struct Bend {
    /// Name of the layer the generator applies the transform to.
    pub layer: String,
    /// Transform source.
    pub transform: BendTransform,
}

impl Bend {
    /// A bend whose transform does not vary over time.
    pub fn fixed<F>(layer: impl Into<String>, transform: F) -> Self
    where
        F: Fn(&Tensor) -> candle_core::Result<Tensor> + Send + Sync + 'static,
    {
        Self {
            layer: layer.into(),
            transform: BendTransform::Static(Arc::new(transform)),
        }
    }

    /// A bend driven by a per-frame modulation sequence.
    pub fn modulated<F>(layer: impl Into<String>, modulation: Tensor, build: F) -> Self
    where
        F: Fn(&Tensor) -> RenderResult<LayerTransform> + Send + Sync + 'static,
    {
        Self {
            layer: layer.into(),
            transform: BendTransform::Modulated {
                modulation,
                build: Arc::new(build),
            },
        }
    }

    /// Per-frame modulation, if any.
    pub fn modulation(&self) -> Option<&Tensor> {
        match &self.transform {
            BendTransform::Static(_) => None,
            BendTransform::Modulated { modulation, .. } => Some(modulation),
        }
    }
}

impl fmt::Debug for Bend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bend")
            .field("layer", &self.layer)
            .field("modulation", &self.modulation().map(|m| m.dims().to_vec()))
            .finish()
    }
}

/// A bend resolved for one batch: target layer plus concrete transform.
#[derive(Clone)]
pub struct PreparedBend {
    /// Target layer name.
    pub layer: String,
    /// Transform for this batch.
    pub transform: LayerTransform,
}

impl PreparedBend {
    /// Apply the transform to `x`.
    pub fn apply(&self, x: &Tensor) -> candle_core::Result<Tensor> {
        (self.transform)(x)
    }
}

impl fmt::Debug for PreparedBend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreparedBend")
            .field("layer", &self.layer)
            .finish_non_exhaustive()
    }
}

/// Resolve every bend for one batch, preserving list order.
///
/// `modulation_slices` holds the device-resident batch slice for each modulated bend, aligned
/// with `bends`.
pub(crate) fn prepare_bends(
    bends: &[Bend],
    modulation_slices: &[Option<Tensor>],
) -> RenderResult<Vec<PreparedBend>> {
    if bends.len() != modulation_slices.len() {
        return Err(RenderError::validation(format!(
            "got {} modulation slices for {} bends",
            modulation_slices.len(),
            bends.len()
        )));
    }
    bends
        .iter()
        .zip(modulation_slices)
        .map(|(bend, slice)| {
            let transform = match (&bend.transform, slice) {
                (BendTransform::Static(t), _) => t.clone(),
                (BendTransform::Modulated { build, .. }, Some(slice)) => build(slice)?,
                (BendTransform::Modulated { .. }, None) => {
                    return Err(RenderError::validation(format!(
                        "bend on layer '{}' is modulated but has no staged modulation",
                        bend.layer
                    )));
                }
            };
            Ok(PreparedBend {
                layer: bend.layer.clone(),
                transform,
            })
        })
        .collect()
}

#[cfg(test)]
#[path = "../../tests/unit/model/bend.rs"]
mod tests;
