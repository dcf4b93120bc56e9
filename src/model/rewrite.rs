use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use candle_core::{DType, Device, Tensor};

use crate::foundation::core::BatchRange;
use crate::foundation::error::{RenderError, RenderResult};
use crate::model::generator::Generator;

/// Per-batch context handed to a rewrite transform.
#[derive(Clone, Copy, Debug)]
pub struct RewriteStep<'a> {
    /// Batch being rendered.
    pub batch: BatchRange,
    /// Host-resident slice of the rewrite's modulation for `batch`.
    pub modulation: &'a Tensor,
}

/// Computes a replacement weight from the original snapshot.
pub type RewriteFn =
    Arc<dyn Fn(&Tensor, &RewriteStep<'_>) -> RenderResult<Tensor> + Send + Sync>;

/// A temporary, per-batch replacement of one named generator weight.
#[derive(Clone)]
pub struct Rewrite {
    /// Transform of `(original_snapshot, step)`.
    pub transform: RewriteFn,
    /// One entry per frame.
    pub modulation: Tensor,
}

impl Rewrite {
    /// Create a rewrite driven by `modulation`.
    pub fn new<F>(modulation: Tensor, transform: F) -> Self
    where
        F: Fn(&Tensor, &RewriteStep<'_>) -> RenderResult<Tensor> + Send + Sync + 'static,
    {
        Self {
            transform: Arc::new(transform),
            modulation,
        }
    }
}

impl fmt::Debug for Rewrite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rewrite")
            .field("modulation", &self.modulation.dims())
            .finish_non_exhaustive()
    }
}

struct Snapshot {
    // Exactly what the generator held before the run; reinstalled on restore.
    original: Tensor,
    // Contiguous f32 host copy fed to every transform.
    staged: Tensor,
}

/// Immutable snapshot of every rewritten parameter, taken once before the first batch.
///
/// Rewrites are computed from these snapshots only, never from a value a previous batch
/// installed. [`StateOverlay::install`] and [`StateOverlay::restore`] are the only operations
/// that mutate generator state.
pub struct StateOverlay {
    snapshots: BTreeMap<String, Snapshot>,
}

impl StateOverlay {
    /// Snapshot `names` from the generator.
    pub fn capture<'a>(
        generator: &dyn Generator,
        names: impl IntoIterator<Item = &'a str>,
    ) -> RenderResult<Self> {
        let mut snapshots = BTreeMap::new();
        for name in names {
            // Deep copies: a generator may update the live parameter's storage in place.
            let original = generator.parameter(name)?.copy()?;
            let staged = original
                .to_device(&Device::Cpu)?
                .to_dtype(DType::F32)?
                .copy()?;
            snapshots.insert(name.to_string(), Snapshot { original, staged });
        }
        Ok(Self { snapshots })
    }

    /// Number of captured parameters.
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Return `true` when nothing was captured.
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Host `f32` snapshot of `name`.
    pub fn snapshot(&self, name: &str) -> Option<&Tensor> {
        self.snapshots.get(name).map(|s| &s.staged)
    }

    /// Compute the value to install for `name` in this step.
    pub fn overlay(
        &self,
        name: &str,
        rewrite: &Rewrite,
        step: &RewriteStep<'_>,
    ) -> RenderResult<Tensor> {
        let snap = self.get(name)?;
        (rewrite.transform)(&snap.staged, step)
    }

    /// Install `value` as `name` on the generator, matching the original dtype and the
    /// generator's device.
    pub(crate) fn install(
        &self,
        generator: &mut dyn Generator,
        name: &str,
        value: Tensor,
    ) -> RenderResult<()> {
        let snap = self.get(name)?;
        if value.dims() != snap.original.dims() {
            return Err(RenderError::validation(format!(
                "rewrite of '{name}' produced shape {:?}, expected {:?}",
                value.dims(),
                snap.original.dims()
            )));
        }
        // An identity transform returns the snapshot itself; never hand its storage over.
        let value = value
            .to_dtype(snap.original.dtype())?
            .to_device(generator.device())?
            .copy()?;
        generator.replace_parameter(name, value)?;
        Ok(())
    }

    /// Put every original value back.
    ///
    /// All parameters are attempted; the first failure is returned.
    pub(crate) fn restore(&self, generator: &mut dyn Generator) -> RenderResult<()> {
        let mut first_err = None;
        for (name, snap) in &self.snapshots {
            let restored = snap
                .original
                .copy()
                .map_err(RenderError::from)
                .and_then(|value| generator.replace_parameter(name, value));
            if let Err(e) = restored {
                tracing::warn!(parameter = %name, error = %e, "failed to restore parameter");
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn get(&self, name: &str) -> RenderResult<&Snapshot> {
        self.snapshots.get(name).ok_or_else(|| {
            RenderError::validation(format!("parameter '{name}' was not snapshotted"))
        })
    }
}

#[cfg(test)]
#[path = "../../tests/unit/model/rewrite.rs"]
mod tests;
