//! Recording generator shared by unit tests.

use std::collections::BTreeMap;

use candle_core::{DType, Device, Tensor, Var};

use crate::foundation::error::{RenderError, RenderResult};
use crate::model::generator::{Generator, GeneratorInputs, GeneratorOutput, TruncationBatch};

#[derive(Clone, Debug)]
pub(crate) struct Call {
    pub(crate) batch_len: usize,
    pub(crate) latents: Vec<f32>,
    pub(crate) noise: Vec<Option<Vec<usize>>>,
    pub(crate) truncation: Result<f64, Vec<f32>>,
    pub(crate) bend_layers: Vec<String>,
    pub(crate) randomize_noise: bool,
    pub(crate) input_is_latent: bool,
    pub(crate) params: BTreeMap<String, Vec<f32>>,
}

/// Emits `[B, 3, size, size]` images whose every pixel is the first latent component.
pub(crate) struct RecordingGenerator {
    pub(crate) device: Device,
    pub(crate) size: usize,
    pub(crate) params: BTreeMap<String, Tensor>,
    pub(crate) calls: Vec<Call>,
    pub(crate) fail_on_call: Option<usize>,
}

impl RecordingGenerator {
    pub(crate) fn new(size: usize) -> Self {
        Self {
            device: Device::Cpu,
            size,
            params: BTreeMap::new(),
            calls: Vec::new(),
            fail_on_call: None,
        }
    }

    pub(crate) fn with_param(mut self, name: &str, values: &[f32]) -> Self {
        let t = Tensor::new(values, &Device::Cpu).unwrap();
        self.params.insert(name.to_string(), t);
        self
    }

    pub(crate) fn param_values(&self, name: &str) -> Vec<f32> {
        self.params[name].to_vec1::<f32>().unwrap()
    }
}

impl Generator for RecordingGenerator {
    fn device(&self) -> &Device {
        &self.device
    }

    fn parameter(&self, name: &str) -> RenderResult<Tensor> {
        self.params
            .get(name)
            .cloned()
            .ok_or_else(|| RenderError::validation(format!("unknown parameter '{name}'")))
    }

    fn replace_parameter(&mut self, name: &str, value: Tensor) -> RenderResult<Tensor> {
        self.params
            .insert(name.to_string(), value)
            .ok_or_else(|| RenderError::validation(format!("unknown parameter '{name}'")))
    }

    fn forward(&mut self, inputs: GeneratorInputs<'_>) -> RenderResult<GeneratorOutput> {
        if self.fail_on_call == Some(self.calls.len()) {
            return Err(candle_core::Error::Msg("simulated device fault".to_string()).into());
        }

        let batch_len = inputs.latents.dims()[0];
        let first = inputs.latents.narrow(1, 0, 1)?;
        self.calls.push(Call {
            batch_len,
            latents: first.flatten_all()?.to_vec1::<f32>()?,
            noise: inputs
                .noise
                .iter()
                .map(|n| n.as_ref().map(|t| t.dims().to_vec()))
                .collect(),
            truncation: match inputs.truncation {
                TruncationBatch::Scalar(v) => Ok(*v),
                TruncationBatch::PerFrame(t) => Err(t.flatten_all()?.to_vec1::<f32>()?),
            },
            bend_layers: inputs.bends.iter().map(|b| b.layer.clone()).collect(),
            randomize_noise: inputs.randomize_noise,
            input_is_latent: inputs.input_is_latent,
            params: self
                .params
                .iter()
                .map(|(k, v)| -> RenderResult<(String, Vec<f32>)> {
                    Ok((k.clone(), v.flatten_all()?.to_vec1::<f32>()?))
                })
                .collect::<RenderResult<_>>()?,
        });

        let images = first
            .reshape((batch_len, 1, 1, 1))?
            .broadcast_as((batch_len, 3, self.size, self.size))?
            .contiguous()?;
        Ok(GeneratorOutput { images, aux: None })
    }
}

/// Keeps weights in `Var`s and updates them in place, the way a trainable model does.
///
/// `parameter` hands out a tensor sharing the live storage.
pub(crate) struct InPlaceGenerator {
    pub(crate) device: Device,
    pub(crate) params: BTreeMap<String, Var>,
    pub(crate) seen: Vec<BTreeMap<String, Vec<f32>>>,
}

impl InPlaceGenerator {
    pub(crate) fn new() -> Self {
        Self {
            device: Device::Cpu,
            params: BTreeMap::new(),
            seen: Vec::new(),
        }
    }

    pub(crate) fn with_param(mut self, name: &str, values: &[f32]) -> Self {
        let var = Var::new(values, &Device::Cpu).unwrap();
        self.params.insert(name.to_string(), var);
        self
    }

    pub(crate) fn param_values(&self, name: &str) -> Vec<f32> {
        self.params[name].as_tensor().to_vec1::<f32>().unwrap()
    }

    fn var(&self, name: &str) -> RenderResult<&Var> {
        self.params
            .get(name)
            .ok_or_else(|| RenderError::validation(format!("unknown parameter '{name}'")))
    }
}

impl Generator for InPlaceGenerator {
    fn device(&self) -> &Device {
        &self.device
    }

    fn parameter(&self, name: &str) -> RenderResult<Tensor> {
        Ok(self.var(name)?.as_tensor().clone())
    }

    fn replace_parameter(&mut self, name: &str, value: Tensor) -> RenderResult<Tensor> {
        let var = self.var(name)?;
        let previous = var.as_tensor().copy()?;
        var.set(&value)?;
        Ok(previous)
    }

    fn forward(&mut self, inputs: GeneratorInputs<'_>) -> RenderResult<GeneratorOutput> {
        let batch_len = inputs.latents.dims()[0];
        let params = self
            .params
            .iter()
            .map(|(k, v)| -> RenderResult<(String, Vec<f32>)> {
                Ok((k.clone(), v.as_tensor().to_vec1::<f32>()?))
            })
            .collect::<RenderResult<_>>()?;
        self.seen.push(params);
        let images = Tensor::zeros((batch_len, 3, 1, 1), DType::F32, &self.device)?;
        Ok(GeneratorOutput { images, aux: None })
    }
}
