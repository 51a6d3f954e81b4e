use super::{float_input, Function};
use crate::tensor::*;
use rayon::prelude::*;

pub const LAYER_NORM_EPSILON: f32 = 1e-5;

/// Normalizes the last axis to zero mean and unit (biased) variance, then
/// applies the learned scale and shift. Inputs: `[x, weight, bias]`.
#[derive(Debug, Clone)]
pub struct LayerNorm {
    norm: Tensor<f32>,
    inv_std: Vec<f32>,
}
impl LayerNorm {
    pub fn new() -> Box<dyn Function> {
        Box::new(Self::default())
    }
}
impl Default for LayerNorm {
    fn default() -> Self {
        Self {
            norm: Tensor::scalar(0.),
            inv_std: Vec::new(),
        }
    }
}

fn row_len(shape: &[usize]) -> Result<usize, TensorError> {
    match shape.last() {
        Some(&n) if n > 0 => Ok(n),
        _ => Err(TensorError::UnexpectedShape(shape.to_vec())),
    }
}

impl Function for LayerNorm {
    fn run(&mut self, inps: &[&GeneralTensor]) -> Result<Tensor<f32>, TensorError> {
        let x = float_input(inps, 0)?;
        let n = row_len(x.shape())?;
        let mut norm = vec![0.; x.size()];
        let mut inv_std = vec![0.; x.size() / n];
        norm.par_chunks_mut(n)
            .zip(inv_std.par_iter_mut())
            .zip(x.blob().par_chunks(n))
            .for_each(|((out, inv), row)| {
                let avg = row.iter().sum::<f32>() / n as f32;
                let var = row.iter().map(|f| (f - avg).powi(2)).sum::<f32>() / n as f32;
                *inv = 1. / (var + LAYER_NORM_EPSILON).sqrt();
                for (o, v) in out.iter_mut().zip(row.iter()) {
                    *o = (v - avg) * *inv;
                }
            });
        self.norm = Tensor::raw(x.shape(), norm)?;
        self.inv_std = inv_std;
        &(&self.norm * float_input(inps, 1)?)? + float_input(inps, 2)?
    }
    fn grad(
        &self,
        inps: &[&GeneralTensor],
        out_grad: &Tensor<f32>,
    ) -> Result<Vec<Tensor<f32>>, TensorError> {
        let x = float_input(inps, 0)?;
        let weight = float_input(inps, 1)?;
        let bias = float_input(inps, 2)?;
        let n = row_len(x.shape())?;
        let scaled = (out_grad * weight)?;
        let mut dx = vec![0.; x.size()];
        dx.par_chunks_mut(n)
            .zip(scaled.blob().par_chunks(n))
            .zip(self.norm.blob().par_chunks(n))
            .zip(self.inv_std.par_iter())
            .for_each(|(((d, g), xh), inv)| {
                let mean_g = g.iter().sum::<f32>() / n as f32;
                let mean_gx = g.iter().zip(xh.iter()).map(|(g, x)| g * x).sum::<f32>() / n as f32;
                for ((d, g), xh) in d.iter_mut().zip(g.iter()).zip(xh.iter()) {
                    *d = inv * (g - mean_g - xh * mean_gx);
                }
            });
        Ok(vec![
            Tensor::raw(x.shape(), dx)?,
            reduce_to_shape(&(out_grad * &self.norm)?, weight.shape())?,
            reduce_to_shape(out_grad, bias.shape())?,
        ])
    }
}
