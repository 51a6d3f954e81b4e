use super::{float_input, Function};
use crate::tensor::*;
use std::sync::Arc;

/// Replaces every score `(i, j)` with `j > i` by `value`.
///
/// The lower-triangular mask is built once for the longest supported sequence
/// and shared between all attention layers; each call reads its top-left
/// `T x T` corner.
#[derive(Debug, Clone)]
pub struct CausalMask {
    mask: Arc<Tensor<bool>>,
    value: f32,
}
impl CausalMask {
    pub fn new(mask: Arc<Tensor<bool>>, value: f32) -> Box<dyn Function> {
        Box::new(Self { mask, value })
    }

    fn apply(&self, inp: &Tensor<f32>, masked: f32) -> Result<Tensor<f32>, TensorError> {
        let max_n = self.mask.shape()[0];
        let dim = inp.dim();
        if dim < 2 || inp.shape()[dim - 1] != inp.shape()[dim - 2] || inp.shape()[dim - 1] > max_n {
            return Err(TensorError::UnexpectedShape(inp.shape().to_vec()));
        }
        let n = inp.shape()[dim - 1];
        let mask = self.mask.blob();
        let data = inp
            .blob()
            .iter()
            .enumerate()
            .map(|(k, v)| {
                let (i, j) = ((k / n) % n, k % n);
                if mask[i * max_n + j] {
                    *v
                } else {
                    masked
                }
            })
            .collect();
        Tensor::raw(inp.shape(), data)
    }
}

impl Function for CausalMask {
    fn run(&mut self, inps: &[&GeneralTensor]) -> Result<Tensor<f32>, TensorError> {
        self.apply(float_input(inps, 0)?, self.value)
    }
    fn grad(
        &self,
        _inps: &[&GeneralTensor],
        out_grad: &Tensor<f32>,
    ) -> Result<Vec<Tensor<f32>>, TensorError> {
        Ok(vec![self.apply(out_grad, 0.)?])
    }
}
