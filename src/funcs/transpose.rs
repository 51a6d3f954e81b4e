use super::{float_input, Function};
use crate::tensor::*;

/// Swaps the last two axes.
#[derive(Debug, Clone)]
pub struct Transpose;
impl Transpose {
    pub fn new() -> Box<dyn Function> {
        Box::new(Self {})
    }
}

impl Function for Transpose {
    fn run(&mut self, inps: &[&GeneralTensor]) -> Result<Tensor<f32>, TensorError> {
        float_input(inps, 0)?.transpose()
    }
    fn grad(
        &self,
        _inps: &[&GeneralTensor],
        out_grad: &Tensor<f32>,
    ) -> Result<Vec<Tensor<f32>>, TensorError> {
        Ok(vec![out_grad.transpose()?])
    }
}
