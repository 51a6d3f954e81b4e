use super::{float_input, Function};
use crate::tensor::*;

/// Elementwise sum with broadcasting (residual connections, biases, position embeddings).
#[derive(Debug, Clone)]
pub struct Add;
impl Add {
    pub fn new() -> Box<dyn Function> {
        Box::new(Self {})
    }
}
impl Function for Add {
    fn run(&mut self, inps: &[&GeneralTensor]) -> Result<Tensor<f32>, TensorError> {
        float_input(inps, 0)? + float_input(inps, 1)?
    }
    fn grad(
        &self,
        inps: &[&GeneralTensor],
        out_grad: &Tensor<f32>,
    ) -> Result<Vec<Tensor<f32>>, TensorError> {
        Ok(vec![
            reduce_to_shape(out_grad, float_input(inps, 0)?.shape())?,
            reduce_to_shape(out_grad, float_input(inps, 1)?.shape())?,
        ])
    }
}
