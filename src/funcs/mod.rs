mod add;
mod causal_mask;
mod coeff;
mod crossentropy;
mod embedding;
mod gelu;
mod heads;
mod layer_norm;
mod matmul;
mod softmax;
mod transpose;

pub use add::*;
pub use causal_mask::*;
pub use coeff::*;
pub use crossentropy::*;
pub use embedding::*;
pub use gelu::*;
pub use heads::*;
pub use layer_norm::*;
pub use matmul::*;
pub use softmax::*;
pub use transpose::*;

use crate::tensor::*;

/// A differentiable node of the computation graph.
///
/// `run` may cache whatever it needs for the backward pass; `grad` receives
/// the same inputs and returns one gradient per input (index inputs get a
/// placeholder which the graph ignores).
pub trait Function: std::fmt::Debug + Send + Sync {
    fn run(&mut self, inps: &[&GeneralTensor]) -> Result<Tensor<f32>, TensorError>;
    fn grad(
        &self,
        inps: &[&GeneralTensor],
        out_grad: &Tensor<f32>,
    ) -> Result<Vec<Tensor<f32>>, TensorError>;
}

/// Terminal node of a backward pass. Returns the per-position losses and the
/// gradient of their sum with respect to the input.
pub trait Loss: std::fmt::Debug {
    fn run(&self, inp: &Tensor<f32>) -> Result<(Tensor<f32>, Tensor<f32>), TensorError>;
}

fn float_input<'a>(inps: &[&'a GeneralTensor], i: usize) -> Result<&'a Tensor<f32>, TensorError> {
    inps.get(i).copied().ok_or(TensorError::MissingInput(i))?.as_float()
}

fn usize_input<'a>(
    inps: &[&'a GeneralTensor],
    i: usize,
) -> Result<&'a Tensor<usize>, TensorError> {
    inps.get(i).copied().ok_or(TensorError::MissingInput(i))?.as_usize()
}
