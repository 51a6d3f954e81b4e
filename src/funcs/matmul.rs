use super::{float_input, Function};
use crate::tensor::*;

/// Batched matrix product of the last two axes, `[.., n, k] x [.., k, m]`.
#[derive(Debug, Clone)]
pub struct MatMul;
impl MatMul {
    pub fn new() -> Box<dyn Function> {
        Box::new(Self {})
    }
}
impl Function for MatMul {
    fn run(&mut self, inps: &[&GeneralTensor]) -> Result<Tensor<f32>, TensorError> {
        float_input(inps, 0)? ^ float_input(inps, 1)?
    }
    fn grad(
        &self,
        inps: &[&GeneralTensor],
        out_grad: &Tensor<f32>,
    ) -> Result<Vec<Tensor<f32>>, TensorError> {
        let a = float_input(inps, 0)?;
        let b = float_input(inps, 1)?;
        let grad_a = reduce_to_shape(&(out_grad ^ &b.transpose()?)?, a.shape())?;
        let grad_b = if b.dim() == 2 && a.dim() > 2 {
            // Shared weight matrix: fold the batch axes into the row axis.
            let (k, m) = (b.shape()[0], b.shape()[1]);
            let rows = a.size() / k.max(1);
            let a_rows = a.reshape(&[rows, k])?.transpose()?;
            matmul_2d(&a_rows, &out_grad.reshape(&[rows, m])?)?
        } else {
            reduce_to_shape(&(&a.transpose()? ^ out_grad)?, b.shape())?
        };
        Ok(vec![grad_a, grad_b])
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_utils::*;
    use super::*;

    #[test]
    fn test_matmul_shared_weight_grad() {
        let mut f = MatMul;
        check_grad(&mut f, &[float(&[2, 3, 4], 1), float(&[4, 5], 2)], 1e-2, 1e-2);
    }

    #[test]
    fn test_matmul_batched_grad() {
        let mut f = MatMul;
        check_grad(
            &mut f,
            &[float(&[2, 2, 3, 4], 3), float(&[2, 2, 4, 3], 4)],
            1e-2,
            1e-2,
        );
    }
}
