use super::{float_input, usize_input, Function};
use crate::tensor::*;

/// Row lookup. Inputs: `[indices, table]`, the table being `[rows, width]`;
/// the output has shape `indices.shape() ++ [width]`.
#[derive(Debug, Clone)]
pub struct Embedding;
impl Embedding {
    pub fn new() -> Box<dyn Function> {
        Box::new(Self {})
    }
}
impl Function for Embedding {
    fn run(&mut self, inps: &[&GeneralTensor]) -> Result<Tensor<f32>, TensorError> {
        let inp = usize_input(inps, 0)?;
        let emb = float_input(inps, 1)?;
        if emb.dim() != 2 {
            return Err(TensorError::UnexpectedShape(emb.shape().to_vec()));
        }
        let width = emb.shape()[1];
        let mut data = Vec::with_capacity(inp.size() * width);
        for &ind in inp.blob() {
            data.extend_from_slice(emb.get(ind)?.blob());
        }
        let mut shape = inp.shape().to_vec();
        shape.push(width);
        Tensor::raw(&shape, data)
    }
    fn grad(
        &self,
        inps: &[&GeneralTensor],
        out_grad: &Tensor<f32>,
    ) -> Result<Vec<Tensor<f32>>, TensorError> {
        let inp = usize_input(inps, 0)?;
        let emb = float_input(inps, 1)?;
        let width = emb.shape()[1];
        if out_grad.size() != inp.size() * width {
            return Err(TensorError::ShapeError(
                out_grad.shape().to_vec(),
                emb.shape().to_vec(),
            ));
        }
        let mut grad = Tensor::<f32>::zeros(emb.shape());
        let rows = emb.shape()[0];
        let blob = grad.blob_mut();
        for (i, &ind) in inp.blob().iter().enumerate() {
            if ind >= rows {
                return Err(TensorError::InvalidIndex {
                    index: ind,
                    size: rows,
                });
            }
            let src = &out_grad.blob()[i * width..(i + 1) * width];
            for (d, s) in blob[ind * width..(ind + 1) * width].iter_mut().zip(src) {
                *d += s;
            }
        }
        Ok(vec![Tensor::scalar(0.), grad])
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_utils::*;
    use super::*;

    #[test]
    fn test_embedding_lookup() {
        let mut f = Embedding;
        let ids = GeneralTensor::Usize(Tensor::raw(&[1, 3], vec![2, 0, 2]).unwrap());
        let table = GeneralTensor::Float(Tensor::raw(&[3, 2], vec![0., 1., 10., 11., 20., 21.]).unwrap());
        let out = f.run(&[&ids, &table]).unwrap();
        assert_eq!(out.shape(), &[1, 3, 2]);
        assert_eq!(out.blob(), &[20., 21., 0., 1., 20., 21.]);

        let bad = GeneralTensor::Usize(Tensor::vector(&[3]));
        assert_eq!(
            f.run(&[&bad, &table]),
            Err(TensorError::InvalidIndex { index: 3, size: 3 })
        );
    }

    #[test]
    fn test_embedding_grad_accumulates_repeats() {
        let mut f = Embedding;
        let ids = GeneralTensor::Usize(Tensor::raw(&[2, 2], vec![1, 1, 0, 3]).unwrap());
        check_grad(&mut f, &[ids, float(&[4, 3], 2)], 1e-2, 1e-2);
    }
}
