use super::{float_input, Function};
use crate::tensor::*;
use rayon::prelude::*;

/// Softmax over the last axis. Keeps its output around for the backward pass.
#[derive(Debug, Clone)]
pub struct Softmax {
    out: Tensor<f32>,
}
impl Softmax {
    pub fn new() -> Box<dyn Function> {
        Box::new(Self::default())
    }
}
impl Default for Softmax {
    fn default() -> Self {
        Self {
            out: Tensor::scalar(0.),
        }
    }
}

/// Numerically stable softmax of every row along the last axis.
pub fn row_softmax<T: TensorOps<f32>>(inp: &T) -> Result<Tensor<f32>, TensorError> {
    let n = match inp.shape().last() {
        Some(&n) if n > 0 => n,
        _ => return Err(TensorError::UnexpectedShape(inp.shape().to_vec())),
    };
    let mut data = vec![0.; inp.size()];
    data.par_chunks_mut(n)
        .zip(inp.blob().par_chunks(n))
        .for_each(|(out, row)| {
            let max = row.iter().fold(f32::NEG_INFINITY, |a, b| f32::max(a, *b));
            let mut sum = 0.;
            for (o, v) in out.iter_mut().zip(row.iter()) {
                *o = (v - max).exp();
                sum += *o;
            }
            for o in out.iter_mut() {
                *o /= sum;
            }
        });
    Tensor::raw(inp.shape(), data)
}

impl Function for Softmax {
    fn run(&mut self, inps: &[&GeneralTensor]) -> Result<Tensor<f32>, TensorError> {
        self.out = row_softmax(float_input(inps, 0)?)?;
        Ok(self.out.clone())
    }
    fn grad(
        &self,
        _inps: &[&GeneralTensor],
        out_grad: &Tensor<f32>,
    ) -> Result<Vec<Tensor<f32>>, TensorError> {
        if out_grad.shape() != self.out.shape() {
            return Err(TensorError::ShapeError(
                out_grad.shape().to_vec(),
                self.out.shape().to_vec(),
            ));
        }
        let n = out_grad.shape().last().copied().unwrap_or(1).max(1);
        let mut data = vec![0.; out_grad.size()];
        data.par_chunks_mut(n)
            .zip(self.out.blob().par_chunks(n))
            .zip(out_grad.blob().par_chunks(n))
            .for_each(|((d, s), g)| {
                let dot = s.iter().zip(g.iter()).map(|(s, g)| s * g).sum::<f32>();
                for ((d, s), g) in d.iter_mut().zip(s.iter()).zip(g.iter()) {
                    *d = s * (g - dot);
                }
            });
        Ok(vec![Tensor::raw(out_grad.shape(), data)?])
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_utils::*;
    use super::*;

    #[test]
    fn test_softmax_rows_sum_to_one() {
        let t = Tensor::raw(&[2, 3], vec![1., 2., 3., 1000., 1000., f32::NEG_INFINITY]).unwrap();
        let s = row_softmax(&t).unwrap();
        assert!((s.blob()[..3].iter().sum::<f32>() - 1.).abs() < 1e-6);
        assert!(s.blob()[2] > s.blob()[1] && s.blob()[1] > s.blob()[0]);
        assert_eq!(&s.blob()[3..], &[0.5, 0.5, 0.]);
    }

    #[test]
    fn test_softmax_grad() {
        let mut f = Softmax::default();
        check_grad(&mut f, &[float(&[2, 2, 5], 3)], 1e-2, 1e-2);
    }
}
