use super::Loss;
use crate::tensor::*;
use rayon::prelude::*;

/// Softmax cross-entropy of logits `[.., V]` against integer targets.
#[derive(Debug)]
pub struct CrossEntropy {
    target: Tensor<usize>,
}
impl CrossEntropy {
    pub fn new(target: Tensor<usize>) -> Box<dyn Loss> {
        Box::new(Self { target })
    }
}

impl Loss for CrossEntropy {
    fn run(&self, inp: &Tensor<f32>) -> Result<(Tensor<f32>, Tensor<f32>), TensorError> {
        let classes = match inp.shape().last() {
            Some(&c) if c > 0 => c,
            _ => return Err(TensorError::UnexpectedShape(inp.shape().to_vec())),
        };
        let loss_shape = &inp.shape()[..inp.dim() - 1];
        if loss_shape.iter().product::<usize>() != self.target.size() {
            return Err(TensorError::ShapeError(
                inp.shape().to_vec(),
                self.target.shape().to_vec(),
            ));
        }
        if let Some(&t) = self.target.blob().iter().find(|t| **t >= classes) {
            return Err(TensorError::InvalidIndex {
                index: t,
                size: classes,
            });
        }
        let mut grad = vec![0.; inp.size()];
        let loss = grad
            .par_chunks_mut(classes)
            .zip(inp.blob().par_chunks(classes))
            .zip(self.target.blob().par_iter())
            .map(|((g, o), t)| {
                let max = o.iter().fold(f32::NEG_INFINITY, |a, b| f32::max(a, *b));
                let mut sum = 0.;
                for (g, v) in g.iter_mut().zip(o.iter()) {
                    *g = (v - max).exp();
                    sum += *g;
                }
                for g in g.iter_mut() {
                    *g /= sum;
                }
                g[*t] -= 1.;
                (max - o[*t]) + sum.ln()
            })
            .collect::<Vec<_>>();
        Ok((Tensor::raw(loss_shape, loss)?, Tensor::raw(inp.shape(), grad)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_logits() {
        let ce = CrossEntropy::new(Tensor::raw(&[1, 2], vec![0, 3]).unwrap());
        let (loss, grad) = ce.run(&Tensor::zeros(&[1, 2, 4])).unwrap();
        assert_eq!(loss.shape(), &[1, 2]);
        for l in loss.blob() {
            assert!((l - 4f32.ln()).abs() < 1e-6);
        }
        assert_eq!(&grad.blob()[..4], &[-0.75, 0.25, 0.25, 0.25]);
        assert_eq!(&grad.blob()[4..], &[0.25, 0.25, 0.25, -0.75]);
    }

    #[test]
    fn test_large_logits_are_stable() {
        let ce = CrossEntropy::new(Tensor::vector(&[1]));
        let (loss, _) = ce
            .run(&Tensor::raw(&[1, 2], vec![1000., 1000.]).unwrap())
            .unwrap();
        assert!((loss.blob()[0] - 2f32.ln()).abs() < 1e-5);
    }

    #[test]
    fn test_large_logits_keep_precision() {
        let ce = CrossEntropy::new(Tensor::vector(&[0, 2]));
        let (loss, _) = ce
            .run(&Tensor::raw(&[2, 3], vec![5000., 5000., 5000., 3000., 3000., 3001.]).unwrap())
            .unwrap();
        assert!((loss.blob()[0] - 3f32.ln()).abs() < 1e-5);
        let expected = (2. * (-1f32).exp() + 1.).ln();
        assert!((loss.blob()[1] - expected).abs() < 1e-5);
    }

    #[test]
    fn test_target_out_of_range() {
        let ce = CrossEntropy::new(Tensor::vector(&[4]));
        assert!(ce.run(&Tensor::zeros(&[1, 4])).is_err());
    }
}
