use super::{float_input, Function};
use crate::tensor::*;

/// Takes the `index`-th of `parts` equal slices of the last axis of a
/// `[B, T, parts * C]` tensor and lays it out per head as `[B, H, T, C / H]`.
#[derive(Debug, Clone)]
pub struct SplitHeads {
    num_heads: usize,
    index: usize,
    parts: usize,
}
impl SplitHeads {
    pub fn new(num_heads: usize, index: usize, parts: usize) -> Box<dyn Function> {
        Box::new(Self {
            num_heads,
            index,
            parts,
        })
    }

    fn dims(&self, shape: &[usize]) -> Result<(usize, usize, usize, usize), TensorError> {
        if shape.len() != 3
            || self.index >= self.parts
            || shape[2] % (self.parts * self.num_heads) != 0
        {
            return Err(TensorError::UnexpectedShape(shape.to_vec()));
        }
        let c = shape[2] / self.parts;
        Ok((shape[0], shape[1], c, c / self.num_heads))
    }
}

impl Function for SplitHeads {
    fn run(&mut self, inps: &[&GeneralTensor]) -> Result<Tensor<f32>, TensorError> {
        let inp = float_input(inps, 0)?;
        let (b, t, c, d) = self.dims(inp.shape())?;
        let h = self.num_heads;
        let src = inp.blob();
        let mut data = Vec::with_capacity(b * t * c);
        for bi in 0..b {
            for hi in 0..h {
                for ti in 0..t {
                    let start = (bi * t + ti) * self.parts * c + self.index * c + hi * d;
                    data.extend_from_slice(&src[start..start + d]);
                }
            }
        }
        Tensor::raw(&[b, h, t, d], data)
    }
    fn grad(
        &self,
        inps: &[&GeneralTensor],
        out_grad: &Tensor<f32>,
    ) -> Result<Vec<Tensor<f32>>, TensorError> {
        let inp = float_input(inps, 0)?;
        let (b, t, c, d) = self.dims(inp.shape())?;
        let h = self.num_heads;
        if out_grad.shape() != [b, h, t, d] {
            return Err(TensorError::UnexpectedShape(out_grad.shape().to_vec()));
        }
        let mut grad = Tensor::<f32>::zeros(inp.shape());
        let dst = grad.blob_mut();
        let src = out_grad.blob();
        for bi in 0..b {
            for hi in 0..h {
                for ti in 0..t {
                    let from = ((bi * h + hi) * t + ti) * d;
                    let to = (bi * t + ti) * self.parts * c + self.index * c + hi * d;
                    dst[to..to + d].copy_from_slice(&src[from..from + d]);
                }
            }
        }
        Ok(vec![grad])
    }
}

/// Inverse of [`SplitHeads`] for a single part: `[B, H, T, D]` to `[B, T, H * D]`.
#[derive(Debug, Clone)]
pub struct MergeHeads;
impl MergeHeads {
    pub fn new() -> Box<dyn Function> {
        Box::new(Self {})
    }
}

fn permute_middle(inp: &Tensor<f32>) -> Result<Tensor<f32>, TensorError> {
    if inp.dim() != 4 {
        return Err(TensorError::UnexpectedShape(inp.shape().to_vec()));
    }
    let (b, x, y, d) = (inp.shape()[0], inp.shape()[1], inp.shape()[2], inp.shape()[3]);
    let src = inp.blob();
    let mut data = Vec::with_capacity(inp.size());
    for bi in 0..b {
        for yi in 0..y {
            for xi in 0..x {
                let start = ((bi * x + xi) * y + yi) * d;
                data.extend_from_slice(&src[start..start + d]);
            }
        }
    }
    Tensor::raw(&[b, y, x, d], data)
}

impl Function for MergeHeads {
    fn run(&mut self, inps: &[&GeneralTensor]) -> Result<Tensor<f32>, TensorError> {
        let swapped = permute_middle(float_input(inps, 0)?)?;
        let s = swapped.shape().to_vec();
        Tensor::raw(&[s[0], s[1], s[2] * s[3]], swapped.into_blob())
    }
    fn grad(
        &self,
        inps: &[&GeneralTensor],
        out_grad: &Tensor<f32>,
    ) -> Result<Vec<Tensor<f32>>, TensorError> {
        let s = float_input(inps, 0)?.shape().to_vec();
        let as_bthd = Tensor::from(out_grad.reshape(&[s[0], s[2], s[1], s[3]])?);
        Ok(vec![permute_middle(&as_bthd)?])
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_utils::*;
    use super::*;

    #[test]
    fn test_split_then_merge_is_identity() {
        // B=1, T=2, three parts of C=4, two heads of size 2.
        let qkv = GeneralTensor::Float(
            Tensor::raw(&[1, 2, 12], (0..24).map(|v| v as f32).collect()).unwrap(),
        );
        let mut k = SplitHeads {
            num_heads: 2,
            index: 1,
            parts: 3,
        };
        let heads = k.run(&[&qkv]).unwrap();
        assert_eq!(heads.shape(), &[1, 2, 2, 2]);
        assert_eq!(heads.blob(), &[4., 5., 16., 17., 6., 7., 18., 19.]);

        let merged = MergeHeads.run(&[&GeneralTensor::Float(heads)]).unwrap();
        assert_eq!(merged.shape(), &[1, 2, 4]);
        assert_eq!(merged.blob(), &[4., 5., 6., 7., 16., 17., 18., 19.]);
    }

    #[test]
    fn test_heads_grad() {
        let mut split = SplitHeads {
            num_heads: 2,
            index: 2,
            parts: 3,
        };
        check_grad(&mut split, &[float(&[2, 3, 12], 1)], 1e-2, 1e-2);
        check_grad(&mut MergeHeads, &[float(&[2, 2, 3, 2], 4)], 1e-2, 1e-2);
    }
}
