mod elements;
mod error;
mod ops;
mod utils;
mod view;
pub use elements::*;
pub use error::*;
pub use ops::*;
pub use utils::*;
pub use view::*;

use rand::Rng;
use rand_distr::{Distribution, Normal};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Dense row-major tensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor<V: TensorElement> {
    blob: Vec<V>,
    shape: Vec<usize>,
}

/// A graph slot either holds floats (activations, parameters) or indices
/// (token ids, positions).
#[derive(Debug, Clone, PartialEq)]
pub enum GeneralTensor {
    Float(Tensor<f32>),
    Usize(Tensor<usize>),
}

impl GeneralTensor {
    pub fn as_float(&self) -> Result<&Tensor<f32>, TensorError> {
        match self {
            GeneralTensor::Float(t) => Ok(t),
            GeneralTensor::Usize(_) => Err(TensorError::UnexpectedType { expected: "float" }),
        }
    }
    pub fn as_float_mut(&mut self) -> Result<&mut Tensor<f32>, TensorError> {
        match self {
            GeneralTensor::Float(t) => Ok(t),
            GeneralTensor::Usize(_) => Err(TensorError::UnexpectedType { expected: "float" }),
        }
    }
    pub fn as_usize(&self) -> Result<&Tensor<usize>, TensorError> {
        match self {
            GeneralTensor::Usize(t) => Ok(t),
            GeneralTensor::Float(_) => Err(TensorError::UnexpectedType { expected: "usize" }),
        }
    }
    pub fn shape(&self) -> &[usize] {
        match self {
            GeneralTensor::Float(t) => t.shape(),
            GeneralTensor::Usize(t) => t.shape(),
        }
    }
    pub fn is_float(&self) -> bool {
        matches!(self, GeneralTensor::Float(_))
    }
}

pub trait TensorOps<V: TensorElement>: Sized + Send + Sync {
    fn shape(&self) -> &[usize];
    fn blob(&self) -> &[V];
    fn tensor(&self) -> &Tensor<V>;
    fn offset(&self) -> usize;

    fn dim(&self) -> usize {
        self.shape().len()
    }
    fn size(&self) -> usize {
        self.shape().iter().product()
    }
    fn len(&self) -> usize {
        self.shape().first().copied().unwrap_or(1)
    }
    fn is_empty(&self) -> bool {
        self.size() == 0
    }

    fn view(&self) -> TensorView<'_, V> {
        TensorView {
            mirror: self.tensor(),
            offset: self.offset(),
            shape: self.shape().to_vec(),
        }
    }

    fn reshape(&self, shape: &[usize]) -> Result<TensorView<'_, V>, TensorError> {
        if shape.iter().product::<usize>() != self.size() {
            return Err(TensorError::ShapeError(
                self.shape().to_vec(),
                shape.to_vec(),
            ));
        }
        Ok(TensorView {
            mirror: self.tensor(),
            offset: self.offset(),
            shape: shape.to_vec(),
        })
    }

    /// Collapses every axis except the last `dims` ones into a single leading axis.
    fn keep_right(&self, dims: usize) -> Result<TensorView<'_, V>, TensorError> {
        if dims > self.dim() {
            return Err(TensorError::UnexpectedShape(self.shape().to_vec()));
        }
        let split = self.dim() - dims;
        let mut new_shape = vec![self.shape()[..split].iter().product::<usize>()];
        new_shape.extend(&self.shape()[split..]);
        self.reshape(&new_shape)
    }

    fn get(&self, ind: usize) -> Result<TensorView<'_, V>, TensorError> {
        let mut v = self.view();
        v.zoom(ind)?;
        Ok(v)
    }

    fn inners(&self) -> Vec<TensorView<'_, V>> {
        match self.shape().first() {
            Some(&len) if len > 0 => {
                let sub_size = self.size() / len;
                (0..len)
                    .map(|i| TensorView {
                        mirror: self.tensor(),
                        offset: self.offset() + i * sub_size,
                        shape: self.shape()[1..].to_vec(),
                    })
                    .collect()
            }
            _ => Vec::new(),
        }
    }

    fn scalar(&self) -> Result<V, TensorError> {
        if self.dim() == 0 {
            Ok(self.blob()[0])
        } else {
            Err(TensorError::NotScalar)
        }
    }

    fn mean(&self) -> f32 {
        self.blob().iter().map(|v| v.as_f32()).sum::<f32>() / self.size() as f32
    }

    fn map_values<W: TensorElement, F: Fn(V) -> W + Sync + Send>(&self, f: F) -> Tensor<W> {
        Tensor {
            blob: self.blob().par_iter().map(|v| f(*v)).collect(),
            shape: self.shape().to_vec(),
        }
    }

    /// Applies `f` to every `dim`-dimensional inner tensor and stacks the results.
    fn map<W: TensorElement, F>(&self, dim: usize, f: F) -> Result<Tensor<W>, TensorError>
    where
        F: Fn(TensorView<'_, V>) -> Result<Tensor<W>, TensorError> + Sync + Send,
    {
        let outs = self
            .keep_right(dim)?
            .inners()
            .into_par_iter()
            .map(|v| f(v))
            .collect::<Result<Vec<_>, TensorError>>()?;
        let inner_shape = match outs.first() {
            Some(t) => t.shape().to_vec(),
            None => return Err(TensorError::UnexpectedShape(self.shape().to_vec())),
        };
        if outs.iter().any(|t| t.shape() != inner_shape.as_slice()) {
            return Err(TensorError::UnexpectedShape(inner_shape));
        }
        let mut out_shape = self.shape()[..self.dim() - dim].to_vec();
        out_shape.extend(&inner_shape);
        Ok(Tensor {
            blob: outs.into_iter().flat_map(|t| t.blob).collect(),
            shape: out_shape,
        })
    }

    /// Swaps the last two axes.
    fn transpose(&self) -> Result<Tensor<V>, TensorError> {
        let dim = self.dim();
        if dim < 2 {
            return Err(TensorError::UnexpectedShape(self.shape().to_vec()));
        }
        let (rows, cols) = (self.shape()[dim - 2], self.shape()[dim - 1]);
        let blob = self.blob();
        let mut data = Vec::with_capacity(blob.len());
        for m in blob.chunks(rows * cols.max(1)) {
            for j in 0..cols {
                for i in 0..rows {
                    data.push(m[i * cols + j]);
                }
            }
        }
        let mut shape = self.shape().to_vec();
        shape.swap(dim - 2, dim - 1);
        Tensor::raw(&shape, data)
    }

    fn to_tensor(&self) -> Tensor<V> {
        Tensor {
            blob: self.blob().to_vec(),
            shape: self.shape().to_vec(),
        }
    }
}

impl<V: TensorElement> TensorOps<V> for Tensor<V> {
    fn tensor(&self) -> &Tensor<V> {
        self
    }
    fn offset(&self) -> usize {
        0
    }
    fn shape(&self) -> &[usize] {
        &self.shape
    }
    fn blob(&self) -> &[V] {
        &self.blob
    }
}

impl<V: TensorElement> Tensor<V> {
    pub fn raw(shape: &[usize], blob: Vec<V>) -> Result<Self, TensorError> {
        let sz = shape.iter().product::<usize>();
        if sz != blob.len() {
            return Err(TensorError::ShapeError(shape.to_vec(), vec![blob.len()]));
        }
        Ok(Self {
            blob,
            shape: shape.to_vec(),
        })
    }
    pub fn scalar(v: V) -> Self {
        Tensor {
            blob: vec![v],
            shape: vec![],
        }
    }
    pub fn vector(v: &[V]) -> Self {
        Tensor {
            blob: v.to_vec(),
            shape: vec![v.len()],
        }
    }
    pub fn constant(shape: &[usize], value: V) -> Self {
        Tensor {
            blob: vec![value; shape.iter().product()],
            shape: shape.to_vec(),
        }
    }
    pub fn zeros(shape: &[usize]) -> Self {
        Self::constant(shape, V::zero())
    }
    pub fn ones(shape: &[usize]) -> Self {
        Self::constant(shape, V::one())
    }
    /// Lower-triangular `n x n` matrix: `one` where `col <= row`.
    pub fn tril(n: usize) -> Self {
        Tensor {
            blob: (0..n * n)
                .map(|i| if i % n <= i / n { V::one() } else { V::zero() })
                .collect(),
            shape: vec![n, n],
        }
    }
    pub fn blob_mut(&mut self) -> &mut [V] {
        &mut self.blob
    }
    pub fn fill(&mut self, v: V) {
        self.blob.fill(v);
    }
    pub fn into_blob(self) -> Vec<V> {
        self.blob
    }
}

impl Tensor<f32> {
    /// Samples every element from `Normal(0, std)`.
    pub fn randn<R: Rng>(r: &mut R, shape: &[usize], std: f32) -> Result<Tensor<f32>, TensorError> {
        if !(std.is_finite() && std >= 0.) {
            return Err(TensorError::InvalidStd(std));
        }
        let normal = Normal::new(0.0, std).map_err(|_| TensorError::InvalidStd(std))?;
        Ok(Tensor {
            blob: (0..shape.iter().product::<usize>())
                .map(|_| normal.sample(r))
                .collect(),
            shape: shape.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_tril() {
        let t = Tensor::<bool>::tril(3);
        assert_eq!(
            t.blob(),
            &[true, false, false, true, true, false, true, true, true]
        );
    }

    #[test]
    fn test_views() {
        let t = Tensor::raw(&[2, 3, 2], (0..12).collect::<Vec<usize>>()).unwrap();
        assert_eq!(t.get(1).unwrap().blob(), &[6, 7, 8, 9, 10, 11]);
        assert_eq!(t.get(1).unwrap().get(2).unwrap().blob(), &[10, 11]);
        assert_eq!(t.keep_right(1).unwrap().shape(), &[6, 2]);
        assert_eq!(t.inners().len(), 2);
        assert!(t.get(2).is_err());
        assert!(t.reshape(&[5, 2]).is_err());
    }

    #[test]
    fn test_transpose() {
        let t = Tensor::raw(&[2, 2, 3], (0..12).map(|v| v as f32).collect()).unwrap();
        let tt = t.transpose().unwrap();
        assert_eq!(tt.shape(), &[2, 3, 2]);
        assert_eq!(
            tt.blob(),
            &[0., 3., 1., 4., 2., 5., 6., 9., 7., 10., 8., 11.]
        );
    }

    #[test]
    fn test_map() {
        let t = Tensor::raw(&[2, 3], vec![1., 2., 3., 4., 5., 6.]).unwrap();
        let sums = t
            .map(1, |row| Ok(Tensor::scalar(row.blob().iter().sum::<f32>())))
            .unwrap();
        assert_eq!(sums.shape(), &[2]);
        assert_eq!(sums.blob(), &[6., 15.]);
    }

    #[test]
    fn test_randn_std() {
        let mut rng = StdRng::seed_from_u64(7);
        let t = Tensor::randn(&mut rng, &[100, 100], 0.02).unwrap();
        let mean = t.mean();
        let var = t.blob().iter().map(|v| (v - mean).powi(2)).sum::<f32>() / t.size() as f32;
        assert!(mean.abs() < 1e-3);
        assert!((var.sqrt() - 0.02).abs() < 2e-3);
        assert!(Tensor::randn(&mut rng, &[2], -1.).is_err());
    }

    #[test]
    fn test_randn_rejects_bad_std() {
        let mut rng = StdRng::seed_from_u64(8);
        for std in [-0.02, f32::NAN, f32::INFINITY] {
            assert!(matches!(
                Tensor::randn(&mut rng, &[3], std),
                Err(TensorError::InvalidStd(_))
            ));
        }
        let zero = Tensor::randn(&mut rng, &[3], 0.).unwrap();
        assert_eq!(zero.blob(), &[0., 0., 0.]);
    }
}
