use crate::funcs::{Add, LayerNorm, MatMul};
use crate::graph::{Graph, GraphError, TensorId};
use crate::tensor::Tensor;
use rand::Rng;

/// Affine layer `x · weight + bias` with an input-major `[fan_in, fan_out]` weight.
#[derive(Debug, Clone, Copy)]
pub struct Linear {
    pub weight: TensorId,
    pub bias: TensorId,
}

impl Linear {
    /// Weight ~ N(0, std), bias zero.
    pub fn new<R: Rng>(
        g: &mut Graph,
        rng: &mut R,
        name: &str,
        fan_in: usize,
        fan_out: usize,
        std: f32,
    ) -> Result<Self, GraphError> {
        let weight = g.alloc_randn(rng, &[fan_in, fan_out], std, format!("{}.weight", name))?;
        let bias = g.alloc(Tensor::zeros(&[fan_out]), format!("{}.bias", name));
        Ok(Self { weight, bias })
    }

    pub fn forward(&self, g: &mut Graph, inp: TensorId) -> Result<TensorId, GraphError> {
        let product = g.call(MatMul::new(), &[inp, self.weight])?;
        g.call(Add::new(), &[product, self.bias])
    }

    pub fn params(&self) -> [TensorId; 2] {
        [self.weight, self.bias]
    }
}

/// Learned layer normalization; scale starts at one and shift at zero.
#[derive(Debug, Clone, Copy)]
pub struct Norm {
    pub weight: TensorId,
    pub bias: TensorId,
}

impl Norm {
    pub fn new(g: &mut Graph, name: &str, degree: usize) -> Self {
        let weight = g.alloc(Tensor::ones(&[degree]), format!("{}.weight", name));
        let bias = g.alloc(Tensor::zeros(&[degree]), format!("{}.bias", name));
        Self { weight, bias }
    }

    pub fn forward(&self, g: &mut Graph, inp: TensorId) -> Result<TensorId, GraphError> {
        g.call(LayerNorm::new(), &[inp, self.weight, self.bias])
    }

    pub fn params(&self) -> [TensorId; 2] {
        [self.weight, self.bias]
    }
}
