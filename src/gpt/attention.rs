use super::linear::Linear;
use crate::config::GptConfig;
use crate::funcs::{CausalMask, Coeff, MatMul, MergeHeads, Softmax, SplitHeads, Transpose};
use crate::graph::{Graph, GraphError, TensorId};
use crate::tensor::Tensor;
use rand::Rng;
use std::sync::Arc;

/// Multi-head causal self-attention.
///
/// `c_attn` projects `[B, T, C]` to the concatenated queries, keys and values
/// `[B, T, 3C]`, which are split into `[B, H, T, D]` per head. Scores
/// `q · kᵀ / √D` are masked so that position `i` only attends to `j <= i`.
#[derive(Debug, Clone)]
pub struct CausalSelfAttention {
    pub c_attn: Linear,
    pub c_proj: Linear,
    num_heads: usize,
    head_size: usize,
}

impl CausalSelfAttention {
    pub fn new<R: Rng>(
        g: &mut Graph,
        rng: &mut R,
        name: &str,
        config: &GptConfig,
        std: f32,
    ) -> Result<Self, GraphError> {
        let c = config.embedding_degree();
        Ok(Self {
            c_attn: Linear::new(g, rng, &format!("{}.c_attn", name), c, 3 * c, std)?,
            c_proj: Linear::new(
                g,
                rng,
                &format!("{}.c_proj", name),
                c,
                c,
                std * config.residual_scale(),
            )?,
            num_heads: config.num_heads(),
            head_size: config.head_size(),
        })
    }

    pub fn forward(
        &self,
        g: &mut Graph,
        inp: TensorId,
        mask: &Arc<Tensor<bool>>,
    ) -> Result<TensorId, GraphError> {
        let qkv = self.c_attn.forward(g, inp)?;
        let q = g.call(SplitHeads::new(self.num_heads, 0, 3), &[qkv])?;
        let k = g.call(SplitHeads::new(self.num_heads, 1, 3), &[qkv])?;
        let v = g.call(SplitHeads::new(self.num_heads, 2, 3), &[qkv])?;

        let k_t = g.call(Transpose::new(), &[k])?;
        let scores = g.call(MatMul::new(), &[q, k_t])?;
        let scaled = g.call(Coeff::new((self.head_size as f32).powf(-0.5)), &[scores])?;
        let masked = g.call(CausalMask::new(mask.clone(), f32::NEG_INFINITY), &[scaled])?;
        let probs = g.call(Softmax::new(), &[masked])?;
        let atten = g.call(MatMul::new(), &[probs, v])?;

        let merged = g.call(MergeHeads::new(), &[atten])?;
        self.c_proj.forward(g, merged)
    }

    pub fn params(&self) -> Vec<TensorId> {
        [self.c_attn.params(), self.c_proj.params()].concat()
    }
}
