use super::attention::CausalSelfAttention;
use super::linear::Norm;
use super::mlp::Mlp;
use crate::config::GptConfig;
use crate::funcs::Add;
use crate::graph::{Graph, GraphError, TensorId};
use crate::tensor::Tensor;
use rand::Rng;
use std::sync::Arc;

/// Pre-norm transformer block:
/// `x = x + attn(ln_1(x)); x = x + mlp(ln_2(x))`.
#[derive(Debug, Clone)]
pub struct Block {
    pub ln_1: Norm,
    pub attn: CausalSelfAttention,
    pub ln_2: Norm,
    pub mlp: Mlp,
    normalized_input: Option<TensorId>,
}

impl Block {
    pub fn new<R: Rng>(
        g: &mut Graph,
        rng: &mut R,
        name: &str,
        config: &GptConfig,
        std: f32,
    ) -> Result<Self, GraphError> {
        let c = config.embedding_degree();
        let ln_1 = Norm::new(g, &format!("{}.ln_1", name), c);
        let attn = CausalSelfAttention::new(g, rng, &format!("{}.attn", name), config, std)?;
        let ln_2 = Norm::new(g, &format!("{}.ln_2", name), c);
        let mlp = Mlp::new(g, rng, &format!("{}.mlp", name), config, std)?;
        Ok(Self {
            ln_1,
            attn,
            ln_2,
            mlp,
            normalized_input: None,
        })
    }

    pub fn forward(
        &mut self,
        g: &mut Graph,
        inp: TensorId,
        mask: &Arc<Tensor<bool>>,
    ) -> Result<TensorId, GraphError> {
        let norm_1 = self.ln_1.forward(g, inp)?;
        self.normalized_input = Some(norm_1);
        let atten = self.attn.forward(g, norm_1, mask)?;
        let x = g.call(Add::new(), &[inp, atten])?;

        let norm_2 = self.ln_2.forward(g, x)?;
        let ff = self.mlp.forward(g, norm_2)?;
        g.call(Add::new(), &[x, ff])
    }

    /// Output of `ln_1`, once the block has been wired.
    pub fn normalized_input(&self) -> Option<TensorId> {
        self.normalized_input
    }

    pub fn params(&self) -> Vec<TensorId> {
        let mut params = self.ln_1.params().to_vec();
        params.extend(self.attn.params());
        params.extend(self.ln_2.params());
        params.extend(self.mlp.params());
        params
    }
}
