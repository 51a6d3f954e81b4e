mod attention;
mod block;
mod linear;
mod mlp;

pub use attention::CausalSelfAttention;
pub use block::Block;
pub use linear::{Linear, Norm};
pub use mlp::Mlp;

use crate::config::{ConfigError, GptConfig};
use crate::funcs::{Add, CrossEntropy, Embedding, Loss, MatMul, Transpose};
use crate::graph::{Graph, GraphError, TensorId};
use crate::optimizer::{Optimizer, OptimizerState};
use crate::tensor::{Tensor, TensorError, TensorOps};
use rand::distributions::WeightedError;
use rand::Rng;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

pub const TOKEN_EMBEDDING: &str = "transformer.wte.weight";
pub const POSITION_EMBEDDING: &str = "transformer.wpe.weight";
/// Output projection. Shares storage with [`TOKEN_EMBEDDING`].
pub const LM_HEAD: &str = "lm_head.weight";

const INIT_STD: f32 = 0.02;
const POSITION_INIT_STD: f32 = 0.01;

#[derive(Error, Debug)]
pub enum GptError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("graph error: {0}")]
    Graph(#[from] GraphError),
    #[error("tensor error: {0}")]
    Tensor(#[from] TensorError),
    #[error("sequence of length {requested} exceeds the maximum of {maximum}")]
    SequenceLengthExceeded { requested: usize, maximum: usize },
    #[error("input is empty")]
    EmptyInput,
    #[error("corpus of {tokens} tokens cannot fill a batch of {required} tokens")]
    CorpusTooSmall { tokens: usize, required: usize },
    #[error("training has already stopped")]
    TrainingStopped,
    #[error("sampling error: {0}")]
    Sampling(#[from] WeightedError),
    #[error("parameter {name} expects shape {expected:?}, got {actual:?}")]
    ParameterShape {
        name: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
    #[error("no parameter named {0}")]
    MissingParameter(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// GPT-2 style language model on top of a static computation graph.
///
/// The token embedding `wte` is a single graph tensor consumed both by the
/// input `Embedding` node and, transposed, by the output projection, so its
/// gradient collects contributions from both ends.
#[derive(Debug)]
pub struct Gpt {
    config: GptConfig,
    graph: Graph,
    wte: TensorId,
    wpe: TensorId,
    token_input: TensorId,
    pos_input: TensorId,
    blocks: Vec<Block>,
    ln_f: Norm,
    output: TensorId,
    params: Vec<TensorId>,
    trace: bool,
}

impl Gpt {
    pub fn new<R: Rng>(rng: &mut R, config: GptConfig) -> Result<Self, GptError> {
        let c = config.embedding_degree();
        let mut g = Graph::new();

        let wte = g.alloc_randn(rng, &[config.vocab_size(), c], INIT_STD, TOKEN_EMBEDDING.into())?;
        let wpe = g.alloc_randn(
            rng,
            &[config.num_tokens(), c],
            POSITION_INIT_STD,
            POSITION_EMBEDDING.into(),
        )?;
        let mut params = vec![wte, wpe];

        // Placeholders, reloaded with the real batch before every forward.
        let token_input = g.alloc_usize(Tensor::zeros(&[1, 1]), "token_input".into());
        let pos_input = g.alloc_usize(Tensor::zeros(&[1]), "pos_input".into());

        let tok_emb = g.call(Embedding::new(), &[token_input, wte])?;
        let pos_emb = g.call(Embedding::new(), &[pos_input, wpe])?;
        let mut x = g.call(Add::new(), &[tok_emb, pos_emb])?;

        let mask = Arc::new(Tensor::<bool>::tril(config.num_tokens()));
        let mut blocks = Vec::with_capacity(config.num_layers());
        for i in 0..config.num_layers() {
            let mut block = Block::new(&mut g, rng, &format!("transformer.h.{}", i), &config, INIT_STD)?;
            x = block.forward(&mut g, x, &mask)?;
            params.extend(block.params());
            blocks.push(block);
        }

        let ln_f = Norm::new(&mut g, "transformer.ln_f", c);
        params.extend(ln_f.params());
        let norm_out = ln_f.forward(&mut g, x)?;

        let lm_head = g.call(Transpose::new(), &[wte])?;
        let output = g.call(MatMul::new(), &[norm_out, lm_head])?;

        Ok(Self {
            config,
            graph: g,
            wte,
            wpe,
            token_input,
            pos_input,
            blocks,
            ln_f,
            output,
            params,
            trace: false,
        })
    }

    pub fn config(&self) -> &GptConfig {
        &self.config
    }

    /// Emit a `debug` event with statistics of every block's `ln_1` output
    /// after each forward.
    pub fn set_trace(&mut self, enabled: bool) {
        self.trace = enabled;
    }

    pub fn num_params(&self) -> usize {
        self.params
            .iter()
            .filter_map(|p| self.graph.get(*p).ok())
            .map(|t| t.shape().iter().product::<usize>())
            .sum()
    }

    /// Canonical parameter names in allocation order. The tied output
    /// projection is listed once, under [`TOKEN_EMBEDDING`].
    pub fn parameter_names(&self) -> Vec<&str> {
        self.params
            .iter()
            .filter_map(|p| self.graph.name_of(*p).ok())
            .collect()
    }

    fn param_id(&self, name: &str) -> Result<TensorId, GptError> {
        if name == LM_HEAD {
            return Ok(self.wte);
        }
        self.params
            .iter()
            .find(|p| self.graph.name_of(**p).map(|n| n == name).unwrap_or(false))
            .copied()
            .ok_or_else(|| GptError::MissingParameter(name.into()))
    }

    pub fn parameter(&self, name: &str) -> Result<&Tensor<f32>, GptError> {
        Ok(self.graph.get_float(self.param_id(name)?)?)
    }

    pub fn gradient(&self, name: &str) -> Result<&Tensor<f32>, GptError> {
        Ok(self.graph.get_grad(self.param_id(name)?)?)
    }

    /// Overwrites a parameter. Loading through [`LM_HEAD`] updates the token
    /// embedding as well, they are the same tensor.
    pub fn load_parameter(&mut self, name: &str, tensor: &Tensor<f32>) -> Result<(), GptError> {
        let id = self.param_id(name)?;
        let expected = self.graph.get(id)?.shape().to_vec();
        if tensor.shape() != expected.as_slice() {
            return Err(GptError::ParameterShape {
                name: name.into(),
                expected,
                actual: tensor.shape().to_vec(),
            });
        }
        self.graph.load(id, tensor)?;
        Ok(())
    }

    /// `ln_1` output of block `layer` from the most recent forward.
    pub fn normalized_input(&self, layer: usize) -> Result<&Tensor<f32>, GptError> {
        let id = self
            .blocks
            .get(layer)
            .and_then(|b| b.normalized_input())
            .ok_or(TensorError::InvalidIndex {
                index: layer,
                size: self.blocks.len(),
            })?;
        Ok(self.graph.get_float(id)?)
    }

    fn check_tokens(&self, tokens: &Tensor<usize>) -> Result<(), GptError> {
        if tokens.dim() != 2 {
            return Err(TensorError::UnexpectedShape(tokens.shape().to_vec()).into());
        }
        let (batch, len) = (tokens.shape()[0], tokens.shape()[1]);
        if batch == 0 || len == 0 {
            return Err(GptError::EmptyInput);
        }
        if len > self.config.num_tokens() {
            return Err(GptError::SequenceLengthExceeded {
                requested: len,
                maximum: self.config.num_tokens(),
            });
        }
        if let Some(&t) = tokens.blob().iter().find(|t| **t >= self.config.vocab_size()) {
            return Err(TensorError::InvalidIndex {
                index: t,
                size: self.config.vocab_size(),
            }
            .into());
        }
        Ok(())
    }

    fn run(&mut self, tokens: &Tensor<usize>) -> Result<(), GptError> {
        self.check_tokens(tokens)?;
        let len = tokens.shape()[1];
        self.graph.load_usize(self.token_input, tokens.clone())?;
        self.graph
            .load_usize(self.pos_input, Tensor::vector(&(0..len).collect::<Vec<_>>()))?;
        self.graph.forward()?;
        if self.trace {
            self.trace_activations();
        }
        Ok(())
    }

    fn trace_activations(&self) {
        for (layer, block) in self.blocks.iter().enumerate() {
            let t = match block.normalized_input().map(|id| self.graph.get_float(id)) {
                Some(Ok(t)) => t,
                _ => continue,
            };
            let mean = t.mean();
            let std = (t.blob().iter().map(|v| (v - mean).powi(2)).sum::<f32>()
                / t.size() as f32)
                .sqrt();
            let (min, max) = t
                .blob()
                .iter()
                .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| {
                    (lo.min(*v), hi.max(*v))
                });
            tracing::debug!(layer, shape = ?t.shape(), mean, std, min, max, "ln_1 output");
        }
    }

    /// Runs the model on `tokens` of shape `(B, T)` and returns logits of
    /// shape `(B, T, V)`. With `targets` of the same shape the mean
    /// cross-entropy over all `B * T` positions is returned too. Gradients
    /// are left untouched.
    pub fn forward(
        &mut self,
        tokens: &Tensor<usize>,
        targets: Option<&Tensor<usize>>,
    ) -> Result<(&Tensor<f32>, Option<f32>), GptError> {
        if let Some(targets) = targets {
            if targets.shape() != tokens.shape() {
                return Err(TensorError::ShapeError(
                    tokens.shape().to_vec(),
                    targets.shape().to_vec(),
                )
                .into());
            }
        }
        self.run(tokens)?;
        let logits = self.graph.get_float(self.output)?;
        let loss = match targets {
            Some(targets) => Some(CrossEntropy::new(targets.clone()).run(logits)?.0.mean()),
            None => None,
        };
        Ok((logits, loss))
    }

    /// One optimization step on a batch: forward, mean cross-entropy,
    /// backward, update. Returns the loss before the update.
    pub fn train_step<O: Optimizer>(
        &mut self,
        xs: &Tensor<usize>,
        ys: &Tensor<usize>,
        optimizer: &O,
        optimizer_state: &mut OptimizerState,
        learning_rate: f32,
    ) -> Result<f32, GptError> {
        if xs.shape() != ys.shape() {
            return Err(TensorError::ShapeError(xs.shape().to_vec(), ys.shape().to_vec()).into());
        }
        self.run(xs)?;
        self.graph.zero_grad();
        let loss = self
            .graph
            .backward_all(self.output, CrossEntropy::new(ys.clone()))?;
        let params = self.params.iter().copied().collect::<HashSet<_>>();
        self.graph
            .optimize(optimizer, optimizer_state, &params, learning_rate)?;
        Ok(loss)
    }

    /// Forward and backward without an update, leaving gradients readable
    /// through [`Gpt::gradient`].
    pub fn compute_gradients(
        &mut self,
        xs: &Tensor<usize>,
        ys: &Tensor<usize>,
    ) -> Result<f32, GptError> {
        if xs.shape() != ys.shape() {
            return Err(TensorError::ShapeError(xs.shape().to_vec(), ys.shape().to_vec()).into());
        }
        self.run(xs)?;
        self.graph.zero_grad();
        Ok(self
            .graph
            .backward_all(self.output, CrossEntropy::new(ys.clone()))?)
    }

    pub fn position_embedding(&self) -> Result<&Tensor<f32>, GptError> {
        Ok(self.graph.get_float(self.wpe)?)
    }

    pub fn final_norm(&self) -> &Norm {
        &self.ln_f
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn tiny() -> Gpt {
        let mut rng = StdRng::seed_from_u64(1);
        Gpt::new(&mut rng, GptConfig::new(8, 11, 2, 2, 8).unwrap()).unwrap()
    }

    #[test]
    fn test_parameter_layout() {
        let gpt = tiny();
        let names = gpt.parameter_names();
        assert_eq!(names[0], TOKEN_EMBEDDING);
        assert_eq!(names[1], POSITION_EMBEDDING);
        assert!(names.contains(&"transformer.h.1.attn.c_attn.weight"));
        assert!(names.contains(&"transformer.h.0.mlp.c_proj.bias"));
        assert!(names.contains(&"transformer.ln_f.weight"));
        assert!(!names.contains(&LM_HEAD));
        assert_eq!(
            gpt.parameter("transformer.h.0.attn.c_attn.weight").unwrap().shape(),
            &[8, 24]
        );
        assert_eq!(
            gpt.parameter("transformer.h.0.mlp.c_fc.weight").unwrap().shape(),
            &[8, 32]
        );
        // wte + wpe + ln_f + 2 * (2 norms + c_attn + c_proj + c_fc + c_proj)
        let per_block = 2 * 16 + (8 * 24 + 24) + (8 * 8 + 8) + (8 * 32 + 32) + (32 * 8 + 8);
        assert_eq!(gpt.num_params(), 11 * 8 + 8 * 8 + 16 + 2 * per_block);
        assert!(matches!(
            gpt.parameter("transformer.h.2.ln_1.weight"),
            Err(GptError::MissingParameter(_))
        ));
    }

    #[test]
    fn test_init_policy() {
        let gpt = tiny();
        assert!(gpt
            .parameter("transformer.h.0.ln_1.weight")
            .unwrap()
            .blob()
            .iter()
            .all(|v| *v == 1.));
        assert!(gpt
            .parameter("transformer.h.1.mlp.c_fc.bias")
            .unwrap()
            .blob()
            .iter()
            .all(|v| *v == 0.));
        assert!(gpt
            .parameter("transformer.ln_f.bias")
            .unwrap()
            .blob()
            .iter()
            .all(|v| *v == 0.));
        assert_eq!(gpt.parameter(LM_HEAD).unwrap(), gpt.parameter(TOKEN_EMBEDDING).unwrap());
    }

    #[test]
    fn test_forward_errors() {
        let mut gpt = tiny();
        let too_long = Tensor::zeros(&[1, 9]);
        assert!(matches!(
            gpt.forward(&too_long, None),
            Err(GptError::SequenceLengthExceeded {
                requested: 9,
                maximum: 8
            })
        ));
        assert!(matches!(
            gpt.forward(&Tensor::zeros(&[1, 0]), None),
            Err(GptError::EmptyInput)
        ));
        let bad_token = Tensor::raw(&[1, 2], vec![0, 11]).unwrap();
        assert!(matches!(
            gpt.forward(&bad_token, None),
            Err(GptError::Tensor(TensorError::InvalidIndex { index: 11, size: 11 }))
        ));
    }

    #[test]
    fn test_load_parameter_checks_shape() {
        let mut gpt = tiny();
        assert!(matches!(
            gpt.load_parameter(LM_HEAD, &Tensor::zeros(&[8, 11])),
            Err(GptError::ParameterShape { .. })
        ));
        gpt.load_parameter(LM_HEAD, &Tensor::ones(&[11, 8])).unwrap();
        assert!(gpt
            .parameter(TOKEN_EMBEDDING)
            .unwrap()
            .blob()
            .iter()
            .all(|v| *v == 1.));
    }

    #[test]
    fn test_normalized_input_available_after_forward() {
        let mut gpt = tiny();
        gpt.set_trace(true);
        let tokens = Tensor::raw(&[2, 3], vec![1, 2, 3, 4, 5, 6]).unwrap();
        gpt.forward(&tokens, None).unwrap();
        let ln = gpt.normalized_input(1).unwrap();
        assert_eq!(ln.shape(), &[2, 3, 8]);
        for row in ln.blob().chunks(8) {
            assert!((row.iter().sum::<f32>() / 8.).abs() < 1e-4);
        }
        assert!(gpt.normalized_input(2).is_err());
    }
}
