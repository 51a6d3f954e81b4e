use serde::{Deserialize, Serialize};

use crate::tensor::{Tensor, TensorError, TensorOps};
use rayon::prelude::*;
use std::collections::HashMap;

/// Per-parameter moments keyed as `{name}_m` / `{name}_v`, plus the number of
/// updates applied so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct OptimizerState {
    pub step: usize,
    pub state: HashMap<String, Tensor<f32>>,
}

pub trait Optimizer: Clone + Serialize + serde::de::DeserializeOwned {
    fn step(
        &self,
        params: HashMap<String, (&mut Tensor<f32>, &Tensor<f32>)>,
        optimizer_state: &mut OptimizerState,
        learning_rate: f32,
    ) -> Result<(), TensorError>;
}

const EPSILON: f32 = 1e-8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdamW {
    beta1: f32,
    beta2: f32,
    weight_decay: f32,
}

impl Default for AdamW {
    fn default() -> Self {
        Self::new()
    }
}

impl AdamW {
    pub fn new() -> Self {
        Self {
            beta1: 0.9,
            beta2: 0.999,
            weight_decay: 0.01,
        }
    }
    pub fn with_weight_decay(mut self, weight_decay: f32) -> Self {
        self.weight_decay = weight_decay;
        self
    }
}

// Decoupled weight decay, as in torch.optim.AdamW.
impl Optimizer for AdamW {
    fn step(
        &self,
        params: HashMap<String, (&mut Tensor<f32>, &Tensor<f32>)>,
        optimizer_state: &mut OptimizerState,
        learning_rate: f32,
    ) -> Result<(), TensorError> {
        let t = optimizer_state.step as i32 + 1;
        let bias1 = 1. / (1. - self.beta1.powi(t));
        let bias2 = 1. / (1. - self.beta2.powi(t));
        let state = &optimizer_state.state;
        for (name, m, v) in params
            .into_par_iter()
            .map(|(name, (param, grad))| {
                if param.shape() != grad.shape() {
                    return Err(TensorError::ShapeError(
                        param.shape().to_vec(),
                        grad.shape().to_vec(),
                    ));
                }
                let mut m = state
                    .get(&format!("{}_m", name))
                    .cloned()
                    .unwrap_or_else(|| Tensor::zeros(param.shape()));
                let mut v = state
                    .get(&format!("{}_v", name))
                    .cloned()
                    .unwrap_or_else(|| Tensor::zeros(param.shape()));
                if m.shape() != param.shape() || v.shape() != param.shape() {
                    return Err(TensorError::ShapeError(
                        param.shape().to_vec(),
                        m.shape().to_vec(),
                    ));
                }

                for (((p, g), m), v) in param
                    .blob_mut()
                    .iter_mut()
                    .zip(grad.blob())
                    .zip(m.blob_mut().iter_mut())
                    .zip(v.blob_mut().iter_mut())
                {
                    *p -= *p * learning_rate * self.weight_decay;
                    *m = self.beta1 * *m + (1. - self.beta1) * g;
                    *v = self.beta2 * *v + (1. - self.beta2) * g * g;
                    let m_hat = *m * bias1;
                    let v_hat = *v * bias2;
                    *p -= m_hat * learning_rate / (v_hat.sqrt() + EPSILON);
                }
                Ok((name, m, v))
            })
            .collect::<Result<Vec<_>, TensorError>>()?
        {
            optimizer_state.state.insert(format!("{}_m", name), m);
            optimizer_state.state.insert(format!("{}_v", name), v);
        }
        optimizer_state.step += 1;
        Ok(())
    }
}
