//! Persistence.
//!
//! A raw checkpoint is a directory with `config.json` and one file per
//! parameter, named after the parameter, holding its row-major values as
//! little-endian `f32`. The tied output projection is written under both
//! `transformer.wte.weight` and `lm_head.weight`. Projection weights
//! (`c_attn`, `c_proj`, `c_fc`) are stored output-major `[out, in]` in files
//! and input-major `[in, out]` in the model, so they are transposed on the
//! way in and out.
//!
//! A training snapshot is a single `bincode` file with everything needed to
//! resume training: parameters, optimizer and its state, loader position.

use crate::config::GptConfig;
use crate::gpt::{Gpt, GptError, LM_HEAD, TOKEN_EMBEDDING};
use crate::optimizer::{Optimizer, OptimizerState};
use crate::tensor::{Tensor, TensorOps};
use crate::training::Trainer;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

const CONFIG_FILE: &str = "config.json";

fn encode(t: &Tensor<f32>) -> Vec<u8> {
    t.blob().iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode(name: &str, bytes: &[u8], shape: &[usize]) -> Result<Tensor<f32>, GptError> {
    let expected = shape.iter().product::<usize>();
    if bytes.len() != expected * 4 {
        return Err(GptError::ParameterShape {
            name: name.into(),
            expected: shape.to_vec(),
            actual: vec![bytes.len() / 4],
        });
    }
    let blob = bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    Ok(Tensor::raw(shape, blob)?)
}

fn is_projection(name: &str) -> bool {
    name.ends_with(".weight")
        && [".c_attn.", ".c_proj.", ".c_fc."]
            .iter()
            .any(|p| name.contains(p))
}

pub fn export_raw<P: AsRef<Path>>(model: &Gpt, dir: P) -> Result<(), GptError> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;
    fs::write(dir.join(CONFIG_FILE), serde_json::to_string_pretty(model.config())?)?;
    for name in model.parameter_names() {
        let param = model.parameter(name)?;
        let bytes = if is_projection(name) {
            encode(&param.transpose()?)
        } else {
            encode(param)
        };
        fs::write(dir.join(name), bytes)?;
    }
    fs::write(dir.join(LM_HEAD), encode(model.parameter(LM_HEAD)?))?;
    tracing::info!(dir = %dir.display(), params = model.num_params(), "exported checkpoint");
    Ok(())
}

/// Loads every canonical parameter file of `dir` into `model`. The
/// `lm_head.weight` file is not read, the token embedding covers it.
pub fn import_raw<P: AsRef<Path>>(model: &mut Gpt, dir: P) -> Result<(), GptError> {
    let dir = dir.as_ref();
    let names = model
        .parameter_names()
        .into_iter()
        .map(String::from)
        .collect::<Vec<_>>();
    for name in names {
        let path = dir.join(&name);
        if !path.exists() {
            return Err(GptError::MissingParameter(name));
        }
        let shape = model.parameter(&name)?.shape().to_vec();
        let bytes = fs::read(path)?;
        let tensor = if is_projection(&name) && shape.len() == 2 {
            decode(&name, &bytes, &[shape[1], shape[0]])?.transpose()?
        } else {
            decode(&name, &bytes, &shape)?
        };
        model.load_parameter(&name, &tensor)?;
    }
    Ok(())
}

/// Builds a model from the `config.json` of `dir` and fills in its parameters.
pub fn load_raw<P: AsRef<Path>, R: Rng>(dir: P, rng: &mut R) -> Result<Gpt, GptError> {
    let dir = dir.as_ref();
    let config = GptConfig::from_file(dir.join(CONFIG_FILE))?;
    let mut model = Gpt::new(rng, config)?;
    import_raw(&mut model, dir)?;
    Ok(model)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSnapshot<O> {
    pub config: GptConfig,
    pub parameters: Vec<(String, Tensor<f32>)>,
    pub optimizer: O,
    pub optimizer_state: OptimizerState,
    pub cursor: usize,
}

impl<O: Optimizer> TrainingSnapshot<O> {
    pub fn capture(model: &Gpt, trainer: &Trainer<O>, cursor: usize) -> Result<Self, GptError> {
        let parameters = model
            .parameter_names()
            .into_iter()
            .map(|name| Ok((name.to_string(), model.parameter(name)?.clone())))
            .collect::<Result<Vec<_>, GptError>>()?;
        Ok(Self {
            config: *model.config(),
            parameters,
            optimizer: trainer.optimizer().clone(),
            optimizer_state: trainer.optimizer_state().clone(),
            cursor,
        })
    }

    pub fn step(&self) -> usize {
        self.optimizer_state.step
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), GptError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, bincode::serialize(self)?)?;
        tracing::info!(path = %path.display(), step = self.step(), "saved training state");
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, GptError> {
        Ok(bincode::deserialize(&fs::read(path)?)?)
    }

    /// Rebuilds the model with the saved parameters. `rng` only seeds the
    /// throwaway initialization that gets overwritten.
    pub fn restore_model<R: Rng>(&self, rng: &mut R) -> Result<Gpt, GptError> {
        let mut model = Gpt::new(rng, self.config)?;
        for (name, tensor) in self.parameters.iter() {
            model.load_parameter(name, tensor)?;
        }
        if !self.parameters.iter().any(|(n, _)| n == TOKEN_EMBEDDING) {
            return Err(GptError::MissingParameter(TOKEN_EMBEDDING.into()));
        }
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_projection_names() {
        assert!(is_projection("transformer.h.0.attn.c_attn.weight"));
        assert!(is_projection("transformer.h.3.mlp.c_proj.weight"));
        assert!(is_projection("transformer.h.1.mlp.c_fc.weight"));
        assert!(!is_projection("transformer.h.0.attn.c_attn.bias"));
        assert!(!is_projection("transformer.h.0.ln_1.weight"));
        assert!(!is_projection(TOKEN_EMBEDDING));
        assert!(!is_projection(LM_HEAD));
    }
}
