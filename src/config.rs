use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{name} must be greater than zero")]
    Zero { name: &'static str },
    #[error("embedding degree {embedding_degree} is not divisible by {num_heads} heads")]
    HeadsDoNotDivide {
        embedding_degree: usize,
        num_heads: usize,
    },
    #[error("invalid training setting {name}: {value}")]
    InvalidTraining { name: &'static str, value: f32 },
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Model hyperparameters. Immutable once built; every constructor validates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawGptConfig")]
pub struct GptConfig {
    num_tokens: usize,
    vocab_size: usize,
    num_layers: usize,
    num_heads: usize,
    embedding_degree: usize,
}

#[derive(Deserialize)]
struct RawGptConfig {
    num_tokens: usize,
    vocab_size: usize,
    num_layers: usize,
    num_heads: usize,
    embedding_degree: usize,
}

impl TryFrom<RawGptConfig> for GptConfig {
    type Error = ConfigError;
    fn try_from(raw: RawGptConfig) -> Result<Self, Self::Error> {
        GptConfig::new(
            raw.num_tokens,
            raw.vocab_size,
            raw.num_layers,
            raw.num_heads,
            raw.embedding_degree,
        )
    }
}

impl Default for GptConfig {
    /// GPT-2 small.
    fn default() -> Self {
        Self {
            num_tokens: 1024,
            vocab_size: 50257,
            num_layers: 12,
            num_heads: 12,
            embedding_degree: 768,
        }
    }
}

impl GptConfig {
    pub fn new(
        num_tokens: usize,
        vocab_size: usize,
        num_layers: usize,
        num_heads: usize,
        embedding_degree: usize,
    ) -> Result<Self, ConfigError> {
        for (name, value) in [
            ("num_tokens", num_tokens),
            ("vocab_size", vocab_size),
            ("num_layers", num_layers),
            ("num_heads", num_heads),
            ("embedding_degree", embedding_degree),
        ] {
            if value == 0 {
                return Err(ConfigError::Zero { name });
            }
        }
        if embedding_degree % num_heads != 0 {
            return Err(ConfigError::HeadsDoNotDivide {
                embedding_degree,
                num_heads,
            });
        }
        Ok(Self {
            num_tokens,
            vocab_size,
            num_layers,
            num_heads,
            embedding_degree,
        })
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(&std::fs::read_to_string(path)?)?)
    }

    /// Maximum sequence length.
    pub fn num_tokens(&self) -> usize {
        self.num_tokens
    }
    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }
    pub fn num_layers(&self) -> usize {
        self.num_layers
    }
    pub fn num_heads(&self) -> usize {
        self.num_heads
    }
    pub fn embedding_degree(&self) -> usize {
        self.embedding_degree
    }
    pub fn head_size(&self) -> usize {
        self.embedding_degree / self.num_heads
    }
    /// `(2 * num_layers)^-0.5`, applied to the init std of residual projections.
    pub fn residual_scale(&self) -> f32 {
        (2. * self.num_layers as f32).powf(-0.5)
    }
}

fn default_batch_size() -> usize {
    4
}
fn default_seq_len() -> usize {
    32
}
fn default_learning_rate() -> f32 {
    3e-4
}
fn default_loss_threshold() -> f32 {
    0.1
}
fn default_seed() -> u64 {
    42
}
fn default_log_interval() -> usize {
    10
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_seq_len")]
    pub seq_len: usize,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f32,
    #[serde(default = "default_loss_threshold")]
    pub loss_threshold: f32,
    #[serde(default)]
    pub max_steps: Option<usize>,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_log_interval")]
    pub log_interval: usize,
    /// Save a training state every this many steps; `None` disables it.
    #[serde(default)]
    pub checkpoint_interval: Option<usize>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            seq_len: default_seq_len(),
            learning_rate: default_learning_rate(),
            loss_threshold: default_loss_threshold(),
            max_steps: None,
            seed: default_seed(),
            log_interval: default_log_interval(),
            checkpoint_interval: None,
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self, model: &GptConfig) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Zero { name: "batch_size" });
        }
        if self.seq_len == 0 {
            return Err(ConfigError::Zero { name: "seq_len" });
        }
        if self.seq_len > model.num_tokens() {
            return Err(ConfigError::InvalidTraining {
                name: "seq_len",
                value: self.seq_len as f32,
            });
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.) {
            return Err(ConfigError::InvalidTraining {
                name: "learning_rate",
                value: self.learning_rate,
            });
        }
        if !self.loss_threshold.is_finite() {
            return Err(ConfigError::InvalidTraining {
                name: "loss_threshold",
                value: self.loss_threshold,
            });
        }
        Ok(())
    }
}

/// Everything a training run needs, loadable from a single JSON file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RunConfig {
    #[serde(default)]
    pub model: GptConfig,
    #[serde(default)]
    pub training: TrainingConfig,
}

impl RunConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: RunConfig = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        config.training.validate(&config.model)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gpt2_small_defaults() {
        let c = GptConfig::default();
        assert_eq!(c.num_tokens(), 1024);
        assert_eq!(c.vocab_size(), 50257);
        assert_eq!(c.head_size(), 64);
        assert!((c.residual_scale() - 24f32.powf(-0.5)).abs() < 1e-7);
    }

    #[test]
    fn test_invalid_heads_rejected() {
        assert!(matches!(
            GptConfig::new(8, 10, 1, 3, 16),
            Err(ConfigError::HeadsDoNotDivide {
                embedding_degree: 16,
                num_heads: 3
            })
        ));
        assert!(matches!(
            GptConfig::new(8, 0, 1, 2, 16),
            Err(ConfigError::Zero { name: "vocab_size" })
        ));
    }

    #[test]
    fn test_deserialization_validates() {
        let bad = r#"{"num_tokens":8,"vocab_size":10,"num_layers":1,"num_heads":3,"embedding_degree":16}"#;
        assert!(serde_json::from_str::<GptConfig>(bad).is_err());

        let run: RunConfig = serde_json::from_str(
            r#"{"model":{"num_tokens":8,"vocab_size":10,"num_layers":1,"num_heads":2,"embedding_degree":16},
                "training":{"batch_size":2}}"#,
        )
        .unwrap();
        assert_eq!(run.model.embedding_degree(), 16);
        assert_eq!(run.training.batch_size, 2);
        assert_eq!(run.training.seq_len, 32);
        assert!(run.training.validate(&run.model).is_err());
    }
}
