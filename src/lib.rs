//! **nano-gpt2** is a small GPT-2 style language model written in pure Rust.
//!
//! It covers the full loop of a decoder-only transformer on the CPU:
//! parameter layout and initialization, the forward pass (multi-head causal
//! self-attention, GELU feed-forward blocks, pre-normalization, tied output
//! projection), training with AdamW until a loss threshold is reached, and
//! top-k multinomial sampling.
//!
//! ## Usage
//!
//! Training on a text file with a character level vocabulary:
//!
//! `cargo run --release -- train --dataset dataset.txt`
//!
//! Sampling from the exported model:
//!
//! `cargo run --release -- generate --dataset dataset.txt --prompt "I speak from certainties"`
//!
//! Set `RUST_LOG=info` to follow training progress, `RUST_LOG=debug` together
//! with `--trace` to see per-layer activation statistics.
//!
//! ## Intro
//!
//! Tensors, the computation graph and its reverse-mode differentiation are
//! implemented from scratch: every operation is a [`funcs::Function`] node
//! in a static [`graph::Graph`], recomputed in order on each forward and
//! differentiated in reverse order on each backward. Kernels are parallelised
//! with `rayon`.
//!
//! Model parameters follow the GPT-2 naming (`transformer.h.0.attn.c_attn.weight`
//! and so on), and the raw checkpoint format writes each one to its own file
//! of little-endian `f32` values.

pub mod checkpoint;
pub mod config;
pub mod data;
pub mod funcs;
pub mod gpt;
pub mod graph;
pub mod optimizer;
pub mod sampling;
pub mod tensor;
pub mod tokenizer;
pub mod training;

pub use config::{ConfigError, GptConfig, RunConfig, TrainingConfig};
pub use data::DataLoader;
pub use gpt::{Gpt, GptError};
pub use training::{StopReason, Trainer, TrainingReport, TrainingState};
