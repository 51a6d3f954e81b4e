#![allow(dead_code)]

use nano_gpt2::tokenizer::Tokenizer;
use nano_gpt2::{Gpt, GptConfig};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeSet;

pub fn tiny_config(vocab_size: usize) -> GptConfig {
    GptConfig::new(24, vocab_size, 2, 4, 16).unwrap()
}

pub fn tiny_model(vocab_size: usize, seed: u64) -> Gpt {
    let mut rng = StdRng::seed_from_u64(seed);
    Gpt::new(&mut rng, tiny_config(vocab_size)).unwrap()
}

/// Whitespace separated words, ids in sorted order.
pub struct WordTokenizer {
    words: Vec<String>,
}

impl WordTokenizer {
    pub fn new(corpus: &str) -> Self {
        Self {
            words: corpus
                .split_whitespace()
                .map(String::from)
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect(),
        }
    }
}

impl Tokenizer for WordTokenizer {
    fn vocab_size(&self) -> usize {
        self.words.len()
    }
    fn tokenize(&self, string: &str) -> Vec<usize> {
        string
            .split_whitespace()
            .filter_map(|w| self.words.iter().position(|v| v == w))
            .collect()
    }
    fn untokenize(&self, tokens: &[usize]) -> String {
        tokens
            .iter()
            .filter_map(|t| self.words.get(*t).map(|s| s.as_str()))
            .collect::<Vec<_>>()
            .join(" ")
    }
}
