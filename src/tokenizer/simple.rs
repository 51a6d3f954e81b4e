use super::Tokenizer;
use std::collections::{BTreeSet, HashMap};

/// Character-level vocabulary built from a corpus, ids assigned in sorted
/// character order. Characters outside the vocabulary are dropped.
#[derive(Debug, Clone)]
pub struct SimpleTokenizer {
    ch_to_int: HashMap<char, usize>,
    int_to_ch: Vec<char>,
}

impl SimpleTokenizer {
    pub fn new(dataset: &str) -> Self {
        let int_to_ch = dataset
            .chars()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect::<Vec<_>>();
        let ch_to_int = int_to_ch
            .iter()
            .enumerate()
            .map(|(i, ch)| (*ch, i))
            .collect::<HashMap<char, usize>>();
        Self {
            int_to_ch,
            ch_to_int,
        }
    }
}

impl Tokenizer for SimpleTokenizer {
    fn vocab_size(&self) -> usize {
        self.int_to_ch.len()
    }
    fn tokenize(&self, string: &str) -> Vec<usize> {
        let tokens = string
            .chars()
            .filter_map(|ch| self.ch_to_int.get(&ch).copied())
            .collect::<Vec<_>>();
        if tokens.len() != string.chars().count() {
            tracing::warn!(
                dropped = string.chars().count() - tokens.len(),
                "characters outside the vocabulary were dropped"
            );
        }
        tokens
    }
    fn untokenize(&self, tokens: &[usize]) -> String {
        tokens
            .iter()
            .filter_map(|tkn| self.int_to_ch.get(*tkn))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_tokenizer() {
        let tokenizer = SimpleTokenizer::new("cabbc");
        assert_eq!(tokenizer.vocab_size(), 3);
        assert_eq!(tokenizer.tokenize("a"), vec![0]);
        assert_eq!(tokenizer.tokenize("abc"), vec![0, 1, 2]);
        assert_eq!(tokenizer.untokenize(&[2, 1, 0]), "cba");
    }

    #[test]
    fn test_encode_decode() {
        let tokenizer = SimpleTokenizer::new("hello world");
        let tokens = tokenizer.tokenize("hello");
        assert_eq!(tokenizer.untokenize(&tokens), "hello");
    }

    #[test]
    fn test_unknown_characters_are_dropped() {
        let tokenizer = SimpleTokenizer::new("ab");
        assert_eq!(tokenizer.tokenize("axb"), vec![0, 1]);
        assert_eq!(tokenizer.untokenize(&[0, 7, 1]), "ab");
    }
}
