use crate::gpt::GptError;
use crate::tensor::Tensor;
use crate::tokenizer::Tokenizer;
use std::path::Path;

/// Sequential `(inputs, targets)` batches over an in-memory token stream.
///
/// Each batch covers `batch_size * seq_len + 1` consecutive tokens: inputs are
/// all but the last, targets all but the first. The cursor then advances by
/// `batch_size * seq_len` and returns to the start once the next batch would
/// run past the end of the corpus, so only full batches are produced.
#[derive(Debug, Clone)]
pub struct DataLoader {
    tokens: Vec<usize>,
    batch_size: usize,
    seq_len: usize,
    cursor: usize,
}

impl DataLoader {
    pub fn from_tokens(
        tokens: Vec<usize>,
        batch_size: usize,
        seq_len: usize,
    ) -> Result<Self, GptError> {
        if batch_size == 0 || seq_len == 0 {
            return Err(GptError::EmptyInput);
        }
        let required = batch_size * seq_len + 1;
        if tokens.len() < required {
            return Err(GptError::CorpusTooSmall {
                tokens: tokens.len(),
                required,
            });
        }
        tracing::info!(
            tokens = tokens.len(),
            batches_per_epoch = tokens.len() / (batch_size * seq_len),
            "loaded corpus"
        );
        Ok(Self {
            tokens,
            batch_size,
            seq_len,
            cursor: 0,
        })
    }

    pub fn from_text<T: Tokenizer + ?Sized>(
        text: &str,
        tokenizer: &T,
        batch_size: usize,
        seq_len: usize,
    ) -> Result<Self, GptError> {
        Self::from_tokens(tokenizer.tokenize(text), batch_size, seq_len)
    }

    /// Reads a UTF-8 corpus fully into memory.
    pub fn from_file<P: AsRef<Path>, T: Tokenizer + ?Sized>(
        path: P,
        tokenizer: &T,
        batch_size: usize,
        seq_len: usize,
    ) -> Result<Self, GptError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_text(&text, tokenizer, batch_size, seq_len)
    }

    pub fn next_batch(&mut self) -> Result<(Tensor<usize>, Tensor<usize>), GptError> {
        let span = self.batch_size * self.seq_len;
        let buf = &self.tokens[self.cursor..self.cursor + span + 1];
        let shape = [self.batch_size, self.seq_len];
        let xs = Tensor::raw(&shape, buf[..span].to_vec())?;
        let ys = Tensor::raw(&shape, buf[1..].to_vec())?;
        self.cursor += span;
        if self.cursor + span + 1 > self.tokens.len() {
            self.cursor = 0;
        }
        Ok((xs, ys))
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Restores a cursor saved from an earlier run.
    pub fn seek(&mut self, cursor: usize) {
        let span = self.batch_size * self.seq_len;
        self.cursor = if cursor + span + 1 > self.tokens.len() {
            0
        } else {
            cursor
        };
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn seq_len(&self) -> usize {
        self.seq_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::TensorOps;

    #[test]
    fn test_batches_are_shifted_by_one() {
        let mut loader = DataLoader::from_tokens((0..20).collect(), 2, 3).unwrap();
        let (xs, ys) = loader.next_batch().unwrap();
        assert_eq!(xs.shape(), &[2, 3]);
        assert_eq!(xs.blob(), &[0, 1, 2, 3, 4, 5]);
        assert_eq!(ys.blob(), &[1, 2, 3, 4, 5, 6]);
        assert_eq!(loader.cursor(), 6);
    }

    #[test]
    fn test_too_small_corpus() {
        assert!(matches!(
            DataLoader::from_tokens(vec![1; 6], 2, 3),
            Err(GptError::CorpusTooSmall {
                tokens: 6,
                required: 7
            })
        ));
        assert!(DataLoader::from_tokens(vec![1; 7], 2, 3).is_ok());
    }
}
