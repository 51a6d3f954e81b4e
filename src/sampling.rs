use crate::funcs::row_softmax;
use crate::gpt::{Gpt, GptError};
use crate::tensor::{Tensor, TensorOps};
use crate::tokenizer::Tokenizer;
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

pub const DEFAULT_TOP_K: usize = 50;

/// The `k` largest probabilities of `probs` with their indices, descending.
/// Equal probabilities keep ascending index order.
pub fn top_k(probs: &[f32], k: usize) -> Vec<(usize, f32)> {
    let mut ranked = probs.iter().copied().enumerate().collect::<Vec<_>>();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked.truncate(k);
    ranked
}

/// Draws a vocabulary id from the top-`k` entries of a probability row.
/// The kept weights are not renormalized; sampling proportional to them is
/// the same thing.
pub fn sample<R: Rng>(rng: &mut R, probs: &[f32], k: usize) -> Result<usize, GptError> {
    let candidates = top_k(probs, k);
    let dist = WeightedIndex::new(candidates.iter().map(|(_, p)| *p))?;
    Ok(candidates[dist.sample(rng)].0)
}

/// Autoregressively extends `prompt` into `num_sequences` rows of exactly
/// `max_length` tokens. A prompt that is already long enough is truncated.
pub fn generate<R: Rng>(
    model: &mut Gpt,
    rng: &mut R,
    prompt: &[usize],
    num_sequences: usize,
    max_length: usize,
    top_k: usize,
) -> Result<Vec<Vec<usize>>, GptError> {
    if prompt.is_empty() || num_sequences == 0 {
        return Err(GptError::EmptyInput);
    }
    let mut rows = vec![prompt.to_vec(); num_sequences];
    for len in prompt.len()..max_length {
        let tokens = Tensor::raw(
            &[num_sequences, len],
            rows.iter().flatten().copied().collect(),
        )?;
        let (logits, _) = model.forward(&tokens, None)?;
        let vocab = logits.shape()[2];
        let mut last = Vec::with_capacity(num_sequences * vocab);
        for seq in logits.inners() {
            last.extend_from_slice(seq.get(len - 1)?.blob());
        }
        let probs = row_softmax(&Tensor::raw(&[num_sequences, vocab], last)?)?;
        for (row, p) in rows.iter_mut().zip(probs.blob().chunks(vocab)) {
            row.push(sample(rng, p, top_k)?);
        }
    }
    for row in rows.iter_mut() {
        row.truncate(max_length);
    }
    Ok(rows)
}

/// [`generate`] with the prompt encoded and every row decoded by `tokenizer`.
pub fn generate_text<R: Rng, T: Tokenizer + ?Sized>(
    model: &mut Gpt,
    tokenizer: &T,
    rng: &mut R,
    prompt: &str,
    num_sequences: usize,
    max_length: usize,
) -> Result<Vec<String>, GptError> {
    let prompt = tokenizer.tokenize(prompt);
    let rows = generate(model, rng, &prompt, num_sequences, max_length, DEFAULT_TOP_K)?;
    Ok(rows.iter().map(|r| tokenizer.untokenize(r)).collect())
}
