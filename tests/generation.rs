mod common;

use common::*;
use nano_gpt2::sampling::{generate, generate_text, DEFAULT_TOP_K};
use nano_gpt2::tokenizer::Tokenizer;
use nano_gpt2::GptError;
use rand::rngs::StdRng;
use rand::SeedableRng;

const CORPUS: &str = "I speak from certainties and you hear from doubts \
    the sea is calm tonight and the tide is full the moon lies fair \
    upon the straits on the French coast the light gleams and is gone";

#[test]
fn fixed_seed_generation_is_reproducible() {
    let tokenizer = WordTokenizer::new(CORPUS);
    let run = || {
        let mut gpt = tiny_model(tokenizer.vocab_size(), 7);
        let mut rng = StdRng::seed_from_u64(42);
        generate_text(&mut gpt, &tokenizer, &mut rng, "I speak from certainties", 5, 20).unwrap()
    };
    let first = run();
    assert_eq!(first.len(), 5);
    for text in first.iter() {
        assert!(text.starts_with("I speak from certainties"));
        assert_eq!(text.split_whitespace().count(), 20);
    }
    assert_eq!(first, run());
}

#[test]
fn rows_are_extended_to_exactly_the_target_length() {
    let mut gpt = tiny_model(30, 8);
    let mut rng = StdRng::seed_from_u64(1);
    let rows = generate(&mut gpt, &mut rng, &[3, 1, 4], 3, 9, DEFAULT_TOP_K).unwrap();
    assert_eq!(rows.len(), 3);
    for row in rows {
        assert_eq!(row.len(), 9);
        assert_eq!(&row[..3], &[3, 1, 4]);
        assert!(row.iter().all(|t| *t < 30));
    }
}

#[test]
fn top_one_sampling_is_greedy_and_rows_agree() {
    let mut gpt = tiny_model(30, 9);
    let mut rng = StdRng::seed_from_u64(5);
    let rows = generate(&mut gpt, &mut rng, &[2], 4, 6, 1).unwrap();
    assert!(rows.iter().all(|r| r == &rows[0]));
}

#[test]
fn long_prompts_are_truncated_and_empty_prompts_rejected() {
    let mut gpt = tiny_model(30, 10);
    let mut rng = StdRng::seed_from_u64(1);
    let rows = generate(&mut gpt, &mut rng, &[1, 2, 3, 4, 5], 2, 3, DEFAULT_TOP_K).unwrap();
    assert_eq!(rows, vec![vec![1, 2, 3], vec![1, 2, 3]]);
    assert!(matches!(
        generate(&mut gpt, &mut rng, &[], 2, 3, DEFAULT_TOP_K),
        Err(GptError::EmptyInput)
    ));
}

#[test]
fn generation_past_the_context_window_fails() {
    let mut gpt = tiny_model(30, 11);
    let mut rng = StdRng::seed_from_u64(1);
    assert!(matches!(
        generate(&mut gpt, &mut rng, &[1], 1, 26, DEFAULT_TOP_K),
        Err(GptError::SequenceLengthExceeded { .. })
    ));
}
