mod common;

use common::*;
use nano_gpt2::config::ConfigError;
use nano_gpt2::gpt::{LM_HEAD, TOKEN_EMBEDDING};
use nano_gpt2::optimizer::{AdamW, OptimizerState};
use nano_gpt2::tensor::{Tensor, TensorOps};
use nano_gpt2::{GptConfig, GptError, RunConfig};

#[test]
fn invalid_config_fails_before_any_model_exists() {
    assert!(matches!(
        GptConfig::new(16, 10, 2, 3, 16),
        Err(ConfigError::HeadsDoNotDivide { .. })
    ));
    assert!(matches!(
        GptConfig::new(0, 10, 2, 2, 16),
        Err(ConfigError::Zero { name: "num_tokens" })
    ));
    let parsed = serde_json::from_str::<RunConfig>(
        r#"{"model":{"num_tokens":16,"vocab_size":10,"num_layers":2,"num_heads":5,"embedding_degree":16}}"#,
    );
    assert!(parsed.is_err());
}

#[test]
fn logits_have_batch_time_vocab_shape() {
    let mut gpt = tiny_model(13, 0);
    for batch in [1, 4, 5] {
        for len in [1, 8, 24] {
            let tokens = Tensor::raw(
                &[batch, len],
                (0..batch * len).map(|i| (i * 7) % 13).collect(),
            )
            .unwrap();
            let (logits, loss) = gpt.forward(&tokens, None).unwrap();
            assert_eq!(logits.shape(), &[batch, len, 13]);
            assert!(logits.blob().iter().all(|v| v.is_finite()));
            assert!(loss.is_none());
        }
    }
    assert!(matches!(
        gpt.forward(&Tensor::zeros(&[1, 25]), None),
        Err(GptError::SequenceLengthExceeded {
            requested: 25,
            maximum: 24
        })
    ));
}

#[test]
fn loss_of_fresh_model_is_close_to_uniform() {
    let mut gpt = tiny_model(13, 1);
    let xs = Tensor::raw(&[2, 8], (0..16).map(|i| i % 13).collect()).unwrap();
    let ys = Tensor::raw(&[2, 8], (1..17).map(|i| i % 13).collect()).unwrap();
    let (_, loss) = gpt.forward(&xs, Some(&ys)).unwrap();
    let loss = loss.unwrap();
    assert!((loss - 13f32.ln()).abs() < 0.3, "loss {}", loss);
}

#[test]
fn future_tokens_do_not_change_past_logits() {
    let mut gpt = tiny_model(11, 2);
    let original = Tensor::raw(&[2, 8], vec![1, 2, 3, 4, 5, 6, 7, 8, 8, 7, 6, 5, 4, 3, 2, 1]).unwrap();
    let mut changed_tokens = original.blob().to_vec();
    for row in 0..2 {
        for pos in 5..8 {
            changed_tokens[row * 8 + pos] = (changed_tokens[row * 8 + pos] + 3) % 11;
        }
    }
    let changed = Tensor::raw(&[2, 8], changed_tokens).unwrap();

    let before = gpt.forward(&original, None).unwrap().0.clone();
    let after = gpt.forward(&changed, None).unwrap().0.clone();
    for row in 0..2 {
        for pos in 0..8 {
            let a = before.get(row).unwrap().get(pos).unwrap().blob().to_vec();
            let b = after.get(row).unwrap().get(pos).unwrap().blob().to_vec();
            let diff = a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).fold(0., f32::max);
            if pos < 5 {
                assert!(diff < 1e-6, "position {} changed by {}", pos, diff);
            } else {
                assert!(diff > 0., "position {} should see its own token", pos);
            }
        }
    }
}

#[test]
fn output_projection_stays_tied_through_training() {
    let mut gpt = tiny_model(9, 3);
    assert_eq!(gpt.parameter(LM_HEAD).unwrap(), gpt.parameter(TOKEN_EMBEDDING).unwrap());

    let xs = Tensor::raw(&[1, 4], vec![0, 1, 2, 3]).unwrap();
    let ys = Tensor::raw(&[1, 4], vec![1, 2, 3, 4]).unwrap();
    let before = gpt.parameter(TOKEN_EMBEDDING).unwrap().clone();
    let opt = AdamW::new();
    let mut state = OptimizerState::default();
    for _ in 0..3 {
        gpt.train_step(&xs, &ys, &opt, &mut state, 1e-2).unwrap();
    }
    let after = gpt.parameter(TOKEN_EMBEDDING).unwrap();
    assert_ne!(&before, after);
    assert_eq!(gpt.parameter(LM_HEAD).unwrap(), after);
    // One moment pair for the shared tensor, not two.
    assert!(state.state.contains_key("transformer.wte.weight_m"));
    assert!(!state.state.keys().any(|k| k.starts_with("lm_head")));
}

#[test]
fn unseen_tokens_get_gradient_through_the_output_projection() {
    let mut gpt = tiny_model(9, 4);
    let xs = Tensor::raw(&[1, 4], vec![0, 1, 2, 3]).unwrap();
    let ys = Tensor::raw(&[1, 4], vec![1, 2, 3, 4]).unwrap();
    gpt.compute_gradients(&xs, &ys).unwrap();
    let grad = gpt.gradient(LM_HEAD).unwrap();
    assert_eq!(grad, gpt.gradient(TOKEN_EMBEDDING).unwrap());
    // Token 8 is never an input, so its row can only be reached via lm_head.
    let row = grad.get(8).unwrap();
    assert!(row.blob().iter().any(|v| v.abs() > 0.));
}
