use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use nano_gpt2::checkpoint::{self, TrainingSnapshot};
use nano_gpt2::optimizer::AdamW;
use nano_gpt2::sampling;
use nano_gpt2::tokenizer::{ByteTokenizer, SimpleTokenizer, Tokenizer};
use nano_gpt2::{DataLoader, Gpt, GptConfig, RunConfig, Trainer, TrainingState};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "nano-gpt2", about = "Train and sample a small GPT-2 style model")]
struct Cli {
    #[arg(long, value_enum, default_value = "char")]
    tokenizer: TokenizerArg,

    #[command(subcommand)]
    command: Command,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum TokenizerArg {
    /// Vocabulary of the characters found in the dataset.
    Char,
    /// 256 byte values.
    Byte,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train until the loss threshold (or the step budget) is reached.
    Train {
        #[arg(long, default_value = "dataset.txt")]
        dataset: PathBuf,
        /// JSON file with `model` and `training` sections.
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long, default_value = "train_data")]
        out: PathBuf,
        #[arg(long)]
        max_steps: Option<usize>,
        #[arg(long)]
        learning_rate: Option<f32>,
        /// Continue from `<out>/state.bin` when present.
        #[arg(long, default_value_t = false)]
        resume: bool,
        /// Log per-layer activation statistics at debug level.
        #[arg(long, default_value_t = false)]
        trace: bool,
    },
    /// Sample continuations of a prompt from an exported model.
    Generate {
        #[arg(long, default_value = "train_data/model")]
        model: PathBuf,
        /// Corpus the character vocabulary is rebuilt from.
        #[arg(long, default_value = "dataset.txt")]
        dataset: PathBuf,
        #[arg(long, default_value = "I speak from certainties")]
        prompt: String,
        #[arg(long, default_value_t = 5)]
        num_sequences: usize,
        #[arg(long, default_value_t = 20)]
        max_length: usize,
        #[arg(long, default_value_t = sampling::DEFAULT_TOP_K)]
        top_k: usize,
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
}

fn build_tokenizer(kind: TokenizerArg, dataset: &Path) -> Result<Box<dyn Tokenizer>> {
    Ok(match kind {
        TokenizerArg::Byte => Box::new(ByteTokenizer::new()),
        TokenizerArg::Char => {
            let text = fs::read_to_string(dataset)
                .with_context(|| format!("failed to read {}", dataset.display()))?;
            Box::new(SimpleTokenizer::new(&text))
        }
    })
}

#[allow(clippy::too_many_arguments)]
fn train(
    tokenizer: &dyn Tokenizer,
    dataset: &Path,
    config: Option<PathBuf>,
    out: &Path,
    max_steps: Option<usize>,
    learning_rate: Option<f32>,
    resume: bool,
    trace: bool,
) -> Result<()> {
    let mut run = match config {
        Some(path) => RunConfig::from_file(&path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => RunConfig::default(),
    };
    if max_steps.is_some() {
        run.training.max_steps = max_steps;
    }
    if let Some(lr) = learning_rate {
        run.training.learning_rate = lr;
    }
    let m = run.model;
    let model_config = GptConfig::new(
        m.num_tokens(),
        tokenizer.vocab_size(),
        m.num_layers(),
        m.num_heads(),
        m.embedding_degree(),
    )?;
    run.training.validate(&model_config)?;
    info!(vocab_size = tokenizer.vocab_size(), "tokenizer ready");

    let mut loader = DataLoader::from_file(
        dataset,
        tokenizer,
        run.training.batch_size,
        run.training.seq_len,
    )?;
    let mut rng = StdRng::seed_from_u64(run.training.seed);
    let state_path = out.join("state.bin");

    let (mut gpt, mut trainer) = if resume && state_path.exists() {
        let snapshot = TrainingSnapshot::<AdamW>::load(&state_path)?;
        info!(step = snapshot.step(), "resuming training");
        loader.seek(snapshot.cursor);
        let gpt = snapshot.restore_model(&mut rng)?;
        let trainer = Trainer::resume(snapshot.optimizer, snapshot.optimizer_state, &run.training);
        (gpt, trainer)
    } else {
        (
            Gpt::new(&mut rng, model_config)?,
            Trainer::new(AdamW::new(), &run.training),
        )
    };
    gpt.set_trace(trace);
    info!(params = gpt.num_params(), "model ready");

    let interval = run.training.checkpoint_interval.filter(|every| *every > 0);
    let mut loss = f32::NAN;
    while trainer.state() == TrainingState::Running {
        loss = trainer.step(&mut gpt, &mut loader)?;
        if let Some(every) = interval {
            if trainer.steps() % every == 0 {
                TrainingSnapshot::capture(&gpt, &trainer, loader.cursor())?.save(&state_path)?;
            }
        }
    }
    info!(
        steps = trainer.steps(),
        loss,
        state = ?trainer.state(),
        "training finished"
    );

    TrainingSnapshot::capture(&gpt, &trainer, loader.cursor())?.save(&state_path)?;
    checkpoint::export_raw(&gpt, out.join("model"))?;
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let Cli { tokenizer, command } = Cli::parse();
    match command {
        Command::Train {
            dataset,
            config,
            out,
            max_steps,
            learning_rate,
            resume,
            trace,
        } => {
            let tokenizer = build_tokenizer(tokenizer, &dataset)?;
            train(
                tokenizer.as_ref(),
                &dataset,
                config,
                &out,
                max_steps,
                learning_rate,
                resume,
                trace,
            )?;
        }
        Command::Generate {
            model,
            dataset,
            prompt,
            num_sequences,
            max_length,
            top_k,
            seed,
        } => {
            let tokenizer = build_tokenizer(tokenizer, &dataset)?;
            let mut rng = StdRng::seed_from_u64(seed);
            let mut gpt = checkpoint::load_raw(&model, &mut rng)
                .with_context(|| format!("failed to load model from {}", model.display()))?;
            let prompt = tokenizer.tokenize(&prompt);
            let rows = sampling::generate(&mut gpt, &mut rng, &prompt, num_sequences, max_length, top_k)?;
            for row in rows {
                println!("> {}", tokenizer.untokenize(&row));
            }
        }
    }
    Ok(())
}
