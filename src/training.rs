use crate::config::TrainingConfig;
use crate::data::DataLoader;
use crate::gpt::{Gpt, GptError};
use crate::optimizer::{Optimizer, OptimizerState};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// A step reported a loss below the threshold.
    LossThreshold,
    /// The step budget ran out first.
    MaxSteps,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingState {
    Running,
    Stopped(StopReason),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingReport {
    pub steps: usize,
    pub final_loss: f32,
    pub reason: StopReason,
    pub losses: Vec<f32>,
}

/// Drives optimization until the loss drops below the threshold or the
/// optional step budget is spent. Stopping only happens between steps.
#[derive(Debug, Clone)]
pub struct Trainer<O: Optimizer> {
    optimizer: O,
    optimizer_state: OptimizerState,
    learning_rate: f32,
    loss_threshold: f32,
    max_steps: Option<usize>,
    log_interval: usize,
    state: TrainingState,
}

impl<O: Optimizer> Trainer<O> {
    pub fn new(optimizer: O, config: &TrainingConfig) -> Self {
        Self::resume(optimizer, OptimizerState::default(), config)
    }

    /// Continues from a saved optimizer state; the step counter lives in it.
    pub fn resume(optimizer: O, optimizer_state: OptimizerState, config: &TrainingConfig) -> Self {
        Self {
            optimizer,
            optimizer_state,
            learning_rate: config.learning_rate,
            loss_threshold: config.loss_threshold,
            max_steps: config.max_steps,
            log_interval: config.log_interval.max(1),
            state: TrainingState::Running,
        }
    }

    pub fn state(&self) -> TrainingState {
        self.state
    }

    /// Number of optimizer updates applied so far.
    pub fn steps(&self) -> usize {
        self.optimizer_state.step
    }

    pub fn optimizer(&self) -> &O {
        &self.optimizer
    }

    pub fn optimizer_state(&self) -> &OptimizerState {
        &self.optimizer_state
    }

    /// Trains on the next batch and returns its loss (measured before the
    /// update).
    pub fn step(&mut self, model: &mut Gpt, loader: &mut DataLoader) -> Result<f32, GptError> {
        if let TrainingState::Stopped(_) = self.state {
            return Err(GptError::TrainingStopped);
        }
        let (xs, ys) = loader.next_batch()?;
        let loss = model.train_step(
            &xs,
            &ys,
            &self.optimizer,
            &mut self.optimizer_state,
            self.learning_rate,
        )?;
        let step = self.steps();
        if step % self.log_interval == 0 {
            tracing::info!(step, loss, "training");
        }
        if loss < self.loss_threshold {
            tracing::info!(step, loss, threshold = self.loss_threshold, "loss threshold reached");
            self.state = TrainingState::Stopped(StopReason::LossThreshold);
        } else if self.max_steps.map(|m| step >= m).unwrap_or(false) {
            tracing::warn!(step, loss, "step budget exhausted before reaching the loss threshold");
            self.state = TrainingState::Stopped(StopReason::MaxSteps);
        }
        Ok(loss)
    }

    /// Steps until stopped. `callback` sees the model, the trainer and the
    /// loss after every step.
    pub fn run<F>(
        &mut self,
        model: &mut Gpt,
        loader: &mut DataLoader,
        mut callback: F,
    ) -> Result<TrainingReport, GptError>
    where
        F: FnMut(&Gpt, &Self, f32) -> Result<(), GptError>,
    {
        if self.max_steps.map(|m| self.steps() >= m).unwrap_or(false) {
            self.state = TrainingState::Stopped(StopReason::MaxSteps);
        }
        let mut losses = Vec::new();
        let start = self.steps();
        while self.state == TrainingState::Running {
            let loss = self.step(model, loader)?;
            losses.push(loss);
            callback(&*model, &*self, loss)?;
        }
        let reason = match self.state {
            TrainingState::Stopped(reason) => reason,
            TrainingState::Running => StopReason::MaxSteps,
        };
        Ok(TrainingReport {
            steps: self.steps() - start,
            final_loss: losses.last().copied().unwrap_or(f32::NAN),
            reason,
            losses,
        })
    }
}
