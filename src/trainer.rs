//! Training loop: shuffled mini-batches, plateau scheduling, early stopping
//! and best-checkpoint tracking.
//!
//! The loop is a small state machine over epochs. Every epoch that improves
//! on the best mean loss snapshots the parameters; twenty stalled epochs
//! end training early. On exit the best snapshot is loaded back, so the
//! returned model is the best-observed one, not the last-trained one.

use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use candle_core::Device;

use crate::config::TrainingConfig;
use crate::dataset::SpectraDataset;
use crate::error::{NirnetError, Result};
use crate::model::SpectralCnn;
use crate::optimizer::OptimizerConfig;
use crate::scheduler::ReduceOnPlateau;

/// File name of the rolling best-loss checkpoint.
pub const BEST_CHECKPOINT: &str = "best-model.safetensors";
/// File name of the training-state sidecar.
pub const TRAINING_STATE: &str = "training_state.json";

/// One epoch's training record.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct EpochRecord {
    /// Zero-based epoch index.
    pub epoch: usize,
    /// Mean training loss over the epoch's batches.
    pub loss: f64,
}

/// Trainer state over the epoch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainerStatus {
    /// Epoch loop in progress.
    Running,
    /// Halted by the early-stopping policy.
    EarlyStopped,
    /// Epoch budget exhausted.
    Completed,
}

/// Early-stopping policy: tracks the best metric and counts stalls.
///
/// Kept separate from the epoch loop so the termination condition is
/// testable on a bare loss sequence. A NaN loss never improves on the
/// best, so checkpoints only ever capture finite-loss parameters.
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    patience: usize,
    best: f64,
    stalled: usize,
}

/// Outcome of feeding one epoch loss to [`EarlyStopping`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopDecision {
    /// New best loss; checkpoint now.
    Improved,
    /// No improvement, keep going.
    Stalled,
    /// Patience exhausted, halt training.
    Stop,
}

impl EarlyStopping {
    /// Create a policy with the given patience.
    #[must_use]
    pub fn new(patience: usize) -> Self {
        Self {
            patience,
            best: f64::INFINITY,
            stalled: 0,
        }
    }

    /// Observe an epoch's mean loss.
    pub fn observe(&mut self, loss: f64) -> StopDecision {
        if loss < self.best {
            self.best = loss;
            self.stalled = 0;
            return StopDecision::Improved;
        }
        self.stalled += 1;
        if self.stalled >= self.patience {
            StopDecision::Stop
        } else {
            StopDecision::Stalled
        }
    }

    /// Best loss seen so far (`+inf` until the first finite observation).
    #[must_use]
    pub fn best(&self) -> f64 {
        self.best
    }
}

/// Sidecar written next to the checkpoint for diagnostics.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct TrainingState {
    epochs_run: usize,
    best_loss: f64,
    final_learning_rate: f64,
    stopped_early: bool,
}

/// Training orchestrator.
pub struct Trainer {
    config: TrainingConfig,
    device: Device,
    output_dir: PathBuf,
    seed: u64,
    status: TrainerStatus,
}

impl Trainer {
    /// Create a trainer writing checkpoints under `output_dir`.
    pub fn new<P: AsRef<Path>>(
        config: TrainingConfig,
        output_dir: P,
        seed: u64,
        device: Device,
    ) -> Self {
        Self {
            config,
            device,
            output_dir: output_dir.as_ref().to_path_buf(),
            seed,
            status: TrainerStatus::Running,
        }
    }

    /// Current loop status.
    #[must_use]
    pub fn status(&self) -> TrainerStatus {
        self.status
    }

    /// Run the epoch loop over the training partition.
    ///
    /// On return the model holds the parameters of its best-loss epoch and
    /// the training history is handed back by value.
    ///
    /// # Errors
    ///
    /// Returns an error if a training step fails, or a `Checkpoint` error
    /// if no checkpoint was ever written (the loss never reached a finite
    /// value) or the final restore fails.
    pub fn fit(
        &mut self,
        model: &mut SpectralCnn,
        train: &SpectraDataset,
    ) -> Result<Vec<EpochRecord>> {
        std::fs::create_dir_all(&self.output_dir)?;
        let best_path = self.output_dir.join(BEST_CHECKPOINT);

        let optimizer_config = OptimizerConfig {
            learning_rate: self.config.learning_rate,
            weight_decay: self.config.weight_decay,
            ..OptimizerConfig::default()
        };
        let mut optimizer = optimizer_config.build_adamw(model.varmap())?;
        let mut scheduler =
            ReduceOnPlateau::new(self.config.scheduler_patience, self.config.scheduler_factor);
        let mut stopping = EarlyStopping::new(self.config.early_stop_patience);

        tracing::info!(
            "training: {} samples, batch size {}, up to {} epochs, lr {:.2e}",
            train.len(),
            self.config.batch_size,
            self.config.epochs,
            optimizer.learning_rate()
        );

        let pb = ProgressBar::new(self.config.epochs as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos:>4}/{len:4} {msg}")
                .map_err(|e| NirnetError::Training(format!("progress template: {e}")))?
                .progress_chars("#>-"),
        );

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut indices: Vec<usize> = (0..train.len()).collect();
        let mut history = Vec::with_capacity(self.config.epochs);
        let mut checkpoint_written = false;

        self.status = TrainerStatus::Running;
        for epoch in 0..self.config.epochs {
            indices.shuffle(&mut rng);

            let mut running = 0.0f64;
            let mut batches = 0usize;
            for chunk in indices.chunks(self.config.batch_size) {
                let (xs, ys) = train.batch(chunk, &self.device)?;
                let preds = model.forward_t(&xs, true)?;
                let loss = candle_nn::loss::mse(&preds, &ys)?;
                optimizer.step(&loss)?;
                running += f64::from(loss.to_vec0::<f32>()?);
                batches += 1;
            }

            #[allow(clippy::cast_precision_loss)]
            let epoch_loss = running / batches as f64;
            if !epoch_loss.is_finite() {
                tracing::warn!("epoch {}: non-finite mean loss {epoch_loss}", epoch + 1);
            }
            history.push(EpochRecord {
                epoch,
                loss: epoch_loss,
            });

            scheduler.step(epoch_loss, &mut optimizer);

            match stopping.observe(epoch_loss) {
                StopDecision::Improved => {
                    model.save_weights(&best_path)?;
                    checkpoint_written = true;
                    tracing::debug!(
                        "epoch {}: new best loss {epoch_loss:.6}, checkpoint saved",
                        epoch + 1
                    );
                }
                StopDecision::Stalled => {}
                StopDecision::Stop => {
                    self.status = TrainerStatus::EarlyStopped;
                    tracing::info!(
                        "early stopping at epoch {} (no improvement for {} epochs)",
                        epoch + 1,
                        self.config.early_stop_patience
                    );
                    pb.inc(1);
                    break;
                }
            }

            pb.set_message(format!("loss {epoch_loss:.6}"));
            pb.inc(1);

            if epoch % 10 == 0 {
                tracing::info!(
                    "epoch {}/{}: loss {epoch_loss:.6}, lr {:.2e}",
                    epoch + 1,
                    self.config.epochs,
                    optimizer.learning_rate()
                );
            }
        }
        if self.status == TrainerStatus::Running {
            self.status = TrainerStatus::Completed;
        }
        pb.finish_with_message(format!("best loss {:.6}", stopping.best()));

        if !checkpoint_written {
            return Err(NirnetError::Checkpoint(
                "no checkpoint was written: training loss never reached a finite value".into(),
            ));
        }
        model.load_weights(&best_path)?;
        tracing::info!("restored best checkpoint (loss {:.6})", stopping.best());

        let state = TrainingState {
            epochs_run: history.len(),
            best_loss: stopping.best(),
            final_learning_rate: optimizer.learning_rate(),
            stopped_early: self.status == TrainerStatus::EarlyStopped,
        };
        let state_json = serde_json::to_string_pretty(&state)
            .map_err(|e| NirnetError::Training(format!("failed to serialize state: {e}")))?;
        std::fs::write(self.output_dir.join(TRAINING_STATE), state_json)?;

        Ok(history)
    }
}
