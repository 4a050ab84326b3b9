// ─────────────────────────────────────────────────────────────────────
// MindTrack — Trainer
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Epoch loop for the fusion head.
//!
//! The backbone stays frozen; each training batch runs the head with
//! dropout, backpropagates the binary cross-entropy and applies one Adam
//! step. Validation loss drives early stopping (best head restored at the
//! end) and learning-rate reduction on plateaus.

use crate::dataset::BatchSource;
use crate::model::{binary_cross_entropy, correct_predictions, FusionClassifier, FusionHead};
use crate::optim::Adam;
use mindtrack_types::config::TrainerConfig;
use mindtrack_types::error::MindTrackResult;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

/// Improvement margin required by the plateau scheduler.
const PLATEAU_MIN_DELTA: f64 = 1e-4;

#[derive(Debug, Clone, Serialize)]
pub struct EpochMetrics {
    pub epoch: usize,
    pub train_loss: f64,
    pub train_accuracy: f64,
    pub val_loss: f64,
    pub val_accuracy: f64,
    /// Learning rate used during this epoch.
    pub learning_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrainingHistory {
    pub epochs: Vec<EpochMetrics>,
    /// 1-based epoch whose head weights were restored.
    pub best_epoch: usize,
    pub best_val_loss: f64,
    pub stopped_early: bool,
}

/// Stop after `patience` epochs without a lower validation loss, keeping
/// the best head seen.
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    patience: usize,
    wait: usize,
    best: f64,
    best_epoch: usize,
    best_head: Option<FusionHead>,
}

impl EarlyStopping {
    pub fn new(patience: usize) -> Self {
        EarlyStopping {
            patience,
            wait: 0,
            best: f64::INFINITY,
            best_epoch: 0,
            best_head: None,
        }
    }

    /// Record an epoch result; returns true when training should stop.
    pub fn update(&mut self, epoch: usize, val_loss: f64, head: &FusionHead) -> bool {
        if val_loss < self.best {
            self.best = val_loss;
            self.best_epoch = epoch;
            self.best_head = Some(head.clone());
            self.wait = 0;
            return false;
        }
        self.wait += 1;
        self.wait >= self.patience && epoch > 1
    }

    pub fn best(&self) -> f64 {
        self.best
    }

    pub fn best_epoch(&self) -> usize {
        self.best_epoch
    }

    pub fn take_best_head(&mut self) -> Option<FusionHead> {
        self.best_head.take()
    }
}

/// Multiply the learning rate by `factor` after `patience` epochs without
/// improvement, never going below `min_lr`.
#[derive(Debug, Clone)]
pub struct ReduceLrOnPlateau {
    patience: usize,
    factor: f64,
    min_lr: f64,
    wait: usize,
    best: f64,
}

impl ReduceLrOnPlateau {
    pub fn new(patience: usize, factor: f64, min_lr: f64) -> Self {
        ReduceLrOnPlateau {
            patience,
            factor,
            min_lr,
            wait: 0,
            best: f64::INFINITY,
        }
    }

    /// Returns the learning rate for the next epoch.
    pub fn update(&mut self, val_loss: f64, lr: f64) -> f64 {
        if val_loss < self.best - PLATEAU_MIN_DELTA {
            self.best = val_loss;
            self.wait = 0;
            return lr;
        }
        self.wait += 1;
        if self.wait >= self.patience && lr > self.min_lr {
            self.wait = 0;
            let reduced = (lr * self.factor).max(self.min_lr);
            tracing::info!(from = lr, to = reduced, "reducing learning rate");
            return reduced;
        }
        lr
    }
}

/// Sample-weighted loss and accuracy over every batch of `source`
/// (no dropout, no updates).
pub fn evaluate<S: BatchSource + ?Sized>(
    model: &FusionClassifier,
    source: &S,
) -> MindTrackResult<(f64, f64)> {
    let mut loss_sum = 0.0;
    let mut correct = 0usize;
    let mut seen = 0usize;
    for index in 0..source.num_batches() {
        let (batch, labels) = source.get_batch(index)?;
        let embeddings = model.backbone.embed_batch(&batch.images)?;
        let probs = model.head.forward(&embeddings, &batch.features);
        loss_sum += binary_cross_entropy(&probs, &labels) * labels.len() as f64;
        correct += correct_predictions(&probs, &labels);
        seen += labels.len();
    }
    Ok(ratio(loss_sum, correct, seen))
}

fn ratio(loss_sum: f64, correct: usize, seen: usize) -> (f64, f64) {
    if seen == 0 {
        return (0.0, 0.0);
    }
    (loss_sum / seen as f64, correct as f64 / seen as f64)
}

pub struct Trainer {
    config: TrainerConfig,
    rng: StdRng,
}

impl Trainer {
    pub fn new(config: TrainerConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Trainer { config, rng }
    }

    /// One pass over the training source; returns (loss, accuracy).
    fn train_epoch<S: BatchSource + ?Sized>(
        &mut self,
        model: &mut FusionClassifier,
        optimizer: &mut Adam,
        train: &S,
    ) -> MindTrackResult<(f64, f64)> {
        let mut loss_sum = 0.0;
        let mut correct = 0usize;
        let mut seen = 0usize;
        for index in 0..train.num_batches() {
            let (batch, labels) = train.get_batch(index)?;
            let embeddings = model.backbone.embed_batch(&batch.images)?;
            let acts = model
                .head
                .forward_train(&embeddings, &batch.features, &mut self.rng);
            let grads = model
                .head
                .backward(&embeddings, &batch.features, &acts, &labels);
            optimizer.step(&mut model.head, &grads);

            loss_sum += binary_cross_entropy(&acts.probs, &labels) * labels.len() as f64;
            correct += correct_predictions(&acts.probs, &labels);
            seen += labels.len();
        }
        Ok(ratio(loss_sum, correct, seen))
    }

    pub fn fit<T, V>(
        &mut self,
        model: &mut FusionClassifier,
        train: &mut T,
        validation: &mut V,
        epochs: usize,
    ) -> MindTrackResult<TrainingHistory>
    where
        T: BatchSource + ?Sized,
        V: BatchSource + ?Sized,
    {
        let mut optimizer = Adam::new(&model.head, self.config.learning_rate);
        let mut stopper = EarlyStopping::new(self.config.early_stopping_patience);
        let mut plateau = ReduceLrOnPlateau::new(
            self.config.lr_patience,
            self.config.lr_factor,
            self.config.min_lr,
        );
        let mut history = Vec::with_capacity(epochs);
        let mut stopped_early = false;

        tracing::info!(
            train_batches = train.num_batches(),
            val_batches = validation.num_batches(),
            train_samples = train.sample_count(),
            val_samples = validation.sample_count(),
            epochs,
            "starting training"
        );

        for epoch in 1..=epochs {
            let learning_rate = optimizer.learning_rate;
            let (train_loss, train_accuracy) = self.train_epoch(model, &mut optimizer, &*train)?;
            train.on_epoch_end();
            let (val_loss, val_accuracy) = evaluate(model, &*validation)?;

            tracing::info!(
                epoch,
                train_loss,
                train_accuracy,
                val_loss,
                val_accuracy,
                learning_rate,
                "epoch finished"
            );
            history.push(EpochMetrics {
                epoch,
                train_loss,
                train_accuracy,
                val_loss,
                val_accuracy,
                learning_rate,
            });

            let stop = stopper.update(epoch, val_loss, &model.head);
            optimizer.learning_rate = plateau.update(val_loss, optimizer.learning_rate);
            if stop {
                tracing::info!(epoch, best_epoch = stopper.best_epoch(), "early stopping");
                stopped_early = true;
                break;
            }
        }

        if let Some(best) = stopper.take_best_head() {
            model.head = best;
            tracing::info!(
                best_epoch = stopper.best_epoch(),
                best_val_loss = stopper.best(),
                "restored best weights"
            );
        }

        Ok(TrainingHistory {
            epochs: history,
            best_epoch: stopper.best_epoch(),
            best_val_loss: stopper.best(),
            stopped_early,
        })
    }
}
