// ─────────────────────────────────────────────────────────────────────
// MindTrack — Training Pipeline
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Dataset directory → trained model and scaler artifacts.

use crate::artifact::scaler_path_for;
use crate::cache::FeatureCache;
use crate::dataset::{
    class_indices, scan_samples, split_samples, validate_dataset, BatchGenerator,
};
use crate::model::FusionClassifier;
use crate::normalize::FeatureScaler;
use crate::trainer::{Trainer, TrainingHistory};
use mindtrack_types::config::PipelineConfig;
use mindtrack_types::error::MindTrackResult;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub model_path: PathBuf,
    /// Set only when a scaler was fitted and written.
    pub scaler_path: Option<PathBuf>,
    pub class_indices: BTreeMap<String, u8>,
    pub train_samples: usize,
    pub val_samples: usize,
    pub history: TrainingHistory,
}

/// Validate, cache features, split, fit the scaler, train and save.
///
/// With `dataset.fit_scaler` the scaler is fitted on the training split's raw
/// features and saved next to the model as `<stem>_scaler.npz`.
pub fn train_from_directory(
    data_dir: &Path,
    output: &Path,
    config: &PipelineConfig,
) -> MindTrackResult<TrainingOutcome> {
    config.validate()?;
    let ds = &config.dataset;

    validate_dataset(data_dir, &ds.expected_classes)?;
    let cache = FeatureCache::build_or_load(data_dir, ds.image_size)?;

    let classes = class_indices(&cache.processed_dir)?;
    tracing::info!(?classes, "class indices");

    let samples = scan_samples(&cache.processed_dir, &classes, &cache.features)?;
    let mut rng = StdRng::seed_from_u64(ds.seed);
    let (train_samples, val_samples) = split_samples(samples, ds.validation_split, &mut rng);
    let (n_train, n_val) = (train_samples.len(), val_samples.len());

    let features = Arc::new(cache.features);
    let mut train = BatchGenerator::new(
        train_samples,
        Arc::clone(&features),
        ds.batch_size,
        ds.image_size,
        ds.seed,
    );
    let mut validation = BatchGenerator::new(
        val_samples,
        features,
        ds.batch_size,
        ds.image_size,
        ds.seed.wrapping_add(1),
    );

    // Without a fitted scaler batches fall back to per-batch z-scores.
    let scaler = match (ds.fit_scaler, n_train) {
        (false, _) => None,
        (true, 0) => {
            tracing::warn!("no training samples; scaler not fitted");
            None
        }
        (true, _) => Some(FeatureScaler::fit(train.raw_features().view())?),
    };
    if let Some(s) = &scaler {
        train = train.with_scaler(s.clone());
        validation = validation.with_scaler(s.clone());
    }

    let mut model = FusionClassifier::new(&config.model)?;
    let mut trainer = Trainer::new(config.trainer.clone());
    let history = trainer.fit(&mut model, &mut train, &mut validation, config.trainer.epochs)?;

    model.save_npz(output)?;
    let scaler_path = match &scaler {
        Some(s) => {
            let path = scaler_path_for(output);
            s.save_npz(&path)?;
            Some(path)
        }
        None => None,
    };
    tracing::info!(
        model = %output.display(),
        scaler = ?scaler_path,
        best_epoch = history.best_epoch,
        best_val_loss = history.best_val_loss,
        "saved model"
    );

    Ok(TrainingOutcome {
        model_path: output.to_path_buf(),
        scaler_path,
        class_indices: classes,
        train_samples: n_train,
        val_samples: n_val,
        history,
    })
}
