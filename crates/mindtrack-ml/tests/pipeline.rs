// ─────────────────────────────────────────────────────────────────────
// MindTrack — End-to-End Pipeline Tests
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Dataset directory → training → artifacts → inference.

use image::{Rgb, RgbImage};
use mindtrack_ml::inference::{ImageInput, InferenceContext, Label};
use mindtrack_ml::train_from_directory;
use mindtrack_types::config::{InferenceConfig, PipelineConfig};
use mindtrack_types::constants::{FEATURE_CACHE_FILE, PROCESSED_DIR};
use mindtrack_types::error::MindTrackError;
use std::fs;
use std::path::Path;

/// Ruled page; dysgraphic pages get ragged margins and uneven letter gaps.
fn write_page(path: &Path, ragged: bool, variant: u32) {
    let img = RgbImage::from_fn(64, 64, |x, y| {
        let line = y / 16;
        let in_line = (3..11).contains(&(y % 16));
        let margin = if ragged { 4 + (line * 7 + variant) % 12 } else { 6 };
        let gap = if ragged { 3 + (x / 9 + variant) % 4 } else { 4 };
        if in_line && x >= margin && x < 58 && x % gap == 0 {
            Rgb([10, 10, 10])
        } else {
            Rgb([245, 245, 245])
        }
    });
    img.save(path).unwrap();
}

fn build_dataset(root: &Path, per_class: u32) {
    for (class, ragged) in [("dysgraphic", true), ("non-dysgraphic", false)] {
        let dir = root.join(class);
        fs::create_dir_all(&dir).unwrap();
        for i in 0..per_class {
            write_page(&dir.join(format!("page_{i:02}.png")), ragged, i);
        }
    }
}

fn small_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.dataset.image_size = 16;
    config.dataset.batch_size = 4;
    config.model.backbone_channels = vec![4, 8];
    config.model.image_units = 8;
    config.model.feature_units = 4;
    config.trainer.epochs = 3;
    config.inference.image_size = 16;
    config
}

#[test]
fn test_train_save_load_predict() {
    let data = tempfile::tempdir().unwrap();
    build_dataset(data.path(), 6);
    let out = tempfile::tempdir().unwrap();
    let model_path = out.path().join("models").join("dysgraphia_model.npz");

    let config = small_config();
    let outcome = train_from_directory(data.path(), &model_path, &config).unwrap();

    assert_eq!(outcome.train_samples + outcome.val_samples, 12);
    // floor(12 × 0.8) = 9
    assert_eq!(outcome.train_samples, 9);
    assert_eq!(outcome.class_indices["dysgraphic"], 0);
    assert_eq!(outcome.class_indices["non-dysgraphic"], 1);
    assert!(!outcome.history.epochs.is_empty());
    assert!(outcome.history.epochs.len() <= 3);
    assert!(model_path.exists());
    let scaler_path = outcome.scaler_path.clone().unwrap();
    assert_eq!(
        scaler_path.file_name().unwrap().to_string_lossy(),
        "dysgraphia_model_scaler.npz"
    );
    assert!(scaler_path.exists());

    assert!(data.path().join(PROCESSED_DIR).join("dysgraphic").is_dir());
    assert!(data.path().join(FEATURE_CACHE_FILE).exists());

    let inference = InferenceConfig {
        model_candidates: vec![out.path().join("missing.npz"), model_path.clone()],
        require_scaler: true,
        image_size: 16,
    };
    let ctx = InferenceContext::load(&inference).unwrap();
    assert!(ctx.model_loaded());
    assert!(ctx.has_scaler());
    assert_eq!(ctx.model_source(), Some(model_path.as_path()));

    let sample = data.path().join("dysgraphic").join("page_00.png");
    let prediction = ctx.predict(ImageInput::Path(&sample));
    assert_ne!(prediction.label, Label::Error);
    assert!((0.5..=1.0).contains(&prediction.confidence));

    let bytes = fs::read(&sample).unwrap();
    let from_bytes = ctx.predict(ImageInput::Bytes(&bytes));
    assert_eq!(from_bytes, prediction);

    let assessment = ctx.assess(ImageInput::Path(&sample));
    assert_eq!(assessment.prediction, prediction.label);
    assert!(!assessment.interpretation.is_empty());
}

#[test]
fn test_require_scaler_rejects_bare_model() {
    let data = tempfile::tempdir().unwrap();
    build_dataset(data.path(), 3);
    let out = tempfile::tempdir().unwrap();
    let model_path = out.path().join("dysgraphia_model.npz");

    let mut config = small_config();
    config.trainer.epochs = 1;
    config.dataset.fit_scaler = false;
    let outcome = train_from_directory(data.path(), &model_path, &config).unwrap();
    assert!(outcome.scaler_path.is_none());

    let strict = InferenceConfig {
        model_candidates: vec![model_path.clone()],
        require_scaler: true,
        image_size: 16,
    };
    assert!(matches!(
        InferenceContext::load(&strict),
        Err(MindTrackError::ArtifactMissing(_))
    ));

    let lenient = InferenceConfig {
        require_scaler: false,
        ..strict
    };
    let ctx = InferenceContext::load(&lenient).unwrap();
    assert!(ctx.model_loaded());
    assert!(!ctx.has_scaler());
}

#[test]
fn test_missing_class_directory_is_fatal() {
    let data = tempfile::tempdir().unwrap();
    fs::create_dir_all(data.path().join("dysgraphic")).unwrap();
    let out = tempfile::tempdir().unwrap();
    let result = train_from_directory(
        data.path(),
        &out.path().join("dysgraphia_model.npz"),
        &small_config(),
    );
    assert!(matches!(result, Err(MindTrackError::DatasetStructure(_))));
    assert!(!data.path().join(PROCESSED_DIR).exists());
}

#[test]
fn test_corrupt_candidate_falls_through_to_stub() {
    let dir = tempfile::tempdir().unwrap();
    let bogus = dir.path().join("dysgraphia_model.npz");
    fs::write(&bogus, b"not an archive").unwrap();
    let config = InferenceConfig {
        model_candidates: vec![bogus],
        require_scaler: false,
        image_size: 16,
    };
    let ctx = InferenceContext::load(&config).unwrap();
    assert!(!ctx.model_loaded());
    let p = ctx.predict(ImageInput::Bytes(b"irrelevant"));
    assert_eq!(p.label, Label::NonDysgraphic);
    assert_eq!(p.confidence, 0.75);
}
