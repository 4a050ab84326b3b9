// ─────────────────────────────────────────────────────────────────────
// MindTrack — Config
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use crate::constants::{CLASS_NAMES, FEATURE_LEN, IMAGE_SIZE, MODEL_FILE};
use crate::error::{MindTrackError, MindTrackResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level pipeline configuration.
/// Every field has a default, so `{}` is a valid config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub dataset: DatasetConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub trainer: TrainerConfig,
    #[serde(default)]
    pub inference: InferenceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Square side length images are resized to.
    #[serde(default = "default_image_size")]
    pub image_size: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Fraction of the shuffled samples held out as the validation suffix.
    #[serde(default = "default_validation_split")]
    pub validation_split: f64,
    /// Class subdirectories that must exist before training starts.
    #[serde(default = "default_expected_classes")]
    pub expected_classes: Vec<String>,
    /// Normalize training batches with a scaler fitted on the training split
    /// instead of per-batch z-scores.
    #[serde(default = "default_true")]
    pub fit_scaler: bool,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Output channels of each stride-2 backbone convolution.
    #[serde(default = "default_backbone_channels")]
    pub backbone_channels: Vec<usize>,
    /// Pretrained backbone archive; a seeded initialization is used when absent.
    ///
    /// Either a native archive (`backbone.conv{i}.kernel`) or an exported one
    /// with 4-D `conv{i}.weight` kernels, see `backbone_layout`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backbone_weights: Option<PathBuf>,
    /// Memory order of 4-D kernels in an exported archive.
    #[serde(default)]
    pub backbone_layout: KernelLayout,
    /// Batch-norm epsilon used when folding exported `conv{i}.bn.*` statistics.
    #[serde(default = "default_bn_epsilon")]
    pub backbone_bn_epsilon: f64,
    #[serde(default = "default_image_units")]
    pub image_units: usize,
    #[serde(default = "default_image_dropout")]
    pub image_dropout: f64,
    #[serde(default = "default_feature_units")]
    pub feature_units: usize,
    #[serde(default = "default_feature_dropout")]
    pub feature_dropout: f64,
    #[serde(default = "default_feature_len")]
    pub num_features: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

/// Axis order of a 4-D convolution kernel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KernelLayout {
    /// (kh, kw, c_in, c_out), as TensorFlow/Keras stores kernels.
    #[default]
    Hwio,
    /// (c_out, c_in, kh, kw), as PyTorch stores kernels.
    Oihw,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainerConfig {
    #[serde(default = "default_epochs")]
    pub epochs: usize,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    /// Epochs without validation-loss improvement before stopping.
    #[serde(default = "default_early_stopping_patience")]
    pub early_stopping_patience: usize,
    /// Epochs without improvement before the learning rate is reduced.
    #[serde(default = "default_lr_patience")]
    pub lr_patience: usize,
    #[serde(default = "default_lr_factor")]
    pub lr_factor: f64,
    #[serde(default = "default_min_lr")]
    pub min_lr: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// Model paths tried in order; the first existing one is loaded.
    #[serde(default = "default_model_candidates")]
    pub model_candidates: Vec<PathBuf>,
    /// Refuse to load a model that has no companion scaler.
    #[serde(default)]
    pub require_scaler: bool,
    #[serde(default = "default_image_size")]
    pub image_size: usize,
}

fn default_image_size() -> usize {
    IMAGE_SIZE
}
fn default_batch_size() -> usize {
    32
}
fn default_validation_split() -> f64 {
    0.2
}
fn default_expected_classes() -> Vec<String> {
    CLASS_NAMES.iter().map(|s| s.to_string()).collect()
}
fn default_true() -> bool {
    true
}
fn default_seed() -> u64 {
    42
}
fn default_backbone_channels() -> Vec<usize> {
    vec![16, 32, 64, 128]
}
fn default_bn_epsilon() -> f64 {
    1e-3
}
fn default_image_units() -> usize {
    128
}
fn default_image_dropout() -> f64 {
    0.5
}
fn default_feature_units() -> usize {
    32
}
fn default_feature_dropout() -> f64 {
    0.3
}
fn default_feature_len() -> usize {
    FEATURE_LEN
}
fn default_epochs() -> usize {
    20
}
fn default_learning_rate() -> f64 {
    0.001
}
fn default_early_stopping_patience() -> usize {
    5
}
fn default_lr_patience() -> usize {
    3
}
fn default_lr_factor() -> f64 {
    0.2
}
fn default_min_lr() -> f64 {
    1e-6
}
fn default_model_candidates() -> Vec<PathBuf> {
    vec![
        PathBuf::from(MODEL_FILE),
        PathBuf::from(".").join(MODEL_FILE),
        PathBuf::from("models").join(MODEL_FILE),
    ]
}

impl Default for DatasetConfig {
    fn default() -> Self {
        DatasetConfig {
            image_size: default_image_size(),
            batch_size: default_batch_size(),
            validation_split: default_validation_split(),
            expected_classes: default_expected_classes(),
            fit_scaler: default_true(),
            seed: default_seed(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig {
            backbone_channels: default_backbone_channels(),
            backbone_weights: None,
            backbone_layout: KernelLayout::default(),
            backbone_bn_epsilon: default_bn_epsilon(),
            image_units: default_image_units(),
            image_dropout: default_image_dropout(),
            feature_units: default_feature_units(),
            feature_dropout: default_feature_dropout(),
            num_features: default_feature_len(),
            seed: default_seed(),
        }
    }
}

impl Default for TrainerConfig {
    fn default() -> Self {
        TrainerConfig {
            epochs: default_epochs(),
            learning_rate: default_learning_rate(),
            early_stopping_patience: default_early_stopping_patience(),
            lr_patience: default_lr_patience(),
            lr_factor: default_lr_factor(),
            min_lr: default_min_lr(),
            seed: default_seed(),
        }
    }
}

impl Default for InferenceConfig {
    fn default() -> Self {
        InferenceConfig {
            model_candidates: default_model_candidates(),
            require_scaler: false,
            image_size: default_image_size(),
        }
    }
}

impl PipelineConfig {
    /// Load from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> MindTrackResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> MindTrackResult<()> {
        if self.dataset.batch_size == 0 {
            return Err(MindTrackError::ConfigError(
                "dataset.batch_size must be >= 1".to_string(),
            ));
        }
        if self.dataset.image_size == 0 || self.inference.image_size == 0 {
            return Err(MindTrackError::ConfigError(
                "image_size must be >= 1".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.dataset.validation_split) {
            return Err(MindTrackError::ConfigError(format!(
                "dataset.validation_split must be in [0, 1), got {}",
                self.dataset.validation_split
            )));
        }
        for (name, rate) in [
            ("model.image_dropout", self.model.image_dropout),
            ("model.feature_dropout", self.model.feature_dropout),
        ] {
            if !(0.0..1.0).contains(&rate) {
                return Err(MindTrackError::ConfigError(format!(
                    "{name} must be in [0, 1), got {rate}"
                )));
            }
        }
        if self.model.backbone_channels.is_empty() {
            return Err(MindTrackError::ConfigError(
                "model.backbone_channels must not be empty".to_string(),
            ));
        }
        if self.model.backbone_bn_epsilon.is_nan() || self.model.backbone_bn_epsilon <= 0.0 {
            return Err(MindTrackError::ConfigError(format!(
                "model.backbone_bn_epsilon must be positive, got {}",
                self.model.backbone_bn_epsilon
            )));
        }
        if self.model.num_features != FEATURE_LEN {
            return Err(MindTrackError::ConfigError(format!(
                "model.num_features must be {FEATURE_LEN}, got {}",
                self.model.num_features
            )));
        }
        if self.trainer.learning_rate <= 0.0 || self.trainer.min_lr <= 0.0 {
            return Err(MindTrackError::ConfigError(
                "learning rates must be positive".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.trainer.lr_factor) || self.trainer.lr_factor == 0.0 {
            return Err(MindTrackError::ConfigError(format!(
                "trainer.lr_factor must be in (0, 1), got {}",
                self.trainer.lr_factor
            )));
        }
        Ok(())
    }
}
