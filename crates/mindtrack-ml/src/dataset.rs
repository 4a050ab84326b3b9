// ─────────────────────────────────────────────────────────────────────
// MindTrack — Dataset
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Dataset scanning, train/validation split and batch generation.
//!
//! A dataset is a directory with one subdirectory per class. Class indices
//! follow the sorted directory names, so `dysgraphic` = 0 and
//! `non-dysgraphic` = 1.

use crate::cache::{feature_key, FeatureMap};
use crate::normalize::{normalize_features, FeatureScaler};
use mindtrack_types::constants::{CHANNELS, FEATURE_LEN, IMAGE_EXTENSIONS, PROCESSED_DIR};
use mindtrack_types::error::{MindTrackError, MindTrackResult};
use mindtrack_vision::{decode_path, resize_square, to_tensor};
use ndarray::{s, Array1, Array2, Array4};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Number of class directories a dataset must contain.
pub const NUM_CLASSES: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub path: PathBuf,
    /// `"class/filename"`, the feature-cache key.
    pub key: String,
    pub label: u8,
}

/// One batch: images (n, h, w, 3) in [0, 1] and features (n, 15).
#[derive(Debug, Clone)]
pub struct Batch {
    pub images: Array4<f64>,
    pub features: Array2<f64>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.features.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Indexed batch provider consumed by the trainer.
pub trait BatchSource {
    fn num_batches(&self) -> usize;
    fn get_batch(&self, index: usize) -> MindTrackResult<(Batch, Array1<f64>)>;
    fn on_epoch_end(&mut self);
    fn sample_count(&self) -> usize;
}

pub fn is_image_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .map(|ext| {
                let ext = ext.to_string_lossy().to_lowercase();
                IMAGE_EXTENSIONS.contains(&ext.as_str())
            })
            .unwrap_or(false)
}

/// Directory entries sorted by path.
pub(crate) fn sorted_entries(dir: &Path) -> MindTrackResult<Vec<PathBuf>> {
    let mut entries = std::fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()?;
    entries.sort();
    Ok(entries)
}

fn class_dirs(dir: &Path) -> MindTrackResult<Vec<String>> {
    Ok(sorted_entries(dir)?
        .into_iter()
        .filter(|p| p.is_dir())
        .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .filter(|name| name != PROCESSED_DIR)
        .collect())
}

/// Class name → index over sorted class directory names.
pub fn class_indices(dir: &Path) -> MindTrackResult<BTreeMap<String, u8>> {
    let names = class_dirs(dir)?;
    if names.len() != NUM_CLASSES {
        return Err(MindTrackError::DatasetStructure(format!(
            "expected {NUM_CLASSES} class directories in {}, found {:?}",
            dir.display(),
            names
        )));
    }
    Ok(names
        .into_iter()
        .enumerate()
        .map(|(i, name)| (name, i as u8))
        .collect())
}

/// Every image under the class directories in sorted order. With a non-empty
/// `features` map, images without a cache entry are skipped.
pub fn scan_samples(
    dir: &Path,
    classes: &BTreeMap<String, u8>,
    features: &FeatureMap,
) -> MindTrackResult<Vec<Sample>> {
    let mut samples = Vec::new();
    for (class_name, &label) in classes {
        let class_dir = dir.join(class_name);
        if !class_dir.is_dir() {
            continue;
        }
        for path in sorted_entries(&class_dir)? {
            if !is_image_file(&path) {
                continue;
            }
            let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };
            let key = feature_key(class_name, &name);
            if !features.is_empty() && !features.contains_key(&key) {
                continue;
            }
            samples.push(Sample { path, key, label });
        }
    }
    tracing::debug!(samples = samples.len(), dir = %dir.display(), "scanned dataset");
    Ok(samples)
}

/// Shuffle once, then split into a training prefix and validation suffix
/// at `floor(n · (1 − validation_split))`.
pub fn split_samples(
    mut samples: Vec<Sample>,
    validation_split: f64,
    rng: &mut StdRng,
) -> (Vec<Sample>, Vec<Sample>) {
    samples.shuffle(rng);
    let cut = (samples.len() as f64 * (1.0 - validation_split)).floor() as usize;
    let validation = samples.split_off(cut.min(samples.len()));
    (samples, validation)
}

/// Check the class directories exist and report per-class image counts.
pub fn validate_dataset(
    data_dir: &Path,
    expected_classes: &[String],
) -> MindTrackResult<BTreeMap<String, usize>> {
    if !data_dir.is_dir() {
        return Err(MindTrackError::DatasetStructure(format!(
            "data directory {} does not exist",
            data_dir.display()
        )));
    }

    let mut counts = BTreeMap::new();
    for class_name in expected_classes {
        let class_dir = data_dir.join(class_name);
        if !class_dir.is_dir() {
            return Err(MindTrackError::DatasetStructure(format!(
                "missing class directory {}",
                class_dir.display()
            )));
        }
        let count = sorted_entries(&class_dir)?
            .iter()
            .filter(|p| is_image_file(p))
            .count();
        if count == 0 {
            tracing::warn!(class = %class_name, "class directory has no images");
        } else {
            tracing::info!(class = %class_name, images = count, "found class images");
        }
        counts.insert(class_name.clone(), count);
    }
    Ok(counts)
}

/// Image + feature batches over a fixed sample list.
#[derive(Debug, Clone)]
pub struct BatchGenerator {
    samples: Vec<Sample>,
    features: Arc<FeatureMap>,
    batch_size: usize,
    image_size: usize,
    scaler: Option<FeatureScaler>,
    rng: StdRng,
}

impl BatchGenerator {
    pub fn new(
        samples: Vec<Sample>,
        features: Arc<FeatureMap>,
        batch_size: usize,
        image_size: usize,
        seed: u64,
    ) -> Self {
        tracing::info!(images = samples.len(), "created batch generator");
        BatchGenerator {
            samples,
            features,
            batch_size: batch_size.max(1),
            image_size,
            scaler: None,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Normalize with a fitted scaler instead of per-batch z-scores.
    pub fn with_scaler(mut self, scaler: FeatureScaler) -> Self {
        self.scaler = Some(scaler);
        self
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Raw (un-normalized) cached features for every sample, zeros when absent.
    pub fn raw_features(&self) -> Array2<f64> {
        let mut out = Array2::zeros((self.samples.len(), FEATURE_LEN));
        for (i, sample) in self.samples.iter().enumerate() {
            if let Some(f) = self.features.get(&sample.key) {
                out.row_mut(i).assign(&Array1::from_vec(f.to_vec()));
            }
        }
        out
    }

    fn placeholder(&self) -> (Batch, Array1<f64>) {
        let batch = Batch {
            images: Array4::zeros((1, self.image_size, self.image_size, CHANNELS)),
            features: Array2::zeros((1, FEATURE_LEN)),
        };
        (batch, Array1::zeros(1))
    }
}

impl BatchSource for BatchGenerator {
    fn num_batches(&self) -> usize {
        self.samples.len().div_ceil(self.batch_size).max(1)
    }

    fn get_batch(&self, index: usize) -> MindTrackResult<(Batch, Array1<f64>)> {
        if self.samples.is_empty() {
            return Ok(self.placeholder());
        }
        if index >= self.num_batches() {
            return Err(MindTrackError::ConfigError(format!(
                "batch index {index} out of range for {} batches",
                self.num_batches()
            )));
        }

        let start = index * self.batch_size;
        let end = (start + self.batch_size).min(self.samples.len());
        let chunk = &self.samples[start..end];
        let n = chunk.len();

        let size = self.image_size;
        let mut images = Array4::<f64>::zeros((n, size, size, CHANNELS));
        let mut features = Array2::<f64>::zeros((n, FEATURE_LEN));
        let mut labels = Array1::<f64>::zeros(n);

        for (i, sample) in chunk.iter().enumerate() {
            labels[i] = f64::from(sample.label);
            match decode_path(&sample.path) {
                Ok(image) => {
                    let tensor = to_tensor(&resize_square(&image, size));
                    images.slice_mut(s![i, .., .., ..]).assign(&tensor);
                    if let Some(f) = self.features.get(&sample.key) {
                        features.row_mut(i).assign(&Array1::from_vec(f.to_vec()));
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "substituting zeros for unreadable sample");
                }
            }
        }

        if features.iter().any(|&v| v != 0.0) {
            features = normalize_features(features.view(), self.scaler.as_ref())?;
        }

        Ok((Batch { images, features }, labels))
    }

    fn on_epoch_end(&mut self) {
        self.samples.shuffle(&mut self.rng);
    }

    fn sample_count(&self) -> usize {
        self.samples.len()
    }
}
