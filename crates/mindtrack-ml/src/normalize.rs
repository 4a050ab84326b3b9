// ─────────────────────────────────────────────────────────────────────
// MindTrack — Feature Normalizer
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Z-score feature normalization.
//!
//! With a fitted [`FeatureScaler`] each column is centred and scaled by the
//! training statistics. Without one, each column is z-scored over the
//! batch itself. Either way non-finite results become 0.0.

use crate::artifact::{create_npz, finish_npz, open_npz, read_array, write_array};
use mindtrack_types::constants::FEATURE_LEN;
use mindtrack_types::error::{MindTrackError, MindTrackResult};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use std::path::Path;

/// Per-feature standardization fitted over a training population.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureScaler {
    pub mean: Array1<f64>,
    /// Population std per feature; zero-variance columns are stored as 1.0.
    pub scale: Array1<f64>,
}

impl FeatureScaler {
    /// Fit on a (n_samples, n_features) matrix.
    pub fn fit(batch: ArrayView2<f64>) -> MindTrackResult<Self> {
        let mean = batch.mean_axis(Axis(0)).ok_or_else(|| {
            MindTrackError::Shape("cannot fit a scaler on zero samples".to_string())
        })?;
        let scale = batch
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s > 0.0 && s.is_finite() { s } else { 1.0 });
        Ok(FeatureScaler { mean, scale })
    }

    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    /// `(x - mean) / scale` per column.
    pub fn transform(&self, batch: ArrayView2<f64>) -> MindTrackResult<Array2<f64>> {
        if batch.ncols() != self.n_features() {
            return Err(MindTrackError::Shape(format!(
                "scaler fitted on {} features, got {}",
                self.n_features(),
                batch.ncols()
            )));
        }
        Ok(((&batch - &self.mean) / &self.scale).mapv(finite_or_zero))
    }

    pub fn save_npz(&self, path: &Path) -> MindTrackResult<()> {
        let mut npz = create_npz(path)?;
        write_array(&mut npz, "mean", &self.mean)?;
        write_array(&mut npz, "scale", &self.scale)?;
        finish_npz(npz, path)
    }

    pub fn from_npz(path: &Path) -> MindTrackResult<Self> {
        let mut npz = open_npz(path)?;
        let scaler = FeatureScaler {
            mean: read_array(&mut npz, "mean")?,
            scale: read_array(&mut npz, "scale")?,
        };
        if scaler.mean.len() != FEATURE_LEN || scaler.scale.len() != FEATURE_LEN {
            return Err(MindTrackError::Artifact(format!(
                "Invalid scaler lengths mean={}, scale={}, expected {FEATURE_LEN}",
                scaler.mean.len(),
                scaler.scale.len()
            )));
        }
        Ok(scaler)
    }
}

fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

/// Column-wise z-score over the batch (population std). Zero-variance
/// columns divide by zero and are coerced to 0.0.
pub fn zscore_columns(batch: ArrayView2<f64>) -> Array2<f64> {
    let Some(mean) = batch.mean_axis(Axis(0)) else {
        return batch.to_owned();
    };
    let std = batch.std_axis(Axis(0), 0.0);
    let degenerate = std.iter().filter(|&&s| s == 0.0 || !s.is_finite()).count();
    if degenerate > 0 {
        tracing::debug!(
            degenerate,
            rows = batch.nrows(),
            "zero-variance feature columns normalized to 0"
        );
    }
    ((&batch - &mean) / &std).mapv(finite_or_zero)
}

/// Normalize a feature batch with the fitted scaler, or z-score it over
/// itself when no scaler is available.
pub fn normalize_features(
    batch: ArrayView2<f64>,
    scaler: Option<&FeatureScaler>,
) -> MindTrackResult<Array2<f64>> {
    match scaler {
        Some(s) => s.transform(batch),
        None => Ok(zscore_columns(batch)),
    }
}

/// Single vector as a batch of one; the result has shape `(1, n)`.
///
/// Without a scaler every column of a one-row batch has zero variance,
/// so the output is all zeros.
pub fn normalize_vector(
    features: ArrayView1<f64>,
    scaler: Option<&FeatureScaler>,
) -> MindTrackResult<Array2<f64>> {
    normalize_features(features.insert_axis(Axis(0)), scaler)
}
