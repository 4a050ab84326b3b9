// ─────────────────────────────────────────────────────────────────────
// MindTrack — Inference
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Single-image prediction against a loaded model.
//!
//! [`InferenceContext`] owns the model and optional scaler; it is built once
//! and only read afterwards. Prediction never fails: a missing model yields
//! the stub answer and any processing error yields the error label with
//! confidence 0.

use crate::artifact::scaler_path_for;
use crate::model::{FusionClassifier, ProbabilityModel};
use crate::normalize::{normalize_vector, FeatureScaler};
use mindtrack_types::config::InferenceConfig;
use mindtrack_types::constants::{
    CHANNELS, FEATURE_LEN, LABEL_DYSGRAPHIC, LABEL_ERROR, LABEL_NON_DYSGRAPHIC, STUB_CONFIDENCE,
};
use mindtrack_types::error::{MindTrackError, MindTrackResult};
use mindtrack_vision::{decode_bytes, decode_path, extract_features, resize_square, to_tensor};
use image::DynamicImage;
use ndarray::{Array1, Array2, Array4, Axis};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Decision boundary on P(non-dysgraphic).
const DECISION_THRESHOLD: f64 = 0.5;

const STRONG: f64 = 0.8;
const MODERATE: f64 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Label {
    #[serde(rename = "Dysgraphic")]
    Dysgraphic,
    #[serde(rename = "Non-dysgraphic")]
    NonDysgraphic,
    #[serde(rename = "Error in prediction")]
    Error,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Dysgraphic => LABEL_DYSGRAPHIC,
            Label::NonDysgraphic => LABEL_NON_DYSGRAPHIC,
            Label::Error => LABEL_ERROR,
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: Label,
    pub confidence: f64,
}

impl Prediction {
    /// Map raw P(non-dysgraphic) to a label and the probability of that label.
    pub fn from_raw(raw: f64) -> Self {
        if raw > DECISION_THRESHOLD {
            Prediction {
                label: Label::NonDysgraphic,
                confidence: raw,
            }
        } else {
            Prediction {
                label: Label::Dysgraphic,
                confidence: 1.0 - raw,
            }
        }
    }

    pub fn stub() -> Self {
        Prediction {
            label: Label::NonDysgraphic,
            confidence: STUB_CONFIDENCE,
        }
    }

    pub fn error() -> Self {
        Prediction {
            label: Label::Error,
            confidence: 0.0,
        }
    }
}

/// Response shape handed to the HTTP layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub prediction: Label,
    pub confidence: f64,
    pub interpretation: String,
}

impl From<Prediction> for Assessment {
    fn from(p: Prediction) -> Self {
        Assessment {
            prediction: p.label,
            confidence: (p.confidence * 10_000.0).round() / 10_000.0,
            interpretation: interpret(p.label, p.confidence).to_string(),
        }
    }
}

/// Human-readable reading of a prediction.
pub fn interpret(label: Label, confidence: f64) -> &'static str {
    match label {
        Label::Dysgraphic if confidence > STRONG => {
            "Strong indication of dysgraphia. Consider professional assessment."
        }
        Label::Dysgraphic if confidence > MODERATE => {
            "Moderate indication of dysgraphia. Monitoring recommended."
        }
        Label::Dysgraphic => "Mild indication of dysgraphia. Further evaluation may be helpful.",
        _ if confidence > STRONG => "Writing appears typical for age group.",
        _ if confidence > MODERATE => "Generally typical writing with minor concerns.",
        _ => "Writing shows some areas for improvement but appears within normal range.",
    }
}

#[derive(Debug, Clone)]
pub enum ImageInput<'a> {
    Path(&'a Path),
    Bytes(&'a [u8]),
}

impl ImageInput<'_> {
    fn decode(&self) -> MindTrackResult<DynamicImage> {
        match self {
            ImageInput::Path(path) => decode_path(path),
            ImageInput::Bytes(bytes) => decode_bytes(bytes),
        }
    }
}

/// Model + scaler, loaded once and shared read-only.
pub struct InferenceContext {
    model: Option<Box<dyn ProbabilityModel + Send + Sync>>,
    scaler: Option<FeatureScaler>,
    source: Option<PathBuf>,
    image_size: usize,
}

impl fmt::Debug for InferenceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InferenceContext")
            .field("model_loaded", &self.model.is_some())
            .field("scaler", &self.scaler.is_some())
            .field("source", &self.source)
            .field("image_size", &self.image_size)
            .finish()
    }
}

impl InferenceContext {
    /// Try the candidate paths in order and load the first model that
    /// exists and passes a smoke prediction. No usable model is not an
    /// error: the context then answers with the stub prediction.
    pub fn load(config: &InferenceConfig) -> MindTrackResult<Self> {
        for candidate in &config.model_candidates {
            if !candidate.exists() {
                continue;
            }
            tracing::info!(path = %candidate.display(), "found model");
            match Self::load_from(candidate, config) {
                Ok(ctx) => return Ok(ctx),
                Err(e @ MindTrackError::ArtifactMissing(_)) => return Err(e),
                Err(e) => {
                    tracing::error!(path = %candidate.display(), error = %e, "failed to load model");
                }
            }
        }
        tracing::warn!("no dysgraphia model found; predictions will use the stub answer");
        Ok(Self::without_model(config.image_size))
    }

    /// Load a specific model file and its companion scaler.
    pub fn load_from(path: &Path, config: &InferenceConfig) -> MindTrackResult<Self> {
        let model = FusionClassifier::from_npz(path)?;

        let scaler_path = scaler_path_for(path);
        let scaler = if scaler_path.exists() {
            let scaler = FeatureScaler::from_npz(&scaler_path)?;
            tracing::info!(path = %scaler_path.display(), "feature scaler loaded");
            Some(scaler)
        } else if config.require_scaler {
            return Err(MindTrackError::ArtifactMissing(format!(
                "scaler {} required for model {}",
                scaler_path.display(),
                path.display()
            )));
        } else {
            tracing::warn!(
                path = %scaler_path.display(),
                "no feature scaler; single-image features normalize to zero"
            );
            None
        };

        smoke_test(&model, config.image_size)?;
        tracing::info!(path = %path.display(), "model loaded");

        Ok(InferenceContext {
            model: Some(Box::new(model)),
            scaler,
            source: Some(path.to_path_buf()),
            image_size: config.image_size,
        })
    }

    /// Context around an already-built model.
    pub fn with_model(
        model: impl ProbabilityModel + Send + Sync + 'static,
        scaler: Option<FeatureScaler>,
        image_size: usize,
    ) -> Self {
        InferenceContext {
            model: Some(Box::new(model)),
            scaler,
            source: None,
            image_size,
        }
    }

    pub fn without_model(image_size: usize) -> Self {
        InferenceContext {
            model: None,
            scaler: None,
            source: None,
            image_size,
        }
    }

    pub fn model_loaded(&self) -> bool {
        self.model.is_some()
    }

    pub fn model_source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn has_scaler(&self) -> bool {
        self.scaler.is_some()
    }

    pub fn predict(&self, input: ImageInput<'_>) -> Prediction {
        let Some(model) = &self.model else {
            tracing::debug!("model not available, returning stub prediction");
            return Prediction::stub();
        };
        match self.raw_probability(model.as_ref(), &input) {
            Ok(raw) => {
                let prediction = Prediction::from_raw(raw);
                tracing::debug!(raw, label = %prediction.label, "prediction");
                prediction
            }
            Err(e) => {
                tracing::error!(error = %e, "prediction failed");
                Prediction::error()
            }
        }
    }

    pub fn assess(&self, input: ImageInput<'_>) -> Assessment {
        self.predict(input).into()
    }

    fn raw_probability(
        &self,
        model: &(dyn ProbabilityModel + Send + Sync),
        input: &ImageInput<'_>,
    ) -> MindTrackResult<f64> {
        let image = input.decode()?;
        let images = to_tensor(&resize_square(&image, self.image_size)).insert_axis(Axis(0));

        // Features come from the decoded image at its own resolution.
        let features = Array1::from_vec(extract_features(&image).to_vec());
        let features = normalize_vector(features.view(), self.scaler.as_ref())?;

        let probs = model.predict_proba(&images, &features)?;
        let raw = probs
            .get(0)
            .copied()
            .ok_or_else(|| MindTrackError::Shape("model returned no prediction".to_string()))?;
        if !(0.0..=1.0).contains(&raw) {
            return Err(MindTrackError::Shape(format!(
                "model returned {raw}, expected a probability in [0, 1]"
            )));
        }
        Ok(raw)
    }
}

/// One forward pass on zero inputs to catch unusable weights at load time.
fn smoke_test(model: &FusionClassifier, image_size: usize) -> MindTrackResult<()> {
    let images = Array4::zeros((1, image_size, image_size, CHANNELS));
    let features = Array2::zeros((1, FEATURE_LEN));
    let out = model.predict_proba(&images, &features)?;
    if out.len() != 1 || !out[0].is_finite() {
        return Err(MindTrackError::Artifact(format!(
            "smoke prediction returned {out:?}"
        )));
    }
    Ok(())
}
