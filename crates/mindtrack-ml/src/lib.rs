// ─────────────────────────────────────────────────────────────────────
// MindTrack — ML
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Dysgraphia classification.
//!
//! Feature normalization, feature cache and batch generation, the fusion
//! classifier (frozen conv backbone + dense head), training with early
//! stopping, and single-image inference.

pub mod artifact;
pub mod cache;
pub mod dataset;
pub mod inference;
pub mod model;
pub mod normalize;
pub mod optim;
pub mod pipeline;
pub mod pretrained;
pub mod trainer;

pub use inference::{interpret, Assessment, ImageInput, InferenceContext, Label, Prediction};
pub use model::{FusionClassifier, ProbabilityModel};
pub use normalize::{normalize_features, normalize_vector, FeatureScaler};
pub use pipeline::{train_from_directory, TrainingOutcome};
pub use pretrained::{import_backbone, load_backbone};
