// ─────────────────────────────────────────────────────────────────────
// MindTrack — Constants
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
/// Length of every handwriting feature vector.
pub const FEATURE_LEN: usize = 15;

/// Number of slots filled by computed metrics; the rest stay zero.
pub const COMPUTED_FEATURES: usize = 3;

/// Side of the square resolution every image is resized to.
pub const IMAGE_SIZE: usize = 224;

/// Color channels of the image tensor (RGB).
pub const CHANNELS: usize = 3;

/// Class directory names in index order (sorted).
pub const CLASS_NAMES: [&str; 2] = ["dysgraphic", "non-dysgraphic"];

/// Image file extensions accepted by the dataset scanner.
pub const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Marker directory whose presence means the feature cache was built.
pub const PROCESSED_DIR: &str = "processed";

/// Feature cache file written next to the marker directory.
pub const FEATURE_CACHE_FILE: &str = "handwriting_features.json";

/// Suffix appended to the model file stem for the companion scaler.
pub const SCALER_SUFFIX: &str = "_scaler";

/// Default model weights file name.
pub const MODEL_FILE: &str = "dysgraphia_model.npz";

/// Label strings shared with external consumers.
pub const LABEL_DYSGRAPHIC: &str = "Dysgraphic";
pub const LABEL_NON_DYSGRAPHIC: &str = "Non-dysgraphic";
pub const LABEL_ERROR: &str = "Error in prediction";

/// Confidence reported when no trained model is available.
pub const STUB_CONFIDENCE: f64 = 0.75;
