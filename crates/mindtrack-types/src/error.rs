// ─────────────────────────────────────────────────────────────────────
// MindTrack — Error
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MindTrackError {
    #[error("Failed to decode image {path}: {message}")]
    Decode { path: PathBuf, message: String },

    #[error("Artifact not found: {0}")]
    ArtifactMissing(String),

    #[error("Corrupt artifact: {0}")]
    Artifact(String),

    #[error("Invalid dataset structure: {0}")]
    DatasetStructure(String),

    #[error("Shape mismatch: {0}")]
    Shape(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl MindTrackError {
    /// Decode failure for an in-memory or on-disk image.
    pub fn decode(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        MindTrackError::Decode {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

pub type MindTrackResult<T> = Result<T, MindTrackError>;
