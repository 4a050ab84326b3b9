// ─────────────────────────────────────────────────────────────────────
// MindTrack — Vision
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Image decoding and handwriting feature extraction.
//!
//! Grayscale filters (Gaussian blur, Canny), Otsu binarization, projection
//! profiles and the three handwriting metrics packed into a fixed-length
//! feature vector.

pub mod decode;
pub mod features;
pub mod filters;
pub mod threshold;

pub use decode::{decode_bytes, decode_path, resize_square, to_tensor};
pub use features::{alignment, extract_features, letter_spacing, stroke_consistency};
