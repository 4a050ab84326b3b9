// ─────────────────────────────────────────────────────────────────────
// MindTrack — Handwriting Features
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Handwriting metrics derived from a grayscale rendering.
//!
//! Three scalar metrics fill slots 0–2 of a fixed 15-slot vector:
//! stroke consistency (edge-intensity spread), letter spacing variability
//! (peak distances in the column profile) and alignment variability
//! (left-margin spread across detected text lines). Slots 3–14 are
//! reserved and always zero. No randomness anywhere.

use crate::decode::{gray_to_array, to_grayscale};
use crate::filters::{canny, gaussian_blur_5x5};
use crate::threshold::{binarize_otsu_inverse, column_projection, row_projection, INK};
use image::DynamicImage;
use mindtrack_types::constants::{COMPUTED_FEATURES, FEATURE_LEN};
use ndarray::Array2;

/// Canny hysteresis thresholds.
const CANNY_LOW: f64 = 50.0;
const CANNY_HIGH: f64 = 150.0;

/// Minimum column ink count for a spacing peak.
const PEAK_FLOOR: f64 = 5.0;

/// A row is text when its ink count exceeds this fraction of the width.
const TEXT_ROW_FRACTION: f64 = 0.1;

/// Rows further apart than this start a new line.
const MAX_ROW_GAP: usize = 2;

/// Lines with fewer rows are treated as noise.
const MIN_LINE_ROWS: usize = 6;

/// Slot indices in the feature vector.
pub const SLOT_STROKE_CONSISTENCY: usize = 0;
pub const SLOT_LETTER_SPACING: usize = 1;
pub const SLOT_ALIGNMENT: usize = 2;

const _: () = assert!(SLOT_ALIGNMENT < COMPUTED_FEATURES && COMPUTED_FEATURES <= FEATURE_LEN);

/// Population standard deviation (ddof = 0). Empty input → 0.
fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    var.sqrt()
}

/// Strict local maxima above `floor`, endpoints excluded.
pub fn find_peaks(signal: &[f64], floor: f64) -> Vec<usize> {
    if signal.len() < 3 {
        return Vec::new();
    }
    (1..signal.len() - 1)
        .filter(|&i| signal[i] > signal[i - 1] && signal[i] > signal[i + 1] && signal[i] > floor)
        .collect()
}

/// Group sorted row indices into `(first, last)` line segments.
///
/// Rows at most `max_gap` apart join the current segment; segments with
/// fewer than `min_rows` rows are dropped.
pub fn group_lines(rows: &[usize], max_gap: usize, min_rows: usize) -> Vec<(usize, usize)> {
    let mut lines = Vec::new();
    let Some(&first) = rows.first() else {
        return lines;
    };

    let (mut start, mut prev, mut count) = (first, first, 1usize);
    for &row in &rows[1..] {
        if row - prev <= max_gap {
            count += 1;
        } else {
            if count >= min_rows {
                lines.push((start, prev));
            }
            start = row;
            count = 1;
        }
        prev = row;
    }
    if count >= min_rows {
        lines.push((start, prev));
    }
    lines
}

pub fn stroke_consistency_gray(gray: &Array2<u8>) -> f64 {
    let blurred = gaussian_blur_5x5(gray);
    let edges = canny(&blurred, CANNY_LOW, CANNY_HIGH);
    let edge_values: Vec<f64> = edges
        .iter()
        .filter(|&&v| v > 0)
        .map(|&v| v as f64)
        .collect();
    if edge_values.is_empty() {
        return 0.0;
    }
    std_dev(&edge_values) / 255.0
}

pub fn letter_spacing_binary(binary: &Array2<u8>) -> f64 {
    let width = binary.ncols();
    if width == 0 {
        return 0.0;
    }
    let projection = column_projection(binary).to_vec();
    let peaks = find_peaks(&projection, PEAK_FLOOR);
    if peaks.len() < 2 {
        return 0.0;
    }
    let distances: Vec<f64> = peaks.windows(2).map(|p| (p[1] - p[0]) as f64).collect();
    std_dev(&distances) / width as f64
}

pub fn alignment_binary(binary: &Array2<u8>) -> f64 {
    let width = binary.ncols();
    if width == 0 {
        return 0.0;
    }
    let projection = row_projection(binary);
    let min_ink = width as f64 * TEXT_ROW_FRACTION;
    let text_rows: Vec<usize> = projection
        .iter()
        .enumerate()
        .filter(|&(_, &ink)| ink > min_ink)
        .map(|(i, _)| i)
        .collect();

    let margins: Vec<f64> = group_lines(&text_rows, MAX_ROW_GAP, MIN_LINE_ROWS)
        .into_iter()
        .filter_map(|(first, last)| {
            // Band excludes the last row of the segment.
            (0..width)
                .find(|&col| (first..last).any(|row| binary[[row, col]] == INK))
                .map(|col| col as f64)
        })
        .collect();

    if margins.len() < 2 {
        return 0.0;
    }
    std_dev(&margins) / width as f64
}

/// Spread of Canny edge intensities over edge pixels, scaled to [0, 1].
pub fn stroke_consistency(image: &DynamicImage) -> f64 {
    stroke_consistency_gray(&gray_to_array(&to_grayscale(image)))
}

/// Variability of distances between column-profile peaks, over image width.
pub fn letter_spacing(image: &DynamicImage) -> f64 {
    let gray = gray_to_array(&to_grayscale(image));
    letter_spacing_binary(&binarize_otsu_inverse(&gray))
}

/// Variability of text-line left margins, over image width.
pub fn alignment(image: &DynamicImage) -> f64 {
    let gray = gray_to_array(&to_grayscale(image));
    alignment_binary(&binarize_otsu_inverse(&gray))
}

/// Fixed-length handwriting feature vector; slots past the computed
/// metrics stay zero.
pub fn extract_features(image: &DynamicImage) -> [f64; FEATURE_LEN] {
    let gray = gray_to_array(&to_grayscale(image));
    extract_features_gray(&gray)
}

/// [`extract_features`] over an already-grayscale intensity grid.
pub fn extract_features_gray(gray: &Array2<u8>) -> [f64; FEATURE_LEN] {
    let binary = binarize_otsu_inverse(gray);
    let mut features = [0.0; FEATURE_LEN];
    features[SLOT_STROKE_CONSISTENCY] = stroke_consistency_gray(gray);
    features[SLOT_LETTER_SPACING] = letter_spacing_binary(&binary);
    features[SLOT_ALIGNMENT] = alignment_binary(&binary);
    tracing::trace!(
        stroke_consistency = features[SLOT_STROKE_CONSISTENCY],
        letter_spacing = features[SLOT_LETTER_SPACING],
        alignment = features[SLOT_ALIGNMENT],
        "extracted handwriting features"
    );
    features
}
