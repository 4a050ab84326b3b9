// ─────────────────────────────────────────────────────────────────────
// MindTrack — Threshold
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Otsu binarization and projection profiles.

use ndarray::{Array1, Array2, Axis};

/// Foreground (ink) value of a binarized image.
pub const INK: u8 = 255;

/// Otsu threshold maximizing between-class variance over the 256-bin histogram.
/// Uniform images have no valid split and yield 0.
pub fn otsu_threshold(gray: &Array2<u8>) -> u8 {
    let total = gray.len();
    if total == 0 {
        return 0;
    }

    let mut hist = [0usize; 256];
    for &v in gray.iter() {
        hist[v as usize] += 1;
    }

    let scale = 1.0 / total as f64;
    let mu: f64 = hist
        .iter()
        .enumerate()
        .map(|(i, &count)| i as f64 * count as f64 * scale)
        .sum();

    let eps = f32::EPSILON as f64;
    let mut q1 = 0.0;
    let mut mu1 = 0.0;
    let mut max_sigma = 0.0;
    let mut max_val = 0u8;

    for (i, &count) in hist.iter().enumerate() {
        let p_i = count as f64 * scale;
        mu1 *= q1;
        q1 += p_i;
        let q2 = 1.0 - q1;

        if q1.min(q2) < eps || q1.max(q2) > 1.0 - eps {
            continue;
        }

        mu1 = (mu1 + i as f64 * p_i) / q1;
        let mu2 = (mu - q1 * mu1) / q2;
        let sigma = q1 * q2 * (mu1 - mu2) * (mu1 - mu2);
        if sigma > max_sigma {
            max_sigma = sigma;
            max_val = i as u8;
        }
    }

    max_val
}

/// Inverse binary threshold: pixels above `threshold` become 0, the rest [`INK`].
pub fn binarize_inverse(gray: &Array2<u8>, threshold: u8) -> Array2<u8> {
    gray.mapv(|v| if v > threshold { 0 } else { INK })
}

/// Otsu threshold followed by inverse binarization; dark strokes become ink.
pub fn binarize_otsu_inverse(gray: &Array2<u8>) -> Array2<u8> {
    binarize_inverse(gray, otsu_threshold(gray))
}

/// Ink count per column (sum over rows / 255).
pub fn column_projection(binary: &Array2<u8>) -> Array1<f64> {
    binary.mapv(|v| v as f64).sum_axis(Axis(0)) / INK as f64
}

/// Ink count per row (sum over columns / 255).
pub fn row_projection(binary: &Array2<u8>) -> Array1<f64> {
    binary.mapv(|v| v as f64).sum_axis(Axis(1)) / INK as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_otsu_uniform_is_zero() {
        let gray = Array2::from_elem((10, 10), 180u8);
        assert_eq!(otsu_threshold(&gray), 0);
    }

    #[test]
    fn test_otsu_separates_two_levels() {
        let gray = Array2::from_shape_fn((10, 10), |(y, _)| if y < 5 { 40u8 } else { 200 });
        let t = otsu_threshold(&gray);
        assert!((40..200).contains(&t), "threshold {t} should split 40 / 200");
        let binary = binarize_otsu_inverse(&gray);
        assert_eq!(binary[[0, 0]], INK);
        assert_eq!(binary[[9, 9]], 0);
    }

    #[test]
    fn test_uniform_black_is_all_ink() {
        let gray = Array2::<u8>::zeros((4, 4));
        let binary = binarize_otsu_inverse(&gray);
        assert!(binary.iter().all(|&v| v == INK));
    }

    #[test]
    fn test_uniform_white_is_blank() {
        let gray = Array2::from_elem((4, 4), 255u8);
        let binary = binarize_otsu_inverse(&gray);
        assert!(binary.iter().all(|&v| v == 0));
    }

    #[test]
    fn test_projections_count_ink() {
        let mut binary = Array2::<u8>::zeros((3, 4));
        binary[[0, 1]] = INK;
        binary[[2, 1]] = INK;
        binary[[2, 3]] = INK;
        let cols = column_projection(&binary);
        let rows = row_projection(&binary);
        assert_eq!(cols.to_vec(), vec![0.0, 2.0, 0.0, 1.0]);
        assert_eq!(rows.to_vec(), vec![1.0, 0.0, 2.0]);
    }
}
