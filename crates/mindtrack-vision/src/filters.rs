// ─────────────────────────────────────────────────────────────────────
// MindTrack — Filters
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Grayscale smoothing and Canny edge detection.

use ndarray::Array2;

/// 5-tap binomial kernel (σ derived from the kernel size).
const GAUSS_5: [f64; 5] = [0.0625, 0.25, 0.375, 0.25, 0.0625];

/// Edge pixel value in the Canny output map.
pub const EDGE: u8 = 255;

/// Reflect-101 border index: `-1 → 1`, `n → n - 2`.
fn reflect101(i: isize, n: usize) -> usize {
    if n == 1 {
        return 0;
    }
    let n = n as isize;
    let mut i = i;
    loop {
        if i < 0 {
            i = -i;
        } else if i >= n {
            i = 2 * n - 2 - i;
        } else {
            return i as usize;
        }
    }
}

/// Replicate border index.
fn clamp_index(i: isize, n: usize) -> usize {
    i.clamp(0, n as isize - 1) as usize
}

/// Separable 5×5 Gaussian blur with reflect-101 borders.
pub fn gaussian_blur_5x5(gray: &Array2<u8>) -> Array2<u8> {
    let (h, w) = gray.dim();
    if h == 0 || w == 0 {
        return gray.clone();
    }

    let mut horizontal = Array2::<f64>::zeros((h, w));
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0;
            for (k, &weight) in GAUSS_5.iter().enumerate() {
                let xx = reflect101(x as isize + k as isize - 2, w);
                acc += weight * gray[[y, xx]] as f64;
            }
            horizontal[[y, x]] = acc;
        }
    }

    Array2::from_shape_fn((h, w), |(y, x)| {
        let mut acc = 0.0;
        for (k, &weight) in GAUSS_5.iter().enumerate() {
            let yy = reflect101(y as isize + k as isize - 2, h);
            acc += weight * horizontal[[yy, x]];
        }
        acc.round().clamp(0.0, 255.0) as u8
    })
}

/// 3×3 Sobel derivatives (dx, dy) with replicated borders.
pub fn sobel(gray: &Array2<u8>) -> (Array2<i32>, Array2<i32>) {
    let (h, w) = gray.dim();
    let mut dx = Array2::<i32>::zeros((h, w));
    let mut dy = Array2::<i32>::zeros((h, w));
    if h == 0 || w == 0 {
        return (dx, dy);
    }

    let px = |y: isize, x: isize| gray[[clamp_index(y, h), clamp_index(x, w)]] as i32;

    for y in 0..h as isize {
        for x in 0..w as isize {
            let gx = (px(y - 1, x + 1) + 2 * px(y, x + 1) + px(y + 1, x + 1))
                - (px(y - 1, x - 1) + 2 * px(y, x - 1) + px(y + 1, x - 1));
            let gy = (px(y + 1, x - 1) + 2 * px(y + 1, x) + px(y + 1, x + 1))
                - (px(y - 1, x - 1) + 2 * px(y - 1, x) + px(y - 1, x + 1));
            dx[[y as usize, x as usize]] = gx;
            dy[[y as usize, x as usize]] = gy;
        }
    }
    (dx, dy)
}

/// Neighbour offsets along the quantized gradient direction.
fn direction_offsets(gx: i32, gy: i32) -> [(isize, isize); 2] {
    let mut angle = (gy as f64).atan2(gx as f64).to_degrees();
    if angle < 0.0 {
        angle += 180.0;
    }
    if !(22.5..157.5).contains(&angle) {
        [(0, -1), (0, 1)]
    } else if angle < 67.5 {
        [(-1, -1), (1, 1)]
    } else if angle < 112.5 {
        [(-1, 0), (1, 0)]
    } else {
        [(1, -1), (-1, 1)]
    }
}

/// Canny edge detector: L1 gradient magnitude, non-maximum suppression
/// and 8-connected hysteresis between `low` and `high`.
///
/// Output pixels are either 0 or [`EDGE`].
pub fn canny(gray: &Array2<u8>, low: f64, high: f64) -> Array2<u8> {
    let (h, w) = gray.dim();
    let mut edges = Array2::<u8>::zeros((h, w));
    if h == 0 || w == 0 {
        return edges;
    }

    let (dx, dy) = sobel(gray);
    let magnitude = Array2::from_shape_fn((h, w), |(y, x)| {
        (dx[[y, x]].abs() + dy[[y, x]].abs()) as f64
    });

    let mag_at = |y: isize, x: isize| -> f64 {
        if y < 0 || x < 0 || y >= h as isize || x >= w as isize {
            0.0
        } else {
            magnitude[[y as usize, x as usize]]
        }
    };

    // 0 = suppressed, 1 = weak candidate, 2 = strong
    let mut class = Array2::<u8>::zeros((h, w));
    let mut stack = Vec::new();
    for y in 0..h {
        for x in 0..w {
            let m = magnitude[[y, x]];
            if m <= low {
                continue;
            }
            let [(ay, ax), (by, bx)] = direction_offsets(dx[[y, x]], dy[[y, x]]);
            let (yi, xi) = (y as isize, x as isize);
            let is_max = m > mag_at(yi + ay, xi + ax) && m >= mag_at(yi + by, xi + bx);
            if !is_max {
                continue;
            }
            if m > high {
                class[[y, x]] = 2;
                stack.push((y, x));
            } else {
                class[[y, x]] = 1;
            }
        }
    }

    while let Some((y, x)) = stack.pop() {
        edges[[y, x]] = EDGE;
        for oy in -1isize..=1 {
            for ox in -1isize..=1 {
                if oy == 0 && ox == 0 {
                    continue;
                }
                let ny = y as isize + oy;
                let nx = x as isize + ox;
                if ny < 0 || nx < 0 || ny >= h as isize || nx >= w as isize {
                    continue;
                }
                let (ny, nx) = (ny as usize, nx as usize);
                if class[[ny, nx]] == 1 {
                    class[[ny, nx]] = 2;
                    stack.push((ny, nx));
                }
            }
        }
    }

    edges
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reflect101_borders() {
        assert_eq!(reflect101(-1, 5), 1);
        assert_eq!(reflect101(-2, 5), 2);
        assert_eq!(reflect101(5, 5), 3);
        assert_eq!(reflect101(6, 5), 2);
        assert_eq!(reflect101(3, 5), 3);
        assert_eq!(reflect101(-3, 1), 0);
    }

    #[test]
    fn test_blur_preserves_constant_image() {
        let gray = Array2::from_elem((9, 7), 137u8);
        let blurred = gaussian_blur_5x5(&gray);
        assert!(blurred.iter().all(|&v| v == 137));
    }

    #[test]
    fn test_blur_spreads_impulse() {
        let mut gray = Array2::<u8>::zeros((9, 9));
        gray[[4, 4]] = 255;
        let blurred = gaussian_blur_5x5(&gray);
        // centre weight 0.375² × 255 ≈ 35.9
        assert_eq!(blurred[[4, 4]], 36);
        assert!(blurred[[4, 6]] > 0);
        assert_eq!(blurred[[4, 7]], 0);
    }

    #[test]
    fn test_sobel_vertical_step() {
        let gray = Array2::from_shape_fn((5, 6), |(_, x)| if x < 3 { 0u8 } else { 100 });
        let (dx, dy) = sobel(&gray);
        assert_eq!(dx[[2, 2]], 400);
        assert_eq!(dx[[2, 0]], 0);
        assert!(dy.iter().all(|&v| v == 0));
    }

    #[test]
    fn test_canny_constant_has_no_edges() {
        let gray = Array2::from_elem((20, 20), 200u8);
        let edges = canny(&gray, 50.0, 150.0);
        assert!(edges.iter().all(|&v| v == 0));
    }

    #[test]
    fn test_canny_detects_step_edge() {
        let gray = Array2::from_shape_fn((20, 20), |(_, x)| if x < 10 { 0u8 } else { 255 });
        let edges = canny(&gray, 50.0, 150.0);
        let edge_count = edges.iter().filter(|&&v| v == EDGE).count();
        assert!(edge_count >= 20, "expected a vertical edge line, got {edge_count}");
        assert!(edges.iter().all(|&v| v == 0 || v == EDGE));
        // nothing far from the step
        assert!(edges.column(2).iter().all(|&v| v == 0));
        assert!(edges.column(17).iter().all(|&v| v == 0));
    }

    #[test]
    fn test_canny_empty_image() {
        let gray = Array2::<u8>::zeros((0, 0));
        assert_eq!(canny(&gray, 50.0, 150.0).len(), 0);
    }
}
