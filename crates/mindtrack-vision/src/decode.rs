// ─────────────────────────────────────────────────────────────────────
// MindTrack — Decode
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Image decoding, resizing and tensor conversion.

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, Luma, RgbImage};
use mindtrack_types::constants::CHANNELS;
use mindtrack_types::error::{MindTrackError, MindTrackResult};
use ndarray::{Array2, Array3};
use std::path::Path;

/// Path recorded in decode errors for in-memory images.
const MEMORY_SOURCE: &str = "<memory>";

/// Decode an image file. The file is read fully and closed before decoding.
pub fn decode_path(path: &Path) -> MindTrackResult<DynamicImage> {
    let bytes = std::fs::read(path).map_err(|e| MindTrackError::decode(path, e))?;
    image::load_from_memory(&bytes).map_err(|e| MindTrackError::decode(path, e))
}

/// Decode an encoded image held in memory (PNG/JPEG).
pub fn decode_bytes(bytes: &[u8]) -> MindTrackResult<DynamicImage> {
    if bytes.is_empty() {
        return Err(MindTrackError::decode(MEMORY_SOURCE, "empty buffer"));
    }
    image::load_from_memory(bytes).map_err(|e| MindTrackError::decode(MEMORY_SOURCE, e))
}

/// Resize to `size`×`size` RGB with bilinear interpolation.
pub fn resize_square(image: &DynamicImage, size: usize) -> RgbImage {
    image
        .resize_exact(size as u32, size as u32, FilterType::Triangle)
        .to_rgb8()
}

/// RGB image → (height, width, 3) tensor scaled to [0, 1].
pub fn to_tensor(image: &RgbImage) -> Array3<f64> {
    let (w, h) = image.dimensions();
    Array3::from_shape_fn((h as usize, w as usize, CHANNELS), |(y, x, c)| {
        image.get_pixel(x as u32, y as u32)[c] as f64 / 255.0
    })
}

/// BT.601 luma weights in 14-bit fixed point (0.299, 0.587, 0.114).
const LUMA_R: u32 = 4899;
const LUMA_G: u32 = 9617;
const LUMA_B: u32 = 1868;
const LUMA_SHIFT: u32 = 14;

/// Single-channel BT.601 luma of any decoded image, alpha dropped.
///
/// Gray inputs pass through unchanged since the weights sum to 1.
pub fn to_grayscale(image: &DynamicImage) -> GrayImage {
    let rgb = image.to_rgb8();
    let (w, h) = rgb.dimensions();
    GrayImage::from_fn(w, h, |x, y| {
        let [r, g, b] = rgb.get_pixel(x, y).0;
        let luma = (u32::from(r) * LUMA_R
            + u32::from(g) * LUMA_G
            + u32::from(b) * LUMA_B
            + (1 << (LUMA_SHIFT - 1)))
            >> LUMA_SHIFT;
        Luma([luma as u8])
    })
}

/// Grayscale buffer → (height, width) intensity grid.
pub fn gray_to_array(gray: &GrayImage) -> Array2<u8> {
    let (w, h) = gray.dimensions();
    Array2::from_shape_fn((h as usize, w as usize), |(y, x)| {
        gray.get_pixel(x as u32, y as u32)[0]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb};
    use std::io::Cursor;

    fn png_bytes(image: &RgbImage) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(image.clone())
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_decode_bytes_png() {
        let img = RgbImage::from_pixel(12, 8, Rgb([10, 20, 30]));
        let decoded = decode_bytes(&png_bytes(&img)).unwrap();
        assert_eq!(decoded.width(), 12);
        assert_eq!(decoded.height(), 8);
    }

    #[test]
    fn test_decode_garbage_is_decode_error() {
        let err = decode_bytes(b"definitely not an image").unwrap_err();
        assert!(matches!(err, MindTrackError::Decode { .. }));
    }

    #[test]
    fn test_decode_empty_is_decode_error() {
        assert!(matches!(
            decode_bytes(&[]),
            Err(MindTrackError::Decode { .. })
        ));
    }

    #[test]
    fn test_decode_missing_path_is_decode_error() {
        let err = decode_path(Path::new("/nonexistent/sample.png")).unwrap_err();
        match err {
            MindTrackError::Decode { path, .. } => {
                assert_eq!(path, Path::new("/nonexistent/sample.png"))
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_resize_square_dimensions() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(300, 120));
        let resized = resize_square(&img, 224);
        assert_eq!(resized.dimensions(), (224, 224));
    }

    #[test]
    fn test_tensor_scaled_to_unit_range() {
        let img = RgbImage::from_pixel(4, 3, Rgb([255, 0, 51]));
        let t = to_tensor(&img);
        assert_eq!(t.dim(), (3, 4, 3));
        assert!((t[[0, 0, 0]] - 1.0).abs() < 1e-12);
        assert_eq!(t[[2, 3, 1]], 0.0);
        assert!((t[[1, 1, 2]] - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_grayscale_uses_bt601_weights() {
        let img = RgbImage::from_fn(4, 1, |x, _| match x {
            0 => Rgb([255, 0, 0]),
            1 => Rgb([0, 255, 0]),
            2 => Rgb([0, 0, 255]),
            _ => Rgb([200, 100, 50]),
        });
        let gray = to_grayscale(&DynamicImage::ImageRgb8(img));
        let values: Vec<u8> = gray.pixels().map(|p| p[0]).collect();
        // 0.299·200 + 0.587·100 + 0.114·50 = 124.2
        assert_eq!(values, vec![76, 150, 29, 124]);
    }

    #[test]
    fn test_grayscale_passes_gray_through() {
        let gray = GrayImage::from_fn(16, 1, |x, _| Luma([(x * 17) as u8]));
        let out = to_grayscale(&DynamicImage::ImageLuma8(gray.clone()));
        assert_eq!(out, gray);
    }

    #[test]
    fn test_gray_array_layout_is_row_major() {
        let gray = GrayImage::from_fn(5, 2, |x, y| Luma([(x + 10 * y) as u8]));
        let arr = gray_to_array(&gray);
        assert_eq!(arr.dim(), (2, 5));
        assert_eq!(arr[[1, 3]], 13);
    }
}
