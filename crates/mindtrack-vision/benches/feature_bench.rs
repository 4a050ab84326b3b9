// ─────────────────────────────────────────────────────────────────────
// MindTrack — Feature Extraction Benchmark
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────

use criterion::{criterion_group, criterion_main, Criterion};
use image::{DynamicImage, GrayImage, Luma};
use mindtrack_vision::extract_features;

/// Synthetic 224×224 page: five ruled text lines with ragged margins
/// and evenly spaced letter strokes.
fn synthetic_page() -> DynamicImage {
    DynamicImage::ImageLuma8(GrayImage::from_fn(224, 224, |x, y| {
        let line = y / 40;
        let in_line = y % 40 >= 12 && y % 40 < 26;
        let margin = 12 + 7 * line;
        let stroke = (x + 3 * line) % 9 < 2;
        if in_line && x >= margin && x < 210 && stroke {
            Luma([20])
        } else {
            Luma([235])
        }
    }))
}

/// Benchmark: full 15-slot feature vector at the model resolution.
fn bench_extract_features_224(c: &mut Criterion) {
    let page = synthetic_page();
    c.bench_function("bench_extract_features_224", |b| {
        b.iter(|| std::hint::black_box(extract_features(&page)))
    });
}

criterion_group!(benches, bench_extract_features_224);
criterion_main!(benches);
