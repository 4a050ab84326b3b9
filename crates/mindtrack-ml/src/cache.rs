// ─────────────────────────────────────────────────────────────────────
// MindTrack — Feature Cache
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Per-image handwriting features computed once per dataset.
//!
//! The `processed/` directory doubles as the "already built" marker: when it
//! exists the JSON cache is loaded as-is (or treated as empty if missing),
//! otherwise every class image is resized into `processed/<class>/` and its
//! features are written to `handwriting_features.json`.
//!
//! Builds go into a staging directory that is renamed to `processed/` only
//! after the JSON is written, so an interrupted build leaves no marker.

use crate::dataset::{is_image_file, sorted_entries};
use mindtrack_types::constants::{FEATURE_CACHE_FILE, FEATURE_LEN, PROCESSED_DIR};
use mindtrack_types::error::MindTrackResult;
use mindtrack_vision::decode::{decode_path, gray_to_array, to_grayscale};
use mindtrack_vision::features::extract_features_gray;
use mindtrack_vision::resize_square;
use image::DynamicImage;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Build target before it is promoted to `processed/`.
const STAGING_DIR: &str = ".processed.partial";

/// `"class/filename"` → feature vector.
pub type FeatureMap = BTreeMap<String, [f64; FEATURE_LEN]>;

/// Cache key for an image inside a class directory.
pub fn feature_key(class_name: &str, file_name: &str) -> String {
    format!("{class_name}/{file_name}")
}

#[derive(Debug, Clone)]
pub struct FeatureCache {
    pub processed_dir: PathBuf,
    pub cache_file: PathBuf,
    pub features: FeatureMap,
}

impl FeatureCache {
    pub fn build_or_load(data_dir: &Path, image_size: usize) -> MindTrackResult<Self> {
        let processed_dir = data_dir.join(PROCESSED_DIR);
        let cache_file = data_dir.join(FEATURE_CACHE_FILE);

        let features = if processed_dir.is_dir() {
            let features = load_feature_map(&cache_file)?;
            if cache_file.exists() {
                tracing::info!(images = features.len(), "loaded existing features");
            } else {
                tracing::warn!(path = %cache_file.display(), "no existing features found");
            }
            features
        } else {
            let staging = data_dir.join(STAGING_DIR);
            if staging.exists() {
                tracing::warn!(path = %staging.display(), "removing incomplete feature build");
                fs::remove_dir_all(&staging)?;
            }
            let features = build(data_dir, &staging, image_size)?;
            save_feature_map(&cache_file, &features)?;
            fs::rename(&staging, &processed_dir)?;
            tracing::info!(
                images = features.len(),
                path = %cache_file.display(),
                "processed images and extracted features"
            );
            features
        };

        Ok(FeatureCache {
            processed_dir,
            cache_file,
            features,
        })
    }
}

fn build(data_dir: &Path, processed_dir: &Path, image_size: usize) -> MindTrackResult<FeatureMap> {
    fs::create_dir_all(processed_dir)?;
    let mut features = FeatureMap::new();

    for class_dir in sorted_entries(data_dir)? {
        if !class_dir.is_dir() {
            continue;
        }
        let Some(class_name) = file_name(&class_dir) else {
            continue;
        };
        if class_name == PROCESSED_DIR || class_name == STAGING_DIR {
            continue;
        }

        let out_dir = processed_dir.join(&class_name);
        fs::create_dir_all(&out_dir)?;

        for image_path in sorted_entries(&class_dir)? {
            if !is_image_file(&image_path) {
                continue;
            }
            let Some(name) = file_name(&image_path) else {
                continue;
            };
            let image = match decode_path(&image_path) {
                Ok(image) => image,
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unreadable image");
                    continue;
                }
            };

            let resized = resize_square(&image, image_size);
            resized.save(out_dir.join(&name))?;

            let gray = to_grayscale(&DynamicImage::ImageRgb8(resized));
            features.insert(
                feature_key(&class_name, &name),
                extract_features_gray(&gray_to_array(&gray)),
            );
        }
    }
    Ok(features)
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}

/// Read a cache file; a missing file is an empty map.
pub fn load_feature_map(path: &Path) -> MindTrackResult<FeatureMap> {
    if !path.exists() {
        return Ok(FeatureMap::new());
    }
    let contents = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

pub fn save_feature_map(path: &Path, features: &FeatureMap) -> MindTrackResult<()> {
    fs::write(path, serde_json::to_string_pretty(features)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn write_page(path: &Path, margin: u32) {
        let img = RgbImage::from_fn(60, 40, |x, y| {
            if (8..30).contains(&y) && x >= margin && x < 50 && x % 4 != 0 {
                Rgb([0, 0, 0])
            } else {
                Rgb([255, 255, 255])
            }
        });
        img.save(path).unwrap();
    }

    #[test]
    fn test_build_then_reuse() {
        let dir = tempfile::tempdir().unwrap();
        for class in ["dysgraphic", "non-dysgraphic"] {
            fs::create_dir_all(dir.path().join(class)).unwrap();
        }
        write_page(&dir.path().join("dysgraphic").join("a.png"), 5);
        write_page(&dir.path().join("non-dysgraphic").join("b.png"), 12);
        fs::write(dir.path().join("dysgraphic").join("notes.txt"), "x").unwrap();
        fs::write(dir.path().join("dysgraphic").join("broken.png"), b"not a png").unwrap();

        let cache = FeatureCache::build_or_load(dir.path(), 32).unwrap();
        let keys: Vec<_> = cache.features.keys().cloned().collect();
        assert_eq!(keys, vec!["dysgraphic/a.png", "non-dysgraphic/b.png"]);
        assert!(cache.cache_file.exists());

        let resized = image::open(cache.processed_dir.join("dysgraphic").join("a.png")).unwrap();
        assert_eq!((resized.width(), resized.height()), (32, 32));

        // Marker present: cached values are returned untouched.
        let mut edited = cache.features.clone();
        edited.insert("dysgraphic/a.png".to_string(), [1.0; FEATURE_LEN]);
        save_feature_map(&cache.cache_file, &edited).unwrap();
        let reloaded = FeatureCache::build_or_load(dir.path(), 32).unwrap();
        assert_eq!(reloaded.features["dysgraphic/a.png"], [1.0; FEATURE_LEN]);
    }

    #[test]
    fn test_failed_build_leaves_no_marker() {
        let dir = tempfile::tempdir().unwrap();
        for class in ["dysgraphic", "non-dysgraphic"] {
            fs::create_dir_all(dir.path().join(class)).unwrap();
        }
        write_page(&dir.path().join("dysgraphic").join("a.png"), 5);
        write_page(&dir.path().join("non-dysgraphic").join("b.png"), 12);

        // A directory where the cache file belongs makes the final write fail.
        let blocker = dir.path().join(FEATURE_CACHE_FILE);
        fs::create_dir_all(&blocker).unwrap();
        assert!(FeatureCache::build_or_load(dir.path(), 16).is_err());
        assert!(!dir.path().join(PROCESSED_DIR).exists());
        assert!(dir.path().join(STAGING_DIR).exists());

        // The next run discards the stale staging tree and rebuilds.
        fs::remove_dir(&blocker).unwrap();
        let cache = FeatureCache::build_or_load(dir.path(), 16).unwrap();
        assert_eq!(cache.features.len(), 2);
        assert!(cache.processed_dir.join("dysgraphic").join("a.png").exists());
        assert!(!dir.path().join(STAGING_DIR).exists());
    }

    #[test]
    fn test_marker_without_cache_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join(PROCESSED_DIR)).unwrap();
        let cache = FeatureCache::build_or_load(dir.path(), 32).unwrap();
        assert!(cache.features.is_empty());
        assert!(!cache.cache_file.exists());
    }

    #[test]
    fn test_feature_key_format() {
        assert_eq!(feature_key("dysgraphic", "x.jpg"), "dysgraphic/x.jpg");
    }
}
