// ─────────────────────────────────────────────────────────────────────
// MindTrack — Artifacts
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! `.npz` archive helpers shared by model weights and the feature scaler.

use mindtrack_types::constants::SCALER_SUFFIX;
use mindtrack_types::error::{MindTrackError, MindTrackResult};
use ndarray::{Array, ArrayBase, Data, Dimension, OwnedRepr};
use ndarray_npy::{NpzReader, NpzWriter};
use std::fs::File;
use std::path::{Path, PathBuf};

/// Companion scaler path: same directory and stem, `_scaler` suffix.
///
/// `models/dysgraphia_model.npz` → `models/dysgraphia_model_scaler.npz`.
pub fn scaler_path_for(model_path: &Path) -> PathBuf {
    let stem = model_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    model_path.with_file_name(format!("{stem}{SCALER_SUFFIX}.npz"))
}

pub fn open_npz(path: &Path) -> MindTrackResult<NpzReader<File>> {
    let file = File::open(path)?;
    NpzReader::new(file).map_err(|e| {
        MindTrackError::Artifact(format!("Failed to open npz '{}': {e}", path.display()))
    })
}

/// Create an archive for writing, creating parent directories as needed.
pub fn create_npz(path: &Path) -> MindTrackResult<NpzWriter<File>> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(NpzWriter::new(File::create(path)?))
}

/// Entry names without the `.npy` suffix.
pub fn entry_names(npz: &mut NpzReader<File>) -> MindTrackResult<Vec<String>> {
    let names = npz
        .names()
        .map_err(|e| MindTrackError::Artifact(format!("Failed to list npz entries: {e}")))?;
    Ok(names
        .into_iter()
        .map(|n| n.trim_end_matches(".npy").to_string())
        .collect())
}

pub fn read_array<D: Dimension>(
    npz: &mut NpzReader<File>,
    key: &str,
) -> MindTrackResult<Array<f64, D>> {
    npz.by_name::<OwnedRepr<f64>, D>(&format!("{key}.npy"))
        .or_else(|_| npz.by_name::<OwnedRepr<f64>, D>(key))
        .map_err(|e| MindTrackError::Artifact(format!("Failed to read {key} from npz: {e}")))
}

pub fn write_array<S, D>(
    npz: &mut NpzWriter<File>,
    key: &str,
    array: &ArrayBase<S, D>,
) -> MindTrackResult<()>
where
    S: Data<Elem = f64>,
    D: Dimension,
{
    npz.add_array(key, array)
        .map_err(|e| MindTrackError::Artifact(format!("Failed to write {key} to npz: {e}")))
}

pub fn finish_npz(npz: NpzWriter<File>, path: &Path) -> MindTrackResult<()> {
    npz.finish().map(|_| ()).map_err(|e| {
        MindTrackError::Artifact(format!("Failed to finalize npz '{}': {e}", path.display()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array1, Array2};

    #[test]
    fn test_scaler_path_for() {
        assert_eq!(
            scaler_path_for(Path::new("models/dysgraphia_model.npz")),
            PathBuf::from("models/dysgraphia_model_scaler.npz")
        );
        assert_eq!(
            scaler_path_for(Path::new("weights.npz")),
            PathBuf::from("weights_scaler.npz")
        );
    }

    #[test]
    fn test_write_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("arrays.npz");

        let a = array![1.0, 2.5, -3.0];
        let b = Array2::from_shape_fn((2, 3), |(i, j)| (i * 3 + j) as f64);

        let mut npz = create_npz(&path).unwrap();
        write_array(&mut npz, "a", &a).unwrap();
        write_array(&mut npz, "b", &b).unwrap();
        finish_npz(npz, &path).unwrap();

        let mut reader = open_npz(&path).unwrap();
        let mut names = entry_names(&mut reader).unwrap();
        names.sort();
        assert_eq!(names, vec!["a", "b"]);

        let a_back: Array1<f64> = read_array(&mut reader, "a").unwrap();
        let b_back: Array2<f64> = read_array(&mut reader, "b").unwrap();
        assert_eq!(a_back, a);
        assert_eq!(b_back, b);

        let missing = read_array::<ndarray::Ix1>(&mut reader, "nope");
        assert!(matches!(missing, Err(MindTrackError::Artifact(_))));
    }
}
