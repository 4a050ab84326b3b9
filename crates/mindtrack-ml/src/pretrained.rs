// ─────────────────────────────────────────────────────────────────────
// MindTrack — Pretrained Backbone Import
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Import of exported pretrained convolution stacks into [`ConvBackbone`].
//!
//! An exported archive holds one group of entries per stride-2 3×3
//! convolution, numbered from 0 in network order:
//!
//! | entry | shape |
//! |---|---|
//! | `conv{i}.weight` | 4-D kernel, HWIO or OIHW ([`KernelLayout`]) |
//! | `conv{i}.bias` | `(c_out,)`, optional |
//! | `conv{i}.bn.gamma`, `.beta`, `.mean`, `.var` | `(c_out,)`, optional, all four or none |
//!
//! This is what `numpy.savez` produces from the stem convolutions of an
//! ImageNet network (e.g. the stride-2 `Conv1` of MobileNetV2 with its
//! `bn_Conv1` statistics). Batch norm is folded into the kernel:
//! `w' = w·γ/√(σ² + ε)`, `b' = (b − μ)·γ/√(σ² + ε) + β`.

use crate::artifact::{entry_names, open_npz, read_array};
use crate::model::{ConvBackbone, ConvLayer};
use mindtrack_types::config::KernelLayout;
use mindtrack_types::error::{MindTrackError, MindTrackResult};
use ndarray::{Array1, Array2, Array4, Ix1, Ix4};
use std::fs::File;
use std::path::Path;

/// Native archives carry `backbone.conv0.kernel`; anything else is imported.
pub fn is_native_archive(names: &[String]) -> bool {
    names.iter().any(|n| n == "backbone.conv0.kernel")
}

/// 4-D 3×3 kernel → `(9·c_in, c_out)` im2col matrix,
/// row `(ky·3 + kx)·c_in + ci`.
pub fn kernel_to_im2col(kernel: &Array4<f64>, layout: KernelLayout) -> MindTrackResult<Array2<f64>> {
    let hwio = match layout {
        KernelLayout::Hwio => kernel.view(),
        KernelLayout::Oihw => kernel.view().permuted_axes([2, 3, 1, 0]),
    };
    let (kh, kw, c_in, c_out) = hwio.dim();
    if kh != 3 || kw != 3 {
        return Err(MindTrackError::Artifact(format!(
            "Only 3×3 kernels can be imported, got {kh}×{kw} ({layout:?} shape {:?})",
            kernel.dim()
        )));
    }
    Ok(Array2::from_shape_fn((9 * c_in, c_out), |(r, o)| {
        let (tap, ci) = (r / c_in, r % c_in);
        hwio[[tap / 3, tap % 3, ci, o]]
    }))
}

struct BatchNorm {
    gamma: Array1<f64>,
    beta: Array1<f64>,
    mean: Array1<f64>,
    var: Array1<f64>,
}

fn fold_batch_norm(kernel: &mut Array2<f64>, bias: &mut Array1<f64>, bn: &BatchNorm, eps: f64) {
    let scale = &bn.gamma / &bn.var.mapv(|v| (v + eps).sqrt());
    *kernel *= &scale;
    *bias = (&*bias - &bn.mean) * &scale + &bn.beta;
}

fn read_vector(
    npz: &mut ndarray_npy::NpzReader<File>,
    key: &str,
    len: usize,
) -> MindTrackResult<Array1<f64>> {
    let v = read_array::<Ix1>(npz, key)?;
    if v.len() != len {
        return Err(MindTrackError::Artifact(format!(
            "Invalid {key} length {}, expected {len}",
            v.len()
        )));
    }
    Ok(v)
}

/// Read an exported archive (see module docs) into a backbone.
pub fn import_backbone(
    path: &Path,
    layout: KernelLayout,
    bn_epsilon: f64,
) -> MindTrackResult<ConvBackbone> {
    let mut npz = open_npz(path)?;
    let names = entry_names(&mut npz)?;
    let has = |key: String| names.iter().any(|n| *n == key);

    let mut layers = Vec::new();
    while has(format!("conv{}.weight", layers.len())) {
        let i = layers.len();
        let raw = read_array::<Ix4>(&mut npz, &format!("conv{i}.weight"))?;
        let mut kernel = kernel_to_im2col(&raw, layout)?;
        let c_out = kernel.ncols();

        let mut bias = if has(format!("conv{i}.bias")) {
            read_vector(&mut npz, &format!("conv{i}.bias"), c_out)?
        } else {
            Array1::zeros(c_out)
        };
        if has(format!("conv{i}.bn.gamma")) {
            let bn = BatchNorm {
                gamma: read_vector(&mut npz, &format!("conv{i}.bn.gamma"), c_out)?,
                beta: read_vector(&mut npz, &format!("conv{i}.bn.beta"), c_out)?,
                mean: read_vector(&mut npz, &format!("conv{i}.bn.mean"), c_out)?,
                var: read_vector(&mut npz, &format!("conv{i}.bn.var"), c_out)?,
            };
            fold_batch_norm(&mut kernel, &mut bias, &bn, bn_epsilon);
        }
        layers.push(ConvLayer { kernel, bias });
    }

    if layers.is_empty() {
        return Err(MindTrackError::Artifact(format!(
            "'{}' holds neither backbone.conv*.kernel nor conv*.weight entries",
            path.display()
        )));
    }
    let backbone = ConvBackbone { layers };
    backbone.validate()?;
    tracing::info!(
        path = %path.display(),
        layers = backbone.layers.len(),
        embedding_dim = backbone.embedding_dim(),
        ?layout,
        "imported pretrained backbone"
    );
    Ok(backbone)
}

/// Native archive or exported archive, chosen by entry names.
pub fn load_backbone(
    path: &Path,
    layout: KernelLayout,
    bn_epsilon: f64,
) -> MindTrackResult<ConvBackbone> {
    let mut npz = open_npz(path)?;
    if is_native_archive(&entry_names(&mut npz)?) {
        ConvBackbone::from_npz(path)
    } else {
        import_backbone(path, layout, bn_epsilon)
    }
}
