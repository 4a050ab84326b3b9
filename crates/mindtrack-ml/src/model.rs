// ─────────────────────────────────────────────────────────────────────
// MindTrack — Fusion Classifier
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Two-branch fusion classifier.
//!
//! Image branch: frozen stride-2 convolutional backbone → global average
//! pooling → Dense(128, ReLU) → Dropout(0.5).
//! Feature branch: Dense(32, ReLU) → Dropout(0.3) over the 15-slot
//! handwriting vector.
//! Both branches are concatenated and reduced by Dense(1, sigmoid) to
//! P(non-dysgraphic).

use crate::artifact::{create_npz, entry_names, finish_npz, open_npz, read_array, write_array};
use crate::pretrained::load_backbone;
use mindtrack_types::config::ModelConfig;
use mindtrack_types::constants::{CHANNELS, FEATURE_LEN};
use mindtrack_types::error::{MindTrackError, MindTrackResult};
use ndarray::{s, Array1, Array2, Array4, ArrayView3, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs::File;
use std::path::Path;

/// 3×3 kernel taps.
const TAPS: usize = 9;

/// Probability clipping for the cross-entropy.
const BCE_EPS: f64 = 1e-7;

/// Anything that maps an image batch plus feature batch to P(non-dysgraphic).
pub trait ProbabilityModel {
    /// `images`: (n, h, w, 3) in [0, 1]; `features`: (n, 15) normalized.
    fn predict_proba(
        &self,
        images: &Array4<f64>,
        features: &Array2<f64>,
    ) -> MindTrackResult<Array1<f64>>;
}

fn relu(x: f64) -> f64 {
    x.max(0.0)
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Mean binary cross-entropy with clipped probabilities.
pub fn binary_cross_entropy(probs: &Array1<f64>, labels: &Array1<f64>) -> f64 {
    if probs.is_empty() {
        return 0.0;
    }
    let total: f64 = probs
        .iter()
        .zip(labels.iter())
        .map(|(&p, &y)| {
            let p = p.clamp(BCE_EPS, 1.0 - BCE_EPS);
            -(y * p.ln() + (1.0 - y) * (1.0 - p).ln())
        })
        .sum();
    total / probs.len() as f64
}

/// Count of predictions on the correct side of 0.5.
pub fn correct_predictions(probs: &Array1<f64>, labels: &Array1<f64>) -> usize {
    probs
        .iter()
        .zip(labels.iter())
        .filter(|&(&p, &y)| (p > 0.5) == (y > 0.5))
        .count()
}

fn uniform(rng: &mut StdRng, shape: (usize, usize), limit: f64) -> Array2<f64> {
    Array2::from_shape_fn(shape, |_| (rng.gen::<f64>() * 2.0 - 1.0) * limit)
}

/// 3×3, stride 2, zero-padded convolution with ReLU.
///
/// `kernel` is stored as a (9·c_in, c_out) matrix; row `(ky·3 + kx)·c_in + ci`.
#[derive(Debug, Clone)]
pub struct ConvLayer {
    pub kernel: Array2<f64>,
    pub bias: Array1<f64>,
}

impl ConvLayer {
    /// He-uniform initialization.
    fn new(c_in: usize, c_out: usize, rng: &mut StdRng) -> Self {
        let limit = (6.0 / (TAPS * c_in) as f64).sqrt();
        ConvLayer {
            kernel: uniform(rng, (TAPS * c_in, c_out), limit),
            bias: Array1::zeros(c_out),
        }
    }

    pub fn in_channels(&self) -> usize {
        self.kernel.nrows() / TAPS
    }

    pub fn out_channels(&self) -> usize {
        self.kernel.ncols()
    }

    /// `map`: (h·w, c_in) row-major pixels → ((⌈h/2⌉·⌈w/2⌉, c_out), ⌈h/2⌉, ⌈w/2⌉).
    fn forward(&self, map: &Array2<f64>, h: usize, w: usize) -> (Array2<f64>, usize, usize) {
        let c_in = map.ncols();
        let (oh, ow) = ((h + 1) / 2, (w + 1) / 2);

        // im2col
        let mut patches = Array2::<f64>::zeros((oh * ow, TAPS * c_in));
        for oy in 0..oh {
            for ox in 0..ow {
                let mut row = patches.row_mut(oy * ow + ox);
                for ky in 0..3 {
                    let iy = (2 * oy + ky) as isize - 1;
                    if iy < 0 || iy >= h as isize {
                        continue;
                    }
                    for kx in 0..3 {
                        let ix = (2 * ox + kx) as isize - 1;
                        if ix < 0 || ix >= w as isize {
                            continue;
                        }
                        let offset = (ky * 3 + kx) * c_in;
                        row.slice_mut(s![offset..offset + c_in])
                            .assign(&map.row(iy as usize * w + ix as usize));
                    }
                }
            }
        }

        let out = (patches.dot(&self.kernel) + &self.bias).mapv(relu);
        (out, oh, ow)
    }
}

/// Frozen convolutional feature extractor ending in global average pooling.
#[derive(Debug, Clone)]
pub struct ConvBackbone {
    pub layers: Vec<ConvLayer>,
}

impl ConvBackbone {
    /// Deterministic initialization from a seed.
    pub fn seeded(channels: &[usize], seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut c_in = CHANNELS;
        let layers = channels
            .iter()
            .map(|&c_out| {
                let layer = ConvLayer::new(c_in, c_out, &mut rng);
                c_in = c_out;
                layer
            })
            .collect();
        ConvBackbone { layers }
    }

    /// Pretrained weights if configured (native or exported archive),
    /// otherwise the seeded development initialization.
    pub fn from_config(config: &ModelConfig) -> MindTrackResult<Self> {
        match &config.backbone_weights {
            Some(path) => {
                tracing::info!(path = %path.display(), "loading pretrained backbone");
                load_backbone(path, config.backbone_layout, config.backbone_bn_epsilon)
            }
            None => {
                tracing::warn!(
                    seed = config.seed,
                    channels = ?config.backbone_channels,
                    "no pretrained backbone configured; using seeded random backbone"
                );
                Ok(ConvBackbone::seeded(&config.backbone_channels, config.seed))
            }
        }
    }

    /// Load `backbone.conv{i}.kernel` / `backbone.conv{i}.bias` entries.
    pub fn from_npz(path: &Path) -> MindTrackResult<Self> {
        let mut npz = open_npz(path)?;
        ConvBackbone::read(&mut npz)
    }

    fn read(npz: &mut ndarray_npy::NpzReader<File>) -> MindTrackResult<Self> {
        let n_layers = entry_names(npz)?
            .iter()
            .filter(|n| n.starts_with("backbone.conv") && n.ends_with(".kernel"))
            .count();
        if n_layers == 0 {
            return Err(MindTrackError::Artifact(
                "archive holds no backbone.conv*.kernel entries".to_string(),
            ));
        }

        let mut layers = Vec::with_capacity(n_layers);
        for i in 0..n_layers {
            layers.push(ConvLayer {
                kernel: read_array(npz, &format!("backbone.conv{i}.kernel"))?,
                bias: read_array(npz, &format!("backbone.conv{i}.bias"))?,
            });
        }
        let backbone = ConvBackbone { layers };
        backbone.validate()?;
        Ok(backbone)
    }

    /// Write the backbone alone in the native layout.
    pub fn save_npz(&self, path: &Path) -> MindTrackResult<()> {
        let mut npz = create_npz(path)?;
        self.write(&mut npz)?;
        finish_npz(npz, path)
    }

    fn write(&self, npz: &mut ndarray_npy::NpzWriter<File>) -> MindTrackResult<()> {
        for (i, layer) in self.layers.iter().enumerate() {
            write_array(npz, &format!("backbone.conv{i}.kernel"), &layer.kernel)?;
            write_array(npz, &format!("backbone.conv{i}.bias"), &layer.bias)?;
        }
        Ok(())
    }

    pub(crate) fn validate(&self) -> MindTrackResult<()> {
        let mut c_in = CHANNELS;
        for (i, layer) in self.layers.iter().enumerate() {
            if layer.kernel.nrows() != TAPS * c_in {
                return Err(MindTrackError::Artifact(format!(
                    "Invalid conv{i} kernel shape {:?}, expected ({}, _)",
                    layer.kernel.dim(),
                    TAPS * c_in
                )));
            }
            if layer.bias.len() != layer.out_channels() {
                return Err(MindTrackError::Artifact(format!(
                    "Invalid conv{i} bias length {}, expected {}",
                    layer.bias.len(),
                    layer.out_channels()
                )));
            }
            c_in = layer.out_channels();
        }
        Ok(())
    }

    pub fn embedding_dim(&self) -> usize {
        self.layers
            .last()
            .map(ConvLayer::out_channels)
            .unwrap_or(CHANNELS)
    }

    /// One (h, w, 3) image → pooled embedding.
    pub fn embed(&self, image: ArrayView3<f64>) -> MindTrackResult<Array1<f64>> {
        let (h, w, c) = image.dim();
        if h == 0 || w == 0 || c != CHANNELS {
            return Err(MindTrackError::Shape(format!(
                "backbone expects (h, w, {CHANNELS}) with h, w > 0, got {:?}",
                image.dim()
            )));
        }

        let mut map = Array2::from_shape_fn((h * w, c), |(r, ch)| image[[r / w, r % w, ch]]);
        let (mut h, mut w) = (h, w);
        for layer in &self.layers {
            let (next, nh, nw) = layer.forward(&map, h, w);
            map = next;
            h = nh;
            w = nw;
        }

        map.mean_axis(Axis(0))
            .ok_or_else(|| MindTrackError::Shape("empty feature map".to_string()))
    }

    /// (n, h, w, 3) → (n, embedding_dim).
    pub fn embed_batch(&self, images: &Array4<f64>) -> MindTrackResult<Array2<f64>> {
        let n = images.len_of(Axis(0));
        let mut out = Array2::zeros((n, self.embedding_dim()));
        for (i, image) in images.outer_iter().enumerate() {
            out.row_mut(i).assign(&self.embed(image)?);
        }
        Ok(out)
    }
}

/// Trainable dense layers on top of the backbone embedding.
#[derive(Debug, Clone)]
pub struct FusionHead {
    pub w_img: Array2<f64>,  // (embedding_dim, image_units)
    pub b_img: Array1<f64>,  // (image_units,)
    pub w_feat: Array2<f64>, // (15, feature_units)
    pub b_feat: Array1<f64>, // (feature_units,)
    pub w_out: Array1<f64>,  // (image_units + feature_units,)
    pub b_out: Array1<f64>,  // (1,)
    pub image_dropout: f64,
    pub feature_dropout: f64,
}

/// Intermediate values kept from a training forward pass.
#[derive(Debug, Clone)]
pub struct HeadActivations {
    pub z_img: Array2<f64>,
    pub a_img: Array2<f64>,
    pub mask_img: Array2<f64>,
    pub z_feat: Array2<f64>,
    pub a_feat: Array2<f64>,
    pub mask_feat: Array2<f64>,
    pub probs: Array1<f64>,
}

/// Loss gradients, one per [`FusionHead`] parameter.
#[derive(Debug, Clone)]
pub struct HeadGradients {
    pub w_img: Array2<f64>,
    pub b_img: Array1<f64>,
    pub w_feat: Array2<f64>,
    pub b_feat: Array1<f64>,
    pub w_out: Array1<f64>,
    pub b_out: Array1<f64>,
}

/// Inverted dropout mask: kept units scaled by 1 / (1 - rate).
fn dropout_mask(shape: (usize, usize), rate: f64, rng: &mut StdRng) -> Array2<f64> {
    if rate <= 0.0 {
        return Array2::ones(shape);
    }
    let keep = 1.0 / (1.0 - rate);
    Array2::from_shape_fn(shape, |_| if rng.gen::<f64>() >= rate { keep } else { 0.0 })
}

impl FusionHead {
    /// Glorot-uniform weights, zero biases.
    pub fn seeded(embedding_dim: usize, config: &ModelConfig, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let glorot = |fan_in: usize, fan_out: usize| (6.0 / (fan_in + fan_out) as f64).sqrt();
        let concat = config.image_units + config.feature_units;

        let w_img = uniform(
            &mut rng,
            (embedding_dim, config.image_units),
            glorot(embedding_dim, config.image_units),
        );
        let w_feat = uniform(
            &mut rng,
            (config.num_features, config.feature_units),
            glorot(config.num_features, config.feature_units),
        );
        let out_limit = glorot(concat, 1);
        let w_out = Array1::from_shape_fn(concat, |_| (rng.gen::<f64>() * 2.0 - 1.0) * out_limit);

        FusionHead {
            w_img,
            b_img: Array1::zeros(config.image_units),
            w_feat,
            b_feat: Array1::zeros(config.feature_units),
            w_out,
            b_out: Array1::zeros(1),
            image_dropout: config.image_dropout,
            feature_dropout: config.feature_dropout,
        }
    }

    pub fn image_units(&self) -> usize {
        self.w_img.ncols()
    }

    fn output(&self, a_img: &Array2<f64>, a_feat: &Array2<f64>) -> Array1<f64> {
        let units = self.image_units();
        let logits = a_img.dot(&self.w_out.slice(s![..units]))
            + a_feat.dot(&self.w_out.slice(s![units..]))
            + self.b_out[0];
        logits.mapv(sigmoid)
    }

    /// Inference forward pass (dropout disabled).
    pub fn forward(&self, embeddings: &Array2<f64>, features: &Array2<f64>) -> Array1<f64> {
        let a_img = (embeddings.dot(&self.w_img) + &self.b_img).mapv(relu);
        let a_feat = (features.dot(&self.w_feat) + &self.b_feat).mapv(relu);
        self.output(&a_img, &a_feat)
    }

    /// Training forward pass with dropout masks drawn from `rng`.
    pub fn forward_train(
        &self,
        embeddings: &Array2<f64>,
        features: &Array2<f64>,
        rng: &mut StdRng,
    ) -> HeadActivations {
        let z_img = embeddings.dot(&self.w_img) + &self.b_img;
        let mask_img = dropout_mask(z_img.dim(), self.image_dropout, rng);
        let a_img = z_img.mapv(relu) * &mask_img;

        let z_feat = features.dot(&self.w_feat) + &self.b_feat;
        let mask_feat = dropout_mask(z_feat.dim(), self.feature_dropout, rng);
        let a_feat = z_feat.mapv(relu) * &mask_feat;

        let probs = self.output(&a_img, &a_feat);
        HeadActivations {
            z_img,
            a_img,
            mask_img,
            z_feat,
            a_feat,
            mask_feat,
            probs,
        }
    }

    /// Gradients of the mean binary cross-entropy.
    pub fn backward(
        &self,
        embeddings: &Array2<f64>,
        features: &Array2<f64>,
        acts: &HeadActivations,
        labels: &Array1<f64>,
    ) -> HeadGradients {
        let n = labels.len().max(1) as f64;
        let units = self.image_units();

        // d loss / d logit for sigmoid + BCE
        let d_logit = (&acts.probs - labels) / n;

        let mut w_out = Array1::zeros(self.w_out.len());
        w_out
            .slice_mut(s![..units])
            .assign(&acts.a_img.t().dot(&d_logit));
        w_out
            .slice_mut(s![units..])
            .assign(&acts.a_feat.t().dot(&d_logit));
        let b_out = Array1::from_elem(1, d_logit.sum());

        let d_col = d_logit.view().insert_axis(Axis(1));
        let relu_grad = |z: &f64| if *z > 0.0 { 1.0 } else { 0.0 };

        let d_z_img = (&d_col * &self.w_out.slice(s![..units]).insert_axis(Axis(0)))
            * &acts.mask_img
            * acts.z_img.mapv(|z| relu_grad(&z));
        let d_z_feat = (&d_col * &self.w_out.slice(s![units..]).insert_axis(Axis(0)))
            * &acts.mask_feat
            * acts.z_feat.mapv(|z| relu_grad(&z));

        HeadGradients {
            w_img: embeddings.t().dot(&d_z_img),
            b_img: d_z_img.sum_axis(Axis(0)),
            w_feat: features.t().dot(&d_z_feat),
            b_feat: d_z_feat.sum_axis(Axis(0)),
            w_out,
            b_out,
        }
    }

    fn write(&self, npz: &mut ndarray_npy::NpzWriter<File>) -> MindTrackResult<()> {
        write_array(npz, "head.w_img", &self.w_img)?;
        write_array(npz, "head.b_img", &self.b_img)?;
        write_array(npz, "head.w_feat", &self.w_feat)?;
        write_array(npz, "head.b_feat", &self.b_feat)?;
        write_array(npz, "head.w_out", &self.w_out)?;
        write_array(npz, "head.b_out", &self.b_out)?;
        let dropout = Array1::from_vec(vec![self.image_dropout, self.feature_dropout]);
        write_array(npz, "head.dropout", &dropout)
    }

    fn read(npz: &mut ndarray_npy::NpzReader<File>) -> MindTrackResult<Self> {
        let dropout: Array1<f64> = read_array(npz, "head.dropout")?;
        if dropout.len() != 2 {
            return Err(MindTrackError::Artifact(format!(
                "Invalid head.dropout length {}, expected 2",
                dropout.len()
            )));
        }
        Ok(FusionHead {
            w_img: read_array(npz, "head.w_img")?,
            b_img: read_array(npz, "head.b_img")?,
            w_feat: read_array(npz, "head.w_feat")?,
            b_feat: read_array(npz, "head.b_feat")?,
            w_out: read_array(npz, "head.w_out")?,
            b_out: read_array(npz, "head.b_out")?,
            image_dropout: dropout[0],
            feature_dropout: dropout[1],
        })
    }

    fn validate(&self, embedding_dim: usize) -> MindTrackResult<()> {
        if self.w_img.nrows() != embedding_dim || self.b_img.len() != self.w_img.ncols() {
            return Err(MindTrackError::Artifact(format!(
                "Invalid image branch shapes w={:?}, b={}, embedding_dim={embedding_dim}",
                self.w_img.dim(),
                self.b_img.len()
            )));
        }
        if self.w_feat.nrows() != FEATURE_LEN || self.b_feat.len() != self.w_feat.ncols() {
            return Err(MindTrackError::Artifact(format!(
                "Invalid feature branch shapes w={:?}, b={}, expected ({FEATURE_LEN}, _)",
                self.w_feat.dim(),
                self.b_feat.len()
            )));
        }
        if self.w_out.len() != self.w_img.ncols() + self.w_feat.ncols() {
            return Err(MindTrackError::Artifact(format!(
                "Invalid w_out length {}, expected {}",
                self.w_out.len(),
                self.w_img.ncols() + self.w_feat.ncols()
            )));
        }
        if self.b_out.len() != 1 {
            return Err(MindTrackError::Artifact(format!(
                "Invalid b_out length {}, expected 1",
                self.b_out.len()
            )));
        }
        Ok(())
    }
}

/// Backbone + head; only the head is trained.
#[derive(Debug, Clone)]
pub struct FusionClassifier {
    pub backbone: ConvBackbone,
    pub head: FusionHead,
}

impl FusionClassifier {
    pub fn new(config: &ModelConfig) -> MindTrackResult<Self> {
        let backbone = ConvBackbone::from_config(config)?;
        let head = FusionHead::seeded(
            backbone.embedding_dim(),
            config,
            config.seed.wrapping_add(1),
        );
        Ok(FusionClassifier { backbone, head })
    }

    pub fn save_npz(&self, path: &Path) -> MindTrackResult<()> {
        let mut npz = create_npz(path)?;
        self.backbone.write(&mut npz)?;
        self.head.write(&mut npz)?;
        finish_npz(npz, path)
    }

    pub fn from_npz(path: &Path) -> MindTrackResult<Self> {
        let mut npz = open_npz(path)?;
        let backbone = ConvBackbone::read(&mut npz)?;
        let head = FusionHead::read(&mut npz)?;
        head.validate(backbone.embedding_dim())?;
        Ok(FusionClassifier { backbone, head })
    }

    fn check_inputs(&self, images: &Array4<f64>, features: &Array2<f64>) -> MindTrackResult<()> {
        if features.ncols() != FEATURE_LEN {
            return Err(MindTrackError::Shape(format!(
                "feature batch has {} columns, expected {FEATURE_LEN}",
                features.ncols()
            )));
        }
        if images.len_of(Axis(0)) != features.nrows() {
            return Err(MindTrackError::Shape(format!(
                "image batch of {} vs feature batch of {}",
                images.len_of(Axis(0)),
                features.nrows()
            )));
        }
        Ok(())
    }
}

impl ProbabilityModel for FusionClassifier {
    fn predict_proba(
        &self,
        images: &Array4<f64>,
        features: &Array2<f64>,
    ) -> MindTrackResult<Array1<f64>> {
        self.check_inputs(images, features)?;
        let embeddings = self.backbone.embed_batch(images)?;
        Ok(self.head.forward(&embeddings, features))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array3};

    fn small_config() -> ModelConfig {
        ModelConfig {
            backbone_channels: vec![4, 6],
            image_units: 8,
            feature_units: 5,
            ..ModelConfig::default()
        }
    }

    fn random_batch(n: usize, size: usize, seed: u64) -> (Array4<f64>, Array2<f64>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let images = Array4::from_shape_fn((n, size, size, CHANNELS), |_| rng.gen::<f64>());
        let features = Array2::from_shape_fn((n, FEATURE_LEN), |_| rng.gen::<f64>() - 0.5);
        (images, features)
    }

    #[test]
    fn test_conv_output_size_halves() {
        let backbone = ConvBackbone::seeded(&[4], 1);
        let map = Array2::ones((7 * 5, CHANNELS));
        let (out, oh, ow) = backbone.layers[0].forward(&map, 7, 5);
        assert_eq!((oh, ow), (4, 3));
        assert_eq!(out.dim(), (12, 4));
        assert!(out.iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn test_conv_matches_direct_sum() {
        // Single-channel identity-like kernel: centre tap weight 1
        let mut kernel = Array2::zeros((TAPS, 1));
        kernel[[4, 0]] = 1.0;
        let layer = ConvLayer {
            kernel,
            bias: array![0.5],
        };
        let map = Array2::from_shape_fn((16, 1), |(r, _)| r as f64);
        let (out, oh, ow) = layer.forward(&map, 4, 4);
        assert_eq!((oh, ow), (2, 2));
        // centres sampled at (0,0), (0,2), (2,0), (2,2)
        assert_eq!(out.column(0).to_vec(), vec![0.5, 2.5, 8.5, 10.5]);
    }

    #[test]
    fn test_backbone_embedding_dim_and_determinism() {
        let a = ConvBackbone::seeded(&[4, 6], 9);
        let b = ConvBackbone::seeded(&[4, 6], 9);
        let image = Array3::from_shape_fn((10, 12, CHANNELS), |(y, x, c)| {
            ((y * 7 + x * 3 + c) % 11) as f64 / 10.0
        });
        let ea = a.embed(image.view()).unwrap();
        let eb = b.embed(image.view()).unwrap();
        assert_eq!(a.embedding_dim(), 6);
        assert_eq!(ea.len(), 6);
        assert_eq!(ea, eb);
    }

    #[test]
    fn test_backbone_rejects_wrong_channels() {
        let backbone = ConvBackbone::seeded(&[4], 0);
        let image = Array3::zeros((8, 8, 1));
        assert!(matches!(
            backbone.embed(image.view()),
            Err(MindTrackError::Shape(_))
        ));
    }

    #[test]
    fn test_predict_proba_bounded() {
        let model = FusionClassifier::new(&small_config()).unwrap();
        let (images, features) = random_batch(3, 16, 4);
        let probs = model.predict_proba(&images, &features).unwrap();
        assert_eq!(probs.len(), 3);
        assert!(probs.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn test_predict_proba_shape_mismatch() {
        let model = FusionClassifier::new(&small_config()).unwrap();
        let (images, _) = random_batch(2, 8, 1);
        let features = Array2::zeros((3, FEATURE_LEN));
        assert!(model.predict_proba(&images, &features).is_err());
        let narrow = Array2::zeros((2, 4));
        assert!(model.predict_proba(&images, &narrow).is_err());
    }

    #[test]
    fn test_bce_values() {
        let loss = binary_cross_entropy(&array![0.5, 0.5], &array![1.0, 0.0]);
        assert!((loss - std::f64::consts::LN_2).abs() < 1e-12);
        let clipped = binary_cross_entropy(&array![0.0], &array![1.0]);
        assert!(clipped.is_finite());
        assert_eq!(correct_predictions(&array![0.9, 0.2, 0.6], &array![1.0, 1.0, 0.0]), 1);
    }

    #[test]
    fn test_backward_matches_finite_difference() {
        let config = ModelConfig {
            image_dropout: 0.0,
            feature_dropout: 0.0,
            ..small_config()
        };
        let mut head = FusionHead::seeded(6, &config, 3);
        let mut rng = StdRng::seed_from_u64(5);
        let emb = Array2::from_shape_fn((4, 6), |_| rng.gen::<f64>());
        let feats = Array2::from_shape_fn((4, FEATURE_LEN), |_| rng.gen::<f64>() - 0.5);
        let labels = array![1.0, 0.0, 1.0, 0.0];

        let acts = head.forward_train(&emb, &feats, &mut rng);
        let grads = head.backward(&emb, &feats, &acts, &labels);

        let loss = |h: &FusionHead| binary_cross_entropy(&h.forward(&emb, &feats), &labels);
        let eps = 1e-6;
        for &(i, j) in &[(0usize, 0usize), (2, 3), (5, 7)] {
            let orig = head.w_img[[i, j]];
            head.w_img[[i, j]] = orig + eps;
            let up = loss(&head);
            head.w_img[[i, j]] = orig - eps;
            let down = loss(&head);
            head.w_img[[i, j]] = orig;
            let numeric = (up - down) / (2.0 * eps);
            assert!(
                (numeric - grads.w_img[[i, j]]).abs() < 1e-6,
                "w_img[{i},{j}]: numeric {numeric} vs analytic {}",
                grads.w_img[[i, j]]
            );
        }
        for k in [0usize, 4, 12] {
            let orig = head.w_out[k];
            head.w_out[k] = orig + eps;
            let up = loss(&head);
            head.w_out[k] = orig - eps;
            let down = loss(&head);
            head.w_out[k] = orig;
            let numeric = (up - down) / (2.0 * eps);
            assert!((numeric - grads.w_out[k]).abs() < 1e-6);
        }
        let orig = head.b_out[0];
        head.b_out[0] = orig + eps;
        let up = loss(&head);
        head.b_out[0] = orig - eps;
        let down = loss(&head);
        head.b_out[0] = orig;
        assert!(((up - down) / (2.0 * eps) - grads.b_out[0]).abs() < 1e-6);
    }

    #[test]
    fn test_dropout_mask_scaling() {
        let mut rng = StdRng::seed_from_u64(0);
        let mask = dropout_mask((200, 50), 0.5, &mut rng);
        assert!(mask.iter().all(|&m| m == 0.0 || m == 2.0));
        let kept = mask.iter().filter(|&&m| m > 0.0).count() as f64 / mask.len() as f64;
        assert!((kept - 0.5).abs() < 0.05, "kept fraction {kept}");
        assert!(dropout_mask((3, 3), 0.0, &mut rng).iter().all(|&m| m == 1.0));
    }

    #[test]
    fn test_npz_roundtrip_reproduces_predictions() {
        let model = FusionClassifier::new(&small_config()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dysgraphia_model.npz");
        model.save_npz(&path).unwrap();

        let loaded = FusionClassifier::from_npz(&path).unwrap();
        assert_eq!(loaded.backbone.layers.len(), 2);
        assert!((loaded.head.image_dropout - 0.5).abs() < 1e-12);

        let (images, features) = random_batch(2, 12, 8);
        let a = model.predict_proba(&images, &features).unwrap();
        let b = loaded.predict_proba(&images, &features).unwrap();
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < 1e-12);
        }

        // A full model archive doubles as a pretrained backbone source.
        let backbone = ConvBackbone::from_npz(&path).unwrap();
        assert_eq!(backbone.embedding_dim(), 6);
    }

    #[test]
    fn test_from_npz_without_backbone_is_artifact_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("head_only.npz");
        let mut npz = create_npz(&path).unwrap();
        write_array(&mut npz, "head.w_out", &array![1.0]).unwrap();
        finish_npz(npz, &path).unwrap();
        assert!(matches!(
            FusionClassifier::from_npz(&path),
            Err(MindTrackError::Artifact(_))
        ));
    }
}
