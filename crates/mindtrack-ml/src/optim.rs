// ─────────────────────────────────────────────────────────────────────
// MindTrack — Optimizer
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Adam over the fusion head parameters.

use crate::model::{FusionHead, HeadGradients};
use ndarray::{Array, Dimension, Zip};

pub const BETA1: f64 = 0.9;
pub const BETA2: f64 = 0.999;
pub const EPSILON: f64 = 1e-7;

/// First and second moment estimates for one parameter tensor.
#[derive(Debug, Clone)]
struct Moments<D: Dimension> {
    m: Array<f64, D>,
    v: Array<f64, D>,
}

impl<D: Dimension> Moments<D> {
    fn like(param: &Array<f64, D>) -> Self {
        Moments {
            m: Array::zeros(param.raw_dim()),
            v: Array::zeros(param.raw_dim()),
        }
    }

    /// `step_size` already carries the bias correction.
    fn apply(&mut self, param: &mut Array<f64, D>, grad: &Array<f64, D>, step_size: f64) {
        Zip::from(param)
            .and(&mut self.m)
            .and(&mut self.v)
            .and(grad)
            .for_each(|p, m, v, &g| {
                *m = BETA1 * *m + (1.0 - BETA1) * g;
                *v = BETA2 * *v + (1.0 - BETA2) * g * g;
                *p -= step_size * *m / (v.sqrt() + EPSILON);
            });
    }
}

/// Adam with bias correction folded into the step size.
#[derive(Debug, Clone)]
pub struct Adam {
    pub learning_rate: f64,
    t: u32,
    w_img: Moments<ndarray::Ix2>,
    b_img: Moments<ndarray::Ix1>,
    w_feat: Moments<ndarray::Ix2>,
    b_feat: Moments<ndarray::Ix1>,
    w_out: Moments<ndarray::Ix1>,
    b_out: Moments<ndarray::Ix1>,
}

impl Adam {
    pub fn new(head: &FusionHead, learning_rate: f64) -> Self {
        Adam {
            learning_rate,
            t: 0,
            w_img: Moments::like(&head.w_img),
            b_img: Moments::like(&head.b_img),
            w_feat: Moments::like(&head.w_feat),
            b_feat: Moments::like(&head.b_feat),
            w_out: Moments::like(&head.w_out),
            b_out: Moments::like(&head.b_out),
        }
    }

    pub fn steps(&self) -> u32 {
        self.t
    }

    pub fn step(&mut self, head: &mut FusionHead, grads: &HeadGradients) {
        self.t += 1;
        let t = self.t as i32;
        let step_size =
            self.learning_rate * (1.0 - BETA2.powi(t)).sqrt() / (1.0 - BETA1.powi(t));

        self.w_img.apply(&mut head.w_img, &grads.w_img, step_size);
        self.b_img.apply(&mut head.b_img, &grads.b_img, step_size);
        self.w_feat.apply(&mut head.w_feat, &grads.w_feat, step_size);
        self.b_feat.apply(&mut head.b_feat, &grads.b_feat, step_size);
        self.w_out.apply(&mut head.w_out, &grads.w_out, step_size);
        self.b_out.apply(&mut head.b_out, &grads.b_out, step_size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mindtrack_types::config::ModelConfig;
    use ndarray::{Array1, Array2};

    fn zero_grads(head: &FusionHead) -> HeadGradients {
        HeadGradients {
            w_img: Array2::zeros(head.w_img.raw_dim()),
            b_img: Array1::zeros(head.b_img.len()),
            w_feat: Array2::zeros(head.w_feat.raw_dim()),
            b_feat: Array1::zeros(head.b_feat.len()),
            w_out: Array1::zeros(head.w_out.len()),
            b_out: Array1::zeros(1),
        }
    }

    #[test]
    fn test_first_step_moves_by_learning_rate() {
        let config = ModelConfig {
            image_units: 4,
            feature_units: 3,
            ..ModelConfig::default()
        };
        let mut head = FusionHead::seeded(5, &config, 0);
        let before = head.b_out[0];
        let mut grads = zero_grads(&head);
        grads.b_out[0] = 0.3;

        let mut adam = Adam::new(&head, 0.01);
        adam.step(&mut head, &grads);

        // m̂ / sqrt(v̂) = sign(g) on the first step
        assert!((before - head.b_out[0] - 0.01).abs() < 1e-6);
        assert_eq!(adam.steps(), 1);
        // zero gradient leaves parameters untouched
        assert_eq!(head.b_img, Array1::<f64>::zeros(4));
    }

    #[test]
    fn test_minimizes_quadratic() {
        let config = ModelConfig {
            image_units: 2,
            feature_units: 2,
            ..ModelConfig::default()
        };
        let mut head = FusionHead::seeded(3, &config, 1);
        head.b_out[0] = 5.0;
        let mut adam = Adam::new(&head, 0.1);
        for _ in 0..500 {
            let mut grads = zero_grads(&head);
            // d/dx (x - 1)²
            grads.b_out[0] = 2.0 * (head.b_out[0] - 1.0);
            adam.step(&mut head, &grads);
        }
        assert!((head.b_out[0] - 1.0).abs() < 0.05, "b_out = {}", head.b_out[0]);
    }
}
