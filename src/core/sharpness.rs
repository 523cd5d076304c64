//! Blur estimation over a grayscale grid.
//!
//! Both estimators convolve over the valid interior only (no padding), so an
//! image narrower or shorter than 3 pixels scores 0. Higher is sharper.

use crate::core::config::{BlurMethod, BlurPolicy};
use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Estimator {
    LaplacianVar,
    TenengradMeanG2,
}

impl Estimator {
    pub fn enabled_by(method: BlurMethod) -> &'static [Estimator] {
        match method {
            BlurMethod::Laplacian => &[Estimator::LaplacianVar],
            BlurMethod::Tenengrad => &[Estimator::TenengradMeanG2],
            BlurMethod::Both => &[Estimator::LaplacianVar, Estimator::TenengradMeanG2],
        }
    }

    pub fn score(&self, gray: &GrayImage) -> f64 {
        match self {
            Estimator::LaplacianVar => laplacian_variance(gray),
            Estimator::TenengradMeanG2 => tenengrad_mean(gray),
        }
    }
}

pub type BlurScores = BTreeMap<Estimator, f64>;

#[derive(Debug, Clone, PartialEq)]
pub struct SharpnessVerdict {
    pub scores: BlurScores,
    pub blurry: bool,
}

impl BlurPolicy {
    pub fn threshold(&self, estimator: Estimator) -> f64 {
        match estimator {
            Estimator::LaplacianVar => self.laplacian_threshold,
            Estimator::TenengradMeanG2 => self.tenengrad_threshold,
        }
    }

    /// Blurry only when every enabled estimator is present and below its threshold.
    pub fn is_blurry(&self, scores: &BlurScores) -> bool {
        Estimator::enabled_by(self.method).iter().all(|estimator| {
            scores
                .get(estimator)
                .is_some_and(|score| *score < self.threshold(*estimator))
        })
    }
}

/// Compute the estimators `policy` enables and apply its decision rule.
pub fn assess(gray: &GrayImage, policy: &BlurPolicy) -> SharpnessVerdict {
    let scores: BlurScores = Estimator::enabled_by(policy.method)
        .iter()
        .map(|estimator| (*estimator, estimator.score(gray)))
        .collect();
    let blurry = policy.is_blurry(&scores);
    SharpnessVerdict { scores, blurry }
}

/// Population variance of the 4-neighbour Laplacian response.
pub fn laplacian_variance(gray: &GrayImage) -> f64 {
    let (width, height) = gray.dimensions();
    if width < 3 || height < 3 {
        return 0.0;
    }

    let px = |x: u32, y: u32| f64::from(gray.get_pixel(x, y)[0]);
    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    let mut count = 0usize;

    // Kernel [[0, 1, 0], [1, -4, 1], [0, 1, 0]]
    for y in 1..(height - 1) {
        for x in 1..(width - 1) {
            let response =
                px(x - 1, y) + px(x + 1, y) + px(x, y - 1) + px(x, y + 1) - 4.0 * px(x, y);
            sum += response;
            sum_sq += response * response;
            count += 1;
        }
    }

    let n = count as f64;
    let mean = sum / n;
    (sum_sq / n - mean * mean).max(0.0)
}

/// Mean of Gx² + Gy² under the 3x3 Sobel kernels.
pub fn tenengrad_mean(gray: &GrayImage) -> f64 {
    let (width, height) = gray.dimensions();
    if width < 3 || height < 3 {
        return 0.0;
    }

    let px = |x: u32, y: u32| f64::from(gray.get_pixel(x, y)[0]);
    let mut total = 0.0;
    let mut count = 0usize;

    // Kx = [[1, 0, -1], [2, 0, -2], [1, 0, -1]], Ky = Kxᵀ
    for y in 1..(height - 1) {
        for x in 1..(width - 1) {
            let left = px(x - 1, y - 1) + 2.0 * px(x - 1, y) + px(x - 1, y + 1);
            let right = px(x + 1, y - 1) + 2.0 * px(x + 1, y) + px(x + 1, y + 1);
            let top = px(x - 1, y - 1) + 2.0 * px(x, y - 1) + px(x + 1, y - 1);
            let bottom = px(x - 1, y + 1) + 2.0 * px(x, y + 1) + px(x + 1, y + 1);
            let gx = left - right;
            let gy = top - bottom;
            total += gx * gx + gy * gy;
            count += 1;
        }
    }

    total / count as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn step_edge() -> GrayImage {
        GrayImage::from_fn(10, 10, |x, _| Luma([if x < 5 { 0 } else { 100 }]))
    }

    fn fine_checkerboard() -> GrayImage {
        GrayImage::from_fn(64, 64, |x, y| {
            Luma([if (x + y) % 2 == 0 { 138 } else { 118 }])
        })
    }

    #[test]
    fn test_step_edge_scores() {
        let img = step_edge();
        assert_eq!(laplacian_variance(&img), 2500.0);
        assert_eq!(tenengrad_mean(&img), 40000.0);
    }

    #[test]
    fn test_flat_image_scores_zero() {
        let img = GrayImage::from_pixel(32, 32, Luma([90]));
        assert_eq!(laplacian_variance(&img), 0.0);
        assert_eq!(tenengrad_mean(&img), 0.0);
    }

    #[test]
    fn test_tiny_image_scores_zero() {
        let img = GrayImage::from_pixel(2, 50, Luma([200]));
        assert_eq!(laplacian_variance(&img), 0.0);
        assert_eq!(tenengrad_mean(&img), 0.0);
    }

    #[test]
    fn test_checkerboard_is_laplacian_sharp_but_gradient_flat() {
        let img = fine_checkerboard();
        assert!((laplacian_variance(&img) - 6400.0).abs() < 1.0);
        assert_eq!(tenengrad_mean(&img), 0.0);
    }

    #[test]
    fn test_both_requires_every_metric_below() {
        let img = fine_checkerboard();
        let both = BlurPolicy::default();
        let verdict = assess(&img, &both);
        assert_eq!(verdict.scores.len(), 2);
        assert!(!verdict.blurry);

        let tenengrad_only = BlurPolicy {
            method: BlurMethod::Tenengrad,
            ..BlurPolicy::default()
        };
        let verdict = assess(&img, &tenengrad_only);
        assert_eq!(verdict.scores.len(), 1);
        assert!(verdict.blurry);

        let laplacian_only = BlurPolicy {
            method: BlurMethod::Laplacian,
            ..BlurPolicy::default()
        };
        assert!(!assess(&img, &laplacian_only).blurry);
    }

    #[test]
    fn test_score_at_threshold_is_not_blurry() {
        let policy = BlurPolicy {
            method: BlurMethod::Laplacian,
            laplacian_threshold: 2500.0,
            ..BlurPolicy::default()
        };
        assert!(!assess(&step_edge(), &policy).blurry);
    }

    #[test]
    fn test_missing_score_is_not_blurry() {
        let policy = BlurPolicy::default();
        let mut scores = BlurScores::new();
        scores.insert(Estimator::LaplacianVar, 0.0);
        assert!(!policy.is_blurry(&scores));
    }
}
