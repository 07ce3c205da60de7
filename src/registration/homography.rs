//! Planar homography from point correspondences: normalized DLT plus a seeded RANSAC wrapper.

use nalgebra::{DMatrix, Matrix3, SymmetricEigen, Vector3};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::index::sample;

use crate::error::{Result, ShoreError};

/// Correspondences needed for one homography hypothesis.
pub const MIN_POINTS: usize = 4;

/// Map `(x, y)` through `h`, or `None` at the line at infinity.
pub fn apply(h: &Matrix3<f64>, p: [f64; 2]) -> Option<[f64; 2]> {
    let q = h * Vector3::new(p[0], p[1], 1.0);
    if q.z.abs() < 1e-12 {
        return None;
    }
    Some([q.x / q.z, q.y / q.z])
}

fn transfer_error(h: &Matrix3<f64>, src: [f64; 2], dst: [f64; 2]) -> f64 {
    match apply(h, src) {
        Some(p) => (p[0] - dst[0]).hypot(p[1] - dst[1]),
        None => f64::INFINITY,
    }
}

/// Similarity that moves the centroid to the origin with mean distance sqrt(2).
fn conditioner(pts: &[[f64; 2]]) -> Matrix3<f64> {
    let n = pts.len() as f64;
    let cx = pts.iter().map(|p| p[0]).sum::<f64>() / n;
    let cy = pts.iter().map(|p| p[1]).sum::<f64>() / n;
    let spread = pts
        .iter()
        .map(|p| (p[0] - cx).hypot(p[1] - cy))
        .sum::<f64>()
        / n;
    let s = if spread > 1e-12 {
        std::f64::consts::SQRT_2 / spread
    } else {
        1.0
    };
    Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0)
}

/// Direct linear transform: `dst ~ H * src` from at least four correspondences.
pub fn estimate_dlt(src: &[[f64; 2]], dst: &[[f64; 2]]) -> Result<Matrix3<f64>> {
    if src.len() != dst.len() {
        return Err(ShoreError::GeometryFailure(format!(
            "mismatched correspondence sets ({} vs {})",
            src.len(),
            dst.len()
        )));
    }
    if src.len() < MIN_POINTS {
        return Err(ShoreError::InsufficientCorrespondences {
            needed: MIN_POINTS,
            found: src.len(),
        });
    }

    let t_src = conditioner(src);
    let t_dst = conditioner(dst);

    let mut a = DMatrix::<f64>::zeros(2 * src.len(), 9);
    for (i, (s, d)) in src.iter().zip(dst).enumerate() {
        let s = t_src * Vector3::new(s[0], s[1], 1.0);
        let d = t_dst * Vector3::new(d[0], d[1], 1.0);
        let (x, y, u, v) = (s.x, s.y, d.x, d.y);
        let r = 2 * i;
        a.row_mut(r)
            .copy_from_slice(&[-x, -y, -1.0, 0.0, 0.0, 0.0, u * x, u * y, u]);
        a.row_mut(r + 1)
            .copy_from_slice(&[0.0, 0.0, 0.0, -x, -y, -1.0, v * x, v * y, v]);
    }

    // Null vector of A from the smallest eigenpair of the 9x9 normal matrix
    let eig = SymmetricEigen::new(a.transpose() * &a);
    let k = eig.eigenvalues.imin();
    let h = eig.eigenvectors.column(k);
    let hn = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]);

    let t_dst_inv = t_dst
        .try_inverse()
        .ok_or_else(|| ShoreError::GeometryFailure("degenerate target points".to_string()))?;
    let h = t_dst_inv * hn * t_src;
    if !h.iter().all(|v| v.is_finite()) || h.determinant().abs() < 1e-12 {
        return Err(ShoreError::GeometryFailure(
            "degenerate homography".to_string(),
        ));
    }
    let scale = h[(2, 2)];
    Ok(if scale.abs() > 1e-12 { h / scale } else { h })
}

#[derive(Debug, Clone, Copy)]
pub struct RansacConfig {
    pub iterations: usize,
    /// Inlier transfer error, in pixels.
    pub threshold: f64,
    pub seed: u64,
}

#[derive(Debug, Clone)]
pub struct RansacFit {
    pub homography: Matrix3<f64>,
    pub inliers: Vec<bool>,
}

impl RansacFit {
    pub fn inlier_count(&self) -> usize {
        self.inliers.iter().filter(|v| **v).count()
    }
}

fn inlier_mask(h: &Matrix3<f64>, src: &[[f64; 2]], dst: &[[f64; 2]], threshold: f64) -> Vec<bool> {
    src.iter()
        .zip(dst)
        .map(|(s, d)| transfer_error(h, *s, *d) < threshold)
        .collect()
}

/// Robust homography: best minimal-sample consensus, refit on its inliers.
pub fn estimate_ransac(src: &[[f64; 2]], dst: &[[f64; 2]], config: &RansacConfig) -> Result<RansacFit> {
    let n = src.len();
    if n < MIN_POINTS {
        return Err(ShoreError::InsufficientCorrespondences {
            needed: MIN_POINTS,
            found: n,
        });
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut best: Option<(Matrix3<f64>, Vec<bool>, usize)> = None;

    let iterations = if n == MIN_POINTS { 1 } else { config.iterations.max(1) };
    for _ in 0..iterations {
        let picks = sample(&mut rng, n, MIN_POINTS);
        let s: Vec<[f64; 2]> = picks.iter().map(|i| src[i]).collect();
        let d: Vec<[f64; 2]> = picks.iter().map(|i| dst[i]).collect();
        let Ok(h) = estimate_dlt(&s, &d) else {
            continue;
        };

        let mask = inlier_mask(&h, src, dst, config.threshold);
        let count = mask.iter().filter(|v| **v).count();
        if best.as_ref().is_none_or(|(_, _, c)| count > *c) {
            let all = count == n;
            best = Some((h, mask, count));
            if all {
                break;
            }
        }
    }

    let Some((h, mask, count)) = best else {
        return Err(ShoreError::GeometryFailure(
            "no non-degenerate sample found".to_string(),
        ));
    };
    if count < MIN_POINTS {
        return Err(ShoreError::InsufficientCorrespondences {
            needed: MIN_POINTS,
            found: count,
        });
    }

    let s: Vec<[f64; 2]> = (0..n).filter(|&i| mask[i]).map(|i| src[i]).collect();
    let d: Vec<[f64; 2]> = (0..n).filter(|&i| mask[i]).map(|i| dst[i]).collect();
    let homography = estimate_dlt(&s, &d).unwrap_or(h);
    let inliers = inlier_mask(&homography, src, dst, config.threshold);

    Ok(RansacFit {
        homography,
        inliers,
    })
}
