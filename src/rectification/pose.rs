use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt, TerminationReason};
use log::{debug, info, warn};
use nalgebra::{DMatrix, DVector, Dyn, Matrix3x4, storage::Owned};

use crate::config::{GcpCorrespondence, MIN_GCPS, SiteCalibration};
use crate::error::{Result, ShoreError};
use crate::rectification::camera::CameraPose;
use crate::resources;

/// Number of parameters fitted per focal candidate (azimuth, tilt, roll).
const N_PARAMS: usize = 3;
/// Spacing of the focal length search grid, in pixels.
const FOCAL_STEP: f64 = 5.0;

/// Camera orientation fitted at a fixed focal length.
struct AngleFit<'a> {
    gcps: &'a [GcpCorrespondence],
    base: CameraPose,
    params: DVector<f64>,
}

impl<'a> AngleFit<'a> {
    fn new(gcps: &'a [GcpCorrespondence], base: CameraPose, seed: [f64; 3]) -> Self {
        Self {
            gcps,
            base,
            params: DVector::from_column_slice(&seed),
        }
    }

    fn pose_for(&self, x: &DVector<f64>) -> CameraPose {
        CameraPose {
            angles: [x[0], x[1], x[2]],
            ..self.base.clone()
        }
    }

    /// Predicted minus observed, all u residuals first, then all v residuals.
    fn residuals_at(&self, x: &DVector<f64>) -> DVector<f64> {
        let pose = self.pose_for(x);
        let p: Matrix3x4<f64> = pose.projection_matrix();
        let n = self.gcps.len();
        let mut r = DVector::zeros(2 * n);
        for (i, gcp) in self.gcps.iter().enumerate() {
            let (u, v) = pose.project_raw(&p, &gcp.world);
            r[i] = u - gcp.pixel.0;
            r[n + i] = v - gcp.pixel.1;
        }
        r
    }
}

impl LeastSquaresProblem<f64, Dyn, Dyn> for AngleFit<'_> {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, x: &DVector<f64>) {
        self.params.clone_from(x);
    }

    fn params(&self) -> DVector<f64> {
        self.params.clone()
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        let r = self.residuals_at(&self.params);
        r.iter().all(|v| v.is_finite()).then_some(r)
    }

    fn jacobian(&self) -> Option<DMatrix<f64>> {
        // Central differences; three parameters keep this cheap.
        let h = 1e-6;
        let n = 2 * self.gcps.len();
        let mut jac = DMatrix::zeros(n, N_PARAMS);
        for k in 0..N_PARAMS {
            let mut plus = self.params.clone();
            let mut minus = self.params.clone();
            plus[k] += h;
            minus[k] -= h;
            let col = (self.residuals_at(&plus) - self.residuals_at(&minus)) / (2.0 * h);
            jac.set_column(k, &col);
        }
        jac.iter().all(|v| v.is_finite()).then_some(jac)
    }
}

/// Outcome of fitting the angles at one focal length.
#[derive(Debug, Clone, Copy)]
pub struct CandidateScore {
    pub focal: f64,
    /// Bias-corrected mean squared reprojection error.
    pub score: f64,
    pub angles: [f64; 3],
}

#[derive(Debug, Clone)]
pub struct PoseSolution {
    pub pose: CameraPose,
    pub score: f64,
    /// Root mean square reprojection error of the final fit, in pixels.
    pub rms: f64,
    pub candidates: Vec<CandidateScore>,
}

/// Solves orientation and focal length from GCP correspondences with the
/// camera position held fixed.
pub struct PoseSolver<'a> {
    site: &'a SiteCalibration,
    width: u32,
    height: u32,
}

impl<'a> PoseSolver<'a> {
    pub fn new(site: &'a SiteCalibration, width: u32, height: u32) -> Self {
        Self { site, width, height }
    }

    /// Candidate focal lengths spanning the site's horizontal FOV range.
    pub fn focal_candidates(&self) -> Vec<f64> {
        let half_width = 0.5 * self.width as f64;
        let focal_for = |fov_deg: f64| half_width / (fov_deg.to_radians() / 2.0).tan();
        let snap = |f: f64| ((f / FOCAL_STEP).round() * FOCAL_STEP).max(FOCAL_STEP);

        let [fov_min, fov_max] = self.site.camera.hfov;
        let lo = snap(focal_for(fov_max));
        let hi = snap(focal_for(fov_min));

        let steps = ((hi - lo) / FOCAL_STEP).round() as usize;
        (0..=steps).map(|i| lo + i as f64 * FOCAL_STEP).collect()
    }

    fn base_pose(&self, focal: f64) -> CameraPose {
        CameraPose::new(
            self.site.camera_position(),
            self.site.nominal_angles(),
            focal,
            self.width,
            self.height,
        )
    }

    /// Fit the angles at a fixed focal length, starting from the nominal orientation.
    pub fn fit_angles(&self, gcps: &[GcpCorrespondence], focal: f64) -> Result<CandidateScore> {
        let problem = AngleFit::new(gcps, self.base_pose(focal), self.site.nominal_angles());
        let (problem, report) = LevenbergMarquardt::new()
            .with_patience(4000)
            .minimize(problem);

        // Noise-free picks can stall at machine precision, which is still a fit.
        let usable = report.termination.was_successful()
            || matches!(report.termination, TerminationReason::NoImprovementPossible(_));
        if !usable {
            return Err(ShoreError::GeometryFailure(format!(
                "angle fit at fx={} did not converge: {:?}",
                focal, report.termination
            )));
        }

        let x = problem.params();
        let residuals = problem.residuals_at(&x);
        let m = residuals.len() as f64;
        let mse = residuals.norm_squared() / m;
        let score = mse * m / (m - N_PARAMS as f64);
        if !score.is_finite() {
            return Err(ShoreError::GeometryFailure(format!(
                "angle fit at fx={} produced a non-finite error",
                focal
            )));
        }

        Ok(CandidateScore {
            focal,
            score,
            angles: [x[0], x[1], x[2]],
        })
    }

    /// Grid search over focal length, then a final angle refit at the best focal length.
    pub fn solve(&self, gcps: &[GcpCorrespondence]) -> Result<PoseSolution> {
        if gcps.len() < MIN_GCPS || 2 * gcps.len() <= N_PARAMS {
            return Err(ShoreError::InsufficientCorrespondences {
                needed: MIN_GCPS,
                found: gcps.len(),
            });
        }

        let _gate = resources::exclusive_compute();

        let mut candidates = Vec::new();
        for focal in self.focal_candidates() {
            match self.fit_angles(gcps, focal) {
                Ok(candidate) => {
                    debug!("fx={:.0}: score={:.4}", focal, candidate.score);
                    candidates.push(candidate);
                }
                Err(e) => warn!("Skipping focal candidate: {}", e),
            }
        }

        let best = candidates
            .iter()
            .min_by(|a, b| a.score.total_cmp(&b.score))
            .ok_or_else(|| {
                ShoreError::GeometryFailure("no focal length candidate converged".to_string())
            })?;

        let fit = self.fit_angles(gcps, best.focal)?;
        let pose = CameraPose {
            angles: fit.angles,
            ..self.base_pose(fit.focal)
        };
        let rms = (fit.score * (2 * gcps.len() - N_PARAMS) as f64 / (2 * gcps.len()) as f64).sqrt();

        info!(
            "Solved pose: fx={:.0}, azimuth={:.3}°, tilt={:.3}°, roll={:.3}°, rms={:.2}px ({} GCPs)",
            pose.fx,
            pose.angles[0].to_degrees(),
            pose.angles[1].to_degrees(),
            pose.angles[2].to_degrees(),
            rms,
            gcps.len()
        );

        Ok(PoseSolution {
            pose,
            score: fit.score,
            rms,
            candidates,
        })
    }
}
