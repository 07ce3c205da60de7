use std::collections::HashSet;
use std::path::Path;

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ShoreError};
use crate::models::Transect;

/// Minimum number of GCPs with pixel picks needed to solve a pose.
pub const MIN_GCPS: usize = 4;

/// Site geometry parsed once from `site.toml`.
///
/// GCP coordinates are absolute (e.g. easting/northing); everything the
/// processing stages touch is expressed in the local frame centred on
/// `(camera.x0, camera.y0)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SiteCalibration {
    pub name: String,
    pub camera: CameraStation,
    pub grid: GridSpec,
    #[serde(rename = "gcp", default)]
    pub gcps: Vec<GroundControlPoint>,
    #[serde(default)]
    pub extraction: ExtractionParams,
    #[serde(default)]
    pub registration: AlignerParams,
    /// Plan-view areas left out of shoreline extraction.
    #[serde(rename = "exclusion", default)]
    pub exclusions: Vec<ExclusionZone>,
}

/// Fixed camera station and its nominal orientation (degrees).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CameraStation {
    pub x0: f64,
    pub y0: f64,
    pub z0: f64,
    pub azimuth: f64,
    pub tilt: f64,
    pub roll: f64,
    /// Horizontal field of view range `[min, max]` in degrees.
    pub hfov: [f64; 2],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GridSpec {
    pub xlim: [f64; 2],
    pub ylim: [f64; 2],
    pub dxdy: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroundControlPoint {
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Polygon in absolute coordinates, e.g. a pier or a groyne.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExclusionZone {
    #[serde(default)]
    pub name: String,
    pub points: Vec<[f64; 2]>,
}

/// A user pick of one GCP in the control photo. Either coordinate may be unset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GcpPick {
    pub name: String,
    #[serde(default)]
    pub u: Option<f64>,
    #[serde(default)]
    pub v: Option<f64>,
}

/// A GCP in the local frame paired with its pixel position.
#[derive(Debug, Clone, Copy)]
pub struct GcpCorrespondence {
    pub world: Point3<f64>,
    pub pixel: (f64, f64),
}

/// Tunables for shoreline extraction. These are per-site; the defaults were
/// picked on a single camera setup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ExtractionParams {
    /// How far seaward (world units) the artifact probe looks past a candidate.
    pub black_test_distance: f64,
    /// Minimum brightness drop per sample accepted as a dry-sand edge.
    pub dry_gradient_threshold: f64,
    /// Half-width (world units) of the band around a transect that contour points must fall in.
    pub perpendicular_tolerance: f64,
    /// Box blur radius in raster cells applied before colour analysis (0 disables).
    pub blur_radius: u32,
    /// Gaussian sigma (in samples) for smoothing the brightness profile.
    pub dry_smoothing_sigma: f64,
    /// Minimum valid samples landward of the shoreline for the dry-sand pass.
    pub min_inland_samples: usize,
}

impl Default for ExtractionParams {
    fn default() -> Self {
        Self {
            black_test_distance: 2.0,
            dry_gradient_threshold: 5.0,
            perpendicular_tolerance: 1.0,
            blur_radius: 5,
            dry_smoothing_sigma: 1.0,
            min_inland_samples: 10,
        }
    }
}

/// Tunables for keypoint matching and homography estimation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct AlignerParams {
    pub fast_threshold: u8,
    pub max_keypoints: usize,
    /// Sigma of the smoothing applied before descriptors are sampled.
    pub descriptor_sigma: f32,
    /// Largest Hamming distance accepted for a match (out of 256 bits).
    pub max_hamming: u32,
    /// Lowe ratio between best and second best match distances.
    pub ratio: f32,
    /// RANSAC inlier threshold in pixels.
    pub ransac_threshold: f64,
    pub ransac_iterations: usize,
    pub seed: u64,
}

impl Default for AlignerParams {
    fn default() -> Self {
        Self {
            fast_threshold: 20,
            max_keypoints: 2048,
            descriptor_sigma: 2.0,
            max_hamming: 64,
            ratio: 0.8,
            ransac_threshold: 3.0,
            ransac_iterations: 2000,
            seed: 0x5EED,
        }
    }
}

impl SiteCalibration {
    /// Parse and validate a site description.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let site: SiteCalibration = toml::from_str(text)?;
        site.validate()?;
        Ok(site)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ShoreError::missing("site configuration", path));
        }
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Check every invariant up front so later stages never see a malformed site.
    pub fn validate(&self) -> Result<()> {
        let grid = &self.grid;
        if !(grid.dxdy > 0.0) {
            return Err(invalid(format!("grid.dxdy must be positive, got {}", grid.dxdy)));
        }
        if !(grid.xlim[0] < grid.xlim[1]) {
            return Err(invalid(format!("grid.xlim must be increasing, got {:?}", grid.xlim)));
        }
        if !(grid.ylim[0] < grid.ylim[1]) {
            return Err(invalid(format!("grid.ylim must be increasing, got {:?}", grid.ylim)));
        }

        let [fov_min, fov_max] = self.camera.hfov;
        if !(fov_min > 0.0 && fov_min <= fov_max && fov_max < 180.0) {
            return Err(invalid(format!(
                "camera.hfov must satisfy 0 < min <= max < 180, got {:?}",
                self.camera.hfov
            )));
        }

        if self.gcps.len() < MIN_GCPS {
            return Err(invalid(format!(
                "at least {} GCPs are required, found {}",
                MIN_GCPS,
                self.gcps.len()
            )));
        }

        let mut seen = HashSet::new();
        for gcp in &self.gcps {
            if !seen.insert(gcp.name.as_str()) {
                return Err(invalid(format!("duplicate GCP name '{}'", gcp.name)));
            }
        }

        for zone in &self.exclusions {
            if zone.points.len() < 3 {
                return Err(invalid(format!(
                    "exclusion zone '{}' needs at least 3 points, found {}",
                    zone.name,
                    zone.points.len()
                )));
            }
        }

        let ex = &self.extraction;
        if ex.perpendicular_tolerance <= 0.0 || ex.black_test_distance < 0.0 {
            return Err(invalid(
                "extraction tolerances must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Camera position in the local frame.
    pub fn camera_position(&self) -> Vector3<f64> {
        Vector3::new(0.0, 0.0, self.camera.z0)
    }

    /// Nominal (azimuth, tilt, roll) in radians, used to seed the pose fit.
    pub fn nominal_angles(&self) -> [f64; 3] {
        [
            self.camera.azimuth.to_radians(),
            self.camera.tilt.to_radians(),
            self.camera.roll.to_radians(),
        ]
    }

    pub fn origin(&self) -> (f64, f64) {
        (self.camera.x0, self.camera.y0)
    }

    pub fn to_local(&self, gcp: &GroundControlPoint) -> Point3<f64> {
        Point3::new(gcp.x - self.camera.x0, gcp.y - self.camera.y0, gcp.z)
    }

    /// Exclusion polygons in the local frame.
    pub fn exclusion_polygons(&self) -> Vec<Vec<[f64; 2]>> {
        self.exclusions
            .iter()
            .map(|zone| {
                zone.points
                    .iter()
                    .map(|p| [p[0] - self.camera.x0, p[1] - self.camera.y0])
                    .collect()
            })
            .collect()
    }

    /// Join pixel picks to site GCPs by name, dropping GCPs with an unset coordinate.
    pub fn correspondences(&self, picks: &[GcpPick]) -> Result<Vec<GcpCorrespondence>> {
        for pick in picks {
            if !self.gcps.iter().any(|g| g.name == pick.name) {
                return Err(invalid(format!("pick refers to unknown GCP '{}'", pick.name)));
            }
        }

        let mut out = Vec::new();
        for gcp in &self.gcps {
            let Some(pick) = picks.iter().find(|p| p.name == gcp.name) else {
                continue;
            };
            if let (Some(u), Some(v)) = (pick.u, pick.v) {
                out.push(GcpCorrespondence {
                    world: self.to_local(gcp),
                    pixel: (u, v),
                });
            }
        }

        if out.len() < MIN_GCPS {
            return Err(ShoreError::InsufficientCorrespondences {
                needed: MIN_GCPS,
                found: out.len(),
            });
        }
        Ok(out)
    }
}

fn invalid(msg: String) -> ShoreError {
    ShoreError::InvalidConfig(msg)
}

pub fn load_gcp_picks<P: AsRef<Path>>(path: P) -> Result<Vec<GcpPick>> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(ShoreError::missing("GCP picks", path));
    }
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

pub fn load_transects<P: AsRef<Path>>(path: P) -> Result<Vec<Transect>> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(ShoreError::missing("transects", path));
    }
    let text = std::fs::read_to_string(path)?;
    let transects: Vec<Transect> = serde_json::from_str(&text)?;
    if transects.is_empty() {
        return Err(ShoreError::missing("transects", path));
    }
    Ok(transects)
}
