use std::path::Path;

use nalgebra::{Matrix3, Matrix3x4, Point3, Vector3, Vector4};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ShoreError};
use crate::raster::WorldGrid;

/// Rotation for the (azimuth, tilt, roll) convention used by the site surveys.
///
/// Row 2 is the optical axis expressed in world coordinates.
pub fn rotation_from_angles(azimuth: f64, tilt: f64, roll: f64) -> Matrix3<f64> {
    let (sa, ca) = azimuth.sin_cos();
    let (st, ct) = tilt.sin_cos();
    let (ss, cs) = roll.sin_cos();
    Matrix3::new(
        ca * cs + sa * ct * ss,
        -cs * sa + ss * ct * ca,
        ss * st,
        -ss * ca + cs * ct * sa,
        ss * sa + cs * ct * ca,
        cs * st,
        st * sa,
        st * ca,
        -ct,
    )
}

/// Solved camera: fixed position, three orientation angles, square-pixel focal
/// length and a principal point at the image centre.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraPose {
    pub position: Vector3<f64>,
    /// (azimuth, tilt, roll) in radians.
    pub angles: [f64; 3],
    pub fx: f64,
    pub fy: f64,
    pub c0u: f64,
    pub c0v: f64,
    pub width: u32,
    pub height: u32,
}

impl CameraPose {
    pub fn new(position: Vector3<f64>, angles: [f64; 3], focal: f64, width: u32, height: u32) -> Self {
        Self {
            position,
            angles,
            fx: focal,
            fy: focal,
            c0u: width as f64 / 2.0,
            c0v: height as f64 / 2.0,
            width,
            height,
        }
    }

    pub fn rotation(&self) -> Matrix3<f64> {
        rotation_from_angles(self.angles[0], self.angles[1], self.angles[2])
    }

    /// `K` with a negated vertical focal length so image rows grow downwards.
    pub fn intrinsics(&self) -> Matrix3<f64> {
        Matrix3::new(self.fx, 0.0, self.c0u, 0.0, -self.fy, self.c0v, 0.0, 0.0, 1.0)
    }

    /// `P = K R [I | -C]`, scaled so that `P[(2, 3)] == 1` when that entry is non-zero.
    pub fn projection_matrix(&self) -> Matrix3x4<f64> {
        let mut ic = Matrix3x4::<f64>::zeros();
        ic.fixed_view_mut::<3, 3>(0, 0).copy_from(&Matrix3::identity());
        ic.set_column(3, &(-self.position));
        let mut p = self.intrinsics() * self.rotation() * ic;
        let scale = p[(2, 3)];
        if scale.abs() > 1e-12 {
            p /= scale;
        }
        p
    }

    /// Pixel position of a world point by homogeneous division, with no
    /// visibility check.
    pub fn project_raw(&self, p: &Matrix3x4<f64>, world: &Point3<f64>) -> (f64, f64) {
        let uvw = p * Vector4::new(world.x, world.y, world.z, 1.0);
        (uvw.x / uvw.z, uvw.y / uvw.z)
    }

    /// Depth of a world point along the optical axis.
    pub fn depth(&self, world: &Point3<f64>) -> f64 {
        self.rotation().row(2).transpose().dot(&(world.coords - self.position))
    }

    /// Project a world point, or `None` if it lies behind the camera.
    pub fn project(&self, world: &Point3<f64>) -> Option<(f64, f64)> {
        if self.depth(world) <= 0.0 {
            return None;
        }
        Some(self.project_raw(&self.projection_matrix(), world))
    }

    /// On-screen test on rounded pixel coordinates against `[1, NU] x [1, NV]`.
    pub fn on_screen(&self, u: f64, v: f64) -> bool {
        let (u, v) = (u.round(), v.round());
        u >= 1.0 && u <= self.width as f64 && v >= 1.0 && v <= self.height as f64
    }

    /// Intersect the viewing ray through pixel `(u, v)` with the plane `z = ground_z`.
    pub fn back_project(&self, u: f64, v: f64, ground_z: f64) -> Option<Point3<f64>> {
        let cam = Vector3::new((u - self.c0u) / self.fx, -(v - self.c0v) / self.fy, 1.0);
        let dir = self.rotation().transpose() * cam;
        if dir.z.abs() < 1e-12 {
            return None;
        }
        let t = (ground_z - self.position.z) / dir.z;
        if t <= 0.0 {
            return None;
        }
        Some(Point3::from(self.position + dir * t))
    }
}

/// Pose plus the site context needed to reproject world points into any
/// aligned photo without solving again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseRecord {
    pub position: [f64; 3],
    pub angles: [f64; 3],
    pub fx: f64,
    pub fy: f64,
    pub c0u: f64,
    pub c0v: f64,
    pub image_width: u32,
    pub image_height: u32,
    pub xlim: [f64; 2],
    pub ylim: [f64; 2],
    pub dxdy: f64,
    pub origin: [f64; 2],
}

impl PoseRecord {
    pub fn new(pose: &CameraPose, grid: &WorldGrid, origin: (f64, f64)) -> Self {
        Self {
            position: [pose.position.x, pose.position.y, pose.position.z],
            angles: pose.angles,
            fx: pose.fx,
            fy: pose.fy,
            c0u: pose.c0u,
            c0v: pose.c0v,
            image_width: pose.width,
            image_height: pose.height,
            xlim: grid.xlim(),
            ylim: grid.ylim(),
            dxdy: grid.dxdy(),
            origin: [origin.0, origin.1],
        }
    }

    pub fn pose(&self) -> CameraPose {
        CameraPose {
            position: Vector3::from(self.position),
            angles: self.angles,
            fx: self.fx,
            fy: self.fy,
            c0u: self.c0u,
            c0v: self.c0v,
            width: self.image_width,
            height: self.image_height,
        }
    }

    pub fn grid(&self) -> WorldGrid {
        WorldGrid::new(self.xlim, self.ylim, self.dxdy)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ShoreError::missing("pose record", path));
        }
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}
