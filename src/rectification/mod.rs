pub mod camera;
pub mod pose;

use image::RgbImage;
use log::debug;
use nalgebra::Point3;

use crate::error::{Result, ShoreError};
use crate::raster::{RectifiedRaster, WorldGrid};

pub use camera::{CameraPose, PoseRecord, rotation_from_angles};
pub use pose::{CandidateScore, PoseSolution, PoseSolver};

/// Resamples aligned photos onto the world grid through a solved pose.
pub struct Rectifier<'a> {
    pose: &'a CameraPose,
    grid: &'a WorldGrid,
}

impl<'a> Rectifier<'a> {
    pub fn new(pose: &'a CameraPose, grid: &'a WorldGrid) -> Self {
        Self { pose, grid }
    }

    /// Nearest-pixel resample. Cells behind the camera or off-screen stay invalid.
    pub fn rectify(&self, photo: &RgbImage) -> Result<RectifiedRaster> {
        let (w, h) = photo.dimensions();
        if (w, h) != (self.pose.width, self.pose.height) {
            return Err(ShoreError::InvalidConfig(format!(
                "photo is {}x{} but the pose was solved for {}x{}",
                w, h, self.pose.width, self.pose.height
            )));
        }

        let p = self.pose.projection_matrix();
        let axis = self.pose.rotation().row(2).transpose();
        let mut raster = RectifiedRaster::for_grid(self.grid);

        for (row, col, [x, y]) in self.grid.iter_cells() {
            let world = Point3::new(x, y, 0.0);
            if axis.dot(&(world.coords - self.pose.position)) <= 0.0 {
                continue;
            }
            let (u, v) = self.pose.project_raw(&p, &world);
            if !self.pose.on_screen(u, v) {
                continue;
            }
            let pu = (u.round() as u32).min(w - 1);
            let pv = (v.round() as u32).min(h - 1);
            raster.set(col as u32, row as u32, *photo.get_pixel(pu, pv));
        }

        debug!(
            "Rectified {}x{} grid, {} cells on screen",
            self.grid.cols(),
            self.grid.rows(),
            raster.valid_count()
        );
        Ok(raster)
    }

    pub fn record(&self, origin: (f64, f64)) -> PoseRecord {
        PoseRecord::new(self.pose, self.grid, origin)
    }
}
