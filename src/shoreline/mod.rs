pub mod contours;
pub mod dry_sand;
pub mod threshold;
pub mod transects;

use image::GrayImage;
use log::{debug, warn};

use crate::config::ExtractionParams;
use crate::error::{Result, ShoreError};
use crate::models::{ShiftSummary, ShorelineFix, Transect};
use crate::raster::{RectifiedRaster, ScalarField, WorldGrid};

pub use threshold::{ColorThreshold, classification_threshold};

/// Per-transect fixes for one rectified raster plus what produced them.
#[derive(Debug, Clone, Default)]
pub struct ShorelineResult {
    pub fixes: Vec<ShorelineFix>,
    pub threshold: Option<f64>,
    /// Longest contour in world coordinates.
    pub contour: Vec<[f64; 2]>,
    pub summary: ShiftSummary,
}

impl ShorelineResult {
    fn undefined(n: usize) -> Self {
        Self {
            fixes: vec![ShorelineFix::undefined(); n],
            ..Self::default()
        }
    }

    pub fn defined_count(&self) -> usize {
        self.fixes.iter().filter(|f| f.shoreline.is_some()).count()
    }
}

/// Finds the waterline along each transect of a rectified raster.
pub struct ShorelineExtractor<'a> {
    grid: &'a WorldGrid,
    transects: &'a [Transect],
    params: &'a ExtractionParams,
    exclusion: Option<&'a GrayImage>,
}

impl<'a> ShorelineExtractor<'a> {
    pub fn new(grid: &'a WorldGrid, transects: &'a [Transect], params: &'a ExtractionParams) -> Self {
        Self {
            grid,
            transects,
            params,
            exclusion: None,
        }
    }

    /// Cells where `mask` is zero are left out of sampling and contouring.
    pub fn with_exclusion(mut self, mask: &'a GrayImage) -> Self {
        self.exclusion = Some(mask);
        self
    }

    pub fn extract(&self, raster: &RectifiedRaster) -> Result<ShorelineResult> {
        let (cols, rows) = (self.grid.cols() as u32, self.grid.rows() as u32);
        if (raster.width(), raster.height()) != (cols, rows) {
            return Err(ShoreError::InvalidConfig(format!(
                "raster is {}x{} but the grid is {}x{}",
                raster.width(),
                raster.height(),
                cols,
                rows
            )));
        }

        let prepared = match self.exclusion {
            Some(mask) => raster.with_exclusion(mask)?,
            None => raster.clone(),
        }
        .box_blur(self.params.blur_radius);

        let color = prepared.red_minus_blue();

        // Step 1: pool non-zero samples along every transect
        let pooled: Vec<f64> = self
            .transects
            .iter()
            .flat_map(|t| transects::sample_transect(&color, self.grid, t))
            .filter_map(|s| s.value)
            .filter(|v| *v != 0.0)
            .collect();

        // Step 2: threshold
        let Some(threshold) = ColorThreshold::from_samples(&pooled) else {
            warn!(
                "No usable colour distribution ({} samples); all transects undefined",
                pooled.len()
            );
            return Ok(ShorelineResult::undefined(self.transects.len()));
        };
        debug!(
            "Threshold {:.2} (otsu {:.2}, wet {:.2}, dry {:.2}) from {} samples",
            threshold.value,
            threshold.otsu,
            threshold.wet_peak,
            threshold.dry_peak,
            pooled.len()
        );

        // Step 3: contour inside the transect corridor
        let polygon = transects::transect_polygon(self.transects);
        let mut interior = color.clone();
        interior.retain(|r, c| transects::contains(&polygon, self.grid.world_at(r, c)));
        let contour = contours::longest(contours::find_contours(&interior, threshold.value))
            .map(|c| c.to_world(self.grid))
            .unwrap_or_default();
        if contour.is_empty() {
            warn!("No contour at level {:.2}", threshold.value);
        }

        // Steps 4-6: per-transect crossing, artifact check, dry-sand refinement
        let brightness = prepared.brightness();
        let fixes: Vec<ShorelineFix> = self
            .transects
            .iter()
            .enumerate()
            .map(|(i, t)| {
                let fix = self.fix_for(t, &contour, &color, &brightness);
                if fix.shoreline.is_none() {
                    debug!("Transect {}: no shoreline crossing", i);
                }
                fix
            })
            .collect();

        let summary = ShiftSummary::from_fixes(&fixes);
        Ok(ShorelineResult {
            fixes,
            threshold: Some(threshold.value),
            contour,
            summary,
        })
    }

    fn fix_for(
        &self,
        transect: &Transect,
        contour: &[[f64; 2]],
        color: &ScalarField,
        brightness: &ScalarField,
    ) -> ShorelineFix {
        let Some((along, point)) =
            transects::first_crossing(contour, transect, self.params.perpendicular_tolerance)
        else {
            return ShorelineFix::undefined();
        };

        if !transects::passes_black_test(
            color,
            self.grid,
            transect,
            along,
            self.params.black_test_distance,
        ) {
            return ShorelineFix::undefined();
        }

        ShorelineFix {
            shoreline: Some(point),
            dry_sand: dry_sand::find_dry_sand(brightness, self.grid, transect, along, self.params),
        }
    }
}
