use serde::{Deserialize, Serialize};

use crate::raster::WorldGrid;

/// A cross-shore sampling line in local world coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transect {
    pub landward: [f64; 2],
    pub seaward: [f64; 2],
}

impl Transect {
    pub fn new(landward: [f64; 2], seaward: [f64; 2]) -> Self {
        Self { landward, seaward }
    }

    pub fn length(&self) -> f64 {
        let dx = self.seaward[0] - self.landward[0];
        let dy = self.seaward[1] - self.landward[1];
        dx.hypot(dy)
    }

    /// Express a world point in the transect frame: `(along, across)`, with
    /// `along = 0` at the landward end and increasing seaward.
    pub fn to_local(&self, point: [f64; 2]) -> (f64, f64) {
        let (sin_a, cos_a) = self.heading().sin_cos();
        let dx = point[0] - self.landward[0];
        let dy = point[1] - self.landward[1];
        (dx * cos_a + dy * sin_a, -dx * sin_a + dy * cos_a)
    }

    /// Inverse of [`Transect::to_local`].
    pub fn to_world(&self, along: f64, across: f64) -> [f64; 2] {
        let (sin_a, cos_a) = self.heading().sin_cos();
        [
            self.landward[0] + along * cos_a - across * sin_a,
            self.landward[1] + along * sin_a + across * cos_a,
        ]
    }

    fn heading(&self) -> f64 {
        (self.seaward[1] - self.landward[1]).atan2(self.seaward[0] - self.landward[0])
    }
}

/// An iso-line traced through a raster, in fractional `(row, col)` cell coordinates.
#[derive(Debug, Clone, Default)]
pub struct Contour {
    pub points: Vec<(f64, f64)>,
}

impl Contour {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        match (self.points.first(), self.points.last()) {
            (Some(a), Some(b)) if self.points.len() > 2 => a == b,
            _ => false,
        }
    }

    /// Snap each vertex to its nearest grid cell and return that cell's world coordinates.
    pub fn to_world(&self, grid: &WorldGrid) -> Vec<[f64; 2]> {
        let max_row = grid.rows().saturating_sub(1) as f64;
        let max_col = grid.cols().saturating_sub(1) as f64;
        self.points
            .iter()
            .map(|&(r, c)| {
                let row = r.round().clamp(0.0, max_row) as usize;
                let col = c.round().clamp(0.0, max_col) as usize;
                grid.world_at(row, col)
            })
            .collect()
    }
}

/// Shoreline result for one transect. Either field is `None` when no valid crossing exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ShorelineFix {
    pub shoreline: Option<[f64; 2]>,
    pub dry_sand: Option<[f64; 2]>,
}

impl ShorelineFix {
    pub fn undefined() -> Self {
        Self::default()
    }

    /// Distance between the waterline and the dry-sand boundary, when both exist.
    pub fn shift(&self) -> Option<f64> {
        let (a, b) = (self.shoreline?, self.dry_sand?);
        Some((a[0] - b[0]).hypot(a[1] - b[1]))
    }
}

/// Aggregate wet/dry boundary shift over a set of transects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ShiftSummary {
    pub count: usize,
    pub mean: Option<f64>,
    pub max: Option<f64>,
}

impl ShiftSummary {
    pub fn from_fixes(fixes: &[ShorelineFix]) -> Self {
        let shifts: Vec<f64> = fixes.iter().filter_map(ShorelineFix::shift).collect();
        Self::from_shifts(&shifts)
    }

    pub fn from_shifts(shifts: &[f64]) -> Self {
        if shifts.is_empty() {
            return Self::default();
        }
        let sum: f64 = shifts.iter().sum();
        let max = shifts.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Self {
            count: shifts.len(),
            mean: Some(sum / shifts.len() as f64),
            max: Some(max),
        }
    }

    /// Combine two summaries as if their shifts had been pooled.
    pub fn merge(&self, other: &ShiftSummary) -> ShiftSummary {
        let count = self.count + other.count;
        if count == 0 {
            return ShiftSummary::default();
        }
        let total = self.mean.unwrap_or(0.0) * self.count as f64
            + other.mean.unwrap_or(0.0) * other.count as f64;
        let max = match (self.max, other.max) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        ShiftSummary {
            count,
            mean: Some(total / count as f64),
            max,
        }
    }
}

/// One transect's entry in a persisted shoreline record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransectFixRecord {
    pub transect: usize,
    pub shoreline: Option<[f64; 2]>,
    pub shoreline_abs: Option<[f64; 2]>,
    pub dry_sand: Option<[f64; 2]>,
    pub dry_sand_abs: Option<[f64; 2]>,
}

/// Shoreline fixes for one photo, as handed to downstream consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShorelineRecord {
    pub photo: String,
    pub threshold: Option<f64>,
    pub fixes: Vec<TransectFixRecord>,
    pub contour: Vec<[f64; 2]>,
    pub summary: ShiftSummary,
    pub approved: bool,
}

impl ShorelineRecord {
    pub fn new(
        photo: impl Into<String>,
        result: &crate::shoreline::ShorelineResult,
        origin: (f64, f64),
        approved: bool,
    ) -> Self {
        let to_abs = |p: Option<[f64; 2]>| p.map(|[x, y]| [x + origin.0, y + origin.1]);
        let fixes = result
            .fixes
            .iter()
            .enumerate()
            .map(|(i, fix)| TransectFixRecord {
                transect: i,
                shoreline: fix.shoreline,
                shoreline_abs: to_abs(fix.shoreline),
                dry_sand: fix.dry_sand,
                dry_sand_abs: to_abs(fix.dry_sand),
            })
            .collect();
        Self {
            photo: photo.into(),
            threshold: result.threshold,
            fixes,
            contour: result.contour.clone(),
            summary: result.summary,
            approved,
        }
    }
}
