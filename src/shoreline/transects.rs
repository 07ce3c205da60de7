use crate::models::Transect;
use crate::raster::{ScalarField, WorldGrid};

/// One sample of a line profile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProfileSample {
    /// Distance from the start of the line, in world units.
    pub distance: f64,
    pub value: Option<f64>,
}

/// Bilinear samples along a straight line in cell coordinates, both
/// endpoints included, at roughly one sample per cell.
pub fn profile_line(field: &ScalarField, start: (f64, f64), end: (f64, f64)) -> Vec<(f64, Option<f64>)> {
    let (dr, dc) = (end.0 - start.0, end.1 - start.1);
    let n = (dr.hypot(dc) + 1.0).ceil().max(2.0) as usize;
    (0..n)
        .map(|i| {
            let t = i as f64 / (n - 1) as f64;
            (t, field.bilinear(start.0 + t * dr, start.1 + t * dc))
        })
        .collect()
}

/// Profile of `field` from the landward to the seaward end of a transect.
pub fn sample_transect(field: &ScalarField, grid: &WorldGrid, transect: &Transect) -> Vec<ProfileSample> {
    let length = transect.length();
    profile_line(field, grid.to_cell(transect.landward), grid.to_cell(transect.seaward))
        .into_iter()
        .map(|(t, value)| ProfileSample {
            distance: t * length,
            value,
        })
        .collect()
}

/// Polygon through every landward endpoint, then the seaward endpoints in reverse.
pub fn transect_polygon(transects: &[Transect]) -> Vec<[f64; 2]> {
    transects
        .iter()
        .map(|t| t.landward)
        .chain(transects.iter().rev().map(|t| t.seaward))
        .collect()
}

/// Even-odd point in polygon test.
pub fn contains(polygon: &[[f64; 2]], p: [f64; 2]) -> bool {
    let mut inside = false;
    let n = polygon.len();
    if n < 3 {
        return false;
    }
    let mut j = n - 1;
    for i in 0..n {
        let (a, b) = (polygon[i], polygon[j]);
        if (a[1] > p[1]) != (b[1] > p[1]) {
            let x = a[0] + (p[1] - a[1]) * (b[0] - a[0]) / (b[1] - a[1]);
            if p[0] < x {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Contour point closest to the landward end among those inside the
/// transect's band. Returns `(along, point)`.
pub fn first_crossing(contour: &[[f64; 2]], transect: &Transect, tolerance: f64) -> Option<(f64, [f64; 2])> {
    let length = transect.length();
    contour
        .iter()
        .filter_map(|&p| {
            let (along, across) = transect.to_local(p);
            (across.abs() < tolerance && along > 0.0 && along < length).then_some((along, p))
        })
        .min_by(|a, b| a.0.total_cmp(&b.0))
}

/// False when the field seaward of a candidate is missing or zero, which
/// marks a crossing produced by the no-data border rather than the waterline.
pub fn passes_black_test(
    field: &ScalarField,
    grid: &WorldGrid,
    transect: &Transect,
    along: f64,
    distance: f64,
) -> bool {
    let probe = transect.to_world(along + distance, 0.0);
    let Some((row, col)) = grid.nearest_cell(probe) else {
        return false;
    };
    match field.get(row, col) {
        Some(v) => v.abs() > 1e-9,
        None => false,
    }
}
