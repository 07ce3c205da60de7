use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut};
use nalgebra::Point3;

use crate::models::ShorelineFix;
use crate::raster::{RectifiedRaster, WorldGrid};
use crate::rectification::PoseRecord;

pub const SHORELINE: Rgb<u8> = Rgb([255, 0, 0]);
pub const DRY_SAND: Rgb<u8> = Rgb([0, 255, 0]);
pub const REPROJECTED: Rgb<u8> = Rgb([255, 255, 0]);

const MARKER_RADIUS: i32 = 2;

fn polyline(image: &mut RgbImage, points: &[(f32, f32)], colour: Rgb<u8>) {
    for pair in points.windows(2) {
        draw_line_segment_mut(image, pair[0], pair[1], colour);
    }
    for &(x, y) in points {
        draw_filled_circle_mut(image, (x.round() as i32, y.round() as i32), MARKER_RADIUS, colour);
    }
}

/// Shoreline and dry-sand fixes drawn over the plan view.
pub fn draw_on_raster(raster: &RectifiedRaster, grid: &WorldGrid, fixes: &[ShorelineFix]) -> RgbImage {
    let mut image = raster.image().clone();
    let to_pixel = |p: [f64; 2]| {
        let (row, col) = grid.to_cell(p);
        (col as f32, row as f32)
    };

    let shore: Vec<(f32, f32)> = fixes.iter().filter_map(|f| f.shoreline).map(to_pixel).collect();
    let dry: Vec<(f32, f32)> = fixes.iter().filter_map(|f| f.dry_sand).map(to_pixel).collect();
    polyline(&mut image, &dry, DRY_SAND);
    polyline(&mut image, &shore, SHORELINE);
    image
}

/// Shoreline fixes projected back into an aligned photo through a stored pose.
pub fn draw_on_photo(photo: &RgbImage, record: &PoseRecord, fixes: &[ShorelineFix]) -> RgbImage {
    let pose = record.pose();
    let mut image = photo.clone();
    let points: Vec<(f32, f32)> = fixes
        .iter()
        .filter_map(|f| f.shoreline)
        .filter_map(|[x, y]| pose.project(&Point3::new(x, y, 0.0)))
        .filter(|&(u, v)| pose.on_screen(u, v))
        .map(|(u, v)| (u as f32, v as f32))
        .collect();
    polyline(&mut image, &points, REPROJECTED);
    image
}
