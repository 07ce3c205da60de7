use std::path::Path;

use image::{GrayImage, Luma, Rgb, RgbImage};
use nalgebra::{Point3, Vector3};
use shoremap::config::{GcpPick, SiteCalibration};
use shoremap::models::Transect;
use shoremap::raster::{RectifiedRaster, WorldGrid};
use shoremap::rectification::CameraPose;
use tempfile::TempDir;

pub const PHOTO_WIDTH: u32 = 640;
pub const PHOTO_HEIGHT: u32 = 480;
pub const TRUE_FOCAL: f64 = 600.0;
pub const CAMERA_HEIGHT: f64 = 20.0;
pub const ORIGIN: (f64, f64) = (1000.0, 5000.0);

/// Dry sand lies landward of this y, wet sand up to the waterline.
pub const DRY_EDGE_Y: f64 = 95.0;
pub const WATERLINE_Y: f64 = 110.0;

// Wet sand and water share green as their brightest channel, so brightness
// only steps down at the dry sand edge.
pub const DRY_SAND: Rgb<u8> = Rgb([230, 210, 170]);
pub const WET_SAND: Rgb<u8> = Rgb([150, 160, 100]);
pub const WATER: Rgb<u8> = Rgb([60, 170, 160]);

/// Rows of the rendered photo covered by the registration mask (all sky).
pub const SKY_MASK_ROWS: u32 = 110;

/// Surveyed GCPs in the local frame.
pub const GCPS: [(&str, [f64; 3]); 6] = [
    ("near_left", [-20.0, 70.0, 0.0]),
    ("near_right", [20.0, 70.0, 0.0]),
    ("mid_left", [-25.0, 120.0, 0.0]),
    ("mid_right", [25.0, 120.0, 0.0]),
    ("post", [0.0, 90.0, 2.0]),
    ("far", [10.0, 150.0, 0.0]),
];

/// (azimuth, tilt, roll) the synthetic photos are rendered with.
pub fn true_angles() -> [f64; 3] {
    [0.0, 80f64.to_radians(), 0.0]
}

pub fn true_pose() -> CameraPose {
    CameraPose::new(
        Vector3::new(0.0, 0.0, CAMERA_HEIGHT),
        true_angles(),
        TRUE_FOCAL,
        PHOTO_WIDTH,
        PHOTO_HEIGHT,
    )
}

/// Site description with a nominal orientation a couple of degrees off the truth.
pub fn site_toml() -> String {
    let mut text = format!(
        r#"name = "synthetic-beach"

[camera]
x0 = {x0:.1}
y0 = {y0:.1}
z0 = {z0:.1}
azimuth = 2.0
tilt = 78.0
roll = 1.0
hfov = [50.0, 62.0]

[grid]
xlim = [-40.0, 40.0]
ylim = [60.0, 160.0]
dxdy = 0.5
"#,
        x0 = ORIGIN.0,
        y0 = ORIGIN.1,
        z0 = CAMERA_HEIGHT
    );
    for (name, [x, y, z]) in GCPS {
        text.push_str(&format!(
            "\n[[gcp]]\nname = \"{}\"\nx = {:.1}\ny = {:.1}\nz = {:.1}\n",
            name,
            x + ORIGIN.0,
            y + ORIGIN.1,
            z
        ));
    }
    text
}

/// `[[exclusion]]` table covering the full grid height between two local x values.
pub fn exclusion_toml(name: &str, x_min: f64, x_max: f64) -> String {
    let corners = [(x_min, 60.0), (x_max, 60.0), (x_max, 160.0), (x_min, 160.0)];
    let points: Vec<String> = corners
        .iter()
        .map(|(x, y)| format!("[{:.1}, {:.1}]", x + ORIGIN.0, y + ORIGIN.1))
        .collect();
    format!(
        "\n[[exclusion]]\nname = \"{}\"\npoints = [{}]\n",
        name,
        points.join(", ")
    )
}

pub fn test_site() -> SiteCalibration {
    SiteCalibration::from_toml_str(&site_toml()).expect("synthetic site should parse")
}

pub fn test_grid() -> WorldGrid {
    WorldGrid::from_site(&test_site())
}

/// Exact pixel picks of every GCP under `pose`.
pub fn gcp_picks(pose: &CameraPose) -> Vec<GcpPick> {
    GCPS.iter()
        .map(|(name, [x, y, z])| {
            let (u, v) = pose
                .project(&Point3::new(*x, *y, *z))
                .expect("GCP should be in front of the camera");
            GcpPick {
                name: name.to_string(),
                u: Some(u),
                v: Some(v),
            }
        })
        .collect()
}

/// Shore-parallel transects from y = 70 out to y = 150.
pub fn test_transects() -> Vec<Transect> {
    (-3..=3)
        .map(|i| {
            let x = i as f64 * 10.0;
            Transect::new([x, 70.0], [x, 150.0])
        })
        .collect()
}

pub fn beach_colour(y: f64) -> Rgb<u8> {
    if y < DRY_EDGE_Y {
        DRY_SAND
    } else if y < WATERLINE_Y {
        WET_SAND
    } else {
        WATER
    }
}

/// A fully valid plan-view raster of the beach.
pub fn beach_raster(grid: &WorldGrid) -> RectifiedRaster {
    let mut raster = RectifiedRaster::for_grid(grid);
    for (row, col, [_, y]) in grid.iter_cells() {
        raster.set(col as u32, row as u32, beach_colour(y));
    }
    raster
}

/// Grey level of an 8x8 pixel block of a fixed random texture.
pub fn texture_value(x: i64, y: i64) -> u8 {
    let (bx, by) = (x.div_euclid(8) as u64, y.div_euclid(8) as u64);
    let mut z = bx.wrapping_mul(0x9E37_79B9_7F4A_7C15) ^ by.wrapping_mul(0xC2B2_AE3D_27D4_EB4F);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    (z ^ (z >> 31)) as u8
}

/// Texture window whose top-left corner sits at `(dx, dy)` in texture coordinates.
pub fn texture_image(width: u32, height: u32, dx: i64, dy: i64) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        let g = texture_value(x as i64 + dx, y as i64 + dy);
        Rgb([g, g, g])
    })
}

/// Ray-cast the beach through `pose`; pixels that never reach the ground show the texture.
pub fn render_photo(pose: &CameraPose) -> RgbImage {
    RgbImage::from_fn(pose.width, pose.height, |u, v| {
        match pose.back_project(u as f64, v as f64, 0.0) {
            Some(ground) => beach_colour(ground.y),
            None => {
                let g = texture_value(u as i64, v as i64);
                Rgb([g, g, g])
            }
        }
    })
}

pub fn sky_mask() -> GrayImage {
    GrayImage::from_fn(PHOTO_WIDTH, PHOTO_HEIGHT, |_, y| {
        if y < SKY_MASK_ROWS { Luma([255]) } else { Luma([0]) }
    })
}

pub fn save_png(image: &RgbImage, path: &Path) {
    image
        .save_with_format(path, image::ImageFormat::Png)
        .expect("Failed to save test image");
}

/// Creates a complete site directory in a temp dir with the given raw photos.
/// The temp dir must be kept alive for as long as the site is used.
pub fn create_test_site(raw: &[(&str, &RgbImage)]) -> TempDir {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let root = dir.path();
    let pose = true_pose();

    std::fs::write(root.join("site.toml"), site_toml()).expect("Failed to write site.toml");

    let control_dir = root.join("control");
    std::fs::create_dir_all(&control_dir).expect("Failed to create control dir");
    save_png(&render_photo(&pose), &control_dir.join("control.png"));
    sky_mask()
        .save_with_format(control_dir.join("mask.png"), image::ImageFormat::Png)
        .expect("Failed to save mask");
    let picks = serde_json::to_string_pretty(&gcp_picks(&pose)).expect("picks serialise");
    std::fs::write(control_dir.join("gcp_picks.json"), picks).expect("Failed to write picks");

    let transects = serde_json::to_string_pretty(&test_transects()).expect("transects serialise");
    std::fs::write(root.join("transects.json"), transects).expect("Failed to write transects");

    let raw_dir = root.join("raw");
    std::fs::create_dir_all(&raw_dir).expect("Failed to create raw dir");
    for (name, image) in raw {
        save_png(image, &raw_dir.join(name));
    }
    dir
}

/// The standard two-photo site: one clear copy of the control view and one fogged-out frame.
pub fn create_standard_site() -> TempDir {
    let clear = render_photo(&true_pose());
    let fog = RgbImage::from_pixel(PHOTO_WIDTH, PHOTO_HEIGHT, Rgb([128, 128, 128]));
    create_test_site(&[("0001-morning.png", &clear), ("0002-fog.png", &fog)])
}
