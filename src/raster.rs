use std::path::Path;

use image::{GrayImage, Luma, Rgb, RgbImage, Rgba, RgbaImage};
use imageproc::drawing::draw_polygon_mut;
use imageproc::point::Point;

use crate::config::SiteCalibration;
use crate::error::{Result, ShoreError};

/// Regular horizontal sampling grid over `[xlim] x [ylim]` at spacing `dxdy`, z = 0.
///
/// Row `r` lies at `y = ylim[0] + r * dxdy` and column `c` at `x = xlim[0] + c * dxdy`.
#[derive(Debug, Clone, PartialEq)]
pub struct WorldGrid {
    xlim: [f64; 2],
    ylim: [f64; 2],
    dxdy: f64,
    cols: usize,
    rows: usize,
}

impl WorldGrid {
    pub fn new(xlim: [f64; 2], ylim: [f64; 2], dxdy: f64) -> Self {
        let count = |lim: [f64; 2]| ((lim[1] - lim[0]) / dxdy + 1e-9).floor() as usize + 1;
        Self {
            xlim,
            ylim,
            dxdy,
            cols: count(xlim),
            rows: count(ylim),
        }
    }

    pub fn from_site(site: &SiteCalibration) -> Self {
        Self::new(site.grid.xlim, site.grid.ylim, site.grid.dxdy)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn dxdy(&self) -> f64 {
        self.dxdy
    }

    pub fn xlim(&self) -> [f64; 2] {
        self.xlim
    }

    pub fn ylim(&self) -> [f64; 2] {
        self.ylim
    }

    pub fn world_at(&self, row: usize, col: usize) -> [f64; 2] {
        [
            self.xlim[0] + col as f64 * self.dxdy,
            self.ylim[0] + row as f64 * self.dxdy,
        ]
    }

    /// Fractional `(row, col)` of a world point.
    pub fn to_cell(&self, point: [f64; 2]) -> (f64, f64) {
        (
            (point[1] - self.ylim[0]) / self.dxdy,
            (point[0] - self.xlim[0]) / self.dxdy,
        )
    }

    /// Nearest cell of a world point, if it lies on the grid.
    pub fn nearest_cell(&self, point: [f64; 2]) -> Option<(usize, usize)> {
        let (r, c) = self.to_cell(point);
        let (r, c) = (r.round(), c.round());
        if r < 0.0 || c < 0.0 || r >= self.rows as f64 || c >= self.cols as f64 {
            return None;
        }
        Some((r as usize, c as usize))
    }

    /// All cell centres in row-major order.
    pub fn iter_cells(&self) -> impl Iterator<Item = (usize, usize, [f64; 2])> + '_ {
        (0..self.rows).flat_map(move |r| (0..self.cols).map(move |c| (r, c, self.world_at(r, c))))
    }
}

/// Plan-view colour raster with an explicit per-cell validity mask.
///
/// Invalid ("no data") cells keep a black colour sample but are never read as data.
#[derive(Debug, Clone, PartialEq)]
pub struct RectifiedRaster {
    image: RgbImage,
    valid: Vec<bool>,
}

impl RectifiedRaster {
    /// An all-invalid raster of `cols x rows` cells.
    pub fn empty(cols: u32, rows: u32) -> Self {
        Self {
            image: RgbImage::new(cols, rows),
            valid: vec![false; (cols * rows) as usize],
        }
    }

    pub fn for_grid(grid: &WorldGrid) -> Self {
        Self::empty(grid.cols() as u32, grid.rows() as u32)
    }

    /// Wrap a fully valid colour image.
    pub fn from_image(image: RgbImage) -> Self {
        let n = (image.width() * image.height()) as usize;
        Self {
            image,
            valid: vec![true; n],
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    fn index(&self, col: u32, row: u32) -> usize {
        (row * self.image.width() + col) as usize
    }

    pub fn set(&mut self, col: u32, row: u32, px: Rgb<u8>) {
        let i = self.index(col, row);
        self.image.put_pixel(col, row, px);
        self.valid[i] = true;
    }

    pub fn invalidate(&mut self, col: u32, row: u32) {
        let i = self.index(col, row);
        self.image.put_pixel(col, row, Rgb([0, 0, 0]));
        self.valid[i] = false;
    }

    pub fn is_valid(&self, col: u32, row: u32) -> bool {
        col < self.width() && row < self.height() && self.valid[self.index(col, row)]
    }

    pub fn get(&self, col: u32, row: u32) -> Option<Rgb<u8>> {
        if self.is_valid(col, row) {
            Some(*self.image.get_pixel(col, row))
        } else {
            None
        }
    }

    pub fn valid_count(&self) -> usize {
        self.valid.iter().filter(|v| **v).count()
    }

    /// Drop every cell where `mask` is zero.
    pub fn with_exclusion(&self, mask: &GrayImage) -> Result<Self> {
        if mask.dimensions() != self.image.dimensions() {
            return Err(ShoreError::InvalidConfig(format!(
                "exclusion mask is {:?}, raster is {:?}",
                mask.dimensions(),
                self.image.dimensions()
            )));
        }
        let mut out = self.clone();
        for (x, y, m) in mask.enumerate_pixels() {
            if m[0] == 0 {
                out.invalidate(x, y);
            }
        }
        Ok(out)
    }

    /// Box mean over a `(2r+1)^2` window using only valid neighbours.
    /// Validity itself is unchanged.
    pub fn box_blur(&self, radius: u32) -> Self {
        if radius == 0 {
            return self.clone();
        }
        let (w, h) = (self.width() as usize, self.height() as usize);
        // Summed-area tables with a zero border row/column.
        let stride = w + 1;
        let mut sums = vec![[0u64; 4]; stride * (h + 1)];
        for y in 0..h {
            for x in 0..w {
                let mut cell = [0u64; 4];
                if self.valid[y * w + x] {
                    let px = self.image.get_pixel(x as u32, y as u32);
                    cell = [px[0] as u64, px[1] as u64, px[2] as u64, 1];
                }
                let above = sums[y * stride + x + 1];
                let left = sums[(y + 1) * stride + x];
                let diag = sums[y * stride + x];
                let out = &mut sums[(y + 1) * stride + x + 1];
                for k in 0..4 {
                    out[k] = cell[k] + above[k] + left[k] - diag[k];
                }
            }
        }

        let r = radius as usize;
        let mut out = self.clone();
        for y in 0..h {
            let (y0, y1) = (y.saturating_sub(r), (y + r + 1).min(h));
            for x in 0..w {
                if !self.valid[y * w + x] {
                    continue;
                }
                let (x0, x1) = (x.saturating_sub(r), (x + r + 1).min(w));
                let mut acc = [0u64; 4];
                for k in 0..4 {
                    acc[k] = sums[y1 * stride + x1][k] + sums[y0 * stride + x0][k]
                        - sums[y0 * stride + x1][k]
                        - sums[y1 * stride + x0][k];
                }
                let n = acc[3].max(1);
                let px = Rgb([
                    ((acc[0] + n / 2) / n) as u8,
                    ((acc[1] + n / 2) / n) as u8,
                    ((acc[2] + n / 2) / n) as u8,
                ]);
                out.image.put_pixel(x as u32, y as u32, px);
            }
        }
        out
    }

    /// Red minus blue for every cell, `None` where invalid.
    pub fn red_minus_blue(&self) -> ScalarField {
        self.field(|px| px[0] as f64 - px[2] as f64)
    }

    /// HSV value channel (max of R, G, B) for every cell.
    pub fn brightness(&self) -> ScalarField {
        self.field(|px| px[0].max(px[1]).max(px[2]) as f64)
    }

    fn field(&self, f: impl Fn(&Rgb<u8>) -> f64) -> ScalarField {
        let data = self
            .image
            .enumerate_pixels()
            .zip(&self.valid)
            .map(|((_, _, px), &ok)| if ok { f(px) } else { f64::NAN })
            .collect();
        ScalarField {
            width: self.width() as usize,
            height: self.height() as usize,
            data,
        }
    }

    /// RGBA encoding with alpha 255 on valid cells and 0 on no-data cells.
    pub fn to_rgba(&self) -> RgbaImage {
        RgbaImage::from_fn(self.width(), self.height(), |x, y| {
            let px = self.image.get_pixel(x, y);
            let alpha = if self.is_valid(x, y) { 255 } else { 0 };
            Rgba([px[0], px[1], px[2], alpha])
        })
    }

    pub fn from_rgba(rgba: &RgbaImage) -> Self {
        let mut out = Self::empty(rgba.width(), rgba.height());
        for (x, y, px) in rgba.enumerate_pixels() {
            if px[3] > 0 {
                out.set(x, y, Rgb([px[0], px[1], px[2]]));
            }
        }
        out
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.to_rgba()
            .save_with_format(path, image::ImageFormat::Png)?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let img = image::open(path)?;
        Ok(Self::from_rgba(&img.to_rgba8()))
    }
}

/// A scalar raster where missing cells are NaN.
#[derive(Debug, Clone)]
pub struct ScalarField {
    width: usize,
    height: usize,
    data: Vec<f64>,
}

impl ScalarField {
    pub fn from_fn(width: usize, height: usize, f: impl Fn(usize, usize) -> Option<f64>) -> Self {
        let mut data = Vec::with_capacity(width * height);
        for row in 0..height {
            for col in 0..width {
                data.push(f(row, col).unwrap_or(f64::NAN));
            }
        }
        Self {
            width,
            height,
            data,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row >= self.height || col >= self.width {
            return None;
        }
        let v = self.data[row * self.width + col];
        if v.is_nan() { None } else { Some(v) }
    }

    /// Mark every cell for which `keep(row, col)` is false as missing.
    pub fn retain(&mut self, keep: impl Fn(usize, usize) -> bool) {
        for row in 0..self.height {
            for col in 0..self.width {
                if !keep(row, col) {
                    self.data[row * self.width + col] = f64::NAN;
                }
            }
        }
    }

    /// Bilinear sample at a fractional `(row, col)`. Any contributing
    /// corner that is missing or off the raster makes the sample missing.
    pub fn bilinear(&self, row: f64, col: f64) -> Option<f64> {
        if row < 0.0 || col < 0.0 {
            return None;
        }
        let (r0, c0) = (row.floor() as usize, col.floor() as usize);
        let (fr, fc) = (row - r0 as f64, col - c0 as f64);
        let mut acc = 0.0;
        for (dr, wr) in [(0, 1.0 - fr), (1, fr)] {
            for (dc, wc) in [(0, 1.0 - fc), (1, fc)] {
                let w = wr * wc;
                if w <= 1e-12 {
                    continue;
                }
                acc += w * self.get(r0 + dr, c0 + dc)?;
            }
        }
        Some(acc)
    }
}

/// Load a binary mask image (any format the `image` crate reads).
pub fn load_mask<P: AsRef<Path>>(path: P) -> Result<GrayImage> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(ShoreError::missing("mask", path));
    }
    Ok(image::open(path)?.to_luma8())
}

/// Rasterise polygons (pixel coordinates) into a mask: 255 inside, 0 elsewhere.
pub fn mask_from_polygons(width: u32, height: u32, polygons: &[Vec<[f32; 2]>]) -> GrayImage {
    let mut mask = GrayImage::new(width, height);
    for poly in polygons {
        let mut pts: Vec<Point<i32>> = poly
            .iter()
            .map(|p| Point::new(p[0].round() as i32, p[1].round() as i32))
            .collect();
        if pts.len() > 1 && pts.first() == pts.last() {
            pts.pop();
        }
        if pts.len() < 3 {
            continue;
        }
        draw_polygon_mut(&mut mask, &pts, Luma([255u8]));
    }
    mask
}

/// Rasterise polygons given in world coordinates onto the grid's cells.
pub fn world_mask_from_polygons(grid: &WorldGrid, polygons: &[Vec<[f64; 2]>]) -> GrayImage {
    let pixel_polys: Vec<Vec<[f32; 2]>> = polygons
        .iter()
        .map(|poly| {
            poly.iter()
                .map(|&p| {
                    let (r, c) = grid.to_cell(p);
                    [c as f32, r as f32]
                })
                .collect()
        })
        .collect();
    mask_from_polygons(grid.cols() as u32, grid.rows() as u32, &pixel_polys)
}

/// Grid-sized exclusion mask: 0 inside any polygon, 255 elsewhere.
pub fn exclusion_from_polygons(grid: &WorldGrid, polygons: &[Vec<[f64; 2]>]) -> GrayImage {
    let mut mask = world_mask_from_polygons(grid, polygons);
    image::imageops::invert(&mut mask);
    mask
}

/// Cell-wise minimum of two masks, so a cell excluded by either stays excluded.
pub fn combine_masks(a: &GrayImage, b: &GrayImage) -> Result<GrayImage> {
    if a.dimensions() != b.dimensions() {
        return Err(ShoreError::InvalidConfig(format!(
            "cannot combine masks of size {:?} and {:?}",
            a.dimensions(),
            b.dimensions()
        )));
    }
    Ok(GrayImage::from_fn(a.width(), a.height(), |x, y| {
        Luma([a.get_pixel(x, y)[0].min(b.get_pixel(x, y)[0])])
    }))
}
