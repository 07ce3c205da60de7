pub mod features;
pub mod homography;

use std::fmt;
use std::sync::Arc;

use image::{GrayImage, Rgb, RgbImage};
use imageproc::geometric_transformations::{Interpolation, Projection, warp_into};
use log::debug;
use nalgebra::Matrix3;

use crate::config::AlignerParams;
use crate::error::{Result, ShoreError};
use crate::resources;

pub use features::{BriefMatcher, Descriptor, FeatureMatch, FeatureMatcher, Features};
pub use homography::{MIN_POINTS, RansacConfig, RansacFit};

/// Why a photo was left out of the aligned set.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    InsufficientCorrespondences { found: usize },
    BelowQualityThreshold { found: usize, threshold: f64 },
    GeometryFailure(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::InsufficientCorrespondences { found } => write!(
                f,
                "insufficient correspondences ({} < {})",
                found, MIN_POINTS
            ),
            SkipReason::BelowQualityThreshold { found, threshold } => {
                write!(f, "{} matches below batch threshold {:.1}", found, threshold)
            }
            SkipReason::GeometryFailure(msg) => write!(f, "homography failed: {}", msg),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AlignedPhoto {
    pub image: RgbImage,
    /// Maps photo pixels to control pixels.
    pub homography: Matrix3<f64>,
    pub matches: usize,
    pub inliers: usize,
}

#[derive(Debug, Clone)]
pub enum AlignOutcome {
    Aligned(AlignedPhoto),
    Skipped(SkipReason),
}

impl AlignOutcome {
    pub fn is_aligned(&self) -> bool {
        matches!(self, AlignOutcome::Aligned(_))
    }
}

/// Paired pixel positions, control side first.
#[derive(Debug, Clone, Default)]
pub struct Correspondences {
    pub control: Vec<[f64; 2]>,
    pub photo: Vec<[f64; 2]>,
}

impl Correspondences {
    pub fn len(&self) -> usize {
        self.control.len()
    }

    pub fn is_empty(&self) -> bool {
        self.control.is_empty()
    }
}

/// Registers photos to the control photo of a site.
pub struct ControlAligner {
    matcher: Arc<dyn FeatureMatcher>,
    control: Features,
    width: u32,
    height: u32,
    mask: Option<GrayImage>,
    ransac: RansacConfig,
}

impl ControlAligner {
    /// Aligner backed by the process-wide matcher.
    pub fn new(control: &RgbImage, mask: Option<GrayImage>, params: &AlignerParams) -> Result<Self> {
        let matcher: Arc<dyn FeatureMatcher> = resources::shared_matcher(params);
        Self::with_matcher(matcher, control, mask, params)
    }

    pub fn with_matcher(
        matcher: Arc<dyn FeatureMatcher>,
        control: &RgbImage,
        mask: Option<GrayImage>,
        params: &AlignerParams,
    ) -> Result<Self> {
        let (width, height) = control.dimensions();
        if let Some(m) = &mask {
            if m.dimensions() != (width, height) {
                return Err(ShoreError::InvalidConfig(format!(
                    "mask is {}x{} but the control photo is {}x{}",
                    m.width(),
                    m.height(),
                    width,
                    height
                )));
            }
        }

        let control = {
            let _gate = resources::exclusive_compute();
            matcher.detect(&to_gray(control))
        };
        debug!(
            "{}: {} control keypoints",
            matcher.name(),
            control.len()
        );

        Ok(Self {
            matcher,
            control,
            width,
            height,
            mask,
            ransac: RansacConfig {
                iterations: params.ransac_iterations,
                threshold: params.ransac_threshold,
                seed: params.seed,
            },
        })
    }

    pub fn control_features(&self) -> &Features {
        &self.control
    }

    pub fn control_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn in_mask(&self, p: [f64; 2]) -> bool {
        let Some(mask) = &self.mask else {
            return true;
        };
        let (x, y) = (p[0].round(), p[1].round());
        x >= 0.0
            && y >= 0.0
            && (x as u32) < mask.width()
            && (y as u32) < mask.height()
            && mask.get_pixel(x as u32, y as u32)[0] != 0
    }

    /// Matched points whose control-side keypoint lies in the stable-region mask.
    pub fn correspondences(&self, photo: &RgbImage) -> Correspondences {
        let (features, matches) = {
            let _gate = resources::exclusive_compute();
            let features = self.matcher.detect(&to_gray(photo));
            let matches = self.matcher.match_features(&self.control, &features);
            (features, matches)
        };

        let mut out = Correspondences::default();
        for m in matches {
            let c = self.control.keypoints[m.control];
            if self.in_mask(c) {
                out.control.push(c);
                out.photo.push(features.keypoints[m.photo]);
            }
        }
        out
    }

    pub fn match_count(&self, photo: &RgbImage) -> usize {
        self.correspondences(photo).len()
    }

    pub fn align(&self, photo: &RgbImage) -> AlignOutcome {
        let pairs = self.correspondences(photo);
        self.align_with(photo, &pairs)
    }

    /// Fit a photo-to-control homography from given correspondences and warp.
    pub fn align_with(&self, photo: &RgbImage, pairs: &Correspondences) -> AlignOutcome {
        if pairs.len() < MIN_POINTS {
            return AlignOutcome::Skipped(SkipReason::InsufficientCorrespondences {
                found: pairs.len(),
            });
        }

        let fit = match homography::estimate_ransac(&pairs.photo, &pairs.control, &self.ransac) {
            Ok(fit) => fit,
            Err(ShoreError::InsufficientCorrespondences { found, .. }) => {
                return AlignOutcome::Skipped(SkipReason::InsufficientCorrespondences { found });
            }
            Err(e) => return AlignOutcome::Skipped(SkipReason::GeometryFailure(e.to_string())),
        };

        match self.warp(photo, &fit.homography) {
            Some(image) => AlignOutcome::Aligned(AlignedPhoto {
                image,
                homography: fit.homography,
                matches: pairs.len(),
                inliers: fit.inlier_count(),
            }),
            None => AlignOutcome::Skipped(SkipReason::GeometryFailure(
                "homography is not invertible".to_string(),
            )),
        }
    }

    /// Resample `photo` into the control frame. Pixels mapping outside the photo are black.
    fn warp(&self, photo: &RgbImage, h: &Matrix3<f64>) -> Option<RgbImage> {
        let mut m = [0f32; 9];
        for r in 0..3 {
            for c in 0..3 {
                m[r * 3 + c] = h[(r, c)] as f32;
            }
        }
        let projection = Projection::from_matrix(m)?;
        let mut out = RgbImage::new(self.width, self.height);
        warp_into(
            photo,
            &projection,
            Interpolation::Bilinear,
            Rgb([0, 0, 0]),
            &mut out,
        );
        Some(out)
    }
}

pub fn to_gray(image: &RgbImage) -> GrayImage {
    image::DynamicImage::ImageRgb8(image.clone()).to_luma8()
}

/// Half the mean match count over photos with enough matches to align at all.
pub fn quality_threshold(counts: &[usize]) -> Option<f64> {
    let usable: Vec<usize> = counts.iter().copied().filter(|&c| c >= MIN_POINTS).collect();
    if usable.is_empty() {
        return None;
    }
    let mean = usable.iter().sum::<usize>() as f64 / usable.len() as f64;
    Some(0.5 * mean)
}

/// Batch admission: `None` admits the photo, otherwise the reason it is skipped.
pub fn admit(count: usize, threshold: Option<f64>) -> Option<SkipReason> {
    if count < MIN_POINTS {
        return Some(SkipReason::InsufficientCorrespondences { found: count });
    }
    match threshold {
        Some(t) if (count as f64) < t => Some(SkipReason::BelowQualityThreshold {
            found: count,
            threshold: t,
        }),
        _ => None,
    }
}
