use image::GrayImage;
use imageproc::corners::{Corner, corners_fast9};
use imageproc::filter::gaussian_blur_f32;
use imageproc::suppress::local_maxima;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::AlignerParams;

/// Half size of the square patch binary tests are drawn from.
const PATCH_RADIUS: i32 = 15;
const BORDER: u32 = PATCH_RADIUS as u32 + 1;
const N_TESTS: usize = 256;
/// Non-maximum suppression radius for FAST corners.
const NMS_RADIUS: u32 = 3;

/// 256-bit binary descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Descriptor(pub [u64; 4]);

impl Descriptor {
    pub fn distance(&self, other: &Descriptor) -> u32 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a ^ b).count_ones())
            .sum()
    }
}

/// Keypoints in `(x, y)` pixel coordinates with one descriptor each.
#[derive(Debug, Clone, Default)]
pub struct Features {
    pub keypoints: Vec<[f64; 2]>,
    pub descriptors: Vec<Descriptor>,
}

impl Features {
    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureMatch {
    pub control: usize,
    pub photo: usize,
    pub distance: u32,
}

/// Keypoint detector plus descriptor matcher used to register photos.
pub trait FeatureMatcher: Send + Sync {
    fn name(&self) -> &str;

    fn detect(&self, image: &GrayImage) -> Features;

    /// Correspondences from control features to photo features.
    fn match_features(&self, control: &Features, photo: &Features) -> Vec<FeatureMatch>;
}

/// FAST-9 corners described by seeded BRIEF tests, matched by brute-force
/// Hamming distance with a ratio test and a mutual-best check.
pub struct BriefMatcher {
    params: AlignerParams,
    tests: Vec<[(i32, i32); 2]>,
}

impl BriefMatcher {
    pub fn new(params: AlignerParams) -> Self {
        let mut rng = StdRng::seed_from_u64(params.seed);
        let mut offset = || {
            (
                rng.gen_range(-PATCH_RADIUS..=PATCH_RADIUS),
                rng.gen_range(-PATCH_RADIUS..=PATCH_RADIUS),
            )
        };
        let tests = (0..N_TESTS).map(|_| [offset(), offset()]).collect();
        Self { params, tests }
    }

    pub fn params(&self) -> &AlignerParams {
        &self.params
    }

    fn describe(&self, smoothed: &GrayImage, x: u32, y: u32) -> Descriptor {
        let at = |(dx, dy): (i32, i32)| {
            smoothed.get_pixel((x as i32 + dx) as u32, (y as i32 + dy) as u32)[0]
        };
        let mut bits = [0u64; 4];
        for (i, [a, b]) in self.tests.iter().enumerate() {
            if at(*a) < at(*b) {
                bits[i / 64] |= 1 << (i % 64);
            }
        }
        Descriptor(bits)
    }
}

/// Index of the nearest descriptor plus the best and second best distances.
fn nearest_two(query: &Descriptor, set: &[Descriptor]) -> Option<(usize, u32, u32)> {
    let mut best: Option<(usize, u32)> = None;
    let mut second = u32::MAX;
    for (j, d) in set.iter().enumerate() {
        let dist = query.distance(d);
        match best {
            Some((_, b)) if dist >= b => second = second.min(dist),
            Some((_, b)) => {
                second = b;
                best = Some((j, dist));
            }
            None => best = Some((j, dist)),
        }
    }
    best.map(|(j, d)| (j, d, second))
}

impl FeatureMatcher for BriefMatcher {
    fn name(&self) -> &str {
        "FAST/BRIEF"
    }

    fn detect(&self, image: &GrayImage) -> Features {
        let (w, h) = image.dimensions();
        if w <= 2 * BORDER || h <= 2 * BORDER {
            return Features::default();
        }

        let corners = corners_fast9(image, self.params.fast_threshold);
        let mut corners: Vec<Corner> = local_maxima(&corners, NMS_RADIUS)
            .into_iter()
            .filter(|c| c.x >= BORDER && c.y >= BORDER && c.x < w - BORDER && c.y < h - BORDER)
            .collect();
        corners.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then(a.y.cmp(&b.y))
                .then(a.x.cmp(&b.x))
        });
        corners.truncate(self.params.max_keypoints);

        let smoothed = if self.params.descriptor_sigma > 0.0 {
            gaussian_blur_f32(image, self.params.descriptor_sigma)
        } else {
            image.clone()
        };

        let mut features = Features::default();
        for c in corners {
            features.keypoints.push([c.x as f64, c.y as f64]);
            features.descriptors.push(self.describe(&smoothed, c.x, c.y));
        }
        features
    }

    fn match_features(&self, control: &Features, photo: &Features) -> Vec<FeatureMatch> {
        if control.is_empty() || photo.is_empty() {
            return Vec::new();
        }

        let reverse: Vec<Option<usize>> = photo
            .descriptors
            .iter()
            .map(|d| nearest_two(d, &control.descriptors).map(|(i, _, _)| i))
            .collect();

        let mut matches = Vec::new();
        for (i, d) in control.descriptors.iter().enumerate() {
            let Some((j, best, second)) = nearest_two(d, &photo.descriptors) else {
                continue;
            };
            if best > self.params.max_hamming {
                continue;
            }
            if second != u32::MAX && best as f32 >= self.params.ratio * second as f32 {
                continue;
            }
            if reverse[j] != Some(i) {
                continue;
            }
            matches.push(FeatureMatch {
                control: i,
                photo: j,
                distance: best,
            });
        }
        matches
    }
}
