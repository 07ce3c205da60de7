mod common;

use approx::assert_abs_diff_eq;
use common::*;
use image::{GrayImage, RgbImage};
use shoremap::ShoreError;
use shoremap::config::AlignerParams;
use shoremap::registration::homography;
use shoremap::registration::{self, AlignOutcome, ControlAligner, Correspondences, SkipReason};

fn control_texture() -> RgbImage {
    texture_image(320, 240, 0, 0)
}

#[test]
fn test_shifted_photo_aligns_to_control() -> anyhow::Result<()> {
    let control = control_texture();
    // Content that sits at (x, y) in the control sits at (x - 6, y - 4) here
    let photo = texture_image(320, 240, 6, 4);

    let aligner = ControlAligner::new(&control, None, &AlignerParams::default())?;
    assert!(aligner.control_features().len() >= 50);

    let aligned = match aligner.align(&photo) {
        AlignOutcome::Aligned(aligned) => aligned,
        AlignOutcome::Skipped(reason) => panic!("photo skipped: {}", reason),
    };

    let mapped = homography::apply(&aligned.homography, [100.0, 100.0]).expect("finite");
    assert_abs_diff_eq!(mapped[0], 106.0, epsilon = 0.25);
    assert_abs_diff_eq!(mapped[1], 104.0, epsilon = 0.25);
    assert!(aligned.inliers >= 20, "only {} inliers", aligned.inliers);
    assert_eq!(aligned.image.dimensions(), control.dimensions());

    // Away from the borders the warped photo reproduces the control
    let mut total = 0u64;
    let mut count = 0u64;
    for y in 20..220 {
        for x in 20..300 {
            let a = aligned.image.get_pixel(x, y)[0] as i64;
            let b = control.get_pixel(x, y)[0] as i64;
            total += (a - b).unsigned_abs();
            count += 1;
        }
    }
    let mean = total as f64 / count as f64;
    assert!(mean < 1.0, "mean abs difference {}", mean);
    Ok(())
}

#[test]
fn test_featureless_photo_is_skipped() -> anyhow::Result<()> {
    let aligner = ControlAligner::new(&control_texture(), None, &AlignerParams::default())?;
    let blank = RgbImage::from_pixel(320, 240, image::Rgb([128, 128, 128]));

    assert_eq!(aligner.match_count(&blank), 0);
    match aligner.align(&blank) {
        AlignOutcome::Skipped(SkipReason::InsufficientCorrespondences { found }) => {
            assert_eq!(found, 0)
        }
        other => panic!("expected a skip, got aligned = {}", other.is_aligned()),
    }
    Ok(())
}

#[test]
fn test_three_correspondences_are_not_enough() -> anyhow::Result<()> {
    let control = control_texture();
    let aligner = ControlAligner::new(&control, None, &AlignerParams::default())?;
    let pairs = Correspondences {
        control: vec![[10.0, 10.0], [200.0, 15.0], [150.0, 180.0]],
        photo: vec![[12.0, 11.0], [202.0, 16.0], [152.0, 181.0]],
    };

    match aligner.align_with(&control, &pairs) {
        AlignOutcome::Skipped(reason) => {
            assert_eq!(reason, SkipReason::InsufficientCorrespondences { found: 3 })
        }
        AlignOutcome::Aligned(_) => panic!("three correspondences must not align"),
    }
    Ok(())
}

#[test]
fn test_four_exact_correspondences_give_exact_homography() -> anyhow::Result<()> {
    let control = control_texture();
    let aligner = ControlAligner::new(&control, None, &AlignerParams::default())?;
    let pairs = Correspondences {
        control: vec![[20.0, 30.0], [290.0, 25.0], [300.0, 210.0], [15.0, 220.0]],
        photo: vec![[25.0, 33.0], [280.0, 31.0], [297.0, 200.0], [22.0, 214.0]],
    };

    let aligned = match aligner.align_with(&control, &pairs) {
        AlignOutcome::Aligned(aligned) => aligned,
        AlignOutcome::Skipped(reason) => panic!("skipped: {}", reason),
    };
    assert_eq!(aligned.inliers, 4);
    for (p, c) in pairs.photo.iter().zip(&pairs.control) {
        let mapped = homography::apply(&aligned.homography, *p).expect("finite");
        assert_abs_diff_eq!(mapped[0], c[0], epsilon = 1e-6);
        assert_abs_diff_eq!(mapped[1], c[1], epsilon = 1e-6);
    }
    Ok(())
}

#[test]
fn test_mask_must_match_control() {
    let wrong = GrayImage::new(100, 100);
    let result = ControlAligner::new(&control_texture(), Some(wrong), &AlignerParams::default());
    assert!(matches!(result, Err(ShoreError::InvalidConfig(_))));
}

#[test]
fn test_mask_limits_control_keypoints() -> anyhow::Result<()> {
    let control = control_texture();
    // Only the top half of the control may contribute matches
    let mask = GrayImage::from_fn(320, 240, |_, y| image::Luma([if y < 120 { 255 } else { 0 }]));
    let aligner = ControlAligner::new(&control, Some(mask), &AlignerParams::default())?;

    let pairs = aligner.correspondences(&control);
    assert!(pairs.len() >= 4);
    assert!(pairs.control.iter().all(|p| p[1] < 120.0));
    Ok(())
}

#[test]
fn test_batch_threshold_skips_weak_photos() {
    let counts = [120, 80, 30, 2];
    let threshold = registration::quality_threshold(&counts);
    assert_eq!(threshold, Some(0.5 * (230.0 / 3.0)));

    let verdicts: Vec<_> = counts
        .iter()
        .map(|&c| registration::admit(c, threshold))
        .collect();
    assert_eq!(verdicts[0], None);
    assert_eq!(verdicts[1], None);
    assert!(matches!(verdicts[2], Some(SkipReason::BelowQualityThreshold { found: 30, .. })));
    assert_eq!(
        verdicts[3],
        Some(SkipReason::InsufficientCorrespondences { found: 2 })
    );
}
