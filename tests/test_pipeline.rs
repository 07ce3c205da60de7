mod common;

use common::*;
use shoremap::pipeline::{CancelToken, SiteRun};
use shoremap::registration::SkipReason;
use shoremap::store::SiteLayout;

#[test]
fn test_full_run_on_synthetic_site() -> anyhow::Result<()> {
    let site = create_standard_site();
    let report = SiteRun::new(site.path()).run()?;

    assert_eq!(report.aligned, 1);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].0, "fog");
    assert!(matches!(
        report.skipped[0].1,
        SkipReason::InsufficientCorrespondences { .. }
    ));
    assert!(report.failed.is_empty());
    assert_eq!(report.rectified, 1);
    assert_eq!(report.extracted, 1);
    assert!(!report.cancelled);

    let layout = SiteLayout::new(site.path());
    assert!(layout.aligned_path("morning").exists());
    assert!(!layout.aligned_path("fog").exists());
    assert!(layout.rectified_path("morning").exists());
    assert!(layout.pose_record().exists());
    assert!(layout.raster_overlay_path("morning").exists());
    assert!(layout.photo_overlay_path("morning").exists());

    let record: ShorelineRecord =
        serde_json::from_str(&std::fs::read_to_string(layout.shoreline_path("morning"))?)?;
    assert_eq!(record.photo, "morning");
    assert!(!record.approved);
    assert_eq!(record.fixes.len(), test_transects().len());
    let defined: Vec<[f64; 2]> = record.fixes.iter().filter_map(|f| f.shoreline_abs).collect();
    assert!(defined.len() >= 5, "{} defined", defined.len());
    for [x, y] in defined {
        assert!((x - ORIGIN.0).abs() <= 31.0);
        assert!((y - ORIGIN.1 - WATERLINE_Y).abs() < 3.0, "shoreline at y = {}", y);
    }

    let pose = PoseRecord::load(layout.pose_record())?;
    assert_eq!(pose.fx, TRUE_FOCAL);
    assert_eq!(pose.origin, [ORIGIN.0, ORIGIN.1]);
    Ok(())
}

#[test]
fn test_rerun_leaves_outputs_alone() -> anyhow::Result<()> {
    let site = create_standard_site();
    SiteRun::new(site.path()).run()?;

    let layout = SiteLayout::new(site.path());
    let shoreline_before = std::fs::read(layout.shoreline_path("morning"))?;
    let rectified_before = std::fs::read(layout.rectified_path("morning"))?;

    let report = SiteRun::new(site.path()).with_approved(true).run()?;

    assert_eq!(report.aligned, 0);
    assert_eq!(report.rectified, 0);
    assert_eq!(report.extracted, 0);
    assert_eq!(report.already_aligned, 1);
    assert_eq!(report.already_rectified, 1);
    assert_eq!(report.already_extracted, 1);
    // Fog has no output, so it is evaluated and skipped again
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(std::fs::read(layout.shoreline_path("morning"))?, shoreline_before);
    assert_eq!(std::fs::read(layout.rectified_path("morning"))?, rectified_before);
    Ok(())
}

#[test]
fn test_batch_threshold_is_stable_across_reruns() -> anyhow::Result<()> {
    let clear = render_photo(&true_pose());
    // Grey out most of the sky band so few matches survive the mask
    let mut occluded = clear.clone();
    for y in 32..SKY_MASK_ROWS {
        for x in 0..PHOTO_WIDTH {
            occluded.put_pixel(x, y, image::Rgb([128, 128, 128]));
        }
    }
    let site = create_test_site(&[("0001-morning.png", &clear), ("0002-occluded.png", &occluded)]);

    let first = SiteRun::new(site.path()).run()?;
    let second = SiteRun::new(site.path()).run()?;

    assert_eq!(first.skipped.len(), 1);
    assert_eq!(first.skipped[0].0, "occluded");
    assert_eq!(second.skipped, first.skipped);
    assert_eq!(second.aligned, 0);
    assert_eq!(second.already_aligned, 1);
    assert!(!SiteLayout::new(site.path()).aligned_path("occluded").exists());
    Ok(())
}

#[test]
fn test_unreadable_raster_fails_only_its_photo() -> anyhow::Result<()> {
    let site = create_standard_site();
    SiteRun::new(site.path()).with_skip_shoreline(true).run()?;

    let layout = SiteLayout::new(site.path());
    std::fs::write(layout.rectified_path("broken"), b"not a png")?;

    let report = SiteRun::new(site.path()).run()?;

    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "broken");
    assert_eq!(report.extracted, 1);
    assert!(layout.shoreline_path("morning").exists());
    assert!(!layout.shoreline_path("broken").exists());
    Ok(())
}

#[test]
fn test_site_exclusion_zone_reaches_extraction() -> anyhow::Result<()> {
    let site = create_standard_site();
    let config = format!("{}{}", site_toml(), exclusion_toml("pier", -32.0, -28.0));
    std::fs::write(site.path().join("site.toml"), config)?;

    SiteRun::new(site.path()).run()?;

    let layout = SiteLayout::new(site.path());
    let record: ShorelineRecord =
        serde_json::from_str(&std::fs::read_to_string(layout.shoreline_path("morning"))?)?;
    assert_eq!(record.fixes[0].shoreline_abs, None);
    assert_eq!(record.fixes[0].dry_sand_abs, None);
    assert!(record.fixes[1..].iter().any(|f| f.shoreline_abs.is_some()));
    Ok(())
}

#[test]
fn test_runs_are_deterministic() -> anyhow::Result<()> {
    let first = create_standard_site();
    let second = create_standard_site();
    SiteRun::new(first.path()).run()?;
    SiteRun::new(second.path()).run()?;

    let (a, b) = (SiteLayout::new(first.path()), SiteLayout::new(second.path()));
    assert_eq!(
        std::fs::read(a.aligned_path("morning"))?,
        std::fs::read(b.aligned_path("morning"))?
    );
    assert_eq!(
        std::fs::read(a.rectified_path("morning"))?,
        std::fs::read(b.rectified_path("morning"))?
    );
    assert_eq!(
        std::fs::read_to_string(a.shoreline_path("morning"))?,
        std::fs::read_to_string(b.shoreline_path("morning"))?
    );
    Ok(())
}

#[test]
fn test_cancelled_run_stops_before_work() -> anyhow::Result<()> {
    let site = create_standard_site();
    let cancel = CancelToken::new();
    cancel.cancel();

    let report = SiteRun::new(site.path()).with_cancel(cancel).run()?;

    assert!(report.cancelled);
    assert_eq!(report.aligned, 0);
    let layout = SiteLayout::new(site.path());
    assert!(!layout.pose_record().exists());
    assert!(layout.aligned_photos()?.is_empty());
    Ok(())
}

#[test]
fn test_skip_shoreline_stops_after_rectification() -> anyhow::Result<()> {
    let site = create_standard_site();
    let report = SiteRun::new(site.path()).with_skip_shoreline(true).run()?;

    assert_eq!(report.rectified, 1);
    assert_eq!(report.extracted, 0);
    let layout = SiteLayout::new(site.path());
    assert!(!layout.shoreline_path("morning").exists());
    Ok(())
}

#[test]
fn test_incomplete_site_is_refused() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    std::fs::write(dir.path().join("site.toml"), site_toml())?;

    let status = SiteLayout::new(dir.path()).status()?;
    assert!(status.site_config);
    assert!(!status.is_ready());
    assert_eq!(
        status.missing(),
        vec!["control photo", "mask", "GCP picks", "transects"]
    );
    assert_eq!(status.raw_photos, 0);

    let result = SiteRun::new(dir.path()).run();
    assert!(result.is_err());
    Ok(())
}

#[test]
fn test_debug_dir_must_be_empty() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    std::fs::write(dir.path().join("leftover.txt"), "x")?;
    assert!(SiteRun::new("unused").with_debug(dir.path().to_path_buf()).is_err());

    let fresh = dir.path().join("fresh");
    let site = create_standard_site();
    SiteRun::new(site.path())
        .with_debug(fresh.clone())?
        .with_skip_shoreline(true)
        .run()?;
    assert!(fresh.join("01_aligned").join("morning.png").exists());
    assert!(fresh.join("02_rectified").join("morning.png").exists());
    Ok(())
}
